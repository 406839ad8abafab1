//! Load-flow solution methods.
//!
//! Three methods share one contract: Newton-Raphson linearizes the power
//! equations and solves the Jacobian system each iteration; the Gauss
//! variants apply the direct fixed-point update with successive (Seidel) or
//! synchronous (Jacobi) refresh. All methods consume the same [`Ybus`], evaluate
//! injections through [`crate::power`], and enforce reactive limits the same
//! way: a PV bus whose reactive output leaves its band is pinned at the
//! violated bound and reclassified PQ for the rest of the run, never back.
//!
//! One call in, one [`SolverResult`] out. Configuration problems (no
//! reference bus, islanded bus, stale matrix) are typed errors and no solve
//! is attempted; numerical failures are terminal statuses on the result,
//! carrying the iteration log accumulated so far. Results are written onto
//! the network's bus records only on a terminal state that has a usable
//! voltage profile (converged, or best-effort on an exhausted iteration
//! budget), never mid-run, and never on divergence or a singular system.

use crate::power;
use crate::ybus::Ybus;
use loadflow_core::{BusId, BusKind, ModelError, ModelResult, Network, PerUnit, Radians};
use num_complex::Complex64;
use serde::Serialize;

mod gauss;
mod newton;

#[cfg(test)]
mod q_limits;

use gauss::GaussMode;

/// Solution method selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveMethod {
    NewtonRaphson,
    GaussSeidel,
    GaussJacobi,
}

impl std::fmt::Display for SolveMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SolveMethod::NewtonRaphson => "Newton-Raphson",
            SolveMethod::GaussSeidel => "Gauss-Seidel",
            SolveMethod::GaussJacobi => "Gauss-Jacobi",
        };
        write!(f, "{}", name)
    }
}

/// Terminal state of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    /// Convergence criterion met within the iteration budget
    Converged,
    /// Budget exhausted outside tolerance; result carries the best current state
    MaxIterationsExceeded,
    /// A non-finite value appeared in the voltage state
    Diverged,
    /// The linearized system could not be solved
    SingularSystem,
}

/// Solved state of one bus
#[derive(Debug, Clone, Serialize)]
pub struct BusResult {
    pub bus: BusId,
    pub magnitude: PerUnit,
    pub angle: Radians,
    /// Final classification; differs from the model's when a reactive limit
    /// forced a PV bus to PQ during the run
    pub kind: BusKind,
}

/// Outcome of one solve call.
#[derive(Debug, Clone, Serialize)]
pub struct SolverResult {
    pub method: SolveMethod,
    pub status: SolveStatus,
    /// Number of update steps (Newton) or sweeps (Gauss) applied
    pub iterations: usize,
    /// Final convergence metric: power mismatch for Newton-Raphson, voltage
    /// step for the Gauss variants, in pu
    pub max_mismatch: f64,
    /// Ordered, append-only human-readable iteration log
    pub log: Vec<String>,
    /// Per-bus results; empty unless the status carries a voltage profile
    pub buses: Vec<BusResult>,
}

impl SolverResult {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// What a method run reports back to the dispatch layer.
pub(crate) struct RunOutcome {
    pub status: SolveStatus,
    pub iterations: usize,
    pub max_mismatch: f64,
}

/// Load-flow solver configuration.
///
/// `new` picks the customary defaults for the method: 20 iterations at
/// 1e-5 pu mismatch for Newton-Raphson, 100 sweeps at 1e-5 pu voltage step
/// for the Gauss variants.
#[derive(Debug, Clone)]
pub struct PowerFlowSolver {
    pub method: SolveMethod,
    /// Convergence tolerance in pu
    pub tolerance: f64,
    /// Iteration budget before giving up
    pub max_iterations: usize,
    /// System MVA base for per-unit conversion of the model's MW/Mvar fields
    pub base_mva: f64,
}

impl PowerFlowSolver {
    /// Create a solver with the method's default settings.
    pub fn new(method: SolveMethod) -> Self {
        let max_iterations = match method {
            SolveMethod::NewtonRaphson => 20,
            SolveMethod::GaussSeidel | SolveMethod::GaussJacobi => 100,
        };
        Self {
            method,
            tolerance: 1e-5,
            max_iterations,
            base_mva: 100.0,
        }
    }

    /// Set convergence tolerance (pu)
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Set the iteration budget
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// Set the system MVA base
    pub fn with_base_mva(mut self, base_mva: f64) -> Self {
        self.base_mva = base_mva;
        self
    }

    /// Run the configured method over the network.
    ///
    /// Validates the solve-time topology invariants first; a configuration
    /// error aborts before any iteration. On return, bus result fields are
    /// populated per the status rules (see module docs).
    pub fn solve(&self, network: &mut Network, ybus: &Ybus) -> ModelResult<SolverResult> {
        network.validate()?;

        let mut case = PfCase::from_network(network, ybus, self.base_mva)?;
        let mut log = Vec::new();
        log.push(format!(
            "starting {} solver: {} buses, tolerance {:.1e} pu, iteration budget {}",
            self.method,
            case.n,
            self.tolerance,
            self.max_iterations
        ));

        let outcome = match self.method {
            SolveMethod::NewtonRaphson => {
                newton::run(&mut case, ybus, self.tolerance, self.max_iterations, &mut log)
            }
            SolveMethod::GaussSeidel => gauss::run(
                &mut case,
                ybus,
                self.tolerance,
                self.max_iterations,
                GaussMode::Seidel,
                &mut log,
            ),
            SolveMethod::GaussJacobi => gauss::run(
                &mut case,
                ybus,
                self.tolerance,
                self.max_iterations,
                GaussMode::Jacobi,
                &mut log,
            ),
        };

        let mut result = SolverResult {
            method: self.method,
            status: outcome.status,
            iterations: outcome.iterations,
            max_mismatch: outcome.max_mismatch,
            log,
            buses: Vec::new(),
        };

        match result.status {
            SolveStatus::Converged | SolveStatus::MaxIterationsExceeded => {
                for i in 0..case.n {
                    result.buses.push(BusResult {
                        bus: case.bus_ids[i],
                        magnitude: PerUnit(case.v_mag[i]),
                        angle: Radians(case.v_ang[i]),
                        kind: case.kinds[i],
                    });
                }
                for bus_result in &result.buses {
                    if let Some(bus) = network.bus_mut(bus_result.bus) {
                        bus.v_result = Some(bus_result.magnitude);
                        bus.angle_result = Some(bus_result.angle);
                    }
                }
                if result.status == SolveStatus::Converged {
                    for bus_result in &result.buses {
                        result.log.push(format!(
                            "bus {}: V = {:.4} pu, angle = {:.3}°",
                            bus_result.bus,
                            bus_result.magnitude.value(),
                            bus_result.angle.to_degrees().value()
                        ));
                    }
                    tracing::debug!(
                        method = %self.method,
                        iterations = result.iterations,
                        "load flow converged"
                    );
                }
            }
            SolveStatus::Diverged | SolveStatus::SingularSystem => {
                tracing::warn!(method = %self.method, status = ?result.status, "load flow failed");
            }
        }

        Ok(result)
    }
}

/// Working data for one solve call, lowered from the model into plain-f64
/// vectors in matrix index order. All power quantities are in pu on the
/// solver's MVA base.
pub(crate) struct PfCase {
    pub n: usize,
    pub bus_ids: Vec<BusId>,
    /// Working classification; PV entries may become PQ during the run
    pub kinds: Vec<BusKind>,
    pub v_mag: Vec<f64>,
    pub v_ang: Vec<f64>,
    /// Magnitude setpoints for Ref/PV buses
    pub v_sched: Vec<f64>,
    pub p_spec: Vec<f64>,
    /// Net specified reactive injection; repinned when a limit is hit
    pub q_spec: Vec<f64>,
    pub q_load: Vec<f64>,
    pub q_min: Vec<f64>,
    pub q_max: Vec<f64>,
    pub base_mva: f64,
}

impl PfCase {
    pub(crate) fn from_network(
        network: &Network,
        ybus: &Ybus,
        base_mva: f64,
    ) -> ModelResult<Self> {
        let n = ybus.n_bus();
        if network.active_buses().count() != n {
            return Err(ModelError::StaleAdmittanceMatrix);
        }

        let mut case = Self {
            n,
            bus_ids: ybus.bus_ids().to_vec(),
            kinds: Vec::with_capacity(n),
            v_mag: Vec::with_capacity(n),
            v_ang: Vec::with_capacity(n),
            v_sched: Vec::with_capacity(n),
            p_spec: Vec::with_capacity(n),
            q_spec: Vec::with_capacity(n),
            q_load: Vec::with_capacity(n),
            q_min: Vec::with_capacity(n),
            q_max: Vec::with_capacity(n),
            base_mva,
        };

        for &id in ybus.bus_ids() {
            let bus = match network.bus(id) {
                Some(bus) if bus.active => bus,
                _ => return Err(ModelError::StaleAdmittanceMatrix),
            };
            case.kinds.push(bus.kind);
            case.v_mag.push(bus.voltage.value());
            case.v_ang.push(bus.angle.value());
            case.v_sched.push(bus.voltage.value());
            case.p_spec.push(bus.net_p().value() / base_mva);
            case.q_spec.push(bus.net_q().value() / base_mva);
            case.q_load.push(bus.q_load.value() / base_mva);
            case.q_min.push(
                bus.q_min
                    .map(|q| q.value() / base_mva)
                    .unwrap_or(f64::NEG_INFINITY),
            );
            case.q_max.push(
                bus.q_max
                    .map(|q| q.value() / base_mva)
                    .unwrap_or(f64::INFINITY),
            );
        }

        Ok(case)
    }

    /// Matrix indices carrying an active-power equation (every non-Ref bus).
    pub(crate) fn p_rows(&self) -> Vec<usize> {
        (0..self.n)
            .filter(|&i| self.kinds[i] != BusKind::Ref)
            .collect()
    }

    /// Matrix indices carrying a reactive-power equation (every PQ bus,
    /// including PV buses already pinned at a limit).
    pub(crate) fn q_rows(&self) -> Vec<usize> {
        (0..self.n)
            .filter(|&i| self.kinds[i] == BusKind::Pq)
            .collect()
    }

    /// The working voltage state as complex phasors.
    pub(crate) fn phasors(&self) -> Vec<Complex64> {
        self.v_mag
            .iter()
            .zip(self.v_ang.iter())
            .map(|(&m, &a)| Complex64::from_polar(m, a))
            .collect()
    }

    /// Adopt a complex voltage state back into the polar working vectors.
    pub(crate) fn set_phasors(&mut self, v: &[Complex64]) {
        for i in 0..self.n {
            self.v_mag[i] = v[i].norm();
            self.v_ang[i] = v[i].arg();
        }
    }

    /// Check every still-PV bus against its reactive band at the current
    /// voltage state. A violating bus has its net reactive specification
    /// pinned at the violated bound and becomes PQ for the rest of the run;
    /// the switch is never undone within a run. Returns whether any bus
    /// switched.
    pub(crate) fn enforce_q_limits(&mut self, ybus: &Ybus, log: &mut Vec<String>) -> bool {
        let mut switched = false;
        for i in 0..self.n {
            if self.kinds[i] != BusKind::Pv {
                continue;
            }
            let (_, q_inj) = power::injection_at(ybus, &self.v_mag, &self.v_ang, i);
            let q_gen = q_inj + self.q_load[i];

            let pinned = if q_gen > self.q_max[i] {
                Some(self.q_max[i])
            } else if q_gen < self.q_min[i] {
                Some(self.q_min[i])
            } else {
                None
            };

            if let Some(limit) = pinned {
                self.kinds[i] = BusKind::Pq;
                self.q_spec[i] = limit - self.q_load[i];
                switched = true;
                let bus = self.bus_ids[i];
                tracing::warn!(bus = %bus, "reactive limit reached, bus switched PV->PQ");
                log.push(format!(
                    "bus {} switched PV->PQ: Q = {:.2} Mvar outside [{:.2}, {:.2}] Mvar",
                    bus,
                    q_gen * self.base_mva,
                    self.q_min[i] * self.base_mva,
                    self.q_max[i] * self.base_mva
                ));
            }
        }
        switched
    }
}
