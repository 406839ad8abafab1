//! Gauss fixed-point load-flow iteration, Seidel and Jacobi variants.
//!
//! Both variants sweep the buses in ascending matrix index order, skipping
//! the reference bus, and apply the direct fixed-point update
//! ```text
//! V_i ← (1/Y_ii) · [ (P_i − jQ_i)/V_i* − Σ_{j≠i} Y_ij·V_j ]
//! ```
//! They differ only in value-refresh timing: **Seidel** reads values already
//! updated within the current sweep (successive substitution), **Jacobi** is
//! strictly synchronous and reads only the previous sweep's values from a
//! second buffer. A PV bus is rescaled to its magnitude setpoint after each
//! update, keeping the computed angle, and is then limit-checked like any
//! other method.
//!
//! Convergence is on the largest complex voltage step between sweeps.
//! Seidel typically converges in a fraction of Jacobi's sweeps; both need
//! far more iterations than Newton-Raphson but each sweep is much cheaper.

use super::{PfCase, RunOutcome, SolveStatus};
use crate::power;
use crate::ybus::Ybus;
use loadflow_core::BusKind;
use num_complex::Complex64;

/// Value-refresh timing of the fixed-point sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaussMode {
    /// Successive substitution: lower-indexed buses are read already updated
    Seidel,
    /// Strictly synchronous: every read comes from the previous sweep
    Jacobi,
}

pub(crate) fn run(
    case: &mut PfCase,
    ybus: &Ybus,
    tolerance: f64,
    max_iterations: usize,
    mode: GaussMode,
    log: &mut Vec<String>,
) -> RunOutcome {
    let n = case.n;
    let mut v = case.phasors();
    let mut steps = 0;
    let mut max_step = f64::INFINITY;

    loop {
        if steps == max_iterations {
            case.set_phasors(&v);
            log.push(format!(
                "iteration budget exhausted after {} iterations",
                steps
            ));
            return RunOutcome {
                status: SolveStatus::MaxIterationsExceeded,
                iterations: steps,
                max_mismatch: max_step,
            };
        }

        let v_prev = v.clone();
        // Jacobi writes land here so its reads stay untouched for the sweep.
        let mut v_next = v.clone();

        for i in 0..n {
            if case.kinds[i] == BusKind::Ref {
                continue;
            }
            let read: &[Complex64] = match mode {
                GaussMode::Seidel => &v,
                GaussMode::Jacobi => &v_prev,
            };

            // A PV bus has no reactive specification: its Q is whatever the
            // network currently injects at the bus.
            let q_i = if case.kinds[i] == BusKind::Pv {
                power::complex_power_at(ybus, read, i).im
            } else {
                case.q_spec[i]
            };

            let mut y_ii = Complex64::new(0.0, 0.0);
            let mut sum = Complex64::new(0.0, 0.0);
            for (j, y) in ybus.y_row_iter(i) {
                if j == i {
                    y_ii = y;
                } else {
                    sum += y * read[j];
                }
            }

            let s_conj = Complex64::new(case.p_spec[i], -q_i);
            let mut v_new = (s_conj / read[i].conj() - sum) / y_ii;
            if case.kinds[i] == BusKind::Pv {
                v_new = Complex64::from_polar(case.v_sched[i], v_new.arg());
            }

            match mode {
                GaussMode::Seidel => v[i] = v_new,
                GaussMode::Jacobi => v_next[i] = v_new,
            }
        }
        if mode == GaussMode::Jacobi {
            v = v_next;
        }

        steps += 1;
        max_step = v
            .iter()
            .zip(v_prev.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        log.push(format!(
            "iteration {}: max voltage step {:.3e} pu",
            steps, max_step
        ));

        if v.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
            log.push("diverged: non-finite voltage state".to_string());
            return RunOutcome {
                status: SolveStatus::Diverged,
                iterations: steps,
                max_mismatch: max_step,
            };
        }

        case.set_phasors(&v);
        let switched = case.enforce_q_limits(ybus, log);

        // A limit switch repins a reactive specification, so the sweep that
        // triggered it must not declare convergence.
        if !switched && max_step < tolerance {
            log.push(format!("converged in {} iterations", steps));
            return RunOutcome {
                status: SolveStatus::Converged,
                iterations: steps,
                max_mismatch: max_step,
            };
        }
    }
}
