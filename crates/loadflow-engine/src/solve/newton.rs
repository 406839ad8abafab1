//! Newton-Raphson load-flow iteration.
//!
//! Each iteration linearizes the power equations around the current voltage
//! state and solves
//! ```text
//! J × [Δθ, ΔV]ᵀ = [ΔP, ΔQ]ᵀ
//! ```
//! for the update step, where J holds the four blocks ∂P/∂θ, ∂P/∂V, ∂Q/∂θ,
//! ∂Q/∂V restricted to the unknown state variables: angles of every non-Ref
//! bus and magnitudes of every PQ bus. Convergence is on the largest power
//! mismatch. Near the solution the error shrinks quadratically; a healthy
//! network converges in a handful of iterations.
//!
//! ## References
//!
//! - Tinney & Hart (1967): "Power Flow Solution by Newton's Method"
//!   IEEE Trans. PAS, 86(11). DOI:
//!   [10.1109/TPAS.1967.291823](https://doi.org/10.1109/TPAS.1967.291823)

use super::{PfCase, RunOutcome, SolveStatus};
use crate::power;
use crate::ybus::Ybus;
use anyhow::{anyhow, Result};
use faer::prelude::SpSolver;
use faer::{FaerMat, Mat};

pub(crate) fn run(
    case: &mut PfCase,
    ybus: &Ybus,
    tolerance: f64,
    max_iterations: usize,
    log: &mut Vec<String>,
) -> RunOutcome {
    let mut steps = 0;
    loop {
        let (p_calc, q_calc) = power::compute_injections(ybus, &case.v_mag, &case.v_ang);
        // Index sets are rebuilt every pass because a reactive-limit switch
        // moves a bus from the PV set into the PQ set mid-run.
        let p_rows = case.p_rows();
        let q_rows = case.q_rows();
        let n_p = p_rows.len();
        let n_vars = n_p + q_rows.len();

        let mut mismatch = vec![0.0; n_vars];
        let mut max_mismatch: f64 = 0.0;
        for (k, &i) in p_rows.iter().enumerate() {
            mismatch[k] = case.p_spec[i] - p_calc[i];
            max_mismatch = max_mismatch.max(mismatch[k].abs());
        }
        for (k, &i) in q_rows.iter().enumerate() {
            mismatch[n_p + k] = case.q_spec[i] - q_calc[i];
            max_mismatch = max_mismatch.max(mismatch[n_p + k].abs());
        }

        if steps == 0 {
            log.push(format!("initial max mismatch {:.3e} pu", max_mismatch));
        } else {
            log.push(format!(
                "iteration {}: max mismatch {:.3e} pu",
                steps, max_mismatch
            ));
        }

        if max_mismatch < tolerance {
            log.push(format!("converged in {} iterations", steps));
            return RunOutcome {
                status: SolveStatus::Converged,
                iterations: steps,
                max_mismatch,
            };
        }
        if steps == max_iterations {
            log.push(format!(
                "iteration budget exhausted after {} iterations",
                steps
            ));
            return RunOutcome {
                status: SolveStatus::MaxIterationsExceeded,
                iterations: steps,
                max_mismatch,
            };
        }

        let jacobian = build_jacobian(ybus, case, &p_rows, &q_rows, &p_calc, &q_calc);
        let delta = match solve_linear_system(jacobian, &mismatch) {
            Ok(delta) => delta,
            Err(_) => {
                log.push("linear solve failed: singular Jacobian system".to_string());
                return RunOutcome {
                    status: SolveStatus::SingularSystem,
                    iterations: steps,
                    max_mismatch,
                };
            }
        };

        for (k, &i) in p_rows.iter().enumerate() {
            case.v_ang[i] += delta[k];
        }
        for (k, &i) in q_rows.iter().enumerate() {
            case.v_mag[i] += delta[n_p + k];
        }
        steps += 1;

        if case
            .v_ang
            .iter()
            .chain(case.v_mag.iter())
            .any(|v| !v.is_finite())
        {
            log.push("diverged: non-finite voltage state".to_string());
            return RunOutcome {
                status: SolveStatus::Diverged,
                iterations: steps,
                max_mismatch,
            };
        }

        case.enforce_q_limits(ybus, log);
    }
}

/// Assemble the Jacobian restricted to the unknown state variables.
///
/// Column layout is [θ of p_rows | V of q_rows]; rows follow the mismatch
/// vector layout [ΔP of p_rows | ΔQ of q_rows]. Only Ybus row entries are
/// visited, so the fill work follows the network sparsity.
fn build_jacobian(
    ybus: &Ybus,
    case: &PfCase,
    p_rows: &[usize],
    q_rows: &[usize],
    p_calc: &[f64],
    q_calc: &[f64],
) -> Mat<f64> {
    let n_p = p_rows.len();
    let n_vars = n_p + q_rows.len();

    let mut theta_col: Vec<Option<usize>> = vec![None; case.n];
    for (k, &i) in p_rows.iter().enumerate() {
        theta_col[i] = Some(k);
    }
    let mut v_col: Vec<Option<usize>> = vec![None; case.n];
    for (k, &i) in q_rows.iter().enumerate() {
        v_col[i] = Some(n_p + k);
    }

    let mut jac = Mat::zeros(n_vars, n_vars);

    // ΔP rows
    for (row, &i) in p_rows.iter().enumerate() {
        let v_i = case.v_mag[i];
        for (j, y) in ybus.y_row_iter(i) {
            if j == i {
                // ∂P_i/∂θ_i = -Q_i - B_ii·V_i²
                if let Some(col) = theta_col[i] {
                    jac.write(row, col, -q_calc[i] - y.im * v_i * v_i);
                }
                // ∂P_i/∂V_i = P_i/V_i + G_ii·V_i
                if let Some(col) = v_col[i] {
                    jac.write(row, col, p_calc[i] / v_i + y.re * v_i);
                }
            } else {
                let theta_ij = case.v_ang[i] - case.v_ang[j];
                let (sin, cos) = theta_ij.sin_cos();
                // ∂P_i/∂θ_j = V_i·V_j·(G_ij·sin - B_ij·cos)
                if let Some(col) = theta_col[j] {
                    jac.write(row, col, v_i * case.v_mag[j] * (y.re * sin - y.im * cos));
                }
                // ∂P_i/∂V_j = V_i·(G_ij·cos + B_ij·sin)
                if let Some(col) = v_col[j] {
                    jac.write(row, col, v_i * (y.re * cos + y.im * sin));
                }
            }
        }
    }

    // ΔQ rows
    for (k, &i) in q_rows.iter().enumerate() {
        let row = n_p + k;
        let v_i = case.v_mag[i];
        for (j, y) in ybus.y_row_iter(i) {
            if j == i {
                // ∂Q_i/∂θ_i = P_i - G_ii·V_i²
                if let Some(col) = theta_col[i] {
                    jac.write(row, col, p_calc[i] - y.re * v_i * v_i);
                }
                // ∂Q_i/∂V_i = Q_i/V_i - B_ii·V_i
                if let Some(col) = v_col[i] {
                    jac.write(row, col, q_calc[i] / v_i - y.im * v_i);
                }
            } else {
                let theta_ij = case.v_ang[i] - case.v_ang[j];
                let (sin, cos) = theta_ij.sin_cos();
                // ∂Q_i/∂θ_j = -V_i·V_j·(G_ij·cos + B_ij·sin)
                if let Some(col) = theta_col[j] {
                    jac.write(row, col, -v_i * case.v_mag[j] * (y.re * cos + y.im * sin));
                }
                // ∂Q_i/∂V_j = V_i·(G_ij·sin - B_ij·cos)
                if let Some(col) = v_col[j] {
                    jac.write(row, col, v_i * (y.re * sin - y.im * cos));
                }
            }
        }
    }

    jac
}

/// Solve the linear system with faer's LU decomposition with partial
/// pivoting. A non-finite entry in the solution means the factorization hit
/// a numerically singular system.
fn solve_linear_system(a: Mat<f64>, b: &[f64]) -> Result<Vec<f64>> {
    let n = b.len();
    if n == 0 {
        return Ok(vec![]);
    }

    let mut rhs = Mat::zeros(n, 1);
    for (i, &value) in b.iter().enumerate() {
        rhs.write(i, 0, value);
    }

    let lu = a.partial_piv_lu();
    let solution = lu.solve(&rhs);

    let x: Vec<f64> = (0..n).map(|i| solution.read(i, 0)).collect();
    if x.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("singular Jacobian system"));
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadflow_core::{Branch, Bus, Diagnostics, Network};

    fn two_bus_case() -> (PfCase, Ybus) {
        let buses = vec![
            Bus::new(1, "slack", "2"),
            Bus::new(2, "load", "0").with_load(50.0, 10.0),
        ];
        let branches = vec![Branch::line(1, 2, 1, 0.01, 0.1)];
        let network = Network::load("two bus", buses, branches).unwrap();
        let mut diag = Diagnostics::new();
        let ybus = Ybus::from_network(&network, &mut diag).unwrap();
        let case = PfCase::from_network(&network, &ybus, 100.0).unwrap();
        (case, ybus)
    }

    #[test]
    fn test_two_bus_converges() {
        let (mut case, ybus) = two_bus_case();
        let mut log = Vec::new();
        let outcome = run(&mut case, &ybus, 1e-6, 20, &mut log);

        assert_eq!(outcome.status, SolveStatus::Converged);
        assert!(outcome.iterations <= 10);
        assert!(outcome.max_mismatch < 1e-6);

        // Load bus sags below the slack and lags it
        assert!(case.v_mag[1] < 1.0 && case.v_mag[1] > 0.9);
        assert!(case.v_ang[1] < 0.0);
        // Slack state untouched
        assert!((case.v_mag[0] - 1.0).abs() < 1e-12);
        assert!(case.v_ang[0].abs() < 1e-12);
    }

    #[test]
    fn test_converged_state_balances_power() {
        let (mut case, ybus) = two_bus_case();
        let mut log = Vec::new();
        run(&mut case, &ybus, 1e-8, 20, &mut log);

        let (p_calc, q_calc) = power::compute_injections(&ybus, &case.v_mag, &case.v_ang);
        // Load bus injection matches the specification
        assert!((p_calc[1] - (-0.5)).abs() < 1e-7);
        assert!((q_calc[1] - (-0.1)).abs() < 1e-7);
        // Slack covers load plus series loss
        assert!(p_calc[0] > 0.5);
    }

    #[test]
    fn test_iteration_budget_exhaustion() {
        let (mut case, ybus) = two_bus_case();
        let mut log = Vec::new();
        let outcome = run(&mut case, &ybus, 1e-12, 1, &mut log);

        assert_eq!(outcome.status, SolveStatus::MaxIterationsExceeded);
        assert_eq!(outcome.iterations, 1);
        // Best-effort state is still finite and plausible
        assert!(case.v_mag.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_jacobian_diagonal_signs() {
        let (case, ybus) = two_bus_case();
        let (p_calc, q_calc) = power::compute_injections(&ybus, &case.v_mag, &case.v_ang);
        let p_rows = case.p_rows();
        let q_rows = case.q_rows();
        let jac = build_jacobian(&ybus, &case, &p_rows, &q_rows, &p_calc, &q_calc);

        // At flat start: ∂P2/∂θ2 = -B22 ≈ 9.9, ∂Q2/∂V2 = -B22 ≈ 9.9
        assert!(jac.read(0, 0) > 0.0);
        assert!(jac.read(1, 1) > 0.0);
    }
}
