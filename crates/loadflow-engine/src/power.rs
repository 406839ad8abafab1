//! Power injection evaluation shared by all solvers.
//!
//! For a voltage state in polar form, the injected power at bus i is
//! ```text
//! P_i = V_i Σ_j V_j (G_ij cos θ_ij + B_ij sin θ_ij)
//! Q_i = V_i Σ_j V_j (G_ij sin θ_ij − B_ij cos θ_ij),   θ_ij = θ_i − θ_j
//! ```
//! with the sums running over the sparse Ybus row entries only. The mismatch
//! a solver drives to zero is the specified injection minus these values.

use crate::ybus::Ybus;
use num_complex::Complex64;

/// P_i and Q_i at a single bus from the polar voltage state.
pub fn injection_at(ybus: &Ybus, v_mag: &[f64], v_ang: &[f64], i: usize) -> (f64, f64) {
    let mut p = 0.0;
    let mut q = 0.0;
    for (j, y) in ybus.y_row_iter(i) {
        let theta_ij = v_ang[i] - v_ang[j];
        let (sin, cos) = theta_ij.sin_cos();
        let vv = v_mag[i] * v_mag[j];
        p += vv * (y.re * cos + y.im * sin);
        q += vv * (y.re * sin - y.im * cos);
    }
    (p, q)
}

/// Active and reactive injections at every bus.
pub fn compute_injections(ybus: &Ybus, v_mag: &[f64], v_ang: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = ybus.n_bus();
    let mut p = vec![0.0; n];
    let mut q = vec![0.0; n];
    for i in 0..n {
        let (p_i, q_i) = injection_at(ybus, v_mag, v_ang, i);
        p[i] = p_i;
        q[i] = q_i;
    }
    (p, q)
}

/// Complex injected power S_i = V_i · conj(Σ_j Y_ij V_j) for solvers working
/// in rectangular coordinates. Re/Im agree with [`injection_at`].
pub fn complex_power_at(ybus: &Ybus, v: &[Complex64], i: usize) -> Complex64 {
    let current: Complex64 = ybus.y_row_iter(i).map(|(j, y)| y * v[j]).sum();
    v[i] * current.conj()
}
