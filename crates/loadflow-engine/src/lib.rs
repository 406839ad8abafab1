//! # loadflow-engine: Steady-State Load-Flow Solvers
//!
//! Turns a [`loadflow_core::Network`] into bus voltage magnitudes and angles:
//! sparse admittance-matrix assembly, shared power-injection evaluation, and
//! three solution methods behind one dispatch surface.
//!
//! | Method | Update | Convergence test | Typical budget |
//! |--------|--------|------------------|----------------|
//! | [`SolveMethod::NewtonRaphson`] | Jacobian linearization, LU solve | max power mismatch | 20 |
//! | [`SolveMethod::GaussSeidel`] | fixed point, successive substitution | max voltage step | 100 |
//! | [`SolveMethod::GaussJacobi`] | fixed point, synchronous sweeps | max voltage step | 100 |
//!
//! All methods enforce reactive limits the same way: a PV bus whose computed
//! Q leaves its band is pinned at the violated bound and reclassified PQ for
//! the rest of the run.
//!
//! The engine is a synchronous batch computation: one call in, one
//! [`SolverResult`] out, results written onto the network's bus records only
//! at a terminal state. Configuration problems are typed errors; numerical
//! failures are statuses on the result.
//!
//! ## Example
//!
//! ```
//! use loadflow_core::{Branch, Bus, Diagnostics, Network};
//! use loadflow_engine::{PowerFlowSolver, SolveMethod, Ybus};
//!
//! let buses = vec![
//!     Bus::new(1, "SLACK", "2"),
//!     Bus::new(2, "LOAD", "0").with_load(50.0, 10.0),
//! ];
//! let branches = vec![Branch::line(1, 2, 1, 0.01, 0.1)];
//! let mut network = Network::load("two bus", buses, branches).unwrap();
//!
//! let mut diag = Diagnostics::new();
//! let ybus = Ybus::from_network(&network, &mut diag).unwrap();
//!
//! let result = PowerFlowSolver::new(SolveMethod::NewtonRaphson)
//!     .solve(&mut network, &ybus)
//!     .unwrap();
//!
//! assert!(result.converged());
//! for line in &result.log {
//!     println!("{line}");
//! }
//! ```

pub mod power;
pub mod solve;
pub mod ybus;

pub use solve::{BusResult, PowerFlowSolver, SolveMethod, SolveStatus, SolverResult};
pub use ybus::{Ybus, YbusError};
