//! Error taxonomy for network configuration problems.
//!
//! Configuration errors are conditions the caller can fix by editing the
//! network: a missing or duplicated reference bus, an unresolvable branch
//! endpoint, an islanded bus. They are detected at load time or before a
//! solve starts, and nothing partial is ever returned alongside them.
//!
//! Numerical failures (singular systems, divergence) are deliberately *not*
//! errors in this taxonomy: they are terminal statuses on the solver result,
//! carrying the iteration log accumulated up to the failure.

use crate::{BranchKey, BusId};
use thiserror::Error;

/// Configuration errors raised by network loading and pre-solve validation.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Two bus records share the same number
    #[error("duplicate bus number {0}")]
    DuplicateBus(BusId),

    /// Two branch records share the same (from, to, circuit) identity
    #[error("duplicate branch identity {0}")]
    DuplicateBranch(BranchKey),

    /// A branch endpoint does not resolve to any bus record
    #[error("branch {branch} references unknown bus {bus}")]
    UnknownEndpoint { branch: BranchKey, bus: BusId },

    /// Bus numbers must be positive
    #[error("bus number 0 is not allowed")]
    InvalidBusNumber,

    /// No active buses to solve over
    #[error("network has no active buses")]
    EmptyNetwork,

    /// No reference bus among the active buses
    #[error("no reference bus among active buses")]
    NoReferenceBus,

    /// More than one reference bus among the active buses
    #[error("multiple reference buses among active buses: {0:?}")]
    MultipleReferenceBuses(Vec<BusId>),

    /// An active bus has no active path to the reference bus
    #[error("bus {0} is electrically islanded from the reference bus")]
    IslandedBus(BusId),

    /// The admittance matrix was built from a different set of active buses
    /// than the network currently has; it must be rebuilt after any edit
    #[error("admittance matrix does not match the network's active buses")]
    StaleAdmittanceMatrix,
}

/// Convenience type alias for Results using ModelError.
pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::IslandedBus(BusId::new(42));
        assert!(err.to_string().contains("islanded"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> ModelResult<()> {
            Err(ModelError::NoReferenceBus)
        }

        fn outer() -> ModelResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
