use thiserror::Error;

/// Failures that abort the current parameter point.
///
/// Numerical overflow guards never surface here: they are resolved to clamp
/// values and reported through [`crate::warnings::WarningLog`].
#[derive(Debug, Error)]
pub enum VacuumError {
    #[error(
        "tunneling from the vacuum at {false_vacuum:?} (V = {false_value:e}) to the vacuum at \
         {true_vacuum:?} (V = {true_value:e}) requested, but the target is not deeper"
    )]
    InvalidTunnelingRequest {
        false_vacuum: Vec<f64>,
        true_vacuum: Vec<f64>,
        false_value: f64,
        true_value: f64,
    },

    #[error(
        "minimizer returned a non-finite minimum from {starting_point:?} after {attempts} scaled retries"
    )]
    MinimizerRetriesExhausted {
        starting_point: Vec<f64>,
        attempts: usize,
    },

    #[error(
        "could not bracket the critical temperature of {vacuum:?}: still above it after {halvings} halvings"
    )]
    CriticalTemperatureNotBracketed { vacuum: Vec<f64>, halvings: usize },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("field configuration dimension mismatch. Expected {expected}, got {got}.")]
    DimensionMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type VacuumResult<T> = std::result::Result<T, VacuumError>;
