use crate::Thermodynamics::ChemicalSystem::ChemicalSystemError;
use thiserror::Error;

/// errors surfaced by the exact and the smart equilibrium solvers.
/// Cache misses and rejected predictions are not errors: they only switch the solver to the exact path
#[derive(Debug, Error)]
pub enum SmartEquilibriumError {
    #[error("Invalid conditions: {0}")]
    InvalidConditions(String),
    #[error("Exact equilibrium solve diverged after {iterations} iterations (residual {residual:e})")]
    ExactSolveDivergence { iterations: usize, residual: f64 },
    #[error("Matrix dimension mismatch: {0}")]
    MatrixDimensionMismatch(String),
    #[error("Singular system: {0}")]
    SingularSystem(String),
    #[error(transparent)]
    System(#[from] ChemicalSystemError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
