use std::fmt;

/// Error types for the bound-constrained minimizer
#[derive(Debug, Clone, PartialEq)]
pub enum MinimizerError {
    DimensionMismatch(String),
    FunctionEvaluationError,
    GradientContractViolation(String),
    GradientEvaluationError,
    InfeasibleBounds(String),
    InvalidCorrectionCount,
    InvalidDimension,
    InvalidTolerance,
    LinearSystemSingular,
    MissingObjective,
    UnexpectedEngineSignal(String),
}

impl fmt::Display for MinimizerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MinimizerError::DimensionMismatch(msg) => {
                write!(f, "Dimension mismatch: {}", msg)
            }
            MinimizerError::FunctionEvaluationError => {
                write!(f, "Function evaluation returned invalid value")
            }
            MinimizerError::GradientContractViolation(msg) => {
                write!(f, "Gradient callable violated its contract: {}", msg)
            }
            MinimizerError::GradientEvaluationError => write!(f, "Gradient evaluation error"),
            MinimizerError::InfeasibleBounds(msg) => {
                write!(f, "Infeasible bounds: {}", msg)
            }
            MinimizerError::InvalidCorrectionCount => {
                write!(f, "Correction history depth must be positive")
            }
            MinimizerError::InvalidDimension => write!(f, "Invalid dimension or empty vector"),
            MinimizerError::InvalidTolerance => write!(f, "Tolerance must be non-negative"),
            MinimizerError::LinearSystemSingular => write!(f, "Linear system is singular"),
            MinimizerError::MissingObjective => {
                write!(f, "Objective function has not been supplied")
            }
            MinimizerError::UnexpectedEngineSignal(msg) => {
                write!(f, "Unexpected engine signal: {}", msg)
            }
        }
    }
}

impl std::error::Error for MinimizerError {}
