use thiserror::Error;

/// Service layer errors
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The conversion window was explicitly inverted.
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The injected recurrence evaluator rejected a rule.
    #[error("Recurrence evaluation error: {0}")]
    Evaluator(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
