use thiserror::Error;

/// ICS parsing errors
#[derive(Error, Debug)]
pub enum IcalError {
    /// The document structure could not be tokenized into VEVENT blocks.
    #[error("Parse error at line {line}: {message}")]
    Structure { line: usize, message: String },
}

pub type IcalResult<T> = std::result::Result<T, IcalError>;
