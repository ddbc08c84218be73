use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Precondition not met: {message}. Hint: {hint}")]
    PreconditionNotMet { message: String, hint: String },

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Spreadsheet parsing failed: {0}")]
    Sheet(#[from] calamine::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for IngestError {
    fn from(e: rusqlite::Error) -> Self {
        IngestError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
