use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid manual reading: {0:?}")]
    InvalidManualValue(String),

    #[error("Manual entry is only accepted while awaiting manual entry")]
    NotAwaitingManualEntry,

    #[error("No read entries loaded")]
    NoEntries,
}

pub type Result<T> = std::result::Result<T, SessionError>;
