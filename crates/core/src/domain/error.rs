// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid sandbox state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    #[error("variant_count must be between 1 and {max}, got {requested}")]
    VariantCountOutOfRange { requested: u32, max: u32 },

    #[error("Malformed sandbox record: {0}")]
    MalformedRecord(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
