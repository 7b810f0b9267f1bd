// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Only orchestrator-level faults travel through this type. Per-variant
/// failures are always resolved into a `VariantResult` instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact storage error: {0}")]
    Artifact(#[from] crate::port::ArtifactError),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
