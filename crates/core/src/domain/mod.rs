// Domain Layer - Pure business logic and entities

pub mod batch;
pub mod error;
pub mod sandbox;
pub mod variant;

// Re-exports
pub use batch::{BatchId, BatchRequest, BatchResult};
pub use error::DomainError;
pub use sandbox::{RenderJobSpec, ResultRecord, SandboxPhase, Viewport};
pub use variant::{derive_seed, VariantId, VariantJob, VariantResult, VariantStatus};
