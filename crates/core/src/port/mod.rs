// Port Layer - Interfaces for external dependencies

pub mod artifact_store;
pub mod content_synthesizer;
pub mod id_provider; // For deterministic testing
pub mod render_sandbox;
pub mod time_provider;

// Re-exports
pub use artifact_store::{ArtifactError, ArtifactStore};
pub use content_synthesizer::{ContentSynthesizer, Synthesis, SynthesisError};
pub use id_provider::IdProvider;
pub use render_sandbox::{RenderSandbox, SandboxError};
pub use time_provider::TimeProvider;
