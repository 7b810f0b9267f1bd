// Infographic Infrastructure - System Adapters
// Implements: RenderSandbox (one child process per variant), ArtifactStore

pub mod fs_artifact_store;
pub mod process_sandbox;

pub use fs_artifact_store::FsArtifactStore;
pub use process_sandbox::{ProcessSandbox, SandboxConfig, DEFAULT_ENV_ALLOWLIST};
