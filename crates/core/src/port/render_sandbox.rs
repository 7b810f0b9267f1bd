// Render Sandbox Port
// Executes one untrusted document in an isolated, disposable context and
// extracts the serialized vector markup

use crate::application::cancel::CancelToken;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Sandbox errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// Could not start an isolated process (e.g. process limit exhausted)
    #[error("Failed to spawn sandbox: {0}")]
    Spawn(String),

    #[error("Sandbox timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// Batch deadline reached; the sandbox was torn down
    #[error("Sandbox cancelled by batch deadline")]
    Cancelled,

    #[error("Sandbox crashed (exit {exit_code:?}): {reason}")]
    Crashed {
        exit_code: Option<i32>,
        reason: String,
        /// Tail of the child's diagnostic output
        diagnostics: String,
    },
}

/// Render sandbox trait
///
/// Implementations must not return before any process they started has
/// exited.
#[async_trait]
pub trait RenderSandbox: Send + Sync {
    /// Render `document` and return the serialized root element
    ///
    /// # Errors
    /// - `SandboxError::Spawn` if no isolated context can be created
    /// - `SandboxError::Timeout` if no completion signal arrives within `timeout`
    /// - `SandboxError::Cancelled` if `cancel` fires first
    /// - `SandboxError::Crashed` on abnormal exit or unreadable output
    async fn extract(
        &self,
        document: &str,
        timeout: Duration,
        cancel: CancelToken,
    ) -> Result<String, SandboxError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Mock render behavior
    #[derive(Debug, Clone)]
    pub enum MockRender {
        /// Return this payload
        Payload(String),
        /// Sleep, then return the payload (honours timeout and cancel)
        Delay(Duration, String),
        /// Never signal completion: ends in Timeout or Cancelled
        Hang,
        /// Report an abnormal exit
        Crash { exit_code: i32, diagnostics: String },
        /// Fail to spawn
        SpawnFail(String),
    }

    /// Scripted sandbox; behavior is selected by a substring of the document
    pub struct MockSandbox {
        default: MockRender,
        rules: Vec<(String, MockRender)>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        call_count: Arc<AtomicUsize>,
    }

    impl MockSandbox {
        pub fn new(default: MockRender) -> Self {
            Self {
                default,
                rules: Vec::new(),
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
                call_count: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Sandbox that returns a well-formed infographic for every document
        pub fn new_success() -> Self {
            Self::new(MockRender::Payload(sample_svg()))
        }

        pub fn on_document_containing(mut self, needle: impl Into<String>, render: MockRender) -> Self {
            self.rules.push((needle.into(), render));
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Highest number of concurrently running extractions observed
        pub fn max_concurrency(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        /// Sandboxes still running (must be zero once a batch returns)
        pub fn active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        fn behavior_for(&self, document: &str) -> MockRender {
            self.rules
                .iter()
                .find(|(needle, _)| document.contains(needle.as_str()))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| self.default.clone())
        }
    }

    /// Decrements the active counter on every exit path
    struct ActiveGuard(Arc<AtomicUsize>);

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// A small but complete infographic (root + 5 children)
    pub fn sample_svg() -> String {
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="600">"#,
            r#"<rect width="800" height="600" fill="white"/>"#,
            r#"<text x="20" y="40">Solar vs Wind</text>"#,
            r#"<circle cx="200" cy="300" r="80"/>"#,
            r#"<circle cx="600" cy="300" r="60"/>"#,
            r#"<g><line x1="0" y1="0" x2="10" y2="10"/></g>"#,
            "</svg>"
        )
        .to_string()
    }

    #[async_trait]
    impl RenderSandbox for MockSandbox {
        async fn extract(
            &self,
            document: &str,
            timeout: Duration,
            mut cancel: CancelToken,
        ) -> Result<String, SandboxError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);
            let _guard = ActiveGuard(Arc::clone(&self.active));

            match self.behavior_for(document) {
                MockRender::Payload(p) => Ok(p),
                MockRender::Delay(d, p) => {
                    tokio::select! {
                        _ = tokio::time::sleep(d.min(timeout)) => {
                            if d > timeout {
                                Err(SandboxError::Timeout { waited_ms: timeout.as_millis() as u64 })
                            } else {
                                Ok(p)
                            }
                        }
                        _ = cancel.cancelled() => Err(SandboxError::Cancelled),
                    }
                }
                MockRender::Hang => {
                    tokio::select! {
                        _ = tokio::time::sleep(timeout) => {
                            Err(SandboxError::Timeout { waited_ms: timeout.as_millis() as u64 })
                        }
                        _ = cancel.cancelled() => Err(SandboxError::Cancelled),
                    }
                }
                MockRender::Crash {
                    exit_code,
                    diagnostics,
                } => Err(SandboxError::Crashed {
                    exit_code: Some(exit_code),
                    reason: "child exited abnormally".to_string(),
                    diagnostics,
                }),
                MockRender::SpawnFail(msg) => Err(SandboxError::Spawn(msg)),
            }
        }
    }
}
