// Content Synthesizer Port
// Abstraction over the prompt-to-markup generator (an opaque text service)

use crate::domain::VariantJob;
use async_trait::async_trait;
use thiserror::Error;

/// Synthesis errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Content generator not configured: {0}")]
    NotConfigured(String),

    #[error("Content generator rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Content generator unreachable: {0}")]
    Unreachable(String),

    #[error("Content generator returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed response from content generator: {0}")]
    MalformedResponse(String),
}

/// Outcome of a synthesis call, validated before entering the render stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Synthesized(String),
    Failed(SynthesisError),
}

impl Synthesis {
    /// Classify a raw synthesizer response.
    ///
    /// A document must be non-blank and look like HTML or SVG markup;
    /// anything else is a malformed response.
    pub fn from_response(raw: Result<String, SynthesisError>) -> Self {
        let document = match raw {
            Ok(document) => document,
            Err(e) => return Synthesis::Failed(e),
        };

        let trimmed = document.trim();
        if trimmed.is_empty() {
            return Synthesis::Failed(SynthesisError::MalformedResponse(
                "empty document".to_string(),
            ));
        }

        let lowered = trimmed.to_ascii_lowercase();
        let renderable = ["<!doctype html", "<html", "<svg", "<script"]
            .iter()
            .any(|needle| lowered.contains(needle));
        if !renderable {
            return Synthesis::Failed(SynthesisError::MalformedResponse(
                "response does not contain renderable markup".to_string(),
            ));
        }

        Synthesis::Synthesized(trimmed.to_string())
    }
}

/// Content synthesizer trait
///
/// Implementations:
/// - GeminiSynthesizer: Gemini `generateContent` over HTTPS
/// - MockSynthesizer: scripted documents for tests
#[async_trait]
pub trait ContentSynthesizer: Send + Sync {
    /// Produce a renderable document for one variant
    ///
    /// # Errors
    /// Any `SynthesisError`; the caller never retries rendering without a document.
    async fn synthesize(&self, job: &VariantJob) -> Result<String, SynthesisError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock synthesizer behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return a document tagged with the variant id
        Document,
        /// Return this exact text
        Raw(String),
        /// Always fail with this error
        Fail(SynthesisError),
        /// Sleep, then return a tagged document
        Delay(Duration),
        /// Panic (for worker isolation testing)
        Panic(String),
    }

    /// Scripted synthesizer; behavior can be overridden per variant id
    pub struct MockSynthesizer {
        default: MockBehavior,
        per_variant: HashMap<u32, MockBehavior>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockSynthesizer {
        pub fn new(default: MockBehavior) -> Self {
            Self {
                default,
                per_variant: HashMap::new(),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Document)
        }

        pub fn new_unreachable() -> Self {
            Self::new(MockBehavior::Fail(SynthesisError::Unreachable(
                "connection refused".to_string(),
            )))
        }

        pub fn with_variant(mut self, variant_id: u32, behavior: MockBehavior) -> Self {
            self.per_variant.insert(variant_id, behavior);
            self
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }

        /// Document produced for a variant by `MockBehavior::Document`
        pub fn document_for(variant_id: u32) -> String {
            format!(
                "<!DOCTYPE html><html><body><!-- variant-{} --></body></html>",
                variant_id
            )
        }
    }

    #[async_trait]
    impl ContentSynthesizer for MockSynthesizer {
        async fn synthesize(&self, job: &VariantJob) -> Result<String, SynthesisError> {
            *self.call_count.lock().unwrap() += 1;

            let behavior = self
                .per_variant
                .get(&job.variant_id())
                .unwrap_or(&self.default)
                .clone();

            match behavior {
                MockBehavior::Document => Ok(Self::document_for(job.variant_id())),
                MockBehavior::Raw(text) => Ok(text),
                MockBehavior::Fail(e) => Err(e),
                MockBehavior::Delay(d) => {
                    tokio::time::sleep(d).await;
                    Ok(Self::document_for(job.variant_id()))
                }
                MockBehavior::Panic(msg) => panic!("{}", msg),
            }
        }
    }
}
