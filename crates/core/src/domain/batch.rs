// Batch Domain Model

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{DomainError, Result};
use super::variant::VariantResult;

/// Maximum length of the prompt-derived part of a batch id
const BATCH_TOPIC_MAX_CHARS: usize = 50;

/// Length of the random part of a batch id
const BATCH_UNIQUE_CHARS: usize = 8;

/// Batch identifier, also the name suffix of the batch output directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Compose `<unix_secs>_<unique>_<topic>` from its parts.
    ///
    /// `unique` is usually a fresh UUID; only its first alphanumeric
    /// characters are kept.
    pub fn compose(unix_secs: i64, unique: &str, prompt: &str) -> Self {
        let unique: String = unique
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(BATCH_UNIQUE_CHARS)
            .collect();
        let topic = sanitize_topic(prompt);

        if topic.is_empty() {
            Self(format!("{}_{}", unix_secs, unique))
        } else {
            Self(format!("{}_{}_{}", unix_secs, unique, topic))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep alphanumerics, spaces, dashes and underscores; collapse whitespace
/// into underscores.
fn sanitize_topic(prompt: &str) -> String {
    let kept: String = prompt
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(BATCH_TOPIC_MAX_CHARS)
        .collect()
}

/// Incoming batch request (immutable once built)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    prompt: String,
    style: String,
    variant_count: u32,
}

impl BatchRequest {
    /// Validate and build a request
    ///
    /// # Errors
    /// - `DomainError::EmptyPrompt` if the prompt is blank
    /// - `DomainError::VariantCountOutOfRange` unless `1 <= variant_count <= max_variants`
    pub fn new(
        prompt: impl Into<String>,
        style: impl Into<String>,
        variant_count: u32,
        max_variants: u32,
    ) -> Result<Self> {
        let prompt = prompt.into().trim().to_string();
        if prompt.is_empty() {
            return Err(DomainError::EmptyPrompt);
        }
        if variant_count == 0 || variant_count > max_variants {
            return Err(DomainError::VariantCountOutOfRange {
                requested: variant_count,
                max: max_variants,
            });
        }

        Ok(Self {
            prompt,
            style: style.into().trim().to_string(),
            variant_count,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn variant_count(&self) -> u32 {
        self.variant_count
    }
}

/// Aggregated outcome of a batch
///
/// Built only by the result aggregator, which guarantees ordering by
/// variant id and a consistent `success_count`.
#[derive(Debug, Clone)]
pub struct BatchResult {
    batch_id: BatchId,
    results: Vec<VariantResult>,
    success_count: usize,
    elapsed: Duration,
    output_directory: PathBuf,
}

impl BatchResult {
    pub(crate) fn new(
        batch_id: BatchId,
        results: Vec<VariantResult>,
        success_count: usize,
        elapsed: Duration,
        output_directory: PathBuf,
    ) -> Self {
        Self {
            batch_id,
            results,
            success_count,
            elapsed,
            output_directory,
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn results(&self) -> &[VariantResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<VariantResult> {
        self.results
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn variant_count(&self) -> usize {
        self.results.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Human-readable summary, e.g. "Successfully generated 2/3 infographic variants"
    pub fn summary_message(&self) -> String {
        format!(
            "Successfully generated {}/{} infographic variants",
            self.success_count,
            self.results.len()
        )
    }
}
