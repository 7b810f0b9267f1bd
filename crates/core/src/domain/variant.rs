// Variant Domain Model

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::batch::BatchRequest;

/// Variant ID (1-based, unique within a batch)
pub type VariantId = u32;

/// Terminal status of one variant job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantStatus {
    Success,
    SynthesisFailed,
    RenderTimeout,
    RenderCrashed,
    ValidationFailed,
}

impl VariantStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, VariantStatus::Success)
    }
}

impl std::fmt::Display for VariantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantStatus::Success => write!(f, "SUCCESS"),
            VariantStatus::SynthesisFailed => write!(f, "SYNTHESIS_FAILED"),
            VariantStatus::RenderTimeout => write!(f, "RENDER_TIMEOUT"),
            VariantStatus::RenderCrashed => write!(f, "RENDER_CRASHED"),
            VariantStatus::ValidationFailed => write!(f, "VALIDATION_FAILED"),
        }
    }
}

/// Derive the synthesis seed for a variant (splitmix64 finalizer).
///
/// Deterministic per id so that a variant can be reproduced, while
/// neighbouring ids land far apart.
pub fn derive_seed(variant_id: VariantId) -> u64 {
    let mut z = (variant_id as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// One unit of work: synthesize + render a single variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantJob {
    variant_id: VariantId,
    variant_count: u32,
    prompt: String,
    style: String,
    seed: u64,
}

impl VariantJob {
    pub fn new(
        variant_id: VariantId,
        variant_count: u32,
        prompt: impl Into<String>,
        style: impl Into<String>,
    ) -> Self {
        Self {
            variant_id,
            variant_count,
            prompt: prompt.into(),
            style: style.into(),
            seed: derive_seed(variant_id),
        }
    }

    /// Build the jobs of a batch with sequential ids starting at 1
    pub fn for_batch(request: &BatchRequest) -> Vec<Self> {
        (1..=request.variant_count())
            .map(|id| {
                Self::new(
                    id,
                    request.variant_count(),
                    request.prompt(),
                    request.style(),
                )
            })
            .collect()
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn variant_count(&self) -> u32 {
        self.variant_count
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Terminal outcome of a variant job
///
/// `payload` is present iff `status == Success`; the constructors are the
/// only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantResult {
    variant_id: VariantId,
    status: VariantStatus,
    payload: Option<String>,
    message: String,
    duration: Duration,
    file_path: Option<PathBuf>,
}

impl VariantResult {
    pub fn success(variant_id: VariantId, payload: String, duration: Duration) -> Self {
        let message = format!("Success: {} bytes", payload.len());
        Self {
            variant_id,
            status: VariantStatus::Success,
            payload: Some(payload),
            message,
            duration,
            file_path: None,
        }
    }

    /// Build a failed result. Passing `VariantStatus::Success` is a bug and
    /// is recorded as `RenderCrashed` instead.
    pub fn failure(
        variant_id: VariantId,
        status: VariantStatus,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let status = if status.is_success() {
            VariantStatus::RenderCrashed
        } else {
            status
        };
        Self {
            variant_id,
            status,
            payload: None,
            message: message.into(),
            duration,
            file_path: None,
        }
    }

    /// Attach the persisted artifact location
    pub fn with_file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Persisting a successful payload failed: the variant no longer counts
    /// as a success and carries no payload.
    pub fn downgrade_to_crashed(self, message: impl Into<String>) -> Self {
        Self {
            variant_id: self.variant_id,
            status: VariantStatus::RenderCrashed,
            payload: None,
            message: message.into(),
            duration: self.duration,
            file_path: None,
        }
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn status(&self) -> VariantStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_deterministic_and_distinct() {
        assert_eq!(derive_seed(1), derive_seed(1));
        let seeds: Vec<u64> = (1..=10).map(derive_seed).collect();
        let mut unique = seeds.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), seeds.len());
    }

    #[test]
    fn test_jobs_for_batch_are_sequential() {
        let request = BatchRequest::new("solar vs wind", "minimal", 4, 5).unwrap();
        let jobs = VariantJob::for_batch(&request);

        let ids: Vec<u32> = jobs.iter().map(|j| j.variant_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(jobs.iter().all(|j| j.prompt() == "solar vs wind"));
        assert_eq!(jobs[2].seed(), derive_seed(3));
        assert_eq!(jobs[0].variant_count(), 4);
    }

    #[test]
    fn test_payload_only_on_success() {
        let ok = VariantResult::success(1, "<svg/>".to_string(), Duration::from_millis(5));
        assert!(ok.is_success());
        assert_eq!(ok.payload(), Some("<svg/>"));

        let failed = VariantResult::failure(
            2,
            VariantStatus::RenderTimeout,
            "timed out",
            Duration::ZERO,
        );
        assert_eq!(failed.status(), VariantStatus::RenderTimeout);
        assert!(failed.payload().is_none());
    }

    #[test]
    fn test_failure_never_builds_success() {
        let r = VariantResult::failure(1, VariantStatus::Success, "oops", Duration::ZERO);
        assert_eq!(r.status(), VariantStatus::RenderCrashed);
        assert!(r.payload().is_none());
    }

    #[test]
    fn test_downgrade_drops_payload_and_path() {
        let r = VariantResult::success(3, "<svg/>".to_string(), Duration::from_secs(1))
            .with_file_path("/tmp/x.svg")
            .downgrade_to_crashed("disk full");

        assert_eq!(r.status(), VariantStatus::RenderCrashed);
        assert!(r.payload().is_none());
        assert!(r.file_path().is_none());
        assert_eq!(r.message(), "disk full");
        assert_eq!(r.duration(), Duration::from_secs(1));
    }
}
