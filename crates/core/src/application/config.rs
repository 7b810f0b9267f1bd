// Orchestrator configuration

use std::time::Duration;

use super::worker::constants::{
    DEFAULT_BATCH_DEADLINE, DEFAULT_EXTRACTION_TIMEOUT, DEFAULT_MAX_VARIANTS,
    DEFAULT_MIN_SVG_CHILDREN,
};
use crate::error::{AppError, Result};

/// Runtime limits of the batch orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound on variants per request
    pub max_variants: u32,
    /// Sandboxes alive at once; `None` means one per variant
    pub max_parallel_sandboxes: Option<usize>,
    /// Per-variant render budget
    pub extraction_timeout: Duration,
    /// Whole-batch budget measured from acceptance
    pub batch_deadline: Duration,
    /// Minimum element children under the extracted root
    pub min_svg_children: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_variants: DEFAULT_MAX_VARIANTS,
            max_parallel_sandboxes: None,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            batch_deadline: DEFAULT_BATCH_DEADLINE,
            min_svg_children: DEFAULT_MIN_SVG_CHILDREN,
        }
    }
}

impl OrchestratorConfig {
    /// Reject configurations the orchestrator cannot honour
    ///
    /// # Errors
    /// - `AppError::Config` on zero limits, or an extraction timeout longer
    ///   than the batch deadline
    pub fn validate(&self) -> Result<()> {
        if self.max_variants == 0 {
            return Err(AppError::Config("max_variants must be at least 1".into()));
        }
        if self.max_parallel_sandboxes == Some(0) {
            return Err(AppError::Config(
                "max_parallel_sandboxes must be at least 1".into(),
            ));
        }
        if self.extraction_timeout.is_zero() || self.batch_deadline.is_zero() {
            return Err(AppError::Config("timeouts must be non-zero".into()));
        }
        if self.extraction_timeout > self.batch_deadline {
            return Err(AppError::Config(format!(
                "extraction timeout ({}s) exceeds batch deadline ({}s)",
                self.extraction_timeout.as_secs(),
                self.batch_deadline.as_secs()
            )));
        }
        Ok(())
    }

    /// Number of sandboxes a batch of `variant_count` may run at once
    pub fn pool_size(&self, variant_count: u32) -> usize {
        let wanted = variant_count.max(1) as usize;
        match self.max_parallel_sandboxes {
            Some(limit) => wanted.min(limit.max(1)),
            None => wanted,
        }
    }
}
