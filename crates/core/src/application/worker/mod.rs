// Variant Worker - synthesize, render, validate one variant

pub mod constants;
mod panic_guard;
pub mod validation;

pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use validation::{normalize_svg, SvgSummary, SvgValidator, ValidationError};

use crate::application::cancel::CancelToken;
use crate::domain::{VariantJob, VariantResult, VariantStatus};
use crate::port::{ContentSynthesizer, RenderSandbox, SandboxError, Synthesis};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Runs the pipeline of a single variant job
///
/// Every failure is folded into the returned `VariantResult`; `run` never
/// returns an error and never panics on a failed stage.
pub struct VariantWorker {
    synthesizer: Arc<dyn ContentSynthesizer>,
    sandbox: Arc<dyn RenderSandbox>,
    validator: SvgValidator,
}

impl VariantWorker {
    pub fn new(
        synthesizer: Arc<dyn ContentSynthesizer>,
        sandbox: Arc<dyn RenderSandbox>,
        validator: SvgValidator,
    ) -> Self {
        Self {
            synthesizer,
            sandbox,
            validator,
        }
    }

    /// Run one variant to a terminal result
    ///
    /// `extraction_timeout` bounds the render stage only; `cancel` aborts
    /// any stage when the batch deadline passes.
    pub async fn run(
        &self,
        job: &VariantJob,
        extraction_timeout: Duration,
        cancel: CancelToken,
    ) -> VariantResult {
        let started = Instant::now();
        info!(
            variant_id = job.variant_id(),
            seed = job.seed(),
            "Variant started"
        );

        let result = self.pipeline(job, extraction_timeout, cancel, started).await;

        if result.is_success() {
            info!(
                variant_id = result.variant_id(),
                duration_ms = result.duration().as_millis() as u64,
                "Variant succeeded"
            );
        } else {
            warn!(
                variant_id = result.variant_id(),
                status = %result.status(),
                duration_ms = result.duration().as_millis() as u64,
                reason = %result.message(),
                "Variant failed"
            );
        }
        result
    }

    async fn pipeline(
        &self,
        job: &VariantJob,
        extraction_timeout: Duration,
        mut cancel: CancelToken,
        started: Instant,
    ) -> VariantResult {
        let id = job.variant_id();

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return VariantResult::failure(
                    id,
                    VariantStatus::RenderTimeout,
                    "Batch deadline exceeded during content synthesis",
                    started.elapsed(),
                );
            }
            raw = self.synthesizer.synthesize(job) => raw,
        };

        let document = match Synthesis::from_response(raw) {
            Synthesis::Synthesized(document) => document,
            Synthesis::Failed(e) => {
                return VariantResult::failure(
                    id,
                    VariantStatus::SynthesisFailed,
                    format!("Content synthesis failed: {}", e),
                    started.elapsed(),
                );
            }
        };

        let payload = match self
            .sandbox
            .extract(&document, extraction_timeout, cancel)
            .await
        {
            Ok(payload) => payload,
            Err(e) => return sandbox_failure(id, e, extraction_timeout, started.elapsed()),
        };

        if let Err(e) = self.validator.validate(&payload) {
            return VariantResult::failure(
                id,
                VariantStatus::ValidationFailed,
                format!("Invalid SVG content: {}", e),
                started.elapsed(),
            );
        }

        VariantResult::success(id, normalize_svg(&payload), started.elapsed())
    }
}

/// Map a sandbox error to a terminal variant result
fn sandbox_failure(
    variant_id: u32,
    error: SandboxError,
    extraction_timeout: Duration,
    elapsed: Duration,
) -> VariantResult {
    let (status, message) = match error {
        SandboxError::Spawn(reason) => (
            VariantStatus::RenderCrashed,
            format!("Resource error: could not start render sandbox: {}", reason),
        ),
        SandboxError::Timeout { .. } => (
            VariantStatus::RenderTimeout,
            format!(
                "Extraction timeout ({}s)",
                extraction_timeout.as_secs_f64()
            ),
        ),
        SandboxError::Cancelled => (
            VariantStatus::RenderTimeout,
            "Batch deadline exceeded during rendering".to_string(),
        ),
        SandboxError::Crashed {
            exit_code,
            reason,
            diagnostics,
        } => {
            let exit = exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let mut message = format!("Render sandbox crashed (exit {}): {}", exit, reason);
            let diagnostics = diagnostics.trim();
            if !diagnostics.is_empty() {
                message.push_str("; diagnostics: ");
                message.push_str(diagnostics);
            }
            (VariantStatus::RenderCrashed, message)
        }
    };
    VariantResult::failure(variant_id, status, message, elapsed)
}
