// Batch Orchestrator - fans a request out into variant jobs and collects
// exactly one result per variant

use crate::application::aggregator::ResultAggregator;
use crate::application::cancel::{cancel_channel, CancelToken};
use crate::application::config::OrchestratorConfig;
use crate::application::worker::constants::GRACEFUL_TERMINATION_TIMEOUT;
use crate::application::worker::{execute_guarded, PanicGuardResult, SvgValidator, VariantWorker};
use crate::domain::{BatchId, BatchRequest, BatchResult, VariantJob, VariantResult, VariantStatus};
use crate::error::Result;
use crate::port::{ArtifactStore, ContentSynthesizer, IdProvider, RenderSandbox, TimeProvider};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

/// Time cancelled variants get to tear down their sandboxes before the
/// orchestrator aborts them outright
const CANCEL_GRACE: Duration = Duration::from_secs(GRACEFUL_TERMINATION_TIMEOUT.as_secs() + 1);

/// Runs batches of variant jobs
pub struct Orchestrator {
    config: OrchestratorConfig,
    worker: Arc<VariantWorker>,
    artifacts: Arc<dyn ArtifactStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Errors
    /// - `AppError::Config` if `config` is inconsistent
    pub fn new(
        config: OrchestratorConfig,
        synthesizer: Arc<dyn ContentSynthesizer>,
        sandbox: Arc<dyn RenderSandbox>,
        artifacts: Arc<dyn ArtifactStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let worker = Arc::new(VariantWorker::new(
            synthesizer,
            sandbox,
            SvgValidator::new(config.min_svg_children),
        ));

        Ok(Self {
            config,
            worker,
            artifacts,
            id_provider,
            time_provider,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate raw request parameters against the configured limits
    ///
    /// # Errors
    /// - `AppError::Domain` on a blank prompt or an out-of-range count
    pub fn accept(
        &self,
        prompt: impl Into<String>,
        style: impl Into<String>,
        variant_count: u32,
    ) -> Result<BatchRequest> {
        Ok(BatchRequest::new(
            prompt,
            style,
            variant_count,
            self.config.max_variants,
        )?)
    }

    /// Run a batch under the configured batch deadline
    pub async fn run_batch(&self, request: &BatchRequest) -> Result<BatchResult> {
        let deadline = Instant::now() + self.config.batch_deadline;
        self.run_batch_until(request, deadline).await
    }

    /// Run a batch that must finish by `deadline`
    ///
    /// Returns exactly one result per requested variant, ordered by id.
    /// Variants still running at the deadline are cancelled and reported as
    /// `RenderTimeout`.
    ///
    /// # Errors
    /// - `AppError::Artifact` if the batch output directory cannot be created
    pub async fn run_batch_until(
        &self,
        request: &BatchRequest,
        deadline: Instant,
    ) -> Result<BatchResult> {
        let started = Instant::now();
        let batch_id = BatchId::compose(
            self.time_provider.now_secs(),
            &self.id_provider.generate_id(),
            request.prompt(),
        );
        let batch_dir = self.artifacts.create_batch_dir(batch_id.as_str()).await?;
        let pool_size = self.config.pool_size(request.variant_count());

        info!(
            batch_id = %batch_id,
            variant_count = request.variant_count(),
            pool_size,
            output_dir = %batch_dir.display(),
            "Batch accepted"
        );

        let semaphore = Arc::new(Semaphore::new(pool_size));
        let (cancel_tx, cancel) = cancel_channel();
        let mut tasks = JoinSet::new();

        for job in VariantJob::for_batch(request) {
            let task = VariantTask {
                job,
                worker: Arc::clone(&self.worker),
                artifacts: Arc::clone(&self.artifacts),
                batch_dir: batch_dir.clone(),
                semaphore: Arc::clone(&semaphore),
                extraction_timeout: self.config.extraction_timeout,
                cancel: cancel.clone(),
            };
            tasks.spawn(task.run());
        }

        let mut slots: BTreeMap<u32, VariantResult> = BTreeMap::new();
        let deadline_reached = sleep_until(deadline);
        let hard_stop = sleep_until(deadline + CANCEL_GRACE);
        tokio::pin!(deadline_reached);
        tokio::pin!(hard_stop);
        let mut cancelled = false;
        let mut aborted = false;

        while !tasks.is_empty() {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(result)) => {
                        slots.insert(result.variant_id(), result);
                    }
                    Some(Err(e)) => {
                        error!(batch_id = %batch_id, error = %e, "Variant task did not return a result");
                    }
                    None => break,
                },
                _ = &mut deadline_reached, if !cancelled => {
                    warn!(
                        batch_id = %batch_id,
                        outstanding = tasks.len(),
                        "Batch deadline reached, cancelling outstanding variants"
                    );
                    cancel_tx.cancel();
                    cancelled = true;
                }
                _ = &mut hard_stop, if cancelled && !aborted => {
                    error!(
                        batch_id = %batch_id,
                        outstanding = tasks.len(),
                        "Variants ignored cancellation, aborting"
                    );
                    tasks.abort_all();
                    aborted = true;
                }
            }
        }

        let results = (1..=request.variant_count())
            .map(|id| {
                slots.remove(&id).unwrap_or_else(|| {
                    let (status, message) = if cancelled {
                        (VariantStatus::RenderTimeout, "Batch deadline exceeded")
                    } else {
                        (VariantStatus::RenderCrashed, "Variant task ended without a result")
                    };
                    VariantResult::failure(id, status, message, started.elapsed())
                })
            })
            .collect();

        Ok(ResultAggregator::aggregate(
            batch_id, results, started, batch_dir,
        ))
    }
}

/// Everything one variant task needs, moved onto its own task
struct VariantTask {
    job: VariantJob,
    worker: Arc<VariantWorker>,
    artifacts: Arc<dyn ArtifactStore>,
    batch_dir: PathBuf,
    semaphore: Arc<Semaphore>,
    extraction_timeout: Duration,
    cancel: CancelToken,
}

impl VariantTask {
    async fn run(self) -> VariantResult {
        let id = self.job.variant_id();
        let queued = Instant::now();
        let mut cancel = self.cancel.clone();

        // No new sandbox may start once the batch is cancelled
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return VariantResult::failure(
                    id,
                    VariantStatus::RenderTimeout,
                    "Batch deadline exceeded before a sandbox slot was free",
                    queued.elapsed(),
                );
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return VariantResult::failure(
                        id,
                        VariantStatus::RenderCrashed,
                        "Sandbox pool closed",
                        queued.elapsed(),
                    );
                }
            },
        };

        let worker = Arc::clone(&self.worker);
        let job = self.job.clone();
        let worker_cancel = self.cancel.clone();
        let timeout = self.extraction_timeout;

        let result = match execute_guarded(async move {
            worker.run(&job, timeout, worker_cancel).await
        })
        .await
        {
            PanicGuardResult::Success(result) => result,
            PanicGuardResult::Panicked(msg) => VariantResult::failure(
                id,
                VariantStatus::RenderCrashed,
                format!("Variant worker panicked: {}", msg),
                queued.elapsed(),
            ),
        };
        drop(permit);

        self.persist(result).await
    }

    /// Write a successful payload; a failed write downgrades the variant
    async fn persist(&self, result: VariantResult) -> VariantResult {
        let id = result.variant_id();
        let written = match result.payload() {
            Some(payload) => {
                self.artifacts
                    .persist_variant(&self.batch_dir, id, payload.as_bytes())
                    .await
            }
            None => return result,
        };

        match written {
            Ok(path) => {
                info!(variant_id = id, path = %path.display(), "Variant persisted");
                result.with_file_path(path)
            }
            Err(e) => {
                warn!(variant_id = id, error = %e, "Failed to persist variant");
                result.downgrade_to_crashed(format!("Rendered SVG could not be saved: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::port::artifact_store::mocks::MockArtifactStore;
    use crate::port::content_synthesizer::mocks::{MockBehavior, MockSynthesizer};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::render_sandbox::mocks::{MockRender, MockSandbox};
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::SynthesisError;

    struct Harness {
        orchestrator: Orchestrator,
        sandbox: Arc<MockSandbox>,
        artifacts: Arc<MockArtifactStore>,
    }

    fn harness(
        config: OrchestratorConfig,
        synth: MockSynthesizer,
        sandbox: MockSandbox,
        artifacts: MockArtifactStore,
    ) -> Harness {
        let sandbox = Arc::new(sandbox);
        let artifacts = Arc::new(artifacts);
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(synth),
            sandbox.clone(),
            artifacts.clone(),
            Arc::new(SequentialIdProvider::default()),
            Arc::new(FixedTimeProvider(1_700_000_000_000)),
        )
        .unwrap();
        Harness {
            orchestrator,
            sandbox,
            artifacts,
        }
    }

    fn statuses(batch: &BatchResult) -> Vec<VariantStatus> {
        batch.results().iter().map(|r| r.status()).collect()
    }

    #[tokio::test]
    async fn test_all_variants_succeed() {
        let h = harness(
            OrchestratorConfig::default(),
            MockSynthesizer::new_success(),
            MockSandbox::new_success(),
            MockArtifactStore::new(),
        );
        let request = h.orchestrator.accept("solar vs wind", "minimal", 3).unwrap();

        let batch = h.orchestrator.run_batch(&request).await.unwrap();

        assert_eq!(batch.success_count(), 3);
        assert_eq!(statuses(&batch), vec![VariantStatus::Success; 3]);
        assert_eq!(
            batch.output_directory(),
            PathBuf::from("generated/batch_1700000000_00000001_solar_vs_wind")
        );
        for (i, result) in batch.results().iter().enumerate() {
            assert_eq!(result.variant_id(), i as u32 + 1);
            let expected = format!("variant_{}/infographic.svg", i + 1);
            assert!(result.file_path().unwrap().ends_with(expected));
        }
        assert_eq!(h.artifacts.persisted().len(), 3);
        assert_eq!(h.sandbox.active(), 0);
    }

    #[tokio::test]
    async fn test_hung_variant_is_cut_at_deadline() {
        let config = OrchestratorConfig {
            extraction_timeout: Duration::from_secs(30),
            batch_deadline: Duration::from_secs(60),
            ..Default::default()
        };
        let h = harness(
            config,
            MockSynthesizer::new_success(),
            MockSandbox::new_success().on_document_containing("variant-2", MockRender::Hang),
            MockArtifactStore::new(),
        );
        let request = h.orchestrator.accept("topic", "style", 3).unwrap();

        let started = Instant::now();
        let deadline = started + Duration::from_millis(200);
        let batch = h
            .orchestrator
            .run_batch_until(&request, deadline)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            statuses(&batch),
            vec![
                VariantStatus::Success,
                VariantStatus::RenderTimeout,
                VariantStatus::Success
            ]
        );
        assert!(batch.results()[1].message().contains("deadline"));
        assert_eq!(batch.success_count(), 2);
        assert_eq!(h.sandbox.active(), 0);
    }

    #[tokio::test]
    async fn test_results_ordered_regardless_of_completion_order() {
        let h = harness(
            OrchestratorConfig::default(),
            MockSynthesizer::new_success()
                .with_variant(1, MockBehavior::Delay(Duration::from_millis(80)))
                .with_variant(2, MockBehavior::Delay(Duration::from_millis(40))),
            MockSandbox::new_success(),
            MockArtifactStore::new(),
        );
        let request = h.orchestrator.accept("topic", "style", 3).unwrap();
        let batch = h.orchestrator.run_batch(&request).await.unwrap();

        let ids: Vec<u32> = batch.results().iter().map(|r| r.variant_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_every_count_yields_sequential_results_on_repeat() {
        let config = OrchestratorConfig::default();
        let max_variants = config.max_variants;
        let h = harness(
            config,
            MockSynthesizer::new_success().with_variant(
                2,
                MockBehavior::Fail(SynthesisError::Upstream {
                    status: 503,
                    message: "overloaded".into(),
                }),
            ),
            MockSandbox::new_success().on_document_containing(
                "variant-3",
                MockRender::Crash {
                    exit_code: 1,
                    diagnostics: "renderer gone".into(),
                },
            ),
            MockArtifactStore::new(),
        );

        for n in 1..=max_variants {
            let request = h.orchestrator.accept("same topic", "style", n).unwrap();
            for _ in 0..2 {
                let batch = h.orchestrator.run_batch(&request).await.unwrap();

                let ids: Vec<u32> = batch.results().iter().map(|r| r.variant_id()).collect();
                assert_eq!(ids, (1..=n).collect::<Vec<_>>());
                assert_eq!(batch.variant_count(), n as usize);

                let successes = batch.results().iter().filter(|r| r.is_success()).count();
                assert_eq!(batch.success_count(), successes);
                assert!(batch.success_count() <= n as usize);
                if n >= 2 {
                    assert_eq!(batch.results()[1].status(), VariantStatus::SynthesisFailed);
                }
                if n >= 3 {
                    assert_eq!(batch.results()[2].status(), VariantStatus::RenderCrashed);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_variant_is_isolated() {
        let h = harness(
            OrchestratorConfig::default(),
            MockSynthesizer::new_success()
                .with_variant(2, MockBehavior::Panic("generator bug".into())),
            MockSandbox::new_success(),
            MockArtifactStore::new(),
        );
        let request = h.orchestrator.accept("topic", "style", 3).unwrap();
        let batch = h.orchestrator.run_batch(&request).await.unwrap();

        assert_eq!(batch.success_count(), 2);
        let crashed = &batch.results()[1];
        assert_eq!(crashed.status(), VariantStatus::RenderCrashed);
        assert!(crashed.message().contains("generator bug"));
    }

    #[tokio::test]
    async fn test_persistence_failure_downgrades_variant() {
        let h = harness(
            OrchestratorConfig::default(),
            MockSynthesizer::new_success(),
            MockSandbox::new_success(),
            MockArtifactStore::new().fail_variant(1),
        );
        let request = h.orchestrator.accept("topic", "style", 2).unwrap();
        let batch = h.orchestrator.run_batch(&request).await.unwrap();

        let first = &batch.results()[0];
        assert_eq!(first.status(), VariantStatus::RenderCrashed);
        assert!(first.payload().is_none());
        assert!(first.file_path().is_none());
        assert!(first.message().contains("could not be saved"));
        assert_eq!(batch.success_count(), 1);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrent_sandboxes() {
        let config = OrchestratorConfig {
            max_parallel_sandboxes: Some(2),
            ..Default::default()
        };
        let h = harness(
            config,
            MockSynthesizer::new_success(),
            MockSandbox::new(MockRender::Delay(
                Duration::from_millis(50),
                crate::port::render_sandbox::mocks::sample_svg(),
            )),
            MockArtifactStore::new(),
        );
        let request = h.orchestrator.accept("topic", "style", 5).unwrap();
        let batch = h.orchestrator.run_batch(&request).await.unwrap();

        assert_eq!(batch.success_count(), 5);
        assert_eq!(h.sandbox.call_count(), 5);
        assert!(h.sandbox.max_concurrency() <= 2);
    }

    #[tokio::test]
    async fn test_all_failed_batch_still_returns_results() {
        let h = harness(
            OrchestratorConfig::default(),
            MockSynthesizer::new_unreachable(),
            MockSandbox::new_success(),
            MockArtifactStore::new(),
        );
        let request = h.orchestrator.accept("topic", "style", 2).unwrap();
        let batch = h.orchestrator.run_batch(&request).await.unwrap();

        assert_eq!(batch.success_count(), 0);
        assert_eq!(batch.variant_count(), 2);
        assert_eq!(
            statuses(&batch),
            vec![VariantStatus::SynthesisFailed; 2]
        );
        assert_eq!(h.sandbox.call_count(), 0);
        assert!(h.artifacts.persisted().is_empty());
    }

    #[tokio::test]
    async fn test_output_dir_failure_is_batch_error() {
        let h = harness(
            OrchestratorConfig::default(),
            MockSynthesizer::new_success(),
            MockSandbox::new_success(),
            MockArtifactStore::failing_create(),
        );
        let request = h.orchestrator.accept("topic", "style", 1).unwrap();
        let err = h.orchestrator.run_batch(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Artifact(_)));
        assert_eq!(h.sandbox.call_count(), 0);
    }

    #[tokio::test]
    async fn test_queued_variants_time_out_when_pool_is_busy() {
        let config = OrchestratorConfig {
            max_parallel_sandboxes: Some(1),
            ..Default::default()
        };
        let h = harness(
            config,
            MockSynthesizer::new_success(),
            MockSandbox::new(MockRender::Hang),
            MockArtifactStore::new(),
        );
        let request = h.orchestrator.accept("topic", "style", 3).unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        let batch = h
            .orchestrator
            .run_batch_until(&request, deadline)
            .await
            .unwrap();

        assert_eq!(statuses(&batch), vec![VariantStatus::RenderTimeout; 3]);
        assert_eq!(h.sandbox.call_count(), 1);
        assert_eq!(h.sandbox.active(), 0);
    }

    #[test]
    fn test_rejects_out_of_range_requests() {
        let h = harness(
            OrchestratorConfig::default(),
            MockSynthesizer::new_success(),
            MockSandbox::new_success(),
            MockArtifactStore::new(),
        );
        assert!(matches!(
            h.orchestrator.accept("topic", "style", 6),
            Err(AppError::Domain(_))
        ));
        assert!(h.orchestrator.accept("  ", "style", 1).is_err());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = OrchestratorConfig {
            extraction_timeout: Duration::from_secs(10),
            batch_deadline: Duration::from_secs(5),
            ..Default::default()
        };
        let result = Orchestrator::new(
            config,
            Arc::new(MockSynthesizer::new_success()),
            Arc::new(MockSandbox::new_success()),
            Arc::new(MockArtifactStore::new()),
            Arc::new(SequentialIdProvider::default()),
            Arc::new(FixedTimeProvider(0)),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
