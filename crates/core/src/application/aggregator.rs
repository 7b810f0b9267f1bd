// Result Aggregator - folds terminal variant results into a BatchResult

use crate::domain::{BatchId, BatchResult, VariantResult};
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::info;

/// Builds the ordered, counted batch result
pub struct ResultAggregator;

impl ResultAggregator {
    /// Order results by variant id and count successes
    ///
    /// `started` is the moment the batch was dispatched; elapsed time runs
    /// until this call.
    pub fn aggregate(
        batch_id: BatchId,
        mut results: Vec<VariantResult>,
        started: Instant,
        output_directory: PathBuf,
    ) -> BatchResult {
        results.sort_by_key(|r| r.variant_id());
        let success_count = results.iter().filter(|r| r.is_success()).count();
        let elapsed = started.elapsed();

        info!(
            batch_id = %batch_id,
            success_count,
            variant_count = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch aggregated"
        );

        BatchResult::new(batch_id, results, success_count, elapsed, output_directory)
    }
}
