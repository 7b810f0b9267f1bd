// Application Layer - Use Cases and Business Logic

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod orchestrator;
pub mod retry;
pub mod worker;

// Re-exports
pub use aggregator::ResultAggregator;
pub use cancel::{cancel_channel, CancelSender, CancelToken};
pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{SvgValidator, VariantWorker};
