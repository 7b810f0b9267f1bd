// Panic isolation for variant jobs
use std::any::Any;
use std::future::Future;
use tokio::task::{JoinError, JoinHandle};
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked (or was aborted); carries the panic message
    Panicked(String),
}

/// Run a future on its own task so a panic inside it cannot unwind into the
/// caller.
///
/// Dropping the returned future aborts the inner task as well.
///
/// # Example
/// ```text
/// match execute_guarded(async { worker.run(&job, timeout, cancel).await }).await {
///     PanicGuardResult::Success(result) => result,
///     PanicGuardResult::Panicked(msg) => VariantResult::failure(..., msg, ...),
/// }
/// ```
pub async fn execute_guarded<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut guard = AbortOnDrop(tokio::spawn(future));
    match (&mut guard.0).await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(join_error) => {
            let panic_msg = join_error_message(join_error);
            error!(panic_msg = %panic_msg, "Variant task panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn join_error_message(join_error: JoinError) -> String {
    if join_error.is_cancelled() {
        return "task was aborted".to_string();
    }
    match join_error.try_into_panic() {
        Ok(payload) => panic_payload_message(payload.as_ref()),
        Err(_) => "Unknown panic".to_string(),
    }
}

fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
