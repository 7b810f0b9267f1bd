//! Batch deadline, forced termination and pool bounds with real processes
#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use infographic_core::application::OrchestratorConfig;
use infographic_core::domain::VariantStatus;
use tempfile::TempDir;

use common::{fake_child, orchestrator, EXTRACTED};

fn pids(path: &std::path::Path) -> Vec<u32> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .collect()
}

#[cfg(target_os = "linux")]
async fn assert_all_gone(pids: &[u32]) {
    let until = Instant::now() + Duration::from_secs(3);
    while pids.iter().any(|&pid| common::process_alive(pid)) {
        assert!(Instant::now() < until, "sandbox processes outlived the batch: {pids:?}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn batch_deadline_cancels_running_sandboxes() {
    let work = TempDir::new().unwrap();
    let pid_file = work.path().join("pids");
    let child = fake_child(
        work.path(),
        &format!("input=$(cat)\necho $$ >> {}\nexec sleep 30\n", pid_file.display()),
    );
    let config = OrchestratorConfig {
        extraction_timeout: Duration::from_secs(10),
        batch_deadline: Duration::from_secs(20),
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(config, child, work.path());

    let started = Instant::now();
    let request = orch.accept("Never finishes", "", 3).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    let batch = orch.run_batch_until(&request, deadline).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(batch.variant_count(), 3);
    assert_eq!(batch.success_count(), 0);
    for result in batch.results() {
        assert_eq!(result.status(), VariantStatus::RenderTimeout);
        assert_eq!(result.message(), "Batch deadline exceeded during rendering");
    }

    let spawned = pids(&pid_file);
    assert_eq!(spawned.len(), 3);
    #[cfg(target_os = "linux")]
    assert_all_gone(&spawned).await;
}

#[tokio::test]
async fn sigterm_resistant_child_is_killed() {
    let work = TempDir::new().unwrap();
    let pid_file = work.path().join("pids");
    let child = fake_child(
        work.path(),
        &format!(
            "trap '' TERM\ninput=$(cat)\necho $$ >> {pids}\nsleep 30 &\necho $! >> {pids}\nwait\n",
            pids = pid_file.display()
        ),
    );
    let config = OrchestratorConfig {
        extraction_timeout: Duration::from_secs(1),
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(config, child, work.path());

    let started = Instant::now();
    let request = orch.accept("Stubborn", "", 1).unwrap();
    let batch = orch.run_batch(&request).await.unwrap();

    // 1s timeout + 300ms grace, then SIGKILL
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(batch.results()[0].status(), VariantStatus::RenderTimeout);

    let spawned = pids(&pid_file);
    assert_eq!(spawned.len(), 2, "shell and its grandchild");
    #[cfg(target_os = "linux")]
    assert_all_gone(&spawned).await;
}

/// With a pool of one, sandboxes never overlap (a lock directory proves it)
#[tokio::test]
async fn pool_of_one_runs_sandboxes_one_at_a_time() {
    let work = TempDir::new().unwrap();
    let lock = work.path().join("lock");
    let child = fake_child(
        work.path(),
        &format!(
            r#"input=$(cat)
if mkdir {lock} 2>/dev/null; then
  sleep 0.2
  rmdir {lock}
  {extracted}
else
  printf '%s\n' '{{"status":"failed","error":"overlapping sandboxes"}}'
  exit 1
fi
"#,
            lock = lock.display(),
            extracted = EXTRACTED
        ),
    );
    let config = OrchestratorConfig {
        max_parallel_sandboxes: Some(1),
        ..common::fast_config()
    };
    let orch = orchestrator(config, child, work.path());

    let request = orch.accept("Serial", "", 3).unwrap();
    let batch = orch.run_batch(&request).await.unwrap();

    assert_eq!(
        batch.success_count(),
        3,
        "{:?}",
        batch.results().iter().map(|r| r.message()).collect::<Vec<_>>()
    );
}
