//! Shared fixtures: fake render children driven by `/bin/sh`

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use infographic_core::application::{Orchestrator, OrchestratorConfig};
use infographic_core::port::content_synthesizer::mocks::MockSynthesizer;
use infographic_core::port::id_provider::mocks::SequentialIdProvider;
use infographic_core::port::time_provider::mocks::FixedTimeProvider;
use infographic_infra_system::{FsArtifactStore, ProcessSandbox, SandboxConfig};

/// 2023-11-14T22:13:20Z
pub const NOW_MS: i64 = 1_700_000_000_000;

/// Result line of a child that extracted a complete infographic
pub const EXTRACTED: &str = r#"printf '%s\n' '{"status":"extracted","payload":"<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"800\" height=\"600\"><rect/><text>Solar</text><circle/><circle/><g><line/></g></svg>"}'"#;

/// Sandbox whose render child is a shell script
pub fn fake_child(dir: &Path, body: &str) -> SandboxConfig {
    let script = dir.join("fake-render-child.sh");
    fs::write(&script, format!("#!/bin/sh\n{}", body)).expect("write script");

    let mut config = SandboxConfig::new("/bin/sh");
    config.args = vec![script.display().to_string()];
    config.termination_grace = Duration::from_millis(300);
    config
}

/// Child that picks its behavior from the variant tag in the document
///
/// `cases` are `case` arms, e.g. `*variant-2*) sleep 30 ;;`; every other
/// variant extracts successfully.
pub fn dispatching_child(dir: &Path, cases: &str) -> SandboxConfig {
    fake_child(
        dir,
        &format!(
            "input=$(cat)\ncase \"$input\" in\n{}\n  *) {} ;;\nesac\n",
            cases, EXTRACTED
        ),
    )
}

pub fn orchestrator(
    config: OrchestratorConfig,
    sandbox: SandboxConfig,
    output_root: &Path,
) -> Orchestrator {
    orchestrator_with(config, MockSynthesizer::new_success(), sandbox, output_root)
}

pub fn orchestrator_with(
    config: OrchestratorConfig,
    synthesizer: MockSynthesizer,
    sandbox: SandboxConfig,
    output_root: &Path,
) -> Orchestrator {
    Orchestrator::new(
        config,
        Arc::new(synthesizer),
        Arc::new(ProcessSandbox::new(sandbox)),
        Arc::new(FsArtifactStore::new(output_root)),
        Arc::new(SequentialIdProvider::default()),
        Arc::new(FixedTimeProvider(NOW_MS)),
    )
    .expect("valid config")
}

/// Short budgets so failing paths finish quickly
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        extraction_timeout: Duration::from_secs(2),
        batch_deadline: Duration::from_secs(20),
        ..OrchestratorConfig::default()
    }
}

/// Whether a process is still alive (zombies count as gone)
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // State is the field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}
