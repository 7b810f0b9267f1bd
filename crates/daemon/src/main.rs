//! Infographic Engine - Main Entry Point
//! HTTP server + batch orchestrator with one sandbox process per variant

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

// Import workspace crates
use infographic_api_http::{ApiServer, ApiState, RateLimiter};
use infographic_core::application::Orchestrator;
use infographic_core::port::id_provider::UuidProvider;
use infographic_core::port::time_provider::SystemTimeProvider;
use infographic_infra_gemini::GeminiSynthesizer;
use infographic_infra_system::{FsArtifactStore, ProcessSandbox, SandboxConfig};

use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (defaults, then environment)
    let settings = Settings::load()?;

    // 2. Initialize logging
    telemetry::init(&settings)?;
    info!("Infographic Engine v{} starting...", VERSION);
    info!(settings = ?settings, "Configuration loaded");

    // 3. Setup dependencies (DI wiring)
    let render_child = settings.render_child_path()?;
    if !render_child.is_file() {
        warn!(
            path = %render_child.display(),
            "Render child not found; every variant will fail until it is installed"
        );
    }
    let sandbox = Arc::new(ProcessSandbox::new(SandboxConfig::new(&render_child)));

    let synthesizer = Arc::new(GeminiSynthesizer::new(settings.gemini_config()));
    let artifacts = Arc::new(FsArtifactStore::new(&settings.output_dir));

    let orchestrator = Orchestrator::new(
        settings.orchestrator_config(),
        synthesizer,
        sandbox,
        artifacts,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    )
    .context("invalid orchestrator configuration")?;

    let state = ApiState::new(
        Arc::new(orchestrator),
        RateLimiter::new(settings.rate_limit_burst, settings.rate_limit_rate),
    );

    // 4. Serve until Ctrl+C
    info!("Press Ctrl+C to shutdown");
    ApiServer::new(settings.server_config(), state)
        .serve(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    telemetry::shutdown();
    info!("Shutdown complete.");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received. Draining in-flight requests..."),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C; serving until killed");
            std::future::pending::<()>().await
        }
    }
}
