// Headless render of one document

use headless_chrome::browser::tab::Tab;
use headless_chrome::{Browser, LaunchOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use infographic_core::application::worker::constants::SIGNAL_POLL_INTERVAL;
use infographic_core::domain::{RenderJobSpec, ResultRecord};

use crate::script::{inject_listener, probe_script, serialize_script, Probe, SettleTracker};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Failed to load document: {0}")]
    Load(String),

    #[error("Failed to serialize root element: {0}")]
    Serialize(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why polling stopped
#[derive(Debug, PartialEq, Eq)]
enum Completion {
    Signalled,
    Settled,
    TimedOut,
}

/// Render `spec` and report the outcome as a result record
pub fn render(spec: &RenderJobSpec) -> ResultRecord {
    let started = Instant::now();
    match render_inner(spec, started) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "Render failed");
            ResultRecord::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn render_inner(spec: &RenderJobSpec, started: Instant) -> Result<ResultRecord, RenderError> {
    let budget = Duration::from_millis(spec.timeout_ms);
    let deadline = started + budget;

    // Loaded from disk: documents routinely exceed what a data: URL carries
    let mut page = tempfile::Builder::new()
        .prefix("infographic-")
        .suffix(".html")
        .tempfile()?;
    page.write_all(inject_listener(&spec.document, &spec.marker).as_bytes())?;
    page.flush()?;
    let url = format!("file://{}", page.path().display());

    let launch_options = LaunchOptions::default_builder()
        .headless(true)
        .window_size(Some((spec.viewport.width, spec.viewport.height)))
        .idle_browser_timeout(budget + Duration::from_secs(5))
        .build()
        .map_err(|e| RenderError::Launch(format!("invalid launch options: {}", e)))?;
    let browser = Browser::new(launch_options).map_err(|e| RenderError::Launch(e.to_string()))?;
    let tab = browser
        .new_tab()
        .map_err(|e| RenderError::Launch(format!("failed to open tab: {}", e)))?;
    tab.set_default_timeout(budget);

    tab.navigate_to(&url)
        .map_err(|e| RenderError::Load(e.to_string()))?;
    tab.wait_until_navigated()
        .map_err(|e| RenderError::Load(e.to_string()))?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Document loaded");

    match wait_for_completion(&tab, spec, deadline) {
        Completion::TimedOut => {
            let waited_ms = started.elapsed().as_millis() as u64;
            info!(waited_ms, "No completion signal before deadline");
            Ok(ResultRecord::TimedOut { waited_ms })
        }
        completion => {
            info!(?completion, elapsed_ms = started.elapsed().as_millis() as u64, "Render complete");
            let payload = serialize_root(&tab, spec)?;
            Ok(ResultRecord::Extracted { payload })
        }
    }
}

fn wait_for_completion(tab: &Arc<Tab>, spec: &RenderJobSpec, deadline: Instant) -> Completion {
    let probe_expr = probe_script(&spec.marker, &spec.root_selector);
    let mut settle = SettleTracker::new(Duration::from_millis(spec.settle_ms));

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Completion::TimedOut;
        }

        match evaluate_string(tab, &probe_expr) {
            Ok(Some(raw)) => match Probe::parse(&raw) {
                Some(probe) if probe.signalled => return Completion::Signalled,
                Some(probe) => {
                    if settle.observe(&probe, now) {
                        return Completion::Settled;
                    }
                }
                None => debug!(raw = %raw, "Unreadable probe result"),
            },
            Ok(None) => debug!("Probe returned no value"),
            // Page still executing or mid-navigation
            Err(e) => debug!(error = %e, "Probe failed"),
        }

        std::thread::sleep(SIGNAL_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

fn serialize_root(tab: &Arc<Tab>, spec: &RenderJobSpec) -> Result<String, RenderError> {
    let expr = serialize_script(&spec.root_selector, spec.strip_styles);
    match evaluate_string(tab, &expr).map_err(RenderError::Serialize)? {
        Some(markup) if !markup.trim().is_empty() => Ok(markup),
        _ => Err(RenderError::Serialize(format!(
            "no element matches '{}'",
            spec.root_selector
        ))),
    }
}

/// Evaluate an expression whose result is a string (or null)
fn evaluate_string(tab: &Arc<Tab>, expr: &str) -> Result<Option<String>, String> {
    let remote = tab.evaluate(expr, false).map_err(|e| e.to_string())?;
    Ok(remote
        .value
        .and_then(|v| v.as_str().map(|s| s.to_string())))
}
