// Infographic render child
//
// stdin:  one RenderJobSpec (JSON)
// stdout: one ResultRecord line
// stderr: logs
// exit:   0 for extracted / timed_out, 1 for failed

mod render;
mod script;

use std::io::Read;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use infographic_core::domain::{RenderJobSpec, ResultRecord};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    let record = match read_spec() {
        Ok(spec) => {
            info!(
                document_bytes = spec.document.len(),
                timeout_ms = spec.timeout_ms,
                marker = %spec.marker,
                "Render job received"
            );
            render::render(&spec)
        }
        Err(e) => {
            error!(error = %e, "Invalid job spec");
            ResultRecord::Failed {
                error: format!("invalid job spec: {}", e),
            }
        }
    };

    println!("{}", record.to_line());

    match record {
        ResultRecord::Failed { .. } => ExitCode::FAILURE,
        ResultRecord::Extracted { .. } | ResultRecord::TimedOut { .. } => ExitCode::SUCCESS,
    }
}

fn read_spec() -> Result<RenderJobSpec, String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| e.to_string())?;
    serde_json::from_str(&input).map_err(|e| e.to_string())
}
