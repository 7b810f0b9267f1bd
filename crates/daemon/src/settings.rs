//! Daemon settings: built-in defaults, then environment variables

use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use infographic_api_http::ApiServerConfig;
use infographic_core::application::worker::constants::{
    DEFAULT_BATCH_DEADLINE, DEFAULT_EXTRACTION_TIMEOUT, DEFAULT_MAX_VARIANTS,
    DEFAULT_MIN_SVG_CHILDREN,
};
use infographic_core::application::OrchestratorConfig;
use infographic_infra_gemini::synthesizer::{DEFAULT_MODEL, DEFAULT_SYNTHESIS_TIMEOUT};
use infographic_infra_gemini::GeminiConfig;

/// Render child binary name, looked up next to the daemon by default
const RENDER_CHILD_BINARY: &str = "infographic-render-child";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub api_key: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub max_variants: u32,
    /// Seconds
    pub extraction_timeout: u64,
    /// Seconds
    pub batch_deadline: u64,
    pub max_parallel_sandboxes: Option<usize>,
    pub output_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub render_child_path: Option<PathBuf>,
    pub gemini_model: String,
    /// Seconds
    pub synthesis_timeout: u64,
    pub min_svg_children: usize,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_variants", &self.max_variants)
            .field("extraction_timeout", &self.extraction_timeout)
            .field("batch_deadline", &self.batch_deadline)
            .field("max_parallel_sandboxes", &self.max_parallel_sandboxes)
            .field("output_dir", &self.output_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("render_child_path", &self.render_child_path)
            .field("gemini_model", &self.gemini_model)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(Environment::default())
    }

    fn from_environment(environment: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?
            .set_default("max_variants", DEFAULT_MAX_VARIANTS)?
            .set_default("extraction_timeout", DEFAULT_EXTRACTION_TIMEOUT.as_secs())?
            .set_default("batch_deadline", DEFAULT_BATCH_DEADLINE.as_secs())?
            .set_default("output_dir", "generated")?
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000)?
            .set_default("gemini_model", DEFAULT_MODEL)?
            .set_default("synthesis_timeout", DEFAULT_SYNTHESIS_TIMEOUT.as_secs())?
            .set_default("min_svg_children", DEFAULT_MIN_SVG_CHILDREN as u64)?
            .set_default("rate_limit_burst", 10)?
            .set_default("rate_limit_rate", 1)?
            .add_source(environment.try_parsing(true))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        self.orchestrator_config().validate()?;
        if self.synthesis_timeout == 0 {
            bail!("SYNTHESIS_TIMEOUT must be at least 1 second");
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_variants: self.max_variants,
            max_parallel_sandboxes: self.max_parallel_sandboxes,
            extraction_timeout: Duration::from_secs(self.extraction_timeout),
            batch_deadline: Duration::from_secs(self.batch_deadline),
            min_svg_children: self.min_svg_children,
        }
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.api_key.clone(),
            model: self.gemini_model.clone(),
            timeout: Duration::from_secs(self.synthesis_timeout),
            ..GeminiConfig::default()
        }
    }

    pub fn server_config(&self) -> ApiServerConfig {
        ApiServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Configured render child, else the binary next to this executable
    pub fn render_child_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.render_child_path {
            return Ok(path.clone());
        }
        let exe = std::env::current_exe().context("cannot locate the daemon executable")?;
        Ok(exe.with_file_name(RENDER_CHILD_BINARY))
    }
}
