//! HTTP Request/Response Types

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use infographic_core::application::worker::constants::DEFAULT_STYLE;
use infographic_core::domain::{BatchResult, VariantResult};

pub const SERVICE_NAME: &str = "infographic-engine";

/// POST /generate-infographics
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_style")]
    pub style_preference: String,
    #[serde(default)]
    pub variant_count: Option<u32>,
}

fn default_style() -> String {
    DEFAULT_STYLE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantPayload {
    pub variant_id: u32,
    pub success: bool,
    pub svg_content_base64: Option<String>,
    pub file_size: Option<usize>,
    pub message: String,
    pub svg_file_path: Option<String>,
}

impl From<&VariantResult> for VariantPayload {
    fn from(result: &VariantResult) -> Self {
        Self {
            variant_id: result.variant_id(),
            success: result.is_success(),
            svg_content_base64: result.payload().map(|svg| BASE64.encode(svg)),
            file_size: result.payload().map(str::len),
            message: result.message().to_string(),
            svg_file_path: result.file_path().map(|p| p.display().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
    pub variants: Vec<VariantPayload>,
    /// Seconds
    pub generation_time: f64,
    pub output_directory: String,
}

impl GenerateResponse {
    /// All-failed batches still report `success: true`; the summary says 0/N
    pub fn from_batch(batch: &BatchResult) -> Self {
        Self {
            success: true,
            message: batch.summary_message(),
            variants: batch.results().iter().map(VariantPayload::from).collect(),
            generation_time: batch.elapsed().as_secs_f64(),
            output_directory: batch.output_directory().display().to_string(),
        }
    }

    /// The batch itself could not run
    pub fn batch_fault(message: impl Into<String>, generation_time: f64) -> Self {
        Self {
            success: false,
            message: message.into(),
            variants: Vec::new(),
            generation_time,
            output_directory: String::new(),
        }
    }
}

/// GET /health
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

/// GET /
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub description: String,
    pub endpoints: serde_json::Value,
}

impl ServiceInfo {
    pub fn new(max_variants: u32) -> Self {
        Self {
            service: SERVICE_NAME,
            version: infographic_core::VERSION,
            description: format!(
                "Generate up to {} infographic variants per prompt, each rendered in its own sandbox",
                max_variants
            ),
            endpoints: serde_json::json!({
                "POST /generate-infographics": "Generate infographic variants from a prompt",
                "GET /health": "Health check",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req: GenerateRequest = serde_json::from_str(r#"{"prompt":"Water cycle"}"#).unwrap();
        assert_eq!(req.style_preference, DEFAULT_STYLE);
        assert_eq!(req.variant_count, None);
    }

    #[test]
    fn failed_variant_has_null_content() {
        let result = VariantResult::failure(
            2,
            infographic_core::domain::VariantStatus::RenderTimeout,
            "Extraction timeout (120s)",
            std::time::Duration::from_secs(120),
        );
        let payload = VariantPayload::from(&result);
        assert!(!payload.success);
        assert_eq!(payload.svg_content_base64, None);
        assert_eq!(payload.file_size, None);

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["svg_content_base64"].is_null());
        assert!(json["svg_file_path"].is_null());
    }

    #[test]
    fn successful_variant_is_base64_encoded() {
        let result = VariantResult::success(1, "<svg/>".to_string(), std::time::Duration::from_secs(1))
            .with_file_path("generated/batch_x/variant_1/infographic.svg");
        let payload = VariantPayload::from(&result);

        assert_eq!(payload.svg_content_base64.as_deref(), Some("PHN2Zy8+"));
        assert_eq!(payload.file_size, Some(6));
        assert_eq!(
            payload.svg_file_path.as_deref(),
            Some("generated/batch_x/variant_1/infographic.svg")
        );
    }
}
