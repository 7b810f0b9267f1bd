// Gemini content synthesizer
// Two calls per variant: an elements list, then the HTML+D3 document

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use infographic_core::application::worker::constants::DEFAULT_COMPLETION_MARKER;
use infographic_core::application::{RetryDecision, RetryPolicy};
use infographic_core::domain::VariantJob;
use infographic_core::port::{ContentSynthesizer, SynthesisError};

use crate::client::{GenerateClient, GenerateRequest, ReqwestGeminiClient, DEFAULT_BASE_URL};
use crate::prompts::{code_prompt, elements_prompt, parse_elements, strip_fences, FALLBACK_ELEMENTS};

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Whole-synthesis budget per variant, retries included (90 seconds)
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Completion signal the generated document must emit
    pub marker: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            retry: RetryPolicy::default(),
            marker: DEFAULT_COMPLETION_MARKER.to_string(),
        }
    }
}

pub struct GeminiSynthesizer {
    /// None when no API key is configured
    client: Option<Arc<dyn GenerateClient>>,
    timeout: Duration,
    retry: RetryPolicy,
    marker: String,
}

impl GeminiSynthesizer {
    pub fn new(config: GeminiConfig) -> Self {
        let client = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| {
                Arc::new(ReqwestGeminiClient::new(
                    &config.base_url,
                    &config.model,
                    key,
                    config.timeout,
                )) as Arc<dyn GenerateClient>
            });

        if client.is_none() {
            warn!("No API key configured; every synthesis will fail");
        }

        Self {
            client,
            timeout: config.timeout,
            retry: config.retry,
            marker: config.marker,
        }
    }

    /// Use a custom client (tests, alternative transports)
    pub fn with_client(client: Arc<dyn GenerateClient>, config: GeminiConfig) -> Self {
        Self {
            client: Some(client),
            timeout: config.timeout,
            retry: config.retry,
            marker: config.marker,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    async fn generate_with_retry(
        &self,
        client: &dyn GenerateClient,
        request: &GenerateRequest,
        jitter_seed: u64,
    ) -> Result<String, SynthesisError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match client.generate(request).await {
                Ok(text) => return Ok(text),
                Err(e) => match self.retry.should_retry(&e, attempts, jitter_seed) {
                    RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
                    RetryDecision::GiveUp => return Err(e),
                },
            }
        }
    }

    async fn two_step(
        &self,
        client: &dyn GenerateClient,
        job: &VariantJob,
    ) -> Result<String, SynthesisError> {
        // Gemini seeds are int32
        let seed = (job.seed() >> 33) as i32;

        let (system_instruction, user_prompt) = elements_prompt(job);
        let elements_request = GenerateRequest {
            system_instruction,
            user_prompt,
            seed,
        };
        let elements = match self
            .generate_with_retry(client, &elements_request, job.seed())
            .await
        {
            Ok(text) => parse_elements(&text),
            Err(SynthesisError::MalformedResponse(reason)) => {
                debug!(variant_id = job.variant_id(), reason = %reason, "Elements step empty, using fallback");
                FALLBACK_ELEMENTS.to_string()
            }
            Err(e) => return Err(e),
        };

        let (system_instruction, user_prompt) = code_prompt(job, &elements, &self.marker);
        let code_request = GenerateRequest {
            system_instruction,
            user_prompt,
            seed,
        };
        let code = self
            .generate_with_retry(client, &code_request, job.seed().rotate_left(17))
            .await?;

        Ok(strip_fences(&code).to_string())
    }
}

#[async_trait]
impl ContentSynthesizer for GeminiSynthesizer {
    async fn synthesize(&self, job: &VariantJob) -> Result<String, SynthesisError> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| SynthesisError::NotConfigured("API_KEY is not set".to_string()))?;

        match tokio::time::timeout(self.timeout, self.two_step(client, job)).await {
            Ok(Ok(document)) => {
                info!(
                    variant_id = job.variant_id(),
                    document_bytes = document.len(),
                    "Document synthesized"
                );
                Ok(document)
            }
            Ok(Err(e)) => {
                warn!(variant_id = job.variant_id(), error = %e, "Synthesis failed");
                Err(e)
            }
            Err(_) => {
                warn!(variant_id = job.variant_id(), timeout_secs = self.timeout.as_secs(), "Synthesis timed out");
                Err(SynthesisError::Unreachable(format!(
                    "content generator did not answer within {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}
