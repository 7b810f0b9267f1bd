//! HTTP Server
//!
//! Routes, request logging and the serve loop with graceful shutdown.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{info, warn};

use crate::handler::{self, ApiState};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Build the application router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handler::root))
        .route("/health", get(handler::health))
        .route("/generate-infographics", post(handler::generate))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
}

async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status.is_client_error() || status.is_server_error() {
        warn!(%method, path = %path, status = status.as_u16(), elapsed_ms, "Request failed");
    } else {
        info!(%method, path = %path, status = status.as_u16(), elapsed_ms, "Request served");
    }
    response
}

/// HTTP Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: ApiState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: ApiState) -> Self {
        Self { config, state }
    }

    /// Bind and serve until `shutdown` resolves
    ///
    /// In-flight requests are allowed to finish after `shutdown` fires.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local: SocketAddr = listener.local_addr()?;

        info!(address = %local, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimiter;
    use crate::types::GenerateResponse;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use infographic_core::application::{Orchestrator, OrchestratorConfig};
    use infographic_core::port::artifact_store::mocks::MockArtifactStore;
    use infographic_core::port::content_synthesizer::mocks::{MockBehavior, MockSynthesizer};
    use infographic_core::port::id_provider::mocks::SequentialIdProvider;
    use infographic_core::port::render_sandbox::mocks::{MockRender, MockSandbox};
    use infographic_core::port::time_provider::mocks::FixedTimeProvider;
    use infographic_core::port::{ArtifactStore, SynthesisError};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(
        synthesizer: MockSynthesizer,
        sandbox: MockSandbox,
        artifacts: Arc<dyn ArtifactStore>,
        limiter: RateLimiter,
    ) -> Router {
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(synthesizer),
            Arc::new(sandbox),
            artifacts,
            Arc::new(SequentialIdProvider::default()),
            Arc::new(FixedTimeProvider(1_700_000_000_000)),
        )
        .unwrap();
        router(ApiState::new(Arc::new(orchestrator), limiter))
    }

    fn app() -> Router {
        app_with(
            MockSynthesizer::new_success(),
            MockSandbox::new_success(),
            Arc::new(MockArtifactStore::new()),
            RateLimiter::new(100, 100),
        )
    }

    fn generate(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate-infographics")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_service() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"status": "healthy", "service": "infographic-engine"})
        );
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json_body(response).await;
        assert!(body["endpoints"]["POST /generate-infographics"].is_string());
    }

    #[tokio::test]
    async fn generates_default_three_variants() {
        let response = app()
            .oneshot(generate(r#"{"prompt":"Solar vs wind"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: GenerateResponse = serde_json::from_value(json_body(response).await).unwrap();
        assert!(body.success);
        assert_eq!(body.message, "Successfully generated 3/3 infographic variants");
        assert_eq!(
            body.variants.iter().map(|v| v.variant_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(body.variants.iter().all(|v| v.svg_content_base64.is_some()));
        assert!(body.output_directory.ends_with("batch_1700000000_00000001_solar_vs_wind"));
    }

    #[tokio::test]
    async fn mixed_batch_reports_each_variant() {
        let synthesizer = MockSynthesizer::new_success().with_variant(
            2,
            MockBehavior::Fail(SynthesisError::Unreachable("connection refused".into())),
        );
        let sandbox = MockSandbox::new_success().on_document_containing(
            "variant-3",
            MockRender::Crash {
                exit_code: 1,
                diagnostics: "segfault".into(),
            },
        );
        let app = app_with(
            synthesizer,
            sandbox,
            Arc::new(MockArtifactStore::new()),
            RateLimiter::new(10, 1),
        );

        let response = app
            .oneshot(generate(r#"{"prompt":"Water cycle","variant_count":3}"#))
            .await
            .unwrap();
        let body: GenerateResponse = serde_json::from_value(json_body(response).await).unwrap();

        assert!(body.success);
        assert_eq!(body.message, "Successfully generated 1/3 infographic variants");
        assert!(body.variants[0].success);
        assert!(!body.variants[1].success);
        assert!(body.variants[1].message.starts_with("Content synthesis failed"));
        assert!(body.variants[2].svg_content_base64.is_none());
        assert!(body.variants[2].file_size.is_none());
    }

    #[tokio::test]
    async fn rejects_out_of_range_count() {
        let response = app()
            .oneshot(generate(r#"{"prompt":"x","variant_count":9}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body.get("variants").is_none());
    }

    #[tokio::test]
    async fn rejects_blank_prompt_and_bad_json() {
        let response = app().oneshot(generate(r#"{"prompt":"   "}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app().oneshot(generate("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rate_limit_returns_429() {
        let app = app_with(
            MockSynthesizer::new_success(),
            MockSandbox::new_success(),
            Arc::new(MockArtifactStore::new()),
            RateLimiter::new(1, 0),
        );

        let first = app
            .clone()
            .oneshot(generate(r#"{"prompt":"a","variant_count":1}"#))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(generate(r#"{"prompt":"a","variant_count":1}"#))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn unusable_output_directory_is_a_batch_fault() {
        let app = app_with(
            MockSynthesizer::new_success(),
            MockSandbox::new_success(),
            Arc::new(MockArtifactStore::failing_create()),
            RateLimiter::new(10, 1),
        );

        let response = app.oneshot(generate(r#"{"prompt":"a"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: GenerateResponse = serde_json::from_value(json_body(response).await).unwrap();
        assert!(!body.success);
        assert!(body.variants.is_empty());
        assert!(body.message.starts_with("Batch failed"));
    }
}
