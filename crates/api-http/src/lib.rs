//! HTTP API Layer
//!
//! Exposes batch generation over HTTP (axum).

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use handler::ApiState;
pub use rate_limiter::RateLimiter;
pub use server::{router, ApiServer, ApiServerConfig};
