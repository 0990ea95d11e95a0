//! # BingMux - Bing Chat to OpenAI Bridge Library
//!
//! This crate bridges the Bing Chat duplex streaming protocol to an
//! OpenAI-compatible chat completions API. While primarily designed as a
//! binary application, this library exposes the bridge core for programmatic
//! use.
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use bingmux::{Config, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Create the application
//!     let app = create_app(config).await?;
//!
//!     // Start server
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`session`] - Anonymous upstream session (cookie) lifecycle
//! - [`conversation`] - Conversation handshake and per-conversation context
//! - [`protocol`] - Frame codec, duplex transport and the per-turn state machine
//! - [`translator`] - Protocol events to caller-facing output units
//! - [`classifier`] - Upstream failure taxonomy
//! - [`bridge`] - Wires the above into one turn
//! - [`converter`] - OpenAI request/response conversion
//! - [`server`] - HTTP route handlers
//! - [`config`] - Layered configuration
//! - [`error`] - Error types and handling

pub mod bridge;
pub mod classifier;
pub mod config;
pub mod conversation;
pub mod converter;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod translator;

// Re-export commonly used types
pub use bridge::{ChatBridge, TurnReport};
pub use classifier::{ErrorClassifier, ErrorKind};
pub use config::Config;
pub use error::ProxyError;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Creates a new BingMux application with the given configuration.
///
/// # Arguments
///
/// * `config` - Application configuration
///
/// # Returns
///
/// Returns an Axum Router that can be served directly. No upstream call is
/// made until the first chat request.
///
/// # Errors
///
/// Returns a `ProxyError` if the classifier overrides are invalid or the HTTP
/// client cannot be built.
pub async fn create_app(config: Config) -> Result<Router, ProxyError> {
    let app_state = Arc::new(server::AppState::new(config)?);
    Ok(create_router(app_state))
}

/// Builds the router around existing application state.
///
/// `POST` on `/` and `/v1/chat/completions` runs a chat completion, `GET /` is a
/// liveness check, and every route answers `OPTIONS`. Other methods get 405.
pub fn create_router(app_state: Arc<server::AppState>) -> Router {
    Router::new()
        .route(
            "/",
            get(server::liveness).post(server::chat_completions).options(server::preflight),
        )
        .route(
            "/v1/chat/completions",
            axum::routing::post(server::chat_completions).options(server::preflight),
        )
        .route("/v1/models", get(server::models).options(server::preflight))
        .route("/health", get(server::health).options(server::preflight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
