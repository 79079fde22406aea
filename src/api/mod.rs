//! # HTTP Gateway
//!
//! OpenAI- and Anthropic-shaped endpoints fronting both providers with a
//! cost estimate, budget admission, and a durable usage ledger.
//!
//! ## Endpoints
//!
//! - `POST /v1/chat/completions` - OpenAI-shaped chat completion
//! - `POST /v1/messages` - Anthropic-shaped messages call
//! - `GET /v1/usage` - aggregate usage summary for a project
//! - `GET /v1/usage/history` - recent usage records for a project
//! - `POST /v1/budget` - create or replace a project's budget
//! - `GET /v1/budget` - read a project's budget
//! - `POST /v1/budget/reset` - zero a project's spend, keep history
//! - `DELETE /v1/budget` - remove a project's budget (ungates it)
//! - `GET /health` - liveness
//! - `GET /metrics` - Prometheus scrape endpoint
//!
//! ## Request flow
//!
//! 1. A request id is generated and the caller's project id resolved.
//! 2. The body is parsed into the provider's native wire type.
//! 3. Input tokens are counted and an output estimate produced.
//! 4. The budget controller admits or rejects the request.
//! 5. On admission, credentials are resolved and the request forwarded
//!    unchanged; actual usage is extracted from the response and charged
//!    to the ledger.

pub mod budget;
pub mod completions;
pub mod error;
pub mod headers;
pub mod health;
pub mod messages;
pub mod messages_handler;
pub mod types;
pub mod usage;

pub use error::GatewayError;

use crate::adapter::{anthropic::AnthropicAdapter, openai::OpenAiAdapter};
use crate::budget::BudgetController;
use crate::config::GatewayConfig;
use crate::ledger::LedgerStore;
use crate::pricing::PricingCatalog;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum request body size (10 MB) — generous enough for large prompts
/// without letting an unbounded body tie up a worker.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Shared application state accessible to every handler.
pub struct AppState {
    pub pricing: Arc<PricingCatalog>,
    pub ledger: Arc<LedgerStore>,
    pub budget: BudgetController,
    pub openai_adapter: OpenAiAdapter,
    pub anthropic_adapter: AnthropicAdapter,
    pub config: Arc<GatewayConfig>,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>, ledger: Arc<LedgerStore>) -> Self {
        let http_client = Arc::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(
                    config.server.request_timeout_seconds,
                ))
                .pool_max_idle_per_host(10)
                .build()
                .expect("failed to build upstream HTTP client"),
        );

        let prometheus_handle = crate::metrics::setup_metrics().unwrap_or_else(|e| {
            tracing::debug!("metrics already initialized, building a detached handle: {e}");
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle()
        });

        Self {
            pricing: Arc::new(PricingCatalog::new()),
            budget: BudgetController::new(Arc::clone(&ledger)),
            ledger,
            openai_adapter: OpenAiAdapter::new(
                Arc::clone(&http_client),
                crate::adapter::openai::DEFAULT_BASE_URL,
            ),
            anthropic_adapter: AnthropicAdapter::new(
                Arc::clone(&http_client),
                crate::adapter::anthropic::DEFAULT_BASE_URL,
            ),
            config,
            prometheus_handle,
            start_time: Instant::now(),
        }
    }

    /// Resolve the project id governing a request: `X-Tokencap-Project-Id`
    /// header, then `project_id` query parameter, then the configured
    /// default. Never fails — every request belongs to some project.
    pub fn resolve_project_id(&self, header: Option<&str>, query: Option<&str>) -> String {
        header
            .map(str::to_string)
            .or_else(|| query.map(str::to_string))
            .unwrap_or_else(|| self.config.default_project_id.clone())
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(completions::handle))
        .route("/v1/messages", post(messages_handler::handle))
        .route("/v1/usage", get(usage::get_summary))
        .route("/v1/usage/history", get(usage::get_history))
        .route(
            "/v1/budget",
            post(budget::set).get(budget::get).delete(budget::delete),
        )
        .route("/v1/budget/reset", post(budget::reset))
        .route("/health", get(health::handle))
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .with_state(state)
}
