//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::config::ReplyMode;
use crate::provider::ModelProvider;
use crate::state::GatewayState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// Always `healthy` while the process answers.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Whether an API key is set. Chat requests fail with 500 until it is.
    pub upstream_configured: bool,
    /// How chat replies are delivered.
    pub reply_mode: ReplyMode,
}

/// `GET /health`. Never calls the upstream model.
pub async fn health<P>(State(state): State<Arc<GatewayState<P>>>) -> Json<HealthReport>
where
    P: ModelProvider + 'static,
{
    Json(HealthReport {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        upstream_configured: state.provider.is_configured(),
        reply_mode: state.config.reply_mode,
    })
}
