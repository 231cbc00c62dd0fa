//! Chat relay gateway.
//!
//! Configuration comes from the environment; see [`GatewayConfig::from_env`].
//! The gateway starts without `GOOGLE_GEMINI_API_KEY` but then answers every
//! chat request with a configuration error.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay_gateway::{create_router, GatewayConfig, GatewayState, GeminiProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chat relay gateway");

    let config = GatewayConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        reply_mode = ?config.reply_mode,
        cors_origins = ?config.cors_origins,
        model = %config.upstream.model,
        upstream = %config.upstream.base_url,
        api_key_configured = config.upstream.api_key.is_some(),
        "Gateway configuration loaded"
    );

    if config.upstream.api_key.is_none() {
        tracing::warn!("GOOGLE_GEMINI_API_KEY is not set - chat requests will fail");
    }

    let provider = Arc::new(GeminiProvider::new(config.upstream.clone())?);
    let listen_addr = config.listen_addr.clone();

    let app = create_router(GatewayState::new(provider, config));

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
