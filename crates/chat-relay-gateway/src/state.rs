//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::provider::ModelProvider;

/// Shared application state for the gateway.
pub struct GatewayState<P>
where
    P: ModelProvider,
{
    /// The upstream model provider.
    pub provider: Arc<P>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<P> GatewayState<P>
where
    P: ModelProvider,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(provider: Arc<P>, config: GatewayConfig) -> Self {
        Self { provider, config }
    }
}

impl<P> Clone for GatewayState<P>
where
    P: ModelProvider,
{
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
        }
    }
}
