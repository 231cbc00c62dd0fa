//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP gateway and its
//! upstream model client. Both can be deserialized or read from the process
//! environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay;

/// How `POST /api/chat` delivers the assistant reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Server-sent events, one frame per text delta.
    #[default]
    Stream,
    /// A single `{content}` JSON body.
    Json,
}

impl FromStr for ReplyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "sse" => Ok(Self::Stream),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown reply mode: {other}")),
        }
    }
}

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Time allowed until response headers are sent, in seconds. Raised to
    /// cover every upstream attempt when shorter, see
    /// [`GatewayConfig::request_timeout`].
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Reply delivery mode.
    #[serde(default)]
    pub reply_mode: ReplyMode,

    /// Upstream model settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    /// Build a configuration from environment variables.
    ///
    /// Recognised variables: `LISTEN_ADDR`, `CORS_ORIGINS` (comma separated),
    /// `MAX_BODY_BYTES`, `REQUEST_TIMEOUT_SECONDS`, `REPLY_MODE` plus those
    /// read by [`UpstreamConfig::from_env`]. Unset or unparsable values keep
    /// their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(limit) = parse_var(&lookup, "MAX_BODY_BYTES") {
            config.max_body_bytes = limit;
        }
        if let Some(timeout) = parse_var(&lookup, "REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = timeout;
        }
        if let Some(mode) = parse_var(&lookup, "REPLY_MODE") {
            config.reply_mode = mode;
        }
        config.upstream = UpstreamConfig::from_lookup(&lookup);
        config
    }

    /// Get the request timeout as a `Duration`.
    ///
    /// Never shorter than the upstream timeout times the number of upstream
    /// attempts, so a slow reply ends in an `ApiError` body instead of a bare
    /// 408 from the router.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        let configured = Duration::from_secs(self.request_timeout_seconds);
        configured.max(self.upstream.timeout() * relay::MAX_ATTEMPTS)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            reply_mode: ReplyMode::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

/// Settings for the Gemini API client.
#[derive(Clone, Deserialize)]
pub struct UpstreamConfig {
    /// API root, without a trailing slash.
    #[serde(default = "UpstreamConfig::default_base_url")]
    pub base_url: String,

    /// Model name, e.g. `gemini-2.5-flash`.
    #[serde(default = "UpstreamConfig::default_model")]
    pub model: String,

    /// API key. Requests fail with a configuration error while unset.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upstream timeout in seconds. Bounds a whole reply in JSON mode and
    /// the silence between chunks in stream mode.
    #[serde(default = "UpstreamConfig::default_timeout")]
    pub timeout_seconds: u64,
}

impl UpstreamConfig {
    fn default_base_url() -> String {
        "https://generativelanguage.googleapis.com".to_string()
    }

    fn default_model() -> String {
        "gemini-2.5-flash".to_string()
    }

    const fn default_timeout() -> u64 {
        120
    }

    /// Build upstream settings from `GEMINI_BASE_URL`, `GEMINI_MODEL`,
    /// `GOOGLE_GEMINI_API_KEY` and `UPSTREAM_TIMEOUT_SECONDS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("GEMINI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            config.model = model;
        }
        config.api_key = lookup("GOOGLE_GEMINI_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(timeout) = parse_var(&lookup, "UPSTREAM_TIMEOUT_SECONDS") {
            config.timeout_seconds = timeout;
        }
        config
    }

    /// Get the upstream timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            api_key: None,
            timeout_seconds: Self::default_timeout(),
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}
