//! Runtime configuration.
//!
//! Everything is an explicit struct injected at construction. Nothing in
//! this crate reads environment variables or other ambient global state;
//! binaries decide where configuration comes from.

use std::time::Duration;

/// Configuration for the model gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Full URL of the reasoning-service proxy endpoint. Requests are
    /// POSTed to this URL as-is; no path is appended.
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Wall-clock bound for one call. A timeout is reported exactly like
    /// an HTTP failure.
    pub timeout: Duration,

    /// Rate-limit budget: maximum calls this gateway instance will make.
    /// Exhaustion fails closed before any network I/O.
    pub max_calls: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(15),
            max_calls: 100,
        }
    }
}

impl GatewayConfig {
    /// Create a config pointing at the given proxy endpoint.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Per-call generation parameters for one engine (verification or
/// comparison).
#[derive(Debug, Clone, Copy)]
pub struct CallParams {
    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Temperature; low by default, extraction should be boring.
    pub temperature: f32,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.2,
        }
    }
}
