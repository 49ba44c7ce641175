//! Resilient gateway to the external reasoning service.
//!
//! The gateway is deliberately dumb about recovery: it makes exactly one
//! authenticated, timeout-bounded HTTP call and reports every failure as an
//! error value. It never retries — the service bills per call, and a retry
//! here would double-bill and duplicate side effects. Retry policy, if any,
//! belongs to callers (none of ours retry; they fall back).
//!
//! ## Security
//!
//! Session tokens arrive as [`SecretString`] and are exposed only at the
//! point of use, on the Authorization header. They never appear in Debug
//! output or error messages.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

use crate::budget::CallBudget;
use crate::config::GatewayConfig;

/// Errors from the model gateway.
///
/// Every variant is absorbed by callers into a documented fallback; none of
/// these ever reach a user.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No session token was supplied. Checked before anything else; the
    /// gateway makes no network call in this case.
    #[error("no session token; gateway disabled")]
    AuthenticationRequired,

    /// The call budget is spent. Also checked before any network I/O.
    #[error("call budget exhausted")]
    BudgetExhausted,

    /// Connection-level failure.
    #[error("HTTP request failed: {0}")]
    Network(String),

    /// Wall-clock timeout. Handled identically to an HTTP error.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 429 from the proxy.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-2xx status; body text captured for the audit trail.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// 2xx response whose first choice had no non-empty text content, or a
    /// body that was not the expected shape at all.
    #[error("response contained no usable content")]
    EmptyResponse,
}

/// One request to the reasoning service.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A successful gateway reply.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    /// Text content of the first choice. Guaranteed non-empty.
    pub content: String,

    /// The full response body, kept for auditing.
    pub raw: JsonValue,
}

/// Gateway abstraction so the orchestrator and comparison engine are
/// testable against mocks.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Execute one call. No retries, ever.
    async fn call(
        &self,
        request: &ModelRequest,
        token: Option<&SecretString>,
    ) -> Result<GatewayReply, GatewayError>;

    /// Gateway name for logging.
    fn name(&self) -> &str;
}

/// Proxy wire format: `{model, messages, temperature, max_tokens}`.
#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    model: &'a str,
    messages: Vec<ProxyMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ProxyMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// HTTP implementation of [`ModelGateway`].
pub struct HttpModelGateway {
    config: GatewayConfig,
    client: reqwest::Client,
    budget: CallBudget,
}

impl std::fmt::Debug for HttpModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelGateway")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl HttpModelGateway {
    /// Create a gateway from an explicit config. No ambient state is read.
    pub fn new(config: GatewayConfig) -> Self {
        let budget = CallBudget::new(config.max_calls);
        Self {
            config,
            // Timeouts are per-request (from config), not on the client.
            client: reqwest::Client::new(),
            budget,
        }
    }

    /// Calls remaining in the rate-limit budget.
    pub fn remaining_budget(&self) -> u32 {
        self.budget.remaining()
    }
}

#[async_trait]
impl ModelGateway for HttpModelGateway {
    async fn call(
        &self,
        request: &ModelRequest,
        token: Option<&SecretString>,
    ) -> Result<GatewayReply, GatewayError> {
        // Hard precondition, not a race: without a token the feature is
        // disabled and we never touch the network.
        let Some(token) = token else {
            return Err(GatewayError::AuthenticationRequired);
        };

        if !self.budget.try_acquire() {
            tracing::warn!(gateway = self.name(), "call budget exhausted");
            return Err(GatewayError::BudgetExhausted);
        }

        let body = ProxyRequest {
            model: &self.config.model,
            messages: vec![
                ProxyMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ProxyMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        // SECURITY: the token is exposed only here, onto the header.
        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(token.expose_secret())
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.config.timeout)
                } else {
                    GatewayError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(GatewayError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: JsonValue = response
            .json()
            .await
            .map_err(|_| GatewayError::EmptyResponse)?;

        let content = raw["choices"][0]["message"]["content"]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .ok_or(GatewayError::EmptyResponse)?
            .to_string();

        Ok(GatewayReply { content, raw })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Scripted gateway double shared by the engine tests in this crate.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a queue of canned replies, one per call, and counts calls.
    /// An empty queue answers `EmptyResponse`.
    pub(crate) struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<GatewayReply, GatewayError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedGateway {
        pub(crate) fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn push_ok(&self, content: &str) {
            self.replies.lock().push_back(Ok(GatewayReply {
                content: content.to_string(),
                raw: JsonValue::Null,
            }));
        }

        pub(crate) fn push_err(&self, error: GatewayError) {
            self.replies.lock().push_back(Err(error));
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn call(
            &self,
            _request: &ModelRequest,
            token: Option<&SecretString>,
        ) -> Result<GatewayReply, GatewayError> {
            if token.is_none() {
                return Err(GatewayError::AuthenticationRequired);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .pop_front()
                .unwrap_or(Err(GatewayError::EmptyResponse))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
