//! Roleplay providers: the remote chat-completions client and the offline stub.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::prompt::{ROLEPLAY_SYSTEM, build_messages};
use crate::repair::{extract_assistant_text, normalize_reply};
use crate::types::{ChatTurn, RoleplayPayload, RoleplayReply};

/// Produces one structured reply per roleplay payload.
#[async_trait]
pub trait RoleplayProvider: Send + Sync {
    /// Request a reply for `payload`, with `history` as prior conversation.
    ///
    /// # Errors
    /// Returns `LlmError::Permanent` (or another non-transient error) when
    /// the backend cannot serve the request at all. Transient trouble is
    /// absorbed into an apology reply.
    async fn roleplay(
        &self,
        payload: &RoleplayPayload,
        history: &[ChatTurn],
    ) -> Result<RoleplayReply, LlmError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// HTTP statuses (and provider error codes) worth retrying.
pub const TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504, 524];

const BUSY_SIGNALS: &[&str] = &["rate-limited upstream", "temporarily rate-limited"];
const GONE_SIGNALS: &[&str] = &["no endpoints found"];

/// Retry decision for a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry with backoff.
    Transient,
    /// Abort and report.
    Permanent,
}

/// Classify a non-success status together with its body or message.
#[must_use]
pub fn classify_failure(status: u16, body: &str) -> FailureKind {
    let lowered = body.to_lowercase();
    if status == 404 || GONE_SIGNALS.iter().any(|s| lowered.contains(s)) {
        return FailureKind::Permanent;
    }
    if TRANSIENT_STATUSES.contains(&status) || BUSY_SIGNALS.iter().any(|s| lowered.contains(s)) {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response body text.
    pub body: String,
}

impl RawResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Posts one chat-completions body and returns whatever came back.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `body`.
    ///
    /// # Errors
    /// Returns an error when no response was received at all.
    async fn post(&self, body: &Value) -> Result<RawResponse, LlmError>;
}

/// reqwest-backed transport for OpenRouter-style endpoints.
pub struct HttpTransport {
    http: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Referer header sent with every request.
    pub const REFERER: &'static str = "http://localhost";
    /// Application title header sent with every request.
    pub const TITLE: &'static str = "Belfry";

    /// Create a transport with a per-attempt timeout.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post(&self, body: &Value) -> Result<RawResponse, LlmError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", Self::REFERER)
            .header("X-Title", Self::TITLE)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| match LlmError::from(e) {
                LlmError::Timeout(_) => LlmError::Timeout(
                    u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                ),
                other => other,
            })?;

        let status = resp.status();
        let body = resp.text().await?;
        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// OpenRouter client
// ---------------------------------------------------------------------------

/// Tunables for a remote roleplay client.
#[derive(Debug, Clone)]
pub struct RoleplayOptions {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff unit; the delay before retry `n` is `unit × n`.
    pub backoff_ms: u64,
    /// Trailing history messages sent with each request.
    pub history_max_messages: usize,
    /// System instruction.
    pub system_prompt: String,
}

impl Default for RoleplayOptions {
    fn default() -> Self {
        Self {
            model: "deepseek/deepseek-r1-0528:free".to_string(),
            temperature: 0.6,
            max_tokens: 256,
            max_retries: 2,
            backoff_ms: 500,
            history_max_messages: 6,
            system_prompt: ROLEPLAY_SYSTEM.to_string(),
        }
    }
}

/// Remote chat-completions client with retry, backoff and reply repair.
pub struct OpenRouterClient {
    transport: Arc<dyn ChatTransport>,
    options: RoleplayOptions,
    cancel: CancellationToken,
}

impl OpenRouterClient {
    /// Create a client over any transport.
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>, options: RoleplayOptions) -> Self {
        Self {
            transport,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a client that talks HTTP to `endpoint`.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` if the API key is blank.
    pub fn http(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout_ms: u64,
        options: RoleplayOptions,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::ConfigError("API key is empty".into()));
        }
        let transport = HttpTransport::new(endpoint, api_key, timeout_ms);
        Ok(Self::new(Arc::new(transport), options))
    }

    /// Observe `token`: once cancelled, pending backoffs end and no new
    /// attempt starts.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> &RoleplayOptions {
        &self.options
    }

    /// Chat-completions request body.
    #[must_use]
    pub fn request_body(&self, messages: &[ChatTurn]) -> Value {
        json!({
            "model": self.options.model,
            "temperature": self.options.temperature,
            "response_format": { "type": "json_object" },
            "max_tokens": self.options.max_tokens,
            "messages": messages,
        })
    }

    /// Run one attempt, mapping every failure to an error.
    async fn attempt(&self, body: &Value) -> Result<RoleplayReply, LlmError> {
        let resp = self.transport.post(body).await?;
        if resp.is_success() {
            let text = extract_assistant_text(&resp.body)?;
            return Ok(RoleplayReply::from_value(normalize_reply(&text)));
        }

        let summary = format!("{} {}. Body: {}", resp.status, resp.reason, resp.body);
        Err(match classify_failure(resp.status, &resp.body) {
            FailureKind::Transient => LlmError::Unavailable(summary),
            FailureKind::Permanent => LlmError::Permanent {
                status: resp.status,
                message: summary,
            },
        })
    }

    async fn backoff(&self, attempt: u32) -> Result<(), LlmError> {
        let delay = Duration::from_millis(self.options.backoff_ms.saturating_mul(u64::from(attempt)));
        tokio::select! {
            () = self.cancel.cancelled() => Err(LlmError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl RoleplayProvider for OpenRouterClient {
    async fn roleplay(
        &self,
        payload: &RoleplayPayload,
        history: &[ChatTurn],
    ) -> Result<RoleplayReply, LlmError> {
        let messages = build_messages(
            &self.options.system_prompt,
            history,
            self.options.history_max_messages,
            payload,
        )?;
        let body = self.request_body(&messages);
        let attempts = self.options.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            let start = Instant::now();
            match self.attempt(&body).await {
                Ok(reply) => {
                    debug!(
                        attempt,
                        elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        reply = %reply.as_value(),
                        "Roleplay reply received"
                    );
                    return Ok(reply);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = self.options.backoff_ms.saturating_mul(u64::from(attempt)),
                        error = %e,
                        "Transient roleplay failure, retrying"
                    );
                    self.backoff(attempt).await?;
                }
                Err(e) if e.is_transient() => {
                    warn!(attempts, error = %e, "Roleplay retries exhausted");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Permanent roleplay failure");
                    return Err(e);
                }
            }
        }

        info!(model = %self.options.model, "Returning apology reply");
        Ok(RoleplayReply::apology())
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

// ---------------------------------------------------------------------------
// Offline stub
// ---------------------------------------------------------------------------

/// Answers every request with a fixed stub, without any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

#[async_trait]
impl RoleplayProvider for OfflineProvider {
    async fn roleplay(
        &self,
        _payload: &RoleplayPayload,
        _history: &[ChatTurn],
    ) -> Result<RoleplayReply, LlmError> {
        Ok(RoleplayReply::offline())
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}
