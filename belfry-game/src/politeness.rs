//! Politeness classification over HTTP.
//!
//! ```text
//! POST {base}/classify   {"text": "..."}
//! ←                      {"label": "polite", "confidence": 0.91}
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use belfry_core::PolitenessClassifier;
use belfry_core::types::{PolitenessLabel, PolitenessResult};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{GameError, Result};

/// Attempts before falling back to a neutral result.
pub const CLASSIFY_ATTEMPTS: u32 = 2;

/// Classifier backed by a remote `/classify` service.
#[derive(Debug, Clone)]
pub struct HttpPolitenessClassifier {
    http: reqwest::Client,
    endpoint: String,
    retry_delay: Duration,
}

impl HttpPolitenessClassifier {
    /// Create a classifier for the service at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_ms: u64, retry_delay_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/classify", base_url.trim_end_matches('/')),
            retry_delay: Duration::from_millis(retry_delay_ms),
        })
    }

    /// Full URL requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, text: &str) -> Result<PolitenessResult> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        parse_classification(&body)
    }
}

/// Read `label` and `confidence` from a classifier response.
///
/// A missing or non-string label counts as neutral, a missing or
/// non-numeric confidence as 0.5.
///
/// # Errors
/// Returns `GameError::Classifier` if the body is not a JSON object.
pub fn parse_classification(body: &Value) -> Result<PolitenessResult> {
    if !body.is_object() {
        return Err(GameError::Classifier(format!("expected an object, got {body}")));
    }
    let label = body
        .get("label")
        .and_then(Value::as_str)
        .map_or(PolitenessLabel::Neutral, PolitenessLabel::from_label);
    #[allow(clippy::cast_possible_truncation)]
    let confidence = body
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5) as f32;
    Ok(PolitenessResult::new(label, confidence))
}

#[async_trait]
impl PolitenessClassifier for HttpPolitenessClassifier {
    async fn classify(&self, text: &str) -> PolitenessResult {
        let started = Instant::now();
        for attempt in 1..=CLASSIFY_ATTEMPTS {
            match self.request(text).await {
                Ok(result) => {
                    debug!(
                        label = %result.label,
                        confidence = result.confidence,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Politeness classified"
                    );
                    return result;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Politeness service failed");
                    if attempt < CLASSIFY_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        warn!("Politeness service unavailable, using neutral fallback");
        PolitenessResult::fallback()
    }
}
