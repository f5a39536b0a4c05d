//! Politeness classification capability.
//!
//! The turn loop only needs a label and a confidence. Implementations must
//! never fail: when a backing service is unavailable they return
//! [`PolitenessResult::fallback`].

use async_trait::async_trait;

use crate::types::{PolitenessLabel, PolitenessResult};

/// Classifies an utterance as polite, neutral, or impolite.
#[async_trait]
pub trait PolitenessClassifier: Send + Sync {
    /// Classify `text`. Infallible by contract.
    async fn classify(&self, text: &str) -> PolitenessResult;
}

const COURTESY: &[&str] = &["please", "could you", "would you"];
const GRATITUDE: &[&str] = &["thank"];
const DEMANDS: &[&str] = &["now!", "right now", "hurry", "tell me"];

/// Keyword scoring classifier that runs without any service.
///
/// Courtesy phrases and thanks add two points each, demands subtract two, a
/// trailing `!` or a very short utterance subtract one. A score of two or
/// more is polite, minus one or less is impolite.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    /// Create a heuristic classifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Synchronous scoring used by [`PolitenessClassifier::classify`].
    #[must_use]
    pub fn score(text: &str) -> PolitenessResult {
        let lowered = text.to_lowercase();
        let has_any = |phrases: &[&str]| phrases.iter().any(|p| lowered.contains(p));

        let mut score: i32 = 0;
        if has_any(COURTESY) {
            score += 2;
        }
        if has_any(GRATITUDE) {
            score += 2;
        }
        if has_any(DEMANDS) {
            score -= 2;
        }
        if text.ends_with('!') {
            score -= 1;
        }
        if text.chars().count() < 4 {
            score -= 1;
        }

        let label = if score >= 2 {
            PolitenessLabel::Polite
        } else if score <= -1 {
            PolitenessLabel::Impolite
        } else {
            PolitenessLabel::Neutral
        };

        #[allow(clippy::cast_precision_loss)]
        let confidence = (score.unsigned_abs() as f32 / 3.0).clamp(0.3, 0.95);
        PolitenessResult::new(label, confidence)
    }
}

#[async_trait]
impl PolitenessClassifier for HeuristicClassifier {
    async fn classify(&self, text: &str) -> PolitenessResult {
        Self::score(text)
    }
}
