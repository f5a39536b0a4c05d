//! The turn loop: one utterance in, one NPC line out.
//!
//! ```text
//! utterance → classify → trust → emotion → history(user)
//!           → tokens → facts → roleplay → history(assistant)
//! ```
//!
//! Turns run strictly one at a time. A failed roleplay call is reported in
//! the [`TurnReport`] and leaves no assistant message behind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use belfry_core::facts::{FactBundle, FactResolver, Resolution};
use belfry_core::tokens::extract_tokens;
use belfry_core::trust::derive_emotion;
use belfry_core::types::{ChatMessage, GameState, NpcState, PolitenessResult, Trust};
use belfry_core::{PolitenessClassifier, TrustEngine};
use belfry_llm::types::APOLOGY_TEXT;
use belfry_llm::{ChatTurn, LlmError, RoleplayPayload, RoleplayProvider};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The NPC answered; the line is in the history.
    Reply {
        /// Speaker.
        npc: String,
        /// What they said.
        text: String,
    },
    /// The roleplay call failed permanently; nothing was recorded for the NPC.
    AiFailed {
        /// Speaker who stays silent.
        npc: String,
        /// Failure shown to the player.
        error: String,
    },
    /// The session was cancelled before the NPC answered.
    Cancelled,
}

impl TurnOutcome {
    /// Line the console prints for the NPC.
    #[must_use]
    pub fn npc_line(&self) -> Option<(&str, &str)> {
        match self {
            Self::Reply { npc, text } => Some((npc, text)),
            Self::AiFailed { npc, .. } => Some((npc, APOLOGY_TEXT)),
            Self::Cancelled => None,
        }
    }
}

/// Everything observable about one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Classifier verdict.
    pub politeness: PolitenessResult,
    /// Trust after the update.
    pub trust: Trust,
    /// Emotion the NPC answered with.
    pub emotion: String,
    /// Facts handed to the roleplay service.
    pub facts: FactBundle,
    /// Topics that could not be grounded.
    pub missing: Vec<String>,
    /// Result of the roleplay call.
    pub outcome: TurnOutcome,
}

/// What `/state` shows.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Current location.
    pub location: String,
    /// NPC being addressed.
    pub current_npc: String,
    /// Relationship state per NPC.
    pub trust: BTreeMap<String, NpcState>,
    /// Item id to carried.
    pub inventory: BTreeMap<String, bool>,
    /// Story flags.
    pub flags: BTreeMap<String, bool>,
    /// Messages recorded so far.
    pub chat_history_len: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the session state and sequences each turn.
pub struct Engine {
    state: GameState,
    trust: TrustEngine,
    resolver: FactResolver,
    classifier: Arc<dyn PolitenessClassifier>,
    provider: Arc<dyn RoleplayProvider>,
    cancel: CancellationToken,
}

impl Engine {
    /// Assemble an engine from its collaborators.
    #[must_use]
    pub fn new(
        state: GameState,
        trust: TrustEngine,
        resolver: FactResolver,
        classifier: Arc<dyn PolitenessClassifier>,
        provider: Arc<dyn RoleplayProvider>,
    ) -> Self {
        Self {
            state,
            trust,
            resolver,
            classifier,
            provider,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token` between the steps of each turn.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable session state, for scripted setups.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Name of the roleplay backend in use.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Forget the conversation. Trust, inventory and flags are kept.
    pub fn reset(&mut self) {
        self.state.chat_history.clear();
        info!(session = %self.state.session_id, "Chat history cleared");
    }

    /// Summary of the session for `/state`.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            location: self.state.location.clone(),
            current_npc: self.state.current_npc.clone(),
            trust: self.state.trust.clone(),
            inventory: self.state.inventory.clone(),
            flags: self.state.flags.clone(),
            chat_history_len: self.state.chat_history.len(),
        }
    }

    /// [`snapshot`](Self::snapshot) as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn dump_state(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Process one player utterance.
    ///
    /// Never fails: classifier and knowledge problems degrade to neutral
    /// results, and roleplay failures are reported in the outcome.
    pub async fn handle_turn(&mut self, utterance: &str) -> TurnReport {
        let npc = self.state.current_npc.clone();
        let location = self.state.location.clone();

        let started = Instant::now();
        let politeness = self.classifier.classify(utterance).await;
        debug!(
            label = %politeness.label,
            confidence = (f64::from(politeness.confidence) * 1000.0).round() / 1000.0,
            elapsed_ms = elapsed_ms(started),
            "POLITENESS"
        );

        let trust = self.trust.update(&mut self.state, &npc, politeness.label);
        let emotion = derive_emotion(self.resolver.knowledge(), &npc, trust);
        debug!(npc = %npc, trust = trust.value(), emotion = %emotion, "TRUST/EMOTION");

        self.state.chat_history.push(ChatMessage::user(format!(
            "[{location}/{npc} tone={}] {utterance}",
            politeness.label
        )));

        let tokens = extract_tokens(utterance);
        let Resolution { facts, missing } = self.resolver.resolve(&tokens, &npc, &location, trust);
        debug!(facts = %facts.to_value(), "FACTS RESOLVED");
        debug!(missing = ?missing, "FACTS MISSING");

        let outcome = self
            .roleplay(&npc, &location, &emotion, utterance, &facts, &missing)
            .await;

        TurnReport {
            politeness,
            trust,
            emotion,
            facts,
            missing,
            outcome,
        }
    }

    async fn roleplay(
        &mut self,
        npc: &str,
        location: &str,
        emotion: &str,
        utterance: &str,
        facts: &FactBundle,
        missing: &[String],
    ) -> TurnOutcome {
        if self.cancel.is_cancelled() {
            return TurnOutcome::Cancelled;
        }

        let payload = RoleplayPayload {
            npc: npc.to_string(),
            location: location.to_string(),
            npc_emotion: emotion.to_string(),
            player_utterance: utterance.to_string(),
            facts: facts.to_value(),
            facts_missing: missing.to_vec(),
        };
        let history: Vec<ChatTurn> = self
            .state
            .chat_history
            .messages()
            .iter()
            .map(|m| ChatTurn::new(m.role.as_str(), m.content.clone()))
            .collect();

        let started = Instant::now();
        match self.provider.roleplay(&payload, &history).await {
            Ok(reply) => {
                let text = reply.roleplay_or_default().to_string();
                debug!(
                    provider = self.provider.name(),
                    elapsed_ms = elapsed_ms(started),
                    reply = %reply.as_value(),
                    "AI ROLEPLAY"
                );
                self.state.chat_history.push(ChatMessage::assistant(text.clone()));
                TurnOutcome::Reply {
                    npc: npc.to_string(),
                    text,
                }
            }
            Err(LlmError::Cancelled) => {
                info!("Roleplay cancelled");
                TurnOutcome::Cancelled
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Roleplay failed");
                TurnOutcome::AiFailed {
                    npc: npc.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
