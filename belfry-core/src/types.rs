//! Core type definitions for the dialogue loop.
//!
//! All state types are serializable so the console can dump them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::config::GameConfig;

// ---------------------------------------------------------------------------
// Trust
// ---------------------------------------------------------------------------

/// Discrete trust an NPC holds toward the player.
///
/// Serialized as the integers `-1`, `0` and `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Trust {
    /// The NPC distrusts the player (`-1`).
    Distrustful,
    /// No opinion either way (`0`).
    #[default]
    Neutral,
    /// The NPC trusts the player (`1`).
    Trusting,
}

impl Trust {
    /// Numeric value in `{-1, 0, 1}`.
    #[must_use]
    pub fn value(self) -> i8 {
        match self {
            Self::Distrustful => -1,
            Self::Neutral => 0,
            Self::Trusting => 1,
        }
    }

    /// Build from any integer, saturating at the bounds.
    #[must_use]
    pub fn from_value(value: i64) -> Self {
        match value {
            v if v < 0 => Self::Distrustful,
            0 => Self::Neutral,
            _ => Self::Trusting,
        }
    }

    /// One step up, saturating at [`Trust::Trusting`].
    #[must_use]
    pub fn raised(self) -> Self {
        Self::from_value(i64::from(self.value()) + 1)
    }

    /// One step down, saturating at [`Trust::Distrustful`].
    #[must_use]
    pub fn lowered(self) -> Self {
        Self::from_value(i64::from(self.value()) - 1)
    }
}

impl fmt::Display for Trust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl Serialize for Trust {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i8(self.value())
    }
}

impl<'de> Deserialize<'de> for Trust {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Ok(Self::from_value(raw))
    }
}

/// Per-NPC relationship state.
///
/// At most one of the two streaks is nonzero at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NpcState {
    /// Current trust.
    pub trust: Trust,
    /// Consecutive polite turns.
    pub polite_streak: u32,
    /// Consecutive impolite turns.
    pub impolite_streak: u32,
}

impl NpcState {
    /// A fresh state with the given trust and no streaks.
    #[must_use]
    pub fn with_trust(trust: Trust) -> Self {
        Self {
            trust,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Politeness
// ---------------------------------------------------------------------------

/// Politeness label produced by a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolitenessLabel {
    /// Courteous phrasing.
    Polite,
    /// Neither polite nor rude.
    Neutral,
    /// Rude or demanding phrasing.
    Impolite,
}

impl PolitenessLabel {
    /// Parse a classifier label. Anything unrecognised counts as neutral.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "polite" => Self::Polite,
            "impolite" => Self::Impolite,
            _ => Self::Neutral,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Polite => "polite",
            Self::Neutral => "neutral",
            Self::Impolite => "impolite",
        }
    }
}

impl fmt::Display for PolitenessLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a politeness classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolitenessResult {
    /// Classified label.
    pub label: PolitenessLabel,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl PolitenessResult {
    /// Create a result, clamping confidence to `[0, 1]`.
    #[must_use]
    pub fn new(label: PolitenessLabel, confidence: f32) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The low-confidence neutral result used when a classifier is unavailable.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new(PolitenessLabel::Neutral, 0.34)
    }
}

// ---------------------------------------------------------------------------
// Chat history
// ---------------------------------------------------------------------------

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The player.
    User,
    /// The NPC.
    Assistant,
}

impl ChatRole {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One line of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: ChatRole,
    /// What was said.
    pub content: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    /// A player message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    /// An NPC message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Append-only conversation log, in conversational order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    /// Empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The last `n` messages, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// All messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The most recent message, if any.
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Mutable per-session game state.
///
/// Created once per session; only the history is ever reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Identifies this session in logs.
    pub session_id: Uuid,
    /// Current location id.
    pub location: String,
    /// NPC the player is talking to.
    pub current_npc: String,
    /// Relationship state per NPC.
    pub trust: BTreeMap<String, NpcState>,
    /// Item id to "carried".
    pub inventory: BTreeMap<String, bool>,
    /// Story flags.
    pub flags: BTreeMap<String, bool>,
    /// Conversation so far.
    pub chat_history: ChatHistory,
}

impl GameState {
    /// Build the opening state described by `config`.
    #[must_use]
    pub fn new(config: &GameConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            location: config.start_location.clone(),
            current_npc: config.start_npc.clone(),
            trust: config
                .npcs
                .iter()
                .map(|npc| (npc.clone(), NpcState::default()))
                .collect(),
            inventory: config.inventory.iter().map(|i| (i.clone(), false)).collect(),
            flags: config.flags.iter().map(|f| (f.clone(), false)).collect(),
            chat_history: ChatHistory::new(),
        }
    }

    /// Relationship state for `npc`, created on first use.
    pub fn npc_state_mut(&mut self, npc: &str) -> &mut NpcState {
        self.trust.entry(npc.to_string()).or_default()
    }

    /// Current trust toward the player for `npc`.
    #[must_use]
    pub fn trust_of(&self, npc: &str) -> Trust {
        self.trust.get(npc).map(|s| s.trust).unwrap_or_default()
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(&GameConfig::default())
    }
}
