//! Request and reply types for roleplay calls.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Text shown when a reply carries no usable `roleplay` string.
pub const NO_REPLY: &str = "(no reply)";

/// In-world line used when the service never answered.
pub const APOLOGY_TEXT: &str = "(the archivist doesn't answer, please try again)";

/// Reply of the offline stub.
pub const OFFLINE_TEXT: &str = "(offline stub)";

/// One chat message as sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatTurn {
    /// Create a message with an arbitrary role.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// A system instruction.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Everything the backend may ground one reply in.
///
/// Serialized as the final user message of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleplayPayload {
    /// NPC speaking.
    pub npc: String,
    /// Current location id.
    pub location: String,
    /// Emotion the reply should carry.
    pub npc_emotion: String,
    /// What the player just said.
    pub player_utterance: String,
    /// Grounded fact bundle.
    pub facts: Value,
    /// Topics the NPC should admit not knowing.
    pub facts_missing: Vec<String>,
}

/// Structured reply from a roleplay backend.
///
/// Always a JSON object; it may lack the `roleplay` field.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleplayReply(Value);

impl RoleplayReply {
    /// Wrap a repaired reply. Non-objects become an empty object.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        if value.is_object() {
            Self(value)
        } else {
            Self(json!({}))
        }
    }

    /// A reply whose `roleplay` is `text`.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self(json!({ "roleplay": text.into() }))
    }

    /// Reply used when retries are exhausted.
    #[must_use]
    pub fn apology() -> Self {
        Self::text(APOLOGY_TEXT)
    }

    /// Reply of the offline stub.
    #[must_use]
    pub fn offline() -> Self {
        Self::text(OFFLINE_TEXT)
    }

    /// The `roleplay` string, if present.
    #[must_use]
    pub fn roleplay(&self) -> Option<&str> {
        self.0.get("roleplay").and_then(Value::as_str)
    }

    /// The `roleplay` string, or [`NO_REPLY`].
    #[must_use]
    pub fn roleplay_or_default(&self) -> &str {
        self.roleplay().unwrap_or(NO_REPLY)
    }

    /// The underlying object.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}
