//! Read-only knowledge-base query interface.
//!
//! The resolver and trust engine only ever talk to a [`KnowledgeBase`]; the
//! storage behind it is opaque. [`WorldKnowledge`] is the in-memory,
//! TOML-backed implementation the game ships with.

pub mod world;

pub use world::WorldKnowledge;

use crate::error::KnowledgeError;
use crate::types::Trust;

/// Shorthand for knowledge query results.
pub type QueryResult<T> = std::result::Result<T, KnowledgeError>;

/// A hint an NPC may give, chosen for the current trust.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpcHint {
    /// Hint text, if the NPC has one for this trust.
    pub hint: Option<String>,
    /// Item the NPC is associated with.
    pub item: Option<String>,
}

/// A puzzle whose trigger mentions some item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleRef {
    /// Puzzle id.
    pub id: String,
    /// Trigger text, empty when the puzzle has none.
    pub trigger: String,
    /// Location id, empty when unknown.
    pub location: String,
}

/// Queries the dialogue loop needs from a knowledge base.
///
/// Identifiers are local names (`emblem`, `alleyGatePuzzle`, `library`).
/// Matching methods return ids in the base's enumeration order with
/// duplicates removed.
pub trait KnowledgeBase: Send + Sync {
    /// Hint and associated item for `npc` at the given trust.
    fn hint_for_npc(&self, npc: &str, trust: Trust) -> QueryResult<NpcHint>;

    /// Emotions the NPC is allowed to show.
    fn emotional_range(&self, npc: &str) -> QueryResult<Vec<String>>;

    /// The NPC's resting emotional state.
    fn current_emotion(&self, npc: &str) -> QueryResult<Option<String>>;

    /// One-line description of the NPC's attitude.
    fn core_attitude(&self, npc: &str) -> QueryResult<Option<String>>;

    /// Whether the NPC may ask follow-up questions.
    fn can_initiate(&self, npc: &str) -> QueryResult<Option<bool>>;

    /// What an item is used for.
    fn item_use(&self, item: &str) -> QueryResult<Option<String>>;

    /// Where an item is found.
    fn item_found_at(&self, item: &str) -> QueryResult<Option<String>>;

    /// Items whose identifier (or use text) contains any of `tokens`.
    fn find_items(&self, tokens: &[String]) -> QueryResult<Vec<String>>;

    /// Clue texts about an item.
    fn clue_texts_for_item(&self, item: &str) -> QueryResult<Vec<String>>;

    /// Puzzles whose trigger text mentions an item.
    fn puzzles_triggered_by_item(&self, item: &str) -> QueryResult<Vec<PuzzleRef>>;

    /// A puzzle's trigger text.
    fn puzzle_trigger(&self, puzzle: &str) -> QueryResult<Option<String>>;

    /// A puzzle's location.
    fn puzzle_location(&self, puzzle: &str) -> QueryResult<Option<String>>;

    /// Puzzles whose identifier or trigger text contains any of `tokens`.
    fn find_puzzles(&self, tokens: &[String]) -> QueryResult<Vec<String>>;

    /// The key item of a location.
    fn location_key_item(&self, location: &str) -> QueryResult<Option<String>>;
}
