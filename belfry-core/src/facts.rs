//! Fact resolution: grounding player tokens against the knowledge base.
//!
//! The resolver turns the tokens of one utterance into a [`FactBundle`] the
//! generative service may draw on, plus the list of topics it could not
//! ground. Optional sections are omitted when empty, so a missing key means
//! "no data" to the consumer.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::knowledge::{KnowledgeBase, QueryResult};
use crate::tokens::is_stopword;
use crate::trust::derive_emotion;
use crate::types::Trust;

/// Item that anchors the demo's central puzzle. Always grounded when named.
pub const ANCHOR_ITEM: &str = "emblem";

// ---------------------------------------------------------------------------
// Bundle types
// ---------------------------------------------------------------------------

/// What the NPC brings to the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcContext {
    /// Emotion derived from trust.
    pub emotion: String,
    /// Current trust.
    pub trust: Trust,
    /// Hint appropriate to the trust level.
    pub hint: Option<String>,
    /// Item the hint is about.
    pub hint_item: Option<String>,
    /// NPC name.
    pub name: String,
    /// Short description of the NPC's attitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_attitude: Option<String>,
    /// Whether the NPC may ask a follow-up question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_initiate: Option<bool>,
}

/// Known facts about one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFacts {
    /// What the item is for.
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_text: Option<String>,
    /// Where the item can be found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_at: Option<String>,
    /// Clues that mention the item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clues: Vec<String>,
}

impl ItemFacts {
    /// Whether no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.use_text.is_none() && self.found_at.is_none() && self.clues.is_empty()
    }
}

/// Known facts about one puzzle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleFacts {
    /// What sets the puzzle off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Where the puzzle is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl PuzzleFacts {
    /// Whether no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trigger.is_none() && self.location.is_none()
    }
}

/// Grounded context for a single turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactBundle {
    /// Always present.
    pub npc_context: NpcContext,
    /// Always present.
    pub location: String,
    /// Key item of the current location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_key_item: Option<String>,
    /// Item id to facts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<String, ItemFacts>,
    /// Puzzle id to facts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub puzzles: BTreeMap<String, PuzzleFacts>,
}

impl FactBundle {
    /// A bundle holding only the two baseline sections.
    #[must_use]
    pub fn baseline(npc_context: NpcContext, location: impl Into<String>) -> Self {
        Self {
            npc_context,
            location: location.into(),
            location_key_item: None,
            items: BTreeMap::new(),
            puzzles: BTreeMap::new(),
        }
    }

    /// Record for `item`, created empty if absent. Existing fields are kept.
    pub fn item_mut(&mut self, item: &str) -> &mut ItemFacts {
        self.items.entry(item.to_string()).or_default()
    }

    /// Record for `puzzle`, created empty if absent. Existing fields are kept.
    pub fn puzzle_mut(&mut self, puzzle: &str) -> &mut PuzzleFacts {
        self.puzzles.entry(puzzle.to_string()).or_default()
    }

    /// Whether only `npc_context` and `location` are populated.
    #[must_use]
    pub fn is_baseline_only(&self) -> bool {
        self.location_key_item.is_none() && self.items.is_empty() && self.puzzles.is_empty()
    }

    /// The bundle as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Output of [`FactResolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Grounded facts.
    pub facts: FactBundle,
    /// Topics that could not be grounded, in discovery order, each once.
    pub missing: Vec<String>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Builds fact bundles from a knowledge base.
#[derive(Clone)]
pub struct FactResolver {
    kb: Arc<dyn KnowledgeBase>,
}

impl std::fmt::Debug for FactResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactResolver").finish_non_exhaustive()
    }
}

/// Unwrap a query, logging and discarding errors.
fn or_empty<T: Default>(query: &str, subject: &str, result: QueryResult<T>) -> T {
    result.unwrap_or_else(|e| {
        warn!(query, subject, error = %e, "Knowledge query failed, treating as unresolved");
        T::default()
    })
}

fn dedup_in_order(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl FactResolver {
    /// Create a resolver over `kb`.
    #[must_use]
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }

    /// The knowledge base this resolver reads.
    #[must_use]
    pub fn knowledge(&self) -> &dyn KnowledgeBase {
        self.kb.as_ref()
    }

    /// Ground `tokens` for a turn with `npc` at `location`.
    ///
    /// Never fails; knowledge-base errors leave the affected query
    /// unresolved.
    #[must_use]
    pub fn resolve(&self, tokens: &[String], npc: &str, location: &str, trust: Trust) -> Resolution {
        let kb = self.kb.as_ref();
        let mut missing = Vec::new();

        let hint = or_empty("hint", npc, kb.hint_for_npc(npc, trust));
        let npc_context = NpcContext {
            emotion: derive_emotion(kb, npc, trust),
            trust,
            hint: non_blank(hint.hint),
            hint_item: non_blank(hint.item),
            name: npc.to_string(),
            core_attitude: non_blank(or_empty("core_attitude", npc, kb.core_attitude(npc))),
            can_initiate: or_empty("can_initiate", npc, kb.can_initiate(npc)),
        };
        let mut facts = FactBundle::baseline(npc_context, location);

        // Location key item.
        facts.location_key_item =
            non_blank(or_empty("location_key_item", location, kb.location_key_item(location)));

        // Items.
        let mut item_ids = or_empty("find_items", "tokens", kb.find_items(tokens));
        if item_ids.is_empty() && tokens.iter().any(|t| t == ANCHOR_ITEM) {
            item_ids.push(ANCHOR_ITEM.to_string());
        }
        for id in &item_ids {
            let record = ItemFacts {
                use_text: non_blank(or_empty("item_use", id, kb.item_use(id))),
                found_at: non_blank(or_empty("item_found_at", id, kb.item_found_at(id))),
                clues: Vec::new(),
            };
            if record.is_empty() {
                missing.push(id.clone());
            } else {
                facts.items.insert(id.clone(), record);
            }
        }

        let anchor_matched = item_ids.iter().any(|i| i == ANCHOR_ITEM);
        if anchor_matched {
            let clues: Vec<String> =
                or_empty("clues", ANCHOR_ITEM, kb.clue_texts_for_item(ANCHOR_ITEM))
                    .into_iter()
                    .filter(|c| !c.trim().is_empty())
                    .collect();
            if !clues.is_empty() {
                facts.item_mut(ANCHOR_ITEM).clues = clues;
            }
        }

        // Puzzles.
        let puzzle_ids = or_empty("find_puzzles", "tokens", kb.find_puzzles(tokens));
        for id in &puzzle_ids {
            let record = PuzzleFacts {
                trigger: non_blank(or_empty("puzzle_trigger", id, kb.puzzle_trigger(id))),
                location: non_blank(or_empty("puzzle_location", id, kb.puzzle_location(id))),
            };
            if record.is_empty() {
                missing.push(id.clone());
            } else {
                facts.puzzles.insert(id.clone(), record);
            }
        }

        if anchor_matched {
            let related = or_empty(
                "puzzles_triggered_by_item",
                ANCHOR_ITEM,
                kb.puzzles_triggered_by_item(ANCHOR_ITEM),
            );
            for puzzle in related {
                let entry = facts.puzzle_mut(&puzzle.id);
                if let Some(trigger) = non_blank(Some(puzzle.trigger)) {
                    entry.trigger = Some(trigger);
                }
                if let Some(location) = non_blank(Some(puzzle.location)) {
                    entry.location = Some(location);
                }
            }
        }

        // Nothing grounded at all.
        if facts.is_baseline_only() && !tokens.is_empty() {
            missing.extend(tokens.iter().filter(|t| !is_stopword(t)).cloned());
        }
        dedup_in_order(&mut missing);

        debug!(
            npc,
            location,
            items = facts.items.len(),
            puzzles = facts.puzzles.len(),
            missing = ?missing,
            "Facts resolved"
        );

        Resolution { facts, missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::WorldKnowledge;

    const WORLD: &str = r#"
        [[locations]]
        id = "library"
        key_item = "emblem"

        [[locations]]
        id = "alley"

        [[npcs]]
        name = "Iris"
        emotional_range = ["Reserved", "Friendly"]
        associated_item = "emblem"
        neutral_hint = "Look among the atlases."
        core_attitude = "Guarded archivist"
        can_initiate = false

        [[items]]
        id = "emblem"
        use = "Unlocks the alley gate"
        found_at = "library"

        [[items]]
        id = "winding_key"

        [[clues]]
        about_item = "emblem"
        text = "A brass emblem hides among the atlases."

        [[puzzles]]
        id = "alleyGatePuzzle"
        trigger = "Emblem used on gate"
        location = "alley"

        [[puzzles]]
        id = "windingPuzzle"
    "#;

    fn resolver() -> FactResolver {
        FactResolver::new(Arc::new(WorldKnowledge::from_toml(WORLD).expect("world")))
    }

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn baseline_is_always_present() {
        let r = resolver().resolve(&[], "Iris", "alley", Trust::Neutral);
        assert_eq!(r.facts.location, "alley");
        assert_eq!(r.facts.npc_context.name, "Iris");
        assert_eq!(r.facts.npc_context.emotion, "reserved");
        assert_eq!(r.facts.npc_context.hint.as_deref(), Some("Look among the atlases."));
        assert!(r.facts.is_baseline_only());
        assert!(r.missing.is_empty());
    }

    #[test]
    fn emblem_pulls_clues_and_related_puzzles() {
        let r = resolver().resolve(&toks(&["emblem"]), "Iris", "library", Trust::Neutral);
        assert_eq!(r.facts.location_key_item.as_deref(), Some("emblem"));

        let emblem = &r.facts.items["emblem"];
        assert_eq!(emblem.use_text.as_deref(), Some("Unlocks the alley gate"));
        assert_eq!(emblem.found_at.as_deref(), Some("library"));
        assert_eq!(emblem.clues.len(), 1);

        let gate = &r.facts.puzzles["alleyGatePuzzle"];
        assert_eq!(gate.location.as_deref(), Some("alley"));
        assert!(r.missing.is_empty());
    }

    #[test]
    fn fieldless_items_and_puzzles_go_to_missing() {
        let r = resolver().resolve(&toks(&["winding"]), "Iris", "alley", Trust::Neutral);
        assert!(r.facts.items.is_empty());
        assert!(r.facts.puzzles.is_empty());
        assert_eq!(r.missing, vec!["winding_key", "windingPuzzle", "winding"]);
    }

    #[test]
    fn ungrounded_tokens_are_all_missing() {
        let r = resolver().resolve(&toks(&["dragon", "moon"]), "Iris", "alley", Trust::Neutral);
        assert!(r.facts.is_baseline_only());
        assert_eq!(r.missing, vec!["dragon", "moon"]);
    }

    #[test]
    fn unknown_anchor_is_missing_once() {
        let bare = FactResolver::new(Arc::new(
            WorldKnowledge::from_toml("[[locations]]\nid = \"alley\"").expect("world"),
        ));
        let r = bare.resolve(&toks(&["emblem", "moon", "emblem"]), "Iris", "alley", Trust::Neutral);
        assert!(r.facts.is_baseline_only());
        assert_eq!(r.missing, vec!["emblem", "moon"]);
    }

    #[test]
    fn key_item_suppresses_total_failure_fallback() {
        let r = resolver().resolve(&toks(&["dragon"]), "Iris", "library", Trust::Neutral);
        assert!(!r.facts.is_baseline_only());
        assert!(r.missing.is_empty());
    }

    #[test]
    fn serialized_bundle_omits_empty_sections() {
        let r = resolver().resolve(&[], "Iris", "alley", Trust::Neutral);
        let value = r.facts.to_value();
        let obj = value.as_object().expect("object");
        assert!(obj.contains_key("npc_context"));
        assert!(obj.contains_key("location"));
        assert!(!obj.contains_key("items"));
        assert!(!obj.contains_key("puzzles"));
        assert!(!obj.contains_key("location_key_item"));
        assert_eq!(value["npc_context"]["can_initiate"], serde_json::json!(false));
        assert_eq!(value["npc_context"]["trust"], serde_json::json!(0));
    }

    #[test]
    fn unknown_npc_still_yields_context() {
        let r = resolver().resolve(&[], "Stranger", "alley", Trust::Trusting);
        assert_eq!(r.facts.npc_context.emotion, "reserved");
        assert!(r.facts.npc_context.hint.is_none());
    }
}
