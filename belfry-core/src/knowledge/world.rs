//! In-memory knowledge base loaded from a TOML world file.
//!
//! ```toml
//! [[locations]]
//! id = "library"
//! key_item = "emblem"
//!
//! [[npcs]]
//! name = "Iris"
//! emotional_range = ["Reserved", "Calm", "Friendly"]
//! good_hint = "The emblem opens the alley gate."
//! required_trust = 1
//!
//! [[items]]
//! id = "emblem"
//! use = "Unlocks the alley gate"
//! found_at = "library"
//!
//! [[clues]]
//! about_item = "emblem"
//! text = "Someone hid a brass emblem between the atlases."
//!
//! [[puzzles]]
//! id = "alleyGatePuzzle"
//! trigger = "Emblem used on gate"
//! location = "alley"
//! ```
//!
//! Tables are enumerated in file order.

use std::path::Path;

use serde::Deserialize;

use super::{KnowledgeBase, NpcHint, PuzzleRef, QueryResult};
use crate::error::{CoreError, KnowledgeError};
use crate::types::Trust;

#[derive(Debug, Clone, Deserialize)]
struct LocationRecord {
    id: String,
    #[serde(default)]
    key_item: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NpcRecord {
    name: String,
    #[serde(default)]
    emotional_range: Vec<String>,
    #[serde(default)]
    current_emotion: Option<String>,
    #[serde(default)]
    core_attitude: Option<String>,
    #[serde(default)]
    can_initiate: Option<bool>,
    #[serde(default)]
    associated_item: Option<String>,
    #[serde(default)]
    good_hint: Option<String>,
    #[serde(default)]
    neutral_hint: Option<String>,
    #[serde(default)]
    bad_hint: Option<String>,
    #[serde(default)]
    required_trust: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemRecord {
    id: String,
    #[serde(default, rename = "use")]
    use_text: Option<String>,
    #[serde(default)]
    found_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClueRecord {
    about_item: String,
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PuzzleRecord {
    id: String,
    #[serde(default)]
    trigger: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WorldFile {
    #[serde(default)]
    locations: Vec<LocationRecord>,
    #[serde(default)]
    npcs: Vec<NpcRecord>,
    #[serde(default)]
    items: Vec<ItemRecord>,
    #[serde(default)]
    clues: Vec<ClueRecord>,
    #[serde(default)]
    puzzles: Vec<PuzzleRecord>,
}

/// Knowledge base held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct WorldKnowledge {
    world: WorldFile,
}

impl WorldKnowledge {
    /// Parse a world from TOML.
    ///
    /// # Errors
    /// Returns `CoreError::World` if the TOML does not describe a world.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let world: WorldFile =
            toml::from_str(toml_str).map_err(|e| CoreError::World(e.to_string()))?;
        Ok(Self { world })
    }

    /// Load a world file from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Number of known items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.world.items.len()
    }

    /// Number of known puzzles.
    #[must_use]
    pub fn puzzle_count(&self) -> usize {
        self.world.puzzles.len()
    }

    fn npc(&self, name: &str) -> QueryResult<&NpcRecord> {
        self.world
            .npcs
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| KnowledgeError::UnknownNpc(name.to_string()))
    }

    fn item(&self, id: &str) -> Option<&ItemRecord> {
        self.world.items.iter().find(|i| i.id == id)
    }

    fn puzzle(&self, id: &str) -> Option<&PuzzleRecord> {
        self.world.puzzles.iter().find(|p| p.id == id)
    }
}

/// Lowercase the tokens, expanding `gear` to both gear halves.
fn expand_tokens(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    if out.iter().any(|t| t == "gear") {
        out.push("gear_left".to_string());
        out.push("gear_right".to_string());
    }
    out
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

fn push_unique(out: &mut Vec<String>, id: &str) {
    if !out.iter().any(|existing| existing == id) {
        out.push(id.to_string());
    }
}

impl KnowledgeBase for WorldKnowledge {
    fn hint_for_npc(&self, npc: &str, trust: Trust) -> QueryResult<NpcHint> {
        let record = self.npc(npc)?;
        let trust = i64::from(trust.value());

        // Distrust reaches for the bad hint before the neutral one.
        let hint = if trust >= record.required_trust {
            record.good_hint.clone().or_else(|| record.neutral_hint.clone())
        } else if trust < 0 {
            record.bad_hint.clone().or_else(|| record.neutral_hint.clone())
        } else {
            record.neutral_hint.clone().or_else(|| record.bad_hint.clone())
        };

        Ok(NpcHint {
            hint,
            item: record.associated_item.clone(),
        })
    }

    fn emotional_range(&self, npc: &str) -> QueryResult<Vec<String>> {
        Ok(self.npc(npc)?.emotional_range.clone())
    }

    fn current_emotion(&self, npc: &str) -> QueryResult<Option<String>> {
        Ok(self.npc(npc)?.current_emotion.clone())
    }

    fn core_attitude(&self, npc: &str) -> QueryResult<Option<String>> {
        Ok(self.npc(npc)?.core_attitude.clone())
    }

    fn can_initiate(&self, npc: &str) -> QueryResult<Option<bool>> {
        Ok(self.npc(npc)?.can_initiate)
    }

    fn item_use(&self, item: &str) -> QueryResult<Option<String>> {
        Ok(self.item(item).and_then(|i| i.use_text.clone()))
    }

    fn item_found_at(&self, item: &str) -> QueryResult<Option<String>> {
        Ok(self.item(item).and_then(|i| i.found_at.clone()))
    }

    fn find_items(&self, tokens: &[String]) -> QueryResult<Vec<String>> {
        let mut out = Vec::new();
        if tokens.is_empty() {
            return Ok(out);
        }
        let toks = expand_tokens(tokens);

        for item in &self.world.items {
            let by_id = contains_any(&item.id, &toks);
            let by_use = item
                .use_text
                .as_deref()
                .is_some_and(|u| contains_any(u, &toks));
            if by_id || by_use {
                push_unique(&mut out, &item.id);
            }
        }
        Ok(out)
    }

    fn clue_texts_for_item(&self, item: &str) -> QueryResult<Vec<String>> {
        Ok(self
            .world
            .clues
            .iter()
            .filter(|c| c.about_item == item)
            .map(|c| c.text.clone())
            .collect())
    }

    fn puzzles_triggered_by_item(&self, item: &str) -> QueryResult<Vec<PuzzleRef>> {
        let needle = item.to_lowercase();
        Ok(self
            .world
            .puzzles
            .iter()
            .filter(|p| {
                p.trigger
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .map(|p| PuzzleRef {
                id: p.id.clone(),
                trigger: p.trigger.clone().unwrap_or_default(),
                location: p.location.clone().unwrap_or_default(),
            })
            .collect())
    }

    fn puzzle_trigger(&self, puzzle: &str) -> QueryResult<Option<String>> {
        Ok(self.puzzle(puzzle).and_then(|p| p.trigger.clone()))
    }

    fn puzzle_location(&self, puzzle: &str) -> QueryResult<Option<String>> {
        Ok(self.puzzle(puzzle).and_then(|p| p.location.clone()))
    }

    fn find_puzzles(&self, tokens: &[String]) -> QueryResult<Vec<String>> {
        let mut out = Vec::new();
        if tokens.is_empty() {
            return Ok(out);
        }
        let toks: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

        for puzzle in &self.world.puzzles {
            let by_id = contains_any(&puzzle.id, &toks);
            let by_trigger = puzzle
                .trigger
                .as_deref()
                .is_some_and(|t| contains_any(t, &toks));
            if by_id || by_trigger {
                push_unique(&mut out, &puzzle.id);
            }
        }
        Ok(out)
    }

    fn location_key_item(&self, location: &str) -> QueryResult<Option<String>> {
        Ok(self
            .world
            .locations
            .iter()
            .find(|l| l.id == location)
            .and_then(|l| l.key_item.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD: &str = r#"
        [[locations]]
        id = "library"
        key_item = "emblem"

        [[npcs]]
        name = "Iris"
        emotional_range = ["Reserved", "Calm", "Friendly"]
        current_emotion = "Reserved"
        associated_item = "emblem"
        good_hint = "good"
        neutral_hint = "neutral"
        bad_hint = "bad"
        required_trust = 1

        [[npcs]]
        name = "Quill"
        neutral_hint = "only neutral"
        required_trust = 1

        [[items]]
        id = "gear_left"
        use = "Half of the clock mechanism"

        [[items]]
        id = "gear_right"
        use = "Other half of the clock mechanism"

        [[items]]
        id = "emblem"
        use = "Unlocks the alley gate"
        found_at = "library"

        [[clues]]
        about_item = "emblem"
        text = "A brass emblem hides among the atlases."

        [[puzzles]]
        id = "alleyGatePuzzle"
        trigger = "Emblem used on gate"
        location = "alley"

        [[puzzles]]
        id = "forgePuzzle"
        trigger = "Scrap metal smelted"
        location = "forge"
    "#;

    fn world() -> WorldKnowledge {
        WorldKnowledge::from_toml(WORLD).expect("world parses")
    }

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn hint_depends_on_trust() {
        let kb = world();
        let at = |t| kb.hint_for_npc("iris", t).expect("known npc").hint;
        assert_eq!(at(Trust::Trusting).as_deref(), Some("good"));
        assert_eq!(at(Trust::Neutral).as_deref(), Some("neutral"));
        assert_eq!(at(Trust::Distrustful).as_deref(), Some("bad"));
    }

    #[test]
    fn missing_hints_fall_back_to_neutral() {
        let kb = world();
        for trust in [Trust::Trusting, Trust::Neutral, Trust::Distrustful] {
            let hint = kb.hint_for_npc("Quill", trust).expect("known npc").hint;
            assert_eq!(hint.as_deref(), Some("only neutral"), "{trust:?}");
        }
    }

    #[test]
    fn unknown_npc_is_an_error() {
        let kb = world();
        assert_eq!(
            kb.emotional_range("Nobody"),
            Err(KnowledgeError::UnknownNpc("Nobody".into()))
        );
    }

    #[test]
    fn gear_expands_to_both_halves() {
        let kb = world();
        let items = kb.find_items(&toks(&["gear"])).expect("query");
        assert_eq!(items, vec!["gear_left", "gear_right"]);
    }

    #[test]
    fn items_match_on_use_text() {
        let kb = world();
        let items = kb.find_items(&toks(&["gate"])).expect("query");
        assert_eq!(items, vec!["emblem"]);
    }

    #[test]
    fn puzzles_match_id_or_trigger_without_duplicates() {
        let kb = world();
        let puzzles = kb.find_puzzles(&toks(&["gate", "alley", "scrap"])).expect("query");
        assert_eq!(puzzles, vec!["alleyGatePuzzle", "forgePuzzle"]);
    }

    #[test]
    fn puzzles_triggered_by_item_are_case_insensitive() {
        let kb = world();
        let related = kb.puzzles_triggered_by_item("emblem").expect("query");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "alleyGatePuzzle");
        assert_eq!(related[0].location, "alley");
    }

    #[test]
    fn location_key_item_lookup() {
        let kb = world();
        assert_eq!(kb.location_key_item("library").expect("q").as_deref(), Some("emblem"));
        assert_eq!(kb.location_key_item("moon").expect("q"), None);
    }

    #[test]
    fn malformed_world_is_rejected() {
        let err = WorldKnowledge::from_toml("[[items]]\nuse = 3").expect_err("bad world");
        assert!(matches!(err, CoreError::World(_)));
    }
}
