//! Trust state machine and emotion derivation.
//!
//! One designated NPC follows a streak-gated *progressive* policy: trust only
//! rises after a run of polite turns, and two rude turns in a row drop it to
//! the floor. Every other NPC follows the *direct* policy, where each polite
//! or impolite label moves trust one step.

use tracing::{debug, warn};

use crate::config::TrustConfig;
use crate::knowledge::KnowledgeBase;
use crate::types::{GameState, NpcState, PolitenessLabel, Trust};

/// Polite turns needed to lift a distrustful NPC back to neutral.
pub const RECOVER_STREAK: u32 = 2;
/// Polite turns needed to lift a neutral NPC to trusting.
pub const TRUST_STREAK: u32 = 3;
/// Impolite turns that snap trust to distrustful.
pub const SNAP_STREAK: u32 = 2;

const NEGATIVE_PRIORITY: &[&str] = &["angry", "sad", "reserved"];
const NEUTRAL_PRIORITY: &[&str] = &["reserved", "calm", "neutral", "joyful"];
const POSITIVE_PRIORITY: &[&str] = &["friendly", "joyful", "reserved"];

/// Emotion used when the knowledge base offers nothing.
pub const DEFAULT_EMOTION: &str = "reserved";

/// Applies politeness labels to the per-NPC trust map.
#[derive(Debug, Clone, Default)]
pub struct TrustEngine {
    gated_npc: Option<String>,
    progressive: bool,
}

impl TrustEngine {
    /// Create an engine that gates `gated_npc` progressively.
    #[must_use]
    pub fn new(gated_npc: Option<String>) -> Self {
        Self {
            gated_npc,
            progressive: true,
        }
    }

    /// Create an engine from configuration.
    #[must_use]
    pub fn from_config(config: &TrustConfig) -> Self {
        Self {
            gated_npc: config.gated_npc.clone(),
            progressive: config.progressive,
        }
    }

    /// Whether `npc` follows the progressive policy.
    #[must_use]
    pub fn is_progressive(&self, npc: &str) -> bool {
        self.progressive
            && self
                .gated_npc
                .as_deref()
                .is_some_and(|g| g.eq_ignore_ascii_case(npc))
    }

    /// Apply one politeness label to `npc` and return the resulting trust.
    pub fn update(&self, state: &mut GameState, npc: &str, label: PolitenessLabel) -> Trust {
        let progressive = self.is_progressive(npc);
        let entry = state.npc_state_mut(npc);
        let before = entry.trust;

        if progressive {
            apply_progressive(entry, label);
        } else {
            apply_direct(entry, label);
        }

        debug!(
            npc,
            %label,
            progressive,
            from = before.value(),
            to = entry.trust.value(),
            polite_streak = entry.polite_streak,
            impolite_streak = entry.impolite_streak,
            "Trust updated"
        );
        entry.trust
    }
}

/// Streak-gated transition.
pub fn apply_progressive(state: &mut NpcState, label: PolitenessLabel) {
    match label {
        PolitenessLabel::Polite => {
            state.polite_streak += 1;
            state.impolite_streak = 0;
            match state.trust {
                Trust::Distrustful if state.polite_streak >= RECOVER_STREAK => {
                    state.trust = Trust::Neutral;
                }
                Trust::Neutral if state.polite_streak >= TRUST_STREAK => {
                    state.trust = Trust::Trusting;
                }
                _ => {}
            }
        }
        PolitenessLabel::Impolite => {
            state.impolite_streak += 1;
            state.polite_streak = 0;
            if state.impolite_streak >= SNAP_STREAK {
                state.trust = Trust::Distrustful;
            }
        }
        PolitenessLabel::Neutral => {
            state.polite_streak = 0;
            state.impolite_streak = 0;
        }
    }
}

/// One step per label, saturating.
pub fn apply_direct(state: &mut NpcState, label: PolitenessLabel) {
    state.trust = match label {
        PolitenessLabel::Polite => state.trust.raised(),
        PolitenessLabel::Impolite => state.trust.lowered(),
        PolitenessLabel::Neutral => state.trust,
    };
    state.polite_streak = 0;
    state.impolite_streak = 0;
}

/// Pick the emotion `npc` shows at `trust`.
///
/// The first entry of the trust-sign priority list found in the NPC's allowed
/// range wins (compared case-insensitively). Otherwise the NPC's current
/// emotion if the range allows it, then the first allowed emotion, then
/// [`DEFAULT_EMOTION`]. The result is lowercase and never empty.
#[must_use]
pub fn derive_emotion(kb: &dyn KnowledgeBase, npc: &str, trust: Trust) -> String {
    let range: Vec<String> = kb
        .emotional_range(npc)
        .unwrap_or_else(|e| {
            warn!(npc, error = %e, "Emotional range query failed");
            Vec::new()
        })
        .into_iter()
        .filter(|e| !e.trim().is_empty())
        .collect();

    let priority = match trust {
        Trust::Distrustful => NEGATIVE_PRIORITY,
        Trust::Neutral => NEUTRAL_PRIORITY,
        Trust::Trusting => POSITIVE_PRIORITY,
    };

    for candidate in priority {
        if range.iter().any(|e| e.eq_ignore_ascii_case(candidate)) {
            return (*candidate).to_string();
        }
    }

    let current = kb.current_emotion(npc).unwrap_or_else(|e| {
        warn!(npc, error = %e, "Current emotion query failed");
        None
    });
    let allowed =
        |c: &String| range.is_empty() || range.iter().any(|e| e.eq_ignore_ascii_case(c));
    if let Some(current) = current.filter(|c| !c.trim().is_empty() && allowed(c)) {
        return current.to_lowercase();
    }

    range
        .first()
        .map_or_else(|| DEFAULT_EMOTION.to_string(), |e| e.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::WorldKnowledge;

    fn engine() -> TrustEngine {
        TrustEngine::new(Some("Iris".to_string()))
    }

    fn run(engine: &TrustEngine, state: &mut GameState, npc: &str, labels: &[PolitenessLabel]) {
        for label in labels {
            engine.update(state, npc, *label);
        }
    }

    use PolitenessLabel::{Impolite, Neutral, Polite};

    #[test]
    fn gated_npc_needs_three_polite_turns() {
        let engine = engine();
        let mut state = GameState::default();
        run(&engine, &mut state, "Iris", &[Polite, Polite]);
        assert_eq!(state.trust_of("Iris"), Trust::Neutral);
        run(&engine, &mut state, "Iris", &[Polite]);
        assert_eq!(state.trust_of("Iris"), Trust::Trusting);
    }

    #[test]
    fn gated_npc_recovers_from_distrust_after_two() {
        let engine = engine();
        let mut state = GameState::default();
        run(&engine, &mut state, "Iris", &[Impolite, Impolite]);
        assert_eq!(state.trust_of("Iris"), Trust::Distrustful);
        run(&engine, &mut state, "Iris", &[Polite]);
        assert_eq!(state.trust_of("Iris"), Trust::Distrustful);
        run(&engine, &mut state, "Iris", &[Polite]);
        assert_eq!(state.trust_of("Iris"), Trust::Neutral);
    }

    #[test]
    fn two_impolite_turns_snap_from_trusting() {
        let engine = engine();
        let mut state = GameState::default();
        state.trust.insert("Iris".into(), NpcState::with_trust(Trust::Trusting));
        run(&engine, &mut state, "Iris", &[Impolite]);
        assert_eq!(state.trust_of("Iris"), Trust::Trusting);
        run(&engine, &mut state, "Iris", &[Impolite]);
        assert_eq!(state.trust_of("Iris"), Trust::Distrustful);
    }

    #[test]
    fn neutral_breaks_streaks() {
        let engine = engine();
        let mut state = GameState::default();
        run(&engine, &mut state, "Iris", &[Polite, Polite, Neutral, Polite]);
        let npc = state.trust["Iris"];
        assert_eq!(npc.trust, Trust::Neutral);
        assert_eq!(npc.polite_streak, 1);
        assert_eq!(npc.impolite_streak, 0);
    }

    #[test]
    fn streak_keeps_counting_at_ceiling() {
        let engine = engine();
        let mut state = GameState::default();
        run(&engine, &mut state, "Iris", &[Polite; 5]);
        let npc = state.trust["Iris"];
        assert_eq!(npc.trust, Trust::Trusting);
        assert_eq!(npc.polite_streak, 5);
    }

    #[test]
    fn other_npcs_move_directly() {
        let engine = engine();
        let mut state = GameState::default();
        assert_eq!(engine.update(&mut state, "Piper", Polite), Trust::Trusting);
        assert_eq!(engine.update(&mut state, "Piper", Polite), Trust::Trusting);
        assert_eq!(engine.update(&mut state, "Piper", Impolite), Trust::Neutral);
        assert_eq!(engine.update(&mut state, "Piper", Impolite), Trust::Distrustful);
        assert_eq!(engine.update(&mut state, "Piper", Impolite), Trust::Distrustful);
        assert_eq!(state.trust["Piper"].polite_streak, 0);
        assert_eq!(state.trust["Piper"].impolite_streak, 0);
    }

    #[test]
    fn disabled_progressive_makes_gated_npc_direct() {
        let engine = TrustEngine::from_config(&TrustConfig {
            gated_npc: Some("Iris".into()),
            progressive: false,
        });
        let mut state = GameState::default();
        assert_eq!(engine.update(&mut state, "Iris", Polite), Trust::Trusting);
    }

    const WORLD: &str = r#"
        [[npcs]]
        name = "Iris"
        emotional_range = ["Reserved", "Calm", "Friendly"]

        [[npcs]]
        name = "Garrick"
        emotional_range = ["Gruff", "Tired"]
        current_emotion = "Tired"

        [[npcs]]
        name = "Mara"
        emotional_range = ["Wistful"]
        current_emotion = "Furious"

        [[npcs]]
        name = "Orin"
        current_emotion = "Sleepy"

        [[npcs]]
        name = "Piper"
        emotional_range = ["Excited"]

        [[npcs]]
        name = "Ghost"
    "#;

    #[test]
    fn emotion_follows_trust_sign() {
        let kb = WorldKnowledge::from_toml(WORLD).expect("world");
        assert_eq!(derive_emotion(&kb, "Iris", Trust::Neutral), "reserved");
        assert_eq!(derive_emotion(&kb, "Iris", Trust::Trusting), "friendly");
        assert_eq!(derive_emotion(&kb, "Iris", Trust::Distrustful), "reserved");
    }

    #[test]
    fn emotion_fallbacks() {
        let kb = WorldKnowledge::from_toml(WORLD).expect("world");
        assert_eq!(derive_emotion(&kb, "Garrick", Trust::Neutral), "tired");
        assert_eq!(derive_emotion(&kb, "Piper", Trust::Neutral), "excited");
        assert_eq!(derive_emotion(&kb, "Mara", Trust::Neutral), "wistful");
        assert_eq!(derive_emotion(&kb, "Orin", Trust::Distrustful), "sleepy");
        assert_eq!(derive_emotion(&kb, "Ghost", Trust::Neutral), DEFAULT_EMOTION);
        assert_eq!(derive_emotion(&kb, "Nobody", Trust::Trusting), DEFAULT_EMOTION);
    }
}
