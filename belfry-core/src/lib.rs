//! # Belfry Core Library
//!
//! Game-agnostic turn-processing core for grounded NPC dialogue.
//!
//! A player's free-text utterance flows through:
//!
//! - **Tokens**: [`tokens::extract_tokens`] normalises the utterance into
//!   salient lowercase tokens.
//! - **Trust**: [`trust::TrustEngine`] moves a discrete per-NPC trust score
//!   from a politeness label and derives the NPC's emotional tone.
//! - **Facts**: [`facts::FactResolver`] grounds the tokens against a
//!   [`knowledge::KnowledgeBase`] into a [`facts::FactBundle`] plus a list of
//!   topics it could not ground.
//!
//! Everything here is synchronous and free of I/O apart from loading a world
//! file; the generative call and the session loop live in `belfry-llm` and
//! `belfry-game`.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod facts;
pub mod knowledge;
pub mod politeness;
pub mod tokens;
pub mod trust;
pub mod types;

pub use config::BelfryConfig;
pub use error::{CoreError, KnowledgeError};
pub use facts::{FactBundle, FactResolver, Resolution};
pub use knowledge::{KnowledgeBase, WorldKnowledge};
pub use politeness::{HeuristicClassifier, PolitenessClassifier};
pub use trust::TrustEngine;
pub use types::*;
