//! # belfry-game: Clocktower Text Adventure
//!
//! Wires the `belfry-core` pipeline and a `belfry-llm` provider into a
//! playable console session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ console   lines in, NPC lines out            │
//! │   └─ engine   one turn at a time             │
//! │        ├─ PolitenessClassifier (http | heur) │
//! │        ├─ TrustEngine + FactResolver (core)  │
//! │        └─ RoleplayProvider (llm)             │
//! │ settings  layered config → composed Engine   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `engine`: turn sequencing, [`TurnReport`](engine::TurnReport), `/state`
//! - `console`: input parsing and the interactive loop
//! - `politeness`: HTTP politeness classifier
//! - `settings`: configuration layering and startup composition

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod console;
pub mod engine;
pub mod error;
pub mod politeness;
pub mod settings;

pub use engine::{Engine, TurnOutcome, TurnReport};
pub use error::GameError;
