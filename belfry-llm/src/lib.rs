//! # belfry-llm: Roleplay Request Protocol
//!
//! Turns one structured roleplay payload into one well-formed reply, whatever
//! the generative backend does:
//!   - **OpenRouter** chat completions over HTTP, with linear-backoff retries
//!     on transient failures and a distinct error on permanent ones
//!   - **Local worker** process speaking one JSON object per line
//!   - **Offline** stub for running without any backend
//!
//! Replies are repaired leniently: prose is wrapped, JSON buried in prose is
//! dug out, and anything else collapses to an empty object. Callers read the
//! `roleplay` string and treat its absence as "no reply".
//!
//! # Failure policy
//!
//! ```text
//! transient (429/5xx/busy/transport) → retry, delay = unit × attempt
//!                                    → exhausted: apology reply (Ok)
//! permanent (404/no endpoints/other) → LlmError::Permanent (Err), no retry
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod repair;
pub mod types;
pub mod worker;

pub use client::{OfflineProvider, OpenRouterClient, RoleplayOptions, RoleplayProvider};
pub use error::LlmError;
pub use types::{ChatTurn, RoleplayPayload, RoleplayReply};
pub use worker::{LocalWorkerProvider, WorkerOptions, WorkerPort};
