//! Integration Tests: scripted console sessions.
//!
//! Drives `run_session` with in-memory input and captures what the player
//! would see.

use std::sync::Arc;

use async_trait::async_trait;
use belfry_core::types::GameState;
use belfry_core::{FactResolver, HeuristicClassifier, TrustEngine, WorldKnowledge};
use belfry_game::Engine;
use belfry_game::console::{SessionEnd, run_session};
use belfry_llm::types::{APOLOGY_TEXT, OFFLINE_TEXT};
use belfry_llm::{
    ChatTurn, LlmError, OfflineProvider, RoleplayPayload, RoleplayProvider, RoleplayReply,
};
use tokio_util::sync::CancellationToken;

const WORLD: &str = include_str!("../assets/clocktower.toml");

struct Unroutable;

#[async_trait]
impl RoleplayProvider for Unroutable {
    async fn roleplay(
        &self,
        _payload: &RoleplayPayload,
        _history: &[ChatTurn],
    ) -> Result<RoleplayReply, LlmError> {
        Err(LlmError::Permanent {
            status: 404,
            message: "No endpoints found for model".into(),
        })
    }

    fn name(&self) -> &'static str {
        "unroutable"
    }
}

fn engine(provider: Arc<dyn RoleplayProvider>) -> Engine {
    Engine::new(
        GameState::default(),
        TrustEngine::new(Some("Iris".into())),
        FactResolver::new(Arc::new(WorldKnowledge::from_toml(WORLD).expect("world"))),
        Arc::new(HeuristicClassifier::new()),
        provider,
    )
}

async fn play(engine: &mut Engine, script: &str) -> (SessionEnd, String) {
    let mut out = Vec::new();
    let end = run_session(engine, script.as_bytes(), &mut out, &CancellationToken::new())
        .await
        .expect("session runs");
    (end, String::from_utf8(out).expect("utf8"))
}

#[tokio::test]
async fn offline_session_until_exit() {
    let mut engine = engine(Arc::new(OfflineProvider));
    let (end, out) = play(&mut engine, "hello Iris\n\n   \n/EXIT\nnever read\n").await;

    assert_eq!(end, SessionEnd::Exit);
    assert!(out.starts_with("=== Belfry: Clocktower ===\nCommands: /state /reset /exit\n"));
    assert!(out.contains(&format!("\nIris> {OFFLINE_TEXT}\n")));
    assert_eq!(out.matches("You> ").count(), 4);
    assert_eq!(engine.state().chat_history.len(), 2);
}

#[tokio::test]
async fn end_of_input_ends_session() {
    let mut engine = engine(Arc::new(OfflineProvider));
    let (end, _) = play(&mut engine, "").await;
    assert_eq!(end, SessionEnd::EndOfInput);
}

#[tokio::test]
async fn commands_report_and_reset() {
    let mut engine = engine(Arc::new(OfflineProvider));
    let (_, out) = play(&mut engine, "could you help, please?\n/state\n/reset\n/dance\n").await;

    assert!(out.contains("\"current_npc\": \"Iris\""));
    assert!(out.contains("\"chat_history_len\": 2"));
    assert!(out.contains("(chat history cleared)"));
    assert!(out.contains("Unknown command."));
    assert!(engine.state().chat_history.is_empty());
    assert_eq!(engine.state().trust["Iris"].polite_streak, 1);
}

#[tokio::test]
async fn ai_failure_keeps_session_alive() {
    let mut engine = engine(Arc::new(Unroutable));
    let (end, out) = play(&mut engine, "where is the emblem?\n/state\n").await;

    assert_eq!(end, SessionEnd::EndOfInput);
    assert!(out.contains("\n(AI error) LLM request rejected (404)"));
    assert!(out.contains(&format!("\nIris> {APOLOGY_TEXT}\n")));
    assert!(out.contains("\"chat_history_len\": 1"));
}

#[tokio::test]
async fn cancelled_token_stops_before_reading() {
    let mut engine = engine(Arc::new(OfflineProvider));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut out = Vec::new();
    let end = run_session(&mut engine, "hello\n".as_bytes(), &mut out, &cancel)
        .await
        .expect("session runs");
    assert_eq!(end, SessionEnd::Cancelled);
    assert!(engine.state().chat_history.is_empty());
}
