//! Configuration for the belfry dialogue loop.
//!
//! Maps directly to `belfry.toml`. Every field has a default so an empty file
//! (or no file at all) yields the clocktower demo setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BelfryConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Opening game state.
    #[serde(default)]
    pub game: GameConfig,
    /// Trust state machine settings.
    #[serde(default)]
    pub trust: TrustConfig,
    /// Knowledge base source.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    /// Politeness classifier selection.
    #[serde(default)]
    pub politeness: PolitenessConfig,
    /// Generative roleplay service settings.
    #[serde(default)]
    pub ai: AiConfig,
}

impl BelfryConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::CoreError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Opening state of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Location the player starts in.
    #[serde(default = "default_start_location")]
    pub start_location: String,
    /// NPC the player starts talking to.
    #[serde(default = "default_start_npc")]
    pub start_npc: String,
    /// NPCs tracked in the trust map from the start.
    #[serde(default = "default_npcs")]
    pub npcs: Vec<String>,
    /// Inventory item ids, all initially not carried.
    #[serde(default = "default_inventory")]
    pub inventory: Vec<String>,
    /// Story flags, all initially unset.
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            start_location: default_start_location(),
            start_npc: default_start_npc(),
            npcs: default_npcs(),
            inventory: default_inventory(),
            flags: default_flags(),
        }
    }
}

/// Trust state machine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// The one NPC whose trust follows the streak-gated progressive policy.
    #[serde(default = "default_gated_npc")]
    pub gated_npc: Option<String>,
    /// Whether the progressive policy is active for the gated NPC.
    #[serde(default = "default_true")]
    pub progressive: bool,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            gated_npc: default_gated_npc(),
            progressive: true,
        }
    }
}

/// Where the knowledge base is loaded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Path to the TOML world file.
    #[serde(default = "default_world_file")]
    pub world_file: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            world_file: default_world_file(),
        }
    }
}

/// Which politeness classifier to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolitenessMode {
    /// Remote classifier service.
    #[serde(alias = "python")]
    Http,
    /// Built-in keyword heuristic.
    Heuristic,
}

/// Politeness classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolitenessConfig {
    /// Classifier selection.
    #[serde(default = "default_politeness_mode")]
    pub mode: PolitenessMode,
    /// Base URL of the classifier service.
    #[serde(default = "default_politeness_url")]
    pub url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_5000")]
    pub timeout_ms: u64,
    /// Pause before the single retry, in milliseconds.
    #[serde(default = "default_120")]
    pub retry_delay_ms: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            mode: PolitenessMode::Http,
            url: default_politeness_url(),
            timeout_ms: 5000,
            retry_delay_ms: 120,
        }
    }
}

/// Which roleplay provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
    /// Remote chat-completions service.
    #[serde(alias = "open_router")]
    OpenRouter,
    /// Persistent local worker process speaking a line protocol.
    #[serde(alias = "mistral_local")]
    Local,
    /// Canned stub reply, no network.
    Offline,
}

/// Generative roleplay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Provider selection.
    #[serde(default = "default_ai_mode")]
    pub mode: AiMode,
    /// Force the offline stub regardless of `mode`.
    #[serde(default)]
    pub offline: bool,
    /// Chat-completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key for the remote service.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Retries after the first attempt on transient failures.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// Linear backoff unit in milliseconds (delay = unit × attempt).
    #[serde(default = "default_500")]
    pub backoff_ms: u64,
    /// Trailing history messages sent with each request.
    #[serde(default = "default_6")]
    pub history_max_messages: usize,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_60000")]
    pub request_timeout_ms: u64,
    /// Maximum tokens to generate.
    #[serde(default = "default_256")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_0_6")]
    pub temperature: f32,
    /// Local worker process settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            mode: AiMode::OpenRouter,
            offline: false,
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            max_retries: 2,
            backoff_ms: 500,
            history_max_messages: 6,
            request_timeout_ms: 60_000,
            max_tokens: 256,
            temperature: 0.6,
            worker: WorkerConfig::default(),
        }
    }
}

/// Local worker process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Interpreter or executable to launch.
    #[serde(default = "default_python")]
    pub program: String,
    /// Arguments, typically the worker script path.
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
    /// `max_new_tokens` sent with each request.
    #[serde(default = "default_256")]
    pub max_new_tokens: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_python(),
            args: default_worker_args(),
            max_new_tokens: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_start_location() -> String { "library".to_string() }
fn default_start_npc() -> String { "Iris".to_string() }
fn default_gated_npc() -> Option<String> { Some("Iris".to_string()) }
fn default_npcs() -> Vec<String> {
    ["Iris", "Piper", "Garrick"].iter().map(ToString::to_string).collect()
}
fn default_inventory() -> Vec<String> {
    ["oil_can", "emblem", "scrap_metal", "winding_key", "gear_left", "gear_right"]
        .iter()
        .map(ToString::to_string)
        .collect()
}
fn default_flags() -> Vec<String> {
    [
        "booksSolved",
        "gateUnlocked",
        "cratesSolved",
        "forgeDone",
        "barrier_Iris",
        "barrier_Piper",
        "barrier_Garrick",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}
fn default_world_file() -> PathBuf { PathBuf::from("belfry-game/assets/clocktower.toml") }
fn default_politeness_mode() -> PolitenessMode { PolitenessMode::Http }
fn default_politeness_url() -> String { "http://localhost:8001".to_string() }
fn default_ai_mode() -> AiMode { AiMode::OpenRouter }
fn default_endpoint() -> String { "https://openrouter.ai/api/v1/chat/completions".to_string() }
fn default_model() -> String { "deepseek/deepseek-r1-0528:free".to_string() }
fn default_python() -> String { "python".to_string() }
fn default_worker_args() -> Vec<String> { vec!["mistral_server.py".to_string()] }
fn default_0_6() -> f32 { 0.6 }
fn default_2() -> u32 { 2 }
fn default_6() -> usize { 6 }
fn default_120() -> u64 { 120 }
fn default_256() -> u32 { 256 }
fn default_500() -> u64 { 500 }
fn default_5000() -> u64 { 5000 }
fn default_60000() -> u64 { 60_000 }
