//! Layered configuration and startup composition.
//!
//! Precedence, lowest first:
//!
//! ```text
//! built-in defaults
//!   < OPENROUTER_API_KEY / OPENROUTER_MODEL
//!   < belfry.toml (optional)
//!   < BELFRY_<SECTION>__<KEY>   e.g. BELFRY_AI__MAX_RETRIES=4
//! ```
//!
//! [`compose`] then picks one classifier and one roleplay provider from the
//! result. Nothing here is global; the engine receives everything it needs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use belfry_core::config::{AiConfig, AiMode, PolitenessConfig, PolitenessMode};
use belfry_core::types::GameState;
use belfry_core::{
    BelfryConfig, FactResolver, HeuristicClassifier, PolitenessClassifier, TrustEngine,
    WorldKnowledge,
};
use belfry_llm::{
    LocalWorkerProvider, OfflineProvider, OpenRouterClient, RoleplayOptions, RoleplayProvider,
    WorkerOptions,
};
use config::{Config, Environment, File, FileFormat};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::Result;
use crate::politeness::HttpPolitenessClassifier;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "BELFRY";
/// Conventional variable holding the remote API key.
pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
/// Conventional variable holding the remote model id.
pub const OPENROUTER_MODEL: &str = "OPENROUTER_MODEL";

/// Build the configuration from `path` (if given) and `env`.
///
/// A missing file is not an error; a malformed one is.
///
/// # Errors
/// Returns `GameError::Config` if a source cannot be read or the merged
/// values do not fit [`BelfryConfig`].
pub fn load(path: Option<&Path>, env: &HashMap<String, String>) -> Result<BelfryConfig> {
    let mut builder = Config::builder();

    if let Some(key) = env.get(OPENROUTER_API_KEY).filter(|v| !v.trim().is_empty()) {
        builder = builder.set_default("ai.api_key", key.as_str())?;
    }
    if let Some(model) = env.get(OPENROUTER_MODEL).filter(|v| !v.trim().is_empty()) {
        builder = builder.set_default("ai.model", model.as_str())?;
    }

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
    }

    let config: BelfryConfig = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        )
        .build()?
        .try_deserialize()?;

    Ok(config)
}

/// Pick the politeness classifier named by `config.mode`.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built.
pub fn build_classifier(config: &PolitenessConfig) -> Result<Arc<dyn PolitenessClassifier>> {
    Ok(match config.mode {
        PolitenessMode::Http => {
            info!(url = %config.url, "Using politeness service");
            Arc::new(HttpPolitenessClassifier::new(
                &config.url,
                config.timeout_ms,
                config.retry_delay_ms,
            )?)
        }
        PolitenessMode::Heuristic => {
            info!("Using heuristic politeness classifier");
            Arc::new(HeuristicClassifier::new())
        }
    })
}

/// Whether the offline stub replaces the configured provider.
///
/// True when asked for explicitly, or when the remote mode has no key.
#[must_use]
pub fn use_offline(config: &AiConfig) -> bool {
    config.offline
        || config.mode == AiMode::Offline
        || (config.mode == AiMode::OpenRouter && config.api_key.trim().is_empty())
}

/// Pick the roleplay provider named by `config.mode`.
///
/// # Errors
/// Returns an error if the local worker cannot be started.
pub fn build_provider(
    config: &AiConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn RoleplayProvider>> {
    if use_offline(config) {
        if config.mode == AiMode::OpenRouter && !config.offline && config.api_key.trim().is_empty() {
            warn!("No API key configured, replies come from the offline stub");
        }
        return Ok(Arc::new(OfflineProvider));
    }

    Ok(match config.mode {
        AiMode::Local => {
            let options = WorkerOptions {
                max_new_tokens: config.worker.max_new_tokens,
                temperature: config.temperature,
                history_max_messages: config.history_max_messages,
                ..WorkerOptions::default()
            };
            Arc::new(LocalWorkerProvider::spawn(
                &config.worker.program,
                &config.worker.args,
                options,
            )?)
        }
        AiMode::OpenRouter | AiMode::Offline => {
            let options = RoleplayOptions {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                max_retries: config.max_retries,
                backoff_ms: config.backoff_ms,
                history_max_messages: config.history_max_messages,
                ..RoleplayOptions::default()
            };
            info!(model = %options.model, endpoint = %config.endpoint, "Using OpenRouter");
            Arc::new(
                OpenRouterClient::http(
                    config.endpoint.clone(),
                    config.api_key.clone(),
                    config.request_timeout_ms,
                    options,
                )?
                .with_cancellation(cancel),
            )
        }
    })
}

/// Load the world and wire every collaborator into an [`Engine`].
///
/// # Errors
/// Returns an error if the world file is unusable or a collaborator cannot
/// be built.
pub fn compose(config: &BelfryConfig, cancel: CancellationToken) -> Result<Engine> {
    let world = WorldKnowledge::from_file(&config.knowledge.world_file)?;
    info!(
        world = %config.knowledge.world_file.display(),
        items = world.item_count(),
        puzzles = world.puzzle_count(),
        "World loaded"
    );

    let classifier = build_classifier(&config.politeness)?;
    let provider = build_provider(&config.ai, cancel.clone())?;

    Ok(Engine::new(
        GameState::new(&config.game),
        TrustEngine::from_config(&config.trust),
        FactResolver::new(Arc::new(world)),
        classifier,
        provider,
    )
    .with_cancellation(cancel))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn no_sources_gives_defaults() {
        let config = load(None, &HashMap::new()).expect("defaults");
        assert_eq!(config.game.start_npc, "Iris");
        assert_eq!(config.ai.max_retries, 2);
        assert!(config.ai.api_key.is_empty());
        assert!(use_offline(&config.ai));
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("belfry.toml");
        std::fs::write(&path, "[ai]\nmax_retries = 3\nbackoff_ms = 100\n").expect("write");

        let config = load(Some(&path), &env(&[("BELFRY_AI__MAX_RETRIES", "4")])).expect("load");
        assert_eq!(config.ai.max_retries, 4);
        assert_eq!(config.ai.backoff_ms, 100);
    }

    #[test]
    fn openrouter_variables_fill_key_and_model() {
        let vars = env(&[("OPENROUTER_API_KEY", "sk-env"), ("OPENROUTER_MODEL", "vendor/model")]);
        let config = load(None, &vars).expect("load");
        assert_eq!(config.ai.api_key, "sk-env");
        assert_eq!(config.ai.model, "vendor/model");
        assert!(!use_offline(&config.ai));
    }

    #[test]
    fn file_key_beats_openrouter_variable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("belfry.toml");
        std::fs::write(&path, "[ai]\napi_key = \"sk-file\"\n").expect("write");

        let config = load(Some(&path), &env(&[("OPENROUTER_API_KEY", "sk-env")])).expect("load");
        assert_eq!(config.ai.api_key, "sk-file");
    }

    #[test]
    fn missing_file_is_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load(Some(&dir.path().join("absent.toml")), &HashMap::new()).expect("load");
        assert_eq!(config.game.start_location, "library");
    }

    #[test]
    fn offline_selection() {
        let mut ai = AiConfig {
            api_key: "sk".into(),
            ..AiConfig::default()
        };
        assert!(!use_offline(&ai));
        ai.offline = true;
        assert!(use_offline(&ai));
        ai.offline = false;
        ai.mode = AiMode::Offline;
        assert!(use_offline(&ai));
        ai.mode = AiMode::Local;
        ai.api_key.clear();
        assert!(!use_offline(&ai));
    }

    #[tokio::test]
    async fn keyless_remote_mode_composes_offline() {
        let provider =
            build_provider(&AiConfig::default(), CancellationToken::new()).expect("provider");
        assert_eq!(provider.name(), "offline");
    }
}
