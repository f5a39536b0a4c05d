//! `belfry`: talk to the clocktower NPCs from a terminal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use belfry_game::console::{self, SessionEnd};
use belfry_game::settings;
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "belfry", version, about = "Grounded, trust-aware NPC dialogue")]
struct Args {
    /// Configuration file (TOML).
    #[arg(short, long, env = "BELFRY_CONFIG", default_value = "belfry.toml")]
    config: PathBuf,

    /// World file, overriding `knowledge.world_file`.
    #[arg(short, long)]
    world: Option<PathBuf>,

    /// Use the offline stub instead of any roleplay backend.
    #[arg(long)]
    offline: bool,

    /// Use the built-in politeness heuristic instead of the service.
    #[arg(long)]
    heuristic: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env: HashMap<String, String> = std::env::vars().collect();
    let mut config = settings::load(Some(&args.config), &env)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(world) = args.world {
        config.knowledge.world_file = world;
    }
    if args.offline {
        config.ai.offline = true;
    }
    if args.heuristic {
        config.politeness.mode = belfry_core::config::PolitenessMode::Heuristic;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    let end = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, ending session");
                on_signal.cancel();
            }
        });

        let mut engine = settings::compose(&config, cancel.clone()).context("starting session")?;
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = std::io::stdout();
        let end = console::run_session(&mut engine, stdin, &mut stdout, &cancel).await?;
        anyhow::Ok(end)
    })?;

    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_millis(200));

    if end == SessionEnd::Cancelled {
        println!();
    }
    info!(?end, "Session ended");
    Ok(())
}
