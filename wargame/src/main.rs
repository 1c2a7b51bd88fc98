//! Wargame terminal front-end.
//!
//! Runs a scenario on stdin/stdout with Claude as the umpire. Logs go to
//! stderr so stdout stays a clean transcript.
//!
//! ```bash
//! cargo run -p wargame -- --topic "Defence of the river crossing" \
//!     --player "Alice:Blue force commander" --player "Bob:Red force commander"
//! ```

mod headless;

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wargame_core::{PlayerRef, ScenarioSession, SessionConfig};

const DEFAULT_LOG_FILTER: &str = "wargame=info,wargame_core=info";

#[derive(Debug, Parser)]
#[command(name = "wargame", version, about = "Run a narrative wargame with an AI umpire")]
struct Args {
    /// What the scenario is about
    #[arg(long)]
    topic: Option<String>,

    /// A participant as "Name:role description" (repeatable)
    #[arg(long = "player", value_name = "NAME:ROLE")]
    players: Vec<String>,

    /// Resume a saved scenario instead of starting a new one
    #[arg(long, value_name = "PATH", conflicts_with = "topic")]
    load: Option<PathBuf>,

    /// Seed for outcome sampling
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_player(id: u64, arg: &str) -> anyhow::Result<PlayerRef> {
    let (name, role) = arg
        .split_once(':')
        .with_context(|| format!("player `{arg}` should look like Name:role"))?;
    let (name, role) = (name.trim(), role.trim());
    if name.is_empty() || role.is_empty() {
        bail!("player `{arg}` needs both a name and a role");
    }
    Ok(PlayerRef::new(id, name, role))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let players = args
        .players
        .iter()
        .enumerate()
        .map(|(i, arg)| parse_player(i as u64 + 1, arg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut config = SessionConfig::new(args.topic.clone().unwrap_or_default())
        .with_players(players)
        .from_env();
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let oracle = config.claude_oracle().context(
        "set ANTHROPIC_API_KEY in a .env file or with: export ANTHROPIC_API_KEY=your_key_here",
    )?;

    let session = match &args.load {
        Some(path) => ScenarioSession::load(path, &config, oracle.clone())
            .await
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            if args.topic.is_none() {
                bail!("either --topic (with at least one --player) or --load is required");
            }
            eprintln!("Briefing the umpire...");
            ScenarioSession::start(config.clone(), oracle.clone())
                .await
                .context("failed to start scenario")?
        }
    };

    headless::run_headless(session, config, oracle).await
}
