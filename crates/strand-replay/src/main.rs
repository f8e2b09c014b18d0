//! Strand replay binary.
//!
//! # Usage
//!
//! ```bash
//! # Replay a captured session with the default configuration
//! strand-replay session.jsonl
//!
//! # Tighter grouping and a visible tombstone
//! strand-replay session.jsonl --adjacency-window-secs 60 --tombstone "(deleted)"
//! ```

use std::{fs::File, io::BufReader, io::Write, path::PathBuf, time::Duration};

use clap::Parser;
use strand_replay::{ReplayError, Rendered, parse_script, replay};
use strand_timeline::{DEFAULT_ADJACENCY_WINDOW, SystemEnv, Timeline, TimelineConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Strand timeline replay
#[derive(Parser, Debug)]
#[command(name = "strand-replay")]
#[command(about = "Replay a JSON-lines session script against a strand timeline")]
#[command(version)]
struct Args {
    /// Path to the script
    script: PathBuf,

    /// Maximum gap in seconds between two grouped messages
    #[arg(long, default_value_t = DEFAULT_ADJACENCY_WINDOW.as_secs())]
    adjacency_window_secs: u64,

    /// Body shown in place of redacted events
    #[arg(long, default_value = "")]
    tombstone: String,

    /// User whose timeline this is
    #[arg(long, default_value = "@me")]
    user: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = TimelineConfig {
        adjacency_window: Duration::from_secs(args.adjacency_window_secs),
        tombstone_body: args.tombstone,
    };
    let timeline =
        Timeline::new(SystemEnv::new(), args.user.as_str(), config).map_err(ReplayError::from)?;

    let file = File::open(&args.script).map_err(ReplayError::from)?;
    let script = parse_script(BufReader::new(file))?;
    tracing::info!(path = %args.script.display(), steps = script.len(), "replaying script");

    let view = replay(timeline, script).await?;

    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", Rendered(&view))?;
    stdout.flush()?;

    Ok(())
}
