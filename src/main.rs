//! Replays collectd-style value lists, one JSON object per line, into a
//! Gnocchi metric store.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use gnocchi_writer::{
    config::Config, event::MeasurementEvent, flusher::Flusher, writer::BatchWriter,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "GNOCCHI_WRITER_CONFIG")]
    config: PathBuf,

    /// Overrides `auth.token` from the configuration file
    #[arg(long, env = "GNOCCHI_WRITER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Read events from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(token) = args.token {
        config.auth.token = token;
    }

    let writer = Arc::new(BatchWriter::from_config(&config)?);
    let flusher = Flusher::spawn(Arc::clone(&writer), config.flush_interval)
        .context("failed to start flusher")?;

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let mut written = 0usize;
    for (number, line) in input.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: MeasurementEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = number + 1, "skipping malformed event: {e}");
                continue;
            }
        };
        match writer.write(&event) {
            Ok(()) => written += 1,
            Err(e) => error!(line = number + 1, "{e}"),
        }
    }

    flusher.shutdown();
    info!(events = written, "input exhausted");
    Ok(())
}
