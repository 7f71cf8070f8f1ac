use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use streamlet::{config, leader, sim};

/// Runs a Streamlet committee for a number of epochs and prints every
/// participant's final chain.
#[derive(Debug, Parser)]
#[command(name = "streamlet", version)]
struct Cli {
    /// JSON config file. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(short = 'n', long)]
    participants: Option<usize>,
    #[arg(short, long)]
    epochs: Option<u64>,
    #[arg(long)]
    txns: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    round_robin: bool,
    /// Emit the full report as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self) -> anyhow::Result<config::Config> {
        let mut config = match &self.config {
            Some(path) => config::Config::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => config::Config::default(),
        };
        if let Some(n) = self.participants {
            config.participants = n;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(txns) = self.txns {
            config.txns_per_epoch = txns;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.round_robin {
            config.schedule = leader::Schedule::RoundRobin;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let report = sim::run(cli.config()?).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    report.check_safety()?;
    Ok(())
}
