use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use kadmos_core::config::Config;
use kadmos_core::core_dht::{
    DhtContext, DhtKey, Scheduler, SimpleStorableModel, Storable, ValueType, Version,
};
use kadmos_core::logging::{init_logging_with_config, LogLevel};
use kadmos_core::metrics::init_metrics;
use tracing::{info, warn};

mod loopback;

use loopback::LoopbackNetwork;

#[derive(Parser, Debug)]
#[command(name = "kadmos")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Extra `target=level` log filter, may be repeated
    #[arg(long = "log-directive")]
    log_directives: Vec<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML configuration file. Without it, defaults and KADMOS_* variables apply.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration as TOML
    Config,
    /// Check a configuration file
    Validate {
        path: PathBuf,
    },
    /// Publish values into an in-process overlay and report the outcome
    Demo {
        /// How long to keep the node running, in seconds
        #[arg(short, long, default_value_t = 3)]
        seconds: u64,

        /// Number of peers in the overlay
        #[arg(short, long, default_value_t = 16)]
        peers: usize,

        /// Number of values the local node owns
        #[arg(short, long, default_value_t = 5)]
        values: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Config::from_env().context("invalid KADMOS_* environment configuration"),
    }
}

async fn run_demo(config: Config, seconds: u64, peers: usize, values: usize) -> Result<()> {
    let network = Arc::new(LoopbackNetwork::new(peers, &config.dht));
    let ctx = DhtContext::new(config.dht, network.clone(), network.clone(), Scheduler::current())?;

    let model = Arc::new(SimpleStorableModel::new());
    ctx.models().register(ValueType::text(), model.clone())?;

    let mut storables = Vec::with_capacity(values);
    for i in 0..values {
        let payload = format!("value number {}", i);
        let value = ctx.value_factories().create(
            &ValueType::text(),
            Version::new(1, 0),
            payload.as_bytes(),
        )?;
        let storable = Arc::new(Storable::new(DhtKey::hash_string(&format!("demo-{}", i)), value));
        model.add(storable.clone());
        storables.push(storable);
    }

    ctx.start();
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    ctx.stop();

    for storable in &storables {
        match storable.publish_time() {
            Some(at) => {
                let ago = SystemTime::now().duration_since(at).unwrap_or_default();
                info!(
                    key = %storable.primary_key(),
                    locations = storable.location_count(),
                    ago = ?ago,
                    "Published"
                );
            }
            None => warn!(key = %storable.primary_key(), "Never published"),
        }
    }

    for peer in network.peers() {
        let stats = peer.database.stats()?;
        info!(peer = %peer.contact, keys = stats.keys, values = stats.values, "Peer database");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_ref())?;
    if let Some(level) = &args.log_level {
        config.logging.level = match level.parse::<LogLevel>() {
            Ok(level) => level,
            Err(e) => {
                eprintln!("{}, using '{}'", e, config.logging.level);
                config.logging.level
            }
        };
    }
    config.logging.directives.extend(args.log_directives.iter().cloned());
    if args.json_logs {
        config.logging.json_format = true;
    }

    init_logging_with_config(config.logging.clone())?;
    init_metrics();

    match args.command {
        Some(Command::Config) => {
            println!("{}", config.to_toml()?);
        }
        Some(Command::Validate { path }) => {
            Config::from_file(&path)?;
            println!("{} is valid", path.display());
        }
        Some(Command::Demo { seconds, peers, values }) => {
            info!(seconds, peers, values, "Starting loopback demo");
            run_demo(config, seconds, peers, values).await?;
        }
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}
