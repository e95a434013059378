//! fragctl: inspect and edit the Fragstore shard directory.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fragstore_common::{telemetry, Config, ShardId};
use fragstore_storage::{clean, resolve, FragmentationDirectory};

#[derive(Parser, Debug)]
#[command(name = "fragctl")]
#[command(author, version, about = "Fragstore shard directory tool", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "FRAGSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage base directory, overrides the config file
    #[arg(long, env = "FRAGSTORE_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Log filter, overrides the config file
    #[arg(long, env = "FRAGSTORE_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assign keys to a shard, overwriting existing assignments
    Add {
        #[arg(allow_negative_numbers = true)]
        shard: i64,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Print the shard owning a key
    Get { key: String },
    /// Print whether a key has an assignment
    Exists { key: String },
    /// Reassign an existing key
    Update {
        key: String,
        #[arg(allow_negative_numbers = true)]
        shard: i64,
    },
    /// Remove an existing key's assignment
    Remove { key: String },
    /// List assignments
    List {
        /// Only keys owned by this shard
        #[arg(long, allow_negative_numbers = true)]
        shard: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Resolve a storage location, creating its namespace directory
    Resolve {
        #[arg(required = true, num_args = 2..)]
        components: Vec<String>,
    },
    /// Normalize a path without touching the filesystem
    Clean { path: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    telemetry::init_logging(&config.logging)?;
    tracing::debug!("Using storage config: {:?}", config.storage);

    let stdout = std::io::stdout();
    run(cli.command, &config, &mut stdout.lock())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(base_dir) = &cli.base_dir {
        config.storage.base_dir = base_dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

fn run(command: Commands, config: &Config, out: &mut impl Write) -> anyhow::Result<()> {
    let directory = FragmentationDirectory::open(&config.storage);

    match command {
        Commands::Add { shard, keys } => {
            let assigned = directory
                .add(shard, &keys)
                .with_context(|| format!("adding {} keys to shard {}", keys.len(), shard))?;
            writeln!(out, "assigned {} keys to shard {}", assigned, shard)?;
        }
        Commands::Get { key } => {
            let shard = directory.get(&key).with_context(|| format!("looking up {}", key))?;
            writeln!(out, "{}", shard)?;
        }
        Commands::Exists { key } => {
            writeln!(out, "{}", directory.exists(&key)?)?;
        }
        Commands::Update { key, shard } => {
            directory
                .update(&key, shard)
                .with_context(|| format!("reassigning {}", key))?;
            writeln!(out, "{} -> {}", key, shard)?;
        }
        Commands::Remove { key } => {
            directory
                .remove(&key)
                .with_context(|| format!("removing {}", key))?;
            writeln!(out, "removed {}", key)?;
        }
        Commands::List { shard, json } => {
            let mut assignments = directory.assignments()?;
            if let Some(shard) = shard.map(ShardId::new) {
                assignments.retain(|a| a.shard == shard);
            }
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&assignments)?)?;
            } else {
                for a in &assignments {
                    writeln!(out, "{}\t{}", a.key, a.shard)?;
                }
            }
        }
        Commands::Resolve { components } => {
            writeln!(out, "{}", resolve(&components)?.display())?;
        }
        Commands::Clean { path } => {
            writeln!(out, "{}", clean(&path))?;
        }
    }
    directory.pool().flush_all()?;
    Ok(())
}
