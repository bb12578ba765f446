//! Kestrel node.
//!
//! Hosts the state machine in a process: loads configuration, installs
//! logging, opens the configured store, bootstraps the chain and runs a
//! command against it. A fatal error is logged and ends the process with a
//! non-zero status.

mod config;
mod replay;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kestrel_chain::{Application, Phase, QueryRequest};
use kestrel_storage::{MemoryStore, RocksStore, StateStore};

use crate::config::{Backend, NodeConfig};

/// Kestrel state machine node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "kestrel-node")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a JSON-lines blocks file through the block lifecycle
    Replay {
        /// One `{"txs": ["<hex>", ...]}` object per line
        blocks: PathBuf,
    },
    /// Print height, root and size of the latest committed version
    Info,
    /// Look up a key in a committed version
    Query {
        key: String,
        /// Version to read (0 = latest)
        #[arg(long, default_value_t = 0)]
        height: u64,
    },
    /// List the current validator set
    Validators,
    /// List registered accounts and their power
    Accounts,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match NodeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("kestrel-node: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    match run(&config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config: &NodeConfig, command: Command) -> anyhow::Result<()> {
    match config.backend {
        Backend::Memory => {
            info!("using in-memory store");
            execute(boot(MemoryStore::new(config.store.clone()), config)?, command)
        }
        Backend::Rocksdb => {
            info!(path = %config.data_dir.display(), "opening rocksdb store");
            let store = RocksStore::open(&config.data_dir, config.store.clone())
                .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
            execute(boot(store, config)?, command)
        }
    }
}

/// InitChain on a fresh store, otherwise restore the authorization table.
fn boot<S: StateStore>(store: S, config: &NodeConfig) -> anyhow::Result<Application<S>> {
    let genesis = config.genesis_validators()?;
    let mut app = Application::new(store, config.chain.clone());
    if app.phase() == Phase::Uninitialized {
        app.init_chain(&genesis)?;
    } else {
        app.restore_authorization(&genesis)?;
    }
    Ok(app)
}

fn execute<S: StateStore>(mut app: Application<S>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Replay { blocks } => {
            let file = File::open(&blocks)
                .with_context(|| format!("opening blocks file {}", blocks.display()))?;
            let summary = replay::replay(&mut app, BufReader::new(file))?;
            info!(
                blocks = summary.blocks,
                txs = summary.txs,
                rejected = summary.rejected,
                height = summary.height,
                root = %summary.root,
                "replay finished"
            );
        }
        Command::Info => {
            let resp = app.info();
            let out = serde_json::json!({
                "data": resp.data,
                "last_block_height": resp.last_block_height,
                "last_block_app_hash": resp.last_block_app_hash.to_hex(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Query { key, height } => {
            let resp = app.query(&QueryRequest::db_get(&key).at_height(height));
            let out = serde_json::json!({
                "code": resp.code.to_string(),
                "log": resp.log,
                "key": String::from_utf8_lossy(&resp.key),
                "value": String::from_utf8_lossy(&resp.value),
                "index": resp.index,
                "height": resp.height,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Validators => {
            for record in app.validators()? {
                println!("{} {}", record.pub_key.to_hex_upper(), record.power);
            }
        }
        Command::Accounts => {
            for account in app.accounts()? {
                println!("{} {}", account.pub_key.to_hex_upper(), account.power);
            }
        }
    }
    app.store().flush()?;
    Ok(())
}
