// src/bin/tangle-node.rs
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tangle_dag::{SimulationParams, Snapshot, TangleConfig, TangleNode};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use yansi::Paint;

#[derive(Parser)]
#[command(name = "tangle-node", about = "Tangle ledger node CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grow a local tangle by repeated tip selection and attachment
    Simulate {
        /// Number of transactions to attach
        #[arg(long, default_value_t = 1000)]
        transactions: usize,

        /// Walk bias toward heavier branches (overrides TANGLE_ALPHA)
        #[arg(long)]
        alpha: Option<f64>,

        /// Walks per selection (overrides TANGLE_WALK_COUNT)
        #[arg(long)]
        walks: Option<usize>,

        /// Master RNG seed (overrides TANGLE_RNG_SEED)
        #[arg(long)]
        seed: Option<u64>,

        /// Snapshot file to seed the ledger from (overrides TANGLE_SNAPSHOT_PATH)
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Check a snapshot file and export its ledger state
    LedgerState {
        #[arg(long)]
        snapshot: PathBuf,

        /// Directory for the ledgerState-<index> file
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn banner() {
    let name = r#"
 _____  _   _  _  ___  _     ___
|_   _|/ \ | \| |/ __|| |   | __|
  | | / _ \| .` | (_ || |__ | _|
  |_|/_/ \_\_|\_|\___||____||___|
"#;
    println!("{}", Paint::cyan(name).bold());
    println!(
        "{} {}",
        Paint::green("Tangle Node").bold(),
        Paint::white("- local tangle simulator and ledger tools").dimmed()
    );
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    banner();

    match cli.command {
        Commands::Simulate { transactions, alpha, walks, seed, snapshot } => {
            let mut config = TangleConfig::from_env()?;
            if let Some(alpha) = alpha {
                config.alpha = alpha;
            }
            if let Some(walks) = walks {
                config.walk_count = walks;
            }
            if seed.is_some() {
                config.rng_seed = seed;
            }
            if snapshot.is_some() {
                config.snapshot_path = snapshot;
            }
            simulate(config, transactions).await?;
        }

        Commands::LedgerState { snapshot, out } => {
            let Some(loaded) = Snapshot::load(&snapshot)? else {
                bail!("snapshot file {} does not exist", snapshot.display());
            };
            if !loaded.state.is_consistent() {
                bail!("snapshot {} holds negative balances", snapshot.display());
            }
            if !loaded.state.has_correct_supply() {
                warn!("snapshot balances do not add up to the total supply");
            }
            let path = loaded.state.write_ledger_state(&out)?;
            println!(
                "{} {} (fingerprint {})",
                Paint::green("[ok]").bold(),
                path.display(),
                loaded.fingerprint()
            );
        }
    }

    Ok(())
}

async fn simulate(config: TangleConfig, transactions: usize) -> anyhow::Result<()> {
    let node = Arc::new(TangleNode::new(config)?);
    let cancel = CancellationToken::new();

    println!(
        "{} {} transactions, alpha {}, {} walk(s)",
        Paint::blue("[simulate]").bold(),
        transactions,
        node.config().alpha,
        node.config().walk_count
    );

    let worker = {
        let node = node.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            node.simulate(SimulationParams { transactions }, &cancel)
        })
    };
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping simulation");
                cancel.cancel();
            }
        })
    };

    let report = worker.await.context("simulation task panicked")??;
    watcher.abort();

    if report.cancelled {
        println!("{}", Paint::yellow("[warn] simulation interrupted, partial report follows"));
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
