use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sitecoord::app::{init_logging, AppConfig};
use sitecoord::config::SiteConfig;
use sitecoord::coordination::Status;
use sitecoord::shuffle::{PassThroughShuffle, ShuffleSink, ShuffleWorker};
use sitecoord::site::simulation::{run_transaction, Outcome};
use sitecoord::site::Site;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Node-local Map-phase coordination for partitioned transactions
#[derive(Parser)]
#[command(name = "sitecoord")]
#[command(about = "Run and inspect node-local MapReduce transaction coordination", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate Map phases on a site and print each delivered response as JSON
    Simulate {
        /// Path to a site configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Number of transactions to run
        #[arg(short = 'n', long, default_value = "1")]
        transactions: u32,

        /// Abort every transaction after this many partitions completed
        #[arg(long)]
        abort_after: Option<usize>,

        /// Seconds to wait for each Map response
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
    /// Validate a site configuration file
    CheckConfig {
        /// Path to the configuration file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&AppConfig::new(cli.verbose));

    let result = match cli.command {
        Commands::Simulate {
            config,
            transactions,
            abort_after,
            timeout,
        } => {
            simulate(
                config,
                transactions,
                abort_after,
                Duration::from_secs(timeout),
            )
            .await
        }
        Commands::CheckConfig { path } => check_config(path),
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn simulate(
    config: Option<PathBuf>,
    transactions: u32,
    abort_after: Option<usize>,
    timeout: Duration,
) -> Result<()> {
    let config = match config {
        Some(path) => SiteConfig::load(&path)
            .with_context(|| format!("loading site configuration {}", path.display()))?,
        None => SiteConfig::default(),
    };

    let shuffle: Option<Arc<dyn ShuffleSink>> = if config.shuffle.enabled {
        let handler = PassThroughShuffle::new(Duration::from_millis(config.shuffle.simulated_work_ms));
        Some(Arc::new(ShuffleWorker::spawn(Arc::new(handler))))
    } else {
        None
    };
    let site = Arc::new(Site::from_config(&config, shuffle));

    let outcome = match abort_after {
        Some(after) => Outcome::AbortAfter {
            after,
            status: Status::Aborted,
        },
        None => Outcome::Complete,
    };

    for txn_id in 1..=i64::from(transactions) {
        let response = run_transaction(site.clone(), txn_id, outcome, timeout).await?;
        println!("{}", serde_json::to_string(&response)?);
    }

    let metrics = site.pool_metrics();
    info!(
        "Simulation finished: {} coordinators created, {} reused",
        metrics.total_created, metrics.reuse_count
    );
    Ok(())
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = SiteConfig::load(&path)?;
    println!(
        "Site {}: {} local partitions {:?}, pool size {}, shuffle {}",
        config.site_id,
        config.local_partitions.len(),
        config.local_partitions,
        config.pool_size,
        if config.shuffle.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}
