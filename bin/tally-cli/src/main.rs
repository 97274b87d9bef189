//! Tally CLI - reconciled reads over a ledger snapshot
//!
//! Loads every store from a JSON snapshot and prints the result of one read
//! as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tally_common::{BalanceScope, Config, MetadataFilter, PageRequest, SortOrder};
use tally_read::{LedgerReader, Ports};
use tally_store::Snapshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "tally-cli")]
#[command(about = "Reconciled reads over a Tally ledger snapshot")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Snapshot file holding the contents of every store
    #[arg(short, long)]
    snapshot: PathBuf,

    /// Organization ID
    #[arg(long)]
    org: Uuid,

    /// Ledger ID
    #[arg(long)]
    ledger: Uuid,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Poll for operations of asynchronously processed transactions
    #[arg(long, env = "TALLY_ASYNC_PROCESSING")]
    async_processing: Option<bool>,

    /// Print read statistics to stderr when done
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct PageArgs {
    /// Page size (defaults to the configured limit)
    #[arg(long)]
    limit: Option<usize>,

    /// Cursor returned by the previous page
    #[arg(long)]
    cursor: Option<String>,

    /// Newest first
    #[arg(long)]
    desc: bool,
}

impl PageArgs {
    fn request(&self, config: &Config) -> PageRequest {
        let mut page = PageRequest::new(self.limit.unwrap_or(config.pagination.default_limit));
        if let Some(cursor) = &self.cursor {
            page = page.with_cursor(cursor.clone());
        }
        if self.desc {
            page = page.with_sort(SortOrder::Desc);
        }
        page
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List balances with in-flight values applied
    Balances {
        /// Only balances of this account
        #[arg(long)]
        account: Option<Uuid>,
        /// Only balances with this alias
        #[arg(long)]
        alias: Option<String>,
    },
    /// Show a transaction with its operations
    Transaction {
        /// Transaction ID
        id: Uuid,
    },
    /// List transactions
    Transactions {
        #[command(flatten)]
        page: PageArgs,
    },
    /// List the operations of a transaction
    Operations {
        /// Transaction ID
        transaction_id: Uuid,
        #[command(flatten)]
        page: PageArgs,
    },
    /// List operation routes
    OperationRoutes {
        #[command(flatten)]
        page: PageArgs,
        /// Metadata condition `key=value`; repeatable
        #[arg(long = "metadata")]
        metadata: Vec<String>,
    },
    /// List transaction routes
    TransactionRoutes {
        #[command(flatten)]
        page: PageArgs,
        /// Metadata condition `key=value`; repeatable
        #[arg(long = "metadata")]
        metadata: Vec<String>,
    },
    /// Show a ledger setting
    Setting {
        /// Setting key
        key: String,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    if args.log_json {
        config.logging.json = true;
    }
    if let Some(async_processing) = args.async_processing {
        config.processing.async_mode = async_processing;
    }
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn metadata_filter(pairs: &[String]) -> Result<Option<MetadataFilter>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let filter = MetadataFilter::parse(pairs.iter().map(String::as_str))
        .map_err(anyhow::Error::msg)?;
    Ok(Some(filter))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: &Args, config: &Config, reader: &LedgerReader, cancel: &CancellationToken) -> Result<()> {
    let (org, ledger) = (args.org, args.ledger);

    match &args.command {
        Commands::Balances { account, alias } => {
            let mut scope = BalanceScope::ledger(org, ledger);
            if let Some(account) = account {
                scope = scope.with_account(*account);
            }
            if let Some(alias) = alias {
                scope = scope.with_alias(alias.clone());
            }
            print_json(&reader.balances(&scope).await?)
        }
        Commands::Transaction { id } => {
            let view = reader.transaction(org, ledger, *id, cancel).await?;
            if view.processing_pending {
                warn!(transaction_id = %id, "Operations still processing, showing partial transaction");
            }
            print_json(&view)
        }
        Commands::Transactions { page } => {
            print_json(&reader.transactions(org, ledger, page.request(config)).await?)
        }
        Commands::Operations { transaction_id, page } => {
            let view = reader
                .transaction_operations(org, ledger, *transaction_id, page.request(config), cancel)
                .await?;
            print_json(&view)
        }
        Commands::OperationRoutes { page, metadata } => {
            let filter = metadata_filter(metadata)?;
            let routes = reader
                .operation_routes(org, ledger, page.request(config), filter.as_ref())
                .await?;
            print_json(&routes)
        }
        Commands::TransactionRoutes { page, metadata } => {
            let filter = metadata_filter(metadata)?;
            let routes = reader
                .transaction_routes(org, ledger, page.request(config), filter.as_ref())
                .await?;
            print_json(&routes)
        }
        Commands::Setting { key } => print_json(&reader.setting(org, ledger, key).await?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config);

    let stores = Snapshot::load(&args.snapshot)
        .with_context(|| format!("loading snapshot {}", args.snapshot.display()))?
        .into_stores();
    info!(snapshot = %args.snapshot.display(), "Loaded snapshot");

    let reader = LedgerReader::new(Ports::from(&stores), &config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight reads");
            on_signal.cancel();
        }
    });

    let result = run(&args, &config, &reader, &cancel).await;

    if args.stats {
        eprintln!("{}", serde_json::to_string_pretty(&reader.stats().snapshot())?);
    }
    result
}
