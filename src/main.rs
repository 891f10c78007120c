//! timeshare-ledger - master schedule and trade ledger tool
//!
//! Every subcommand except `index` works against MongoDB and prints JSON
//! on stdout. Logs go to stderr.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeshare_ledger::{
    auth::{extract_token_from_header, RequestIdentity},
    build_ownership_index,
    config::Args,
    db::{MongoClient, MongoScheduleStore},
    notify::{self, AuditLogNotifier, LogNotifier, Notifier},
    types::parse_object_id,
    FinalizeAction, FinalizeTradeRequest, Schedule, TradeEngine, TradeRequest,
};

#[derive(Parser, Debug)]
#[command(name = "timeshare-ledger")]
#[command(about = "Master schedule ownership and trade ledger")]
struct Cli {
    #[command(flatten)]
    args: Args,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the ownership index of a generated schedule and summarize it
    Index {
        /// Generated schedule (JSON)
        schedule: PathBuf,
    },
    /// Commit a generated schedule as a group's master schedule
    Commit {
        #[arg(long)]
        group: String,
        #[arg(long, env = "LEDGER_TOKEN")]
        token: String,
        /// Generated schedule (JSON)
        schedule: PathBuf,
    },
    /// Propose a trade
    Propose {
        #[arg(long, env = "LEDGER_TOKEN")]
        token: String,
        /// Trade request (JSON)
        trade: PathBuf,
    },
    /// Accept, decline or cancel a trade
    Finalize {
        #[arg(long, env = "LEDGER_TOKEN")]
        token: String,
        #[arg(long)]
        schedule: String,
        #[arg(long)]
        trade: String,
        /// accept, decline (executor) or cancel (initiator)
        #[arg(long)]
        action: FinalizeAction,
    },
    /// List the caller's trades across their groups
    Trades {
        #[arg(long, env = "LEDGER_TOKEN")]
        token: String,
    },
    /// Issue a token for a user id (for tooling and local testing)
    Token {
        #[arg(long)]
        user: String,
        /// Token lifetime in seconds
        #[arg(long, default_value = "3600")]
        expiry_secs: u64,
    },
}

#[derive(Serialize)]
struct IndexSummary {
    units: usize,
    owners: BTreeMap<String, usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let args = cli.args;

    init_tracing(&args);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    match cli.command {
        Command::Index { schedule } => {
            let schedule = read_json::<Schedule>(&schedule)?;
            let index = build_ownership_index(&schedule)?;
            let mut owners = BTreeMap::new();
            for (_, unit) in index.iter() {
                *owners.entry(unit.owner.clone()).or_insert(0) += 1;
            }
            print_json(&IndexSummary {
                units: index.len(),
                owners,
            })
        }
        Command::Token { user, expiry_secs } => {
            let user_id = parse_object_id(&user, "user")?;
            let token = args
                .identity_verifier()?
                .with_expiry(expiry_secs)
                .issue(&user_id)?;
            println!("{}", token);
            Ok(())
        }
        command => run_against_store(&args, command).await,
    }
}

fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("timeshare_ledger={},info", args.log_level).into());
    let json = args
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let plain = (!args.log_json)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

async fn run_against_store(args: &Args, command: Command) -> anyhow::Result<()> {
    let verifier = args.identity_verifier()?;
    let identify = |token: &str| -> anyhow::Result<RequestIdentity> {
        let raw = extract_token_from_header(Some(token)).ok_or_else(|| anyhow!("empty token"))?;
        Ok(verifier.verify(raw)?)
    };

    let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db, args.store_timeout_ms)
        .await
        .context("MongoDB connection failed")?;
    let store = Arc::new(MongoScheduleStore::new(mongo).await?);

    let notifier: Arc<dyn Notifier> = match &args.audit_log {
        Some(path) => Arc::new(AuditLogNotifier::open(path)?),
        None => Arc::new(LogNotifier),
    };
    let (queue, dispatcher) = notify::spawn_dispatcher(args.notification_queue, notifier);
    let engine = TradeEngine::new(store, args.engine_config()).with_notifications(queue);
    info!(mode = ?args.concurrency_mode, unknown_units = ?args.unknown_units, "engine ready");

    let result: anyhow::Result<()> = async {
        match command {
            Command::Commit {
                group,
                token,
                schedule,
            } => {
                let identity = identify(&token)?;
                let group_id = parse_object_id(&group, "group")?;
                let schedule = read_json::<Schedule>(&schedule)?;
                let master = engine
                    .commit_master_schedule(schedule, &group_id, &identity)
                    .await?;
                print_json(&master)
            }
            Command::Propose { token, trade } => {
                let identity = identify(&token)?;
                let request = read_json::<TradeRequest>(&trade)?;
                let trade = engine.submit_trade(&request, &identity).await?;
                print_json(&trade)
            }
            Command::Finalize {
                token,
                schedule,
                trade,
                action,
            } => {
                let identity = identify(&token)?;
                let request = FinalizeTradeRequest::new(
                    parse_object_id(&schedule, "schedule")?,
                    parse_object_id(&trade, "trade")?,
                    action,
                );
                let status = engine.finalize_trade(&request, &identity).await?;
                print_json(&serde_json::json!({ "tradeId": trade, "status": status }))
            }
            Command::Trades { token } => {
                let identity = identify(&token)?;
                let trades = engine.user_trades(&identity).await?;
                print_json(&trades)
            }
            Command::Index { .. } | Command::Token { .. } => Ok(()),
        }
    }
    .await;

    // Dropping the engine closes the queue; wait for pending notifications
    drop(engine);
    if let Err(e) = dispatcher.await {
        error!("Notification dispatcher failed: {}", e);
    }
    result
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
