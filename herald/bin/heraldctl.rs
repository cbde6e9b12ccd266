//! Command-line utility for inspecting a herald retry ledger
//!
//! Works directly on the ledger file, so it can be used while the node is
//! stopped:
//! - List messages still waiting for delivery
//! - Show everything recorded for one message
//! - List resend attempt counters
//! - Drop expired records from the file

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use herald_common::{NetworkId, logging};
use herald_ledger::{
    BackingStore, FileBackingStore, LedgerConfig, MessageId, RetryLedger, RetryRecord, StoreConfig,
    now_ms,
};
use herald_resend::{ResendConfig, accounting};

/// Command-line utility for inspecting a herald retry ledger
#[derive(Parser, Debug)]
#[command(name = "heraldctl")]
#[command(about = "Inspect the herald retry ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults to the usual search order)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the ledger file, overriding the configuration
    #[arg(short, long)]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List messages whose delivery is still pending
    Pending,
    /// Show everything recorded for a message
    Show {
        /// Message ID to show
        message_id: String,
    },
    /// List resend attempt counters
    Attempts,
    /// Remove expired records from the ledger file
    Prune {
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let (ledger_path, resend) = resolve(cli.config.as_deref(), cli.ledger)?;
    let store = FileBackingStore::builder().path(ledger_path).build()?;

    match cli.command {
        Commands::Pending => cmd_pending(store).await?,
        Commands::Show { message_id } => cmd_show(store, &resend, &message_id).await?,
        Commands::Attempts => cmd_attempts(store).await?,
        Commands::Prune { dry_run } => cmd_prune(&store, dry_run).await?,
    }

    Ok(())
}

/// Work out the ledger path and resend bounds from the arguments and config
fn resolve(
    config: Option<&Path>,
    ledger: Option<PathBuf>,
) -> anyhow::Result<(PathBuf, ResendConfig)> {
    let herald = match (config, &ledger) {
        (Some(path), _) => herald::Herald::load(path)?,
        (None, Some(_)) => herald::find_config_file()
            .and_then(|path| herald::Herald::load(&path))
            .unwrap_or_default(),
        (None, None) => herald::Herald::load(&herald::find_config_file()?)?,
    };

    let path = match (ledger, herald.ledger) {
        (Some(path), _) => path,
        (
            None,
            LedgerConfig {
                store: StoreConfig::File { path },
                ..
            },
        ) => path,
        (
            None,
            LedgerConfig {
                store: StoreConfig::Memory,
                ..
            },
        ) => anyhow::bail!("The configured ledger is memory-backed; pass --ledger explicitly"),
    };

    Ok((path, herald.resend))
}

async fn load_ledger(store: FileBackingStore) -> anyhow::Result<RetryLedger> {
    if !store.path().exists() {
        anyhow::bail!("No ledger found at {}", store.path().display());
    }
    Ok(RetryLedger::load(std::sync::Arc::new(store)).await?)
}

/// List pending messages
async fn cmd_pending(store: FileBackingStore) -> anyhow::Result<()> {
    let ledger = load_ledger(store).await?;
    let pending: Vec<RetryRecord> = ledger
        .records()
        .into_iter()
        .filter(|record| record.status.is_pending() && !record.is_expired())
        .collect();

    if pending.is_empty() {
        println!("No pending messages");
        return Ok(());
    }

    println!(
        "{:<28} {:<20} {:>8} {:>6} {:>8}",
        "MESSAGE ID", "STATUS", "ATTEMPTS", "AGE", "EXPIRES"
    );
    for record in &pending {
        println!(
            "{:<28} {:<20} {:>8} {:>6} {:>8}",
            record.id,
            record.status,
            ledger.attempts(&record.id).unwrap_or(0),
            format_age(record.created_at),
            format_remaining(record.expires_at),
        );
    }
    println!("\nTotal: {} message(s)", pending.len());

    Ok(())
}

/// Show one record
async fn cmd_show(
    store: FileBackingStore,
    resend: &ResendConfig,
    message_id: &str,
) -> anyhow::Result<()> {
    let ledger = load_ledger(store).await?;
    let id = MessageId::from(message_id);
    let record = ledger
        .get(&id)
        .ok_or_else(|| anyhow::anyhow!("No record for message {id}"))?;
    let attempts = ledger.attempts(&id);

    println!("Message ID: {}", record.id);
    println!("Status: {}", record.status);
    println!(
        "Created: {} ({} ago)",
        format_timestamp(record.created_at),
        format_age(record.created_at)
    );
    println!("Expires: {}", format_timestamp(record.expires_at));
    println!();

    println!("Routing:");
    println!("  Sender: {}", describe(&record.sender_network_id));
    println!("  Receiver: {}", describe(&record.receiver_network_id));
    println!();

    println!("Payload:");
    println!("  Key ID: {}", record.payload.key_id);
    println!("  Cipher text: {} bytes", record.payload.sealed.cipher_text.len());
    println!();

    println!("Resends:");
    println!("  Attempts: {}", attempts.unwrap_or(0));
    println!(
        "  Manual resend available: {}",
        if !record.is_expired()
            && accounting::manual_resend_available(attempts, resend.max_manual_resends)
        {
            "yes"
        } else {
            "no"
        }
    );

    Ok(())
}

/// List attempt counters
async fn cmd_attempts(store: FileBackingStore) -> anyhow::Result<()> {
    let snapshot = load_ledger(store).await?.snapshot();

    if snapshot.attempts.is_empty() {
        println!("No resend attempts recorded");
        return Ok(());
    }

    println!("{:<28} {:>8}", "MESSAGE ID", "ATTEMPTS");
    for (id, attempts) in &snapshot.attempts {
        println!("{id:<28} {attempts:>8}");
    }

    Ok(())
}

/// Rewrite the ledger without expired records
async fn cmd_prune(store: &FileBackingStore, dry_run: bool) -> anyhow::Result<()> {
    let Some(mut snapshot) = store.load().await? else {
        println!("No ledger found at {}", store.path().display());
        return Ok(());
    };

    let pruned = snapshot.prune(now_ms());
    if pruned == 0 {
        println!("Nothing to prune");
        return Ok(());
    }

    if dry_run {
        println!("Would remove {pruned} expired record(s)");
        return Ok(());
    }

    store.save(&snapshot).await?;
    println!(
        "Removed {pruned} expired record(s), {} remaining",
        snapshot.records.len()
    );

    Ok(())
}

fn describe(network_id: &NetworkId) -> String {
    if network_id.addresses.is_empty() {
        format!("<no addresses> ({} byte key)", network_id.public_key.len())
    } else {
        network_id.to_string()
    }
}

/// Format timestamp (milliseconds since epoch) as human-readable
fn format_timestamp(timestamp_ms: u64) -> String {
    use chrono::{TimeZone, Utc};

    let datetime = Utc.timestamp_millis_opt(i64::try_from(timestamp_ms).unwrap_or(0));
    if let chrono::offset::LocalResult::Single(dt) = datetime {
        dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    } else {
        "unknown".to_string()
    }
}

fn format_secs(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

/// Time since `timestamp_ms`
fn format_age(timestamp_ms: u64) -> String {
    format_secs(now_ms().saturating_sub(timestamp_ms) / 1000)
}

/// Time left until `timestamp_ms`
fn format_remaining(timestamp_ms: u64) -> String {
    let now = now_ms();
    if timestamp_ms <= now {
        "expired".to_string()
    } else {
        format_secs((timestamp_ms - now) / 1000)
    }
}
