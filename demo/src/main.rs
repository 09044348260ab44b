//! Audit ledger command-line tool.
//!
//! Records action and entity-change events into a SQLite ledger, prints
//! chains, and verifies their integrity.
//!
//! Usage:
//!   ledger --db audit.db record-action --user alice --action EXPORTED --resource-type REPORT
//!   ledger --db audit.db record-change --entity-type INVOICE --entity-id inv-1 --operation UPDATE \
//!          --old '{"status":"PENDING"}' --new '{"status":"PAID"}'
//!   ledger --db audit.db show --record 20240315000001
//!   ledger --db audit.db verify

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ledger_audit::Sha2HashEngine;
use ledger_capture::{ActionAuditHelper, ActionEvent, EntityAuditHelper, RequestContext};
use ledger_config::LedgerConfig;
use ledger_contracts::{
    error::{LedgerError, LedgerResult},
    request::{ChangeRequest, ValueMap},
    settings::AuditSettings,
};
use ledger_core::{
    clock::SystemClock,
    traits::{ActionStore, ChangeStore},
    ActionTrail, ChangeTrail,
};
use ledger_sqlite::SqliteLedger;
use ledger_verify::{ChainVerifier, LedgerReport};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Tamper-evident audit ledger.
#[derive(Parser)]
#[command(
    name = "ledger",
    about = "Record, inspect and verify a hash-chained audit ledger",
    long_about = "Every entry stores the hash of its predecessor, so any edit, deletion\n\
                  or reordering of stored entries is detected by `verify`."
)]
struct Cli {
    /// SQLite database file.
    #[arg(long, global = true, default_value = "audit.db")]
    db: PathBuf,

    /// TOML configuration with [action] and [entity] tables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append an action event to the global chain.
    RecordAction {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        trace_id: Option<String>,
        #[arg(long)]
        action: String,
        #[arg(long)]
        resource_type: String,
        #[arg(long)]
        resource_id: Option<String>,
        #[arg(long, default_value = "SUCCESS")]
        outcome: String,
        /// JSON object.
        #[arg(long)]
        details: Option<String>,
    },
    /// Append an entity change to that entity's chain.
    RecordChange {
        #[arg(long)]
        entity_type: String,
        #[arg(long)]
        entity_id: Option<String>,
        #[arg(long)]
        operation: String,
        /// Use this record number instead of resolving or minting one.
        #[arg(long)]
        record_number: Option<String>,
        #[arg(long)]
        performed_by: Option<String>,
        /// JSON object.
        #[arg(long)]
        old: Option<String>,
        /// JSON object.
        #[arg(long)]
        new: Option<String>,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Print a chain as JSON, one entry per line.
    Show {
        /// Entity record number. Prints the action chain when omitted.
        #[arg(long)]
        record: Option<String>,
    },
    /// Verify every chain in the database.
    Verify,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("ledger error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when verification found a broken chain.
fn run(cli: Cli) -> LedgerResult<bool> {
    let settings = load_settings(cli.config.as_deref())?;
    let store = Arc::new(SqliteLedger::open(&cli.db, &settings)?);

    match cli.command {
        Command::RecordAction {
            user,
            trace_id,
            action,
            resource_type,
            resource_id,
            outcome,
            details,
        } => {
            let trail = ActionTrail::new(
                store,
                Arc::new(Sha2HashEngine::new(&settings.action)),
                Arc::new(SystemClock),
            );
            let helper = ActionAuditHelper::new(Arc::new(trail), &settings.action);
            let ctx = context(user, trace_id);
            let event = ActionEvent {
                action,
                resource_type,
                resource_id,
                outcome,
                details: parse_map("details", details.as_deref())?,
                ..ActionEvent::default()
            };
            match helper.record(&ctx, event)? {
                Some(receipt) => print_json(&receipt)?,
                None => println!("action ledger is disabled; nothing recorded"),
            }
        }

        Command::RecordChange {
            entity_type,
            entity_id,
            operation,
            record_number,
            performed_by,
            old,
            new,
            summary,
        } => {
            let trail = ChangeTrail::new(
                store,
                Arc::new(Sha2HashEngine::new(&settings.entity)),
                Arc::new(SystemClock),
            );
            let helper = EntityAuditHelper::new(Arc::new(trail), &settings.entity);
            let request = ChangeRequest {
                entity_type,
                entity_id,
                operation,
                record_number,
                performed_by,
                old_values: parse_map("old", old.as_deref())?,
                new_values: parse_map("new", new.as_deref())?,
                change_summary: summary,
                ..ChangeRequest::default()
            };
            match helper.record_change(&RequestContext::system(), request)? {
                Some(receipt) => print_json(&receipt)?,
                None => println!("entity ledger is disabled; nothing recorded"),
            }
        }

        Command::Show { record } => match record {
            Some(record_number) => {
                for entry in ChangeStore::load_chain(store.as_ref(), &record_number)? {
                    print_json(&entry)?;
                }
            }
            None => {
                for entry in ActionStore::load_chain(store.as_ref())? {
                    print_json(&entry)?;
                }
            }
        },

        Command::Verify => {
            let actions = ChainVerifier::new(Arc::new(Sha2HashEngine::new(&settings.action)))
                .verify_action_store(store.as_ref())?;
            let entities = ChainVerifier::new(Arc::new(Sha2HashEngine::new(&settings.entity)))
                .verify_change_store(store.as_ref())?;

            print_report("action", &actions);
            print_report("entity", &entities);
            info!(passed = actions.passed() && entities.passed(), "verification finished");
            return Ok(actions.passed() && entities.passed());
        }
    }

    Ok(true)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_settings(path: Option<&std::path::Path>) -> LedgerResult<AuditSettings> {
    let config = match path {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    Ok(config.into_settings())
}

fn context(user: Option<String>, trace_id: Option<String>) -> RequestContext {
    let mut ctx = RequestContext::system();
    ctx.actor = user;
    ctx.trace_id = trace_id;
    ctx
}

fn parse_map(flag: &str, raw: Option<&str>) -> LedgerResult<Option<ValueMap>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(LedgerError::validation(format!("--{} must be a JSON object", flag))),
        Err(e) => Err(LedgerError::validation(format!("--{} is not valid JSON: {}", flag, e))),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> LedgerResult<()> {
    let line = serde_json::to_string(value).map_err(|e| LedgerError::Serialization {
        reason: e.to_string(),
    })?;
    println!("{}", line);
    Ok(())
}

fn print_report(variant: &str, report: &LedgerReport) {
    println!(
        "{} ledger: {} chain(s), {} entries, {}",
        variant,
        report.chains.len(),
        report.entries(),
        if report.passed() { "intact" } else { "BROKEN" }
    );
    for (scope, failure) in report.failures() {
        println!(
            "  [{}] {} at position {} (id {:?}): {}",
            scope, failure.kind, failure.position, failure.entry_id, failure.message
        );
    }
}
