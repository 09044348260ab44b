//! SQLite implementation of `ActionStore` and `ChangeStore`.
//!
//! One database holds both ledger variants, one table each. The store only
//! ever issues `INSERT` and `SELECT`; rows are never updated or deleted.
//!
//! Column encoding:
//! - `occurred_at` is stored as microseconds since the Unix epoch (UTC), so
//!   sub-microsecond precision is dropped on write. It is not hashed.
//! - Value maps are stored as JSON text, `NULL` when absent or empty.
//!
//! WAL mode is enabled on open so readers (the verifier, the CLI) do not block
//! the writer.
//!
//! `append` runs the head read, any record-number lookups and the insert in
//! one `BEGIN IMMEDIATE` transaction. Clones share one connection behind a
//! mutex; separate handles and separate processes on the same file queue on
//! SQLite's write lock, waiting up to the busy timeout.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use tracing::{debug, info};

use ledger_config::is_sql_identifier;
use ledger_contracts::{
    entry::{ActionEntry, ChainHead, ChangeEntry},
    error::{LedgerError, LedgerResult},
    request::ValueMap,
    settings::AuditSettings,
};
use ledger_core::traits::{ActionStore, BuildAction, BuildChange, ChangeLookup, ChangeStore};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ACTION_COLUMNS: &str = "id, occurred_at, trace_id, user_id, action, resource_type, resource_id, \
    outcome, client_ip, user_agent, referer, client_source, requested_with, details, old_values, \
    new_values, response_hash, prev_hash, hash";

const CHANGE_COLUMNS: &str = "id, occurred_at, audit_number, record_number, entity_type, entity_id, \
    operation, performed_by, trace_id, metadata, old_values, new_values, change_summary, client_ip, \
    user_agent, prev_hash, hash";

/// Per-row provenance written into the entity table.
#[derive(Debug, Clone, Default)]
struct Provenance {
    service_name: Option<String>,
    source_schema: Option<String>,
    source_table: Option<String>,
}

/// The durable audit ledger backed by SQLite.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
    action_table: String,
    entity_table: String,
    provenance: Provenance,
    path: Option<PathBuf>,
}

impl SqliteLedger {
    /// Open or create a ledger database at `path`.
    ///
    /// Table names come from `settings`; both tables are created if missing.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid table name, `Persistence` if the database
    /// cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>, settings: &AuditSettings) -> LedgerResult<Self> {
        let path = path.as_ref();
        check_tables(settings)?;
        let conn = Connection::open(path).map_err(|e| {
            LedgerError::persistence_caused_by(format!("failed to open ledger '{}'", path.display()), e)
        })?;
        let ledger = Self::with_connection(conn, settings, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "sqlite ledger opened");
        Ok(ledger)
    }

    /// A private in-memory database, for tests and dry runs.
    pub fn in_memory(settings: &AuditSettings) -> LedgerResult<Self> {
        check_tables(settings)?;
        let conn = Connection::open_in_memory()
            .map_err(|e| LedgerError::persistence_caused_by("failed to open in-memory ledger", e))?;
        Self::with_connection(conn, settings, None)
    }

    fn with_connection(conn: Connection, settings: &AuditSettings, path: Option<PathBuf>) -> LedgerResult<Self> {
        let action_table = settings.action.table_name.clone();
        let entity_table = settings.entity.table_name.clone();
        initialize_connection(&conn, &action_table, &entity_table)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            action_table,
            entity_table,
            provenance: Provenance {
                service_name: settings.entity.service_name.clone(),
                source_schema: settings.entity.source_schema.clone(),
                source_table: settings.entity.source_table.clone(),
            },
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True when the database is running in WAL journal mode.
    pub fn is_wal(&self) -> LedgerResult<bool> {
        let conn = self.lock()?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .map_err(read_error("journal mode"))?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::persistence("sqlite connection lock poisoned"))
    }
}

fn check_tables(settings: &AuditSettings) -> LedgerResult<()> {
    for name in [&settings.action.table_name, &settings.entity.table_name] {
        if !is_sql_identifier(name) {
            return Err(LedgerError::config(format!(
                "table name '{}' is not a valid SQL identifier",
                name
            )));
        }
    }
    if settings.action.table_name == settings.entity.table_name {
        return Err(LedgerError::config("action and entity ledgers must use different tables"));
    }
    Ok(())
}

fn initialize_connection(conn: &Connection, action_table: &str, entity_table: &str) -> LedgerResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| LedgerError::persistence_caused_by("failed to set busy timeout", e))?;
    let _mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(|e| LedgerError::persistence_caused_by("failed to enable WAL", e))?;

    let schema = SCHEMA_SQL
        .replace("{action_table}", action_table)
        .replace("{entity_table}", entity_table);
    conn.execute_batch(&schema)
        .map_err(|e| LedgerError::persistence_caused_by("failed to create ledger schema", e))?;
    debug!(action_table, entity_table, "ledger schema ready");
    Ok(())
}

// ── Column codecs ─────────────────────────────────────────────────────────────

fn read_error(what: &'static str) -> impl Fn(rusqlite::Error) -> LedgerError {
    move |e| LedgerError::persistence_caused_by(format!("failed to read {}", what), e)
}

fn to_micros(at: &DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn to_json_column(value: &Option<ValueMap>) -> LedgerResult<Option<String>> {
    match value {
        Some(map) if !map.is_empty() => serde_json::to_string(map)
            .map(Some)
            .map_err(|e| LedgerError::Serialization { reason: e.to_string() }),
        _ => Ok(None),
    }
}

fn from_json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<ValueMap>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn row_to_action(row: &Row<'_>) -> rusqlite::Result<ActionEntry> {
    Ok(ActionEntry {
        id: Some(row.get(0)?),
        occurred_at: from_micros(1, row.get(1)?)?,
        trace_id: row.get(2)?,
        user_id: row.get(3)?,
        action: row.get(4)?,
        resource_type: row.get(5)?,
        resource_id: row.get(6)?,
        outcome: row.get(7)?,
        client_ip: row.get(8)?,
        user_agent: row.get(9)?,
        referer: row.get(10)?,
        client_source: row.get(11)?,
        requested_with: row.get(12)?,
        details: from_json_column(row, 13)?,
        old_values: from_json_column(row, 14)?,
        new_values: from_json_column(row, 15)?,
        response_hash: row.get(16)?,
        prev_hash: row.get(17)?,
        hash: row.get(18)?,
    })
}

fn row_to_change(row: &Row<'_>) -> rusqlite::Result<ChangeEntry> {
    Ok(ChangeEntry {
        id: Some(row.get(0)?),
        occurred_at: from_micros(1, row.get(1)?)?,
        audit_number: row.get(2)?,
        record_number: row.get(3)?,
        entity_type: row.get(4)?,
        entity_id: row.get(5)?,
        operation: row.get(6)?,
        performed_by: row.get(7)?,
        trace_id: row.get(8)?,
        metadata: from_json_column(row, 9)?,
        old_values: from_json_column(row, 10)?,
        new_values: from_json_column(row, 11)?,
        change_summary: row.get(12)?,
        client_ip: row.get(13)?,
        user_agent: row.get(14)?,
        prev_hash: row.get(15)?,
        hash: row.get(16)?,
    })
}

fn inserted_id(conn: &Connection, inserted: usize, table: &str) -> LedgerResult<i64> {
    let id = conn.last_insert_rowid();
    if inserted != 1 || id <= 0 {
        return Err(LedgerError::persistence(format!(
            "insert into {} returned no generated key",
            table
        )));
    }
    Ok(id)
}

fn head_from_row(row: &Row<'_>) -> rusqlite::Result<ChainHead> {
    Ok(ChainHead {
        hash: row.get(0)?,
        occurred_at: from_micros(1, row.get(1)?)?,
    })
}

/// Start a write transaction that takes SQLite's write lock up front.
///
/// Another connection holding the lock makes this wait (up to the busy
/// timeout), so a head read inside the transaction stays current until
/// commit.
fn begin_write(conn: &mut Connection) -> LedgerResult<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| LedgerError::persistence_caused_by("failed to begin ledger write", e))
}

fn commit(tx: Transaction<'_>, what: &str) -> LedgerResult<()> {
    tx.commit()
        .map_err(|e| LedgerError::persistence_caused_by(format!("failed to commit {}", what), e))
}

// ── Action table ──────────────────────────────────────────────────────────────

fn action_head(conn: &Connection, table: &str) -> LedgerResult<Option<ChainHead>> {
    conn.query_row(
        &format!(
            "SELECT hash, occurred_at FROM {} ORDER BY occurred_at DESC, id DESC LIMIT 1",
            table
        ),
        [],
        head_from_row,
    )
    .optional()
    .map_err(read_error("action chain head"))
}

fn insert_action(conn: &Connection, table: &str, entry: &ActionEntry) -> LedgerResult<i64> {
    let details = to_json_column(&entry.details)?;
    let old_values = to_json_column(&entry.old_values)?;
    let new_values = to_json_column(&entry.new_values)?;

    let inserted = conn
        .execute(
            &format!(
                "INSERT INTO {} (occurred_at, trace_id, user_id, action, resource_type, resource_id, \
                 outcome, client_ip, user_agent, referer, client_source, requested_with, details, \
                 old_values, new_values, response_hash, prev_hash, hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                table
            ),
            params![
                to_micros(&entry.occurred_at),
                entry.trace_id,
                entry.user_id,
                entry.action,
                entry.resource_type,
                entry.resource_id,
                entry.outcome,
                entry.client_ip,
                entry.user_agent,
                entry.referer,
                entry.client_source,
                entry.requested_with,
                details,
                old_values,
                new_values,
                entry.response_hash,
                entry.prev_hash,
                entry.hash,
            ],
        )
        .map_err(|e| LedgerError::persistence_caused_by("failed to insert action entry", e))?;

    let id = inserted_id(conn, inserted, table)?;
    debug!(id, table, "action row inserted");
    Ok(id)
}

impl ActionStore for SqliteLedger {
    fn find_head(&self) -> LedgerResult<Option<ChainHead>> {
        action_head(&*self.lock()?, &self.action_table)
    }

    fn save(&self, entry: &ActionEntry) -> LedgerResult<i64> {
        insert_action(&*self.lock()?, &self.action_table, entry)
    }

    fn append(&self, build: &mut BuildAction<'_>) -> LedgerResult<ActionEntry> {
        let mut conn = self.lock()?;
        let tx = begin_write(&mut conn)?;
        let mut entry = build(action_head(&tx, &self.action_table)?)?;
        let id = insert_action(&tx, &self.action_table, &entry)?;
        commit(tx, "action entry")?;
        entry.id = Some(id);
        Ok(entry)
    }

    fn load_chain(&self) -> LedgerResult<Vec<ActionEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM {} ORDER BY occurred_at ASC, id ASC",
                ACTION_COLUMNS, self.action_table
            ))
            .map_err(read_error("action chain"))?;
        let entries = stmt
            .query_map([], row_to_action)
            .map_err(read_error("action chain"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error("action chain"))?;
        Ok(entries)
    }
}

// ── Entity table ──────────────────────────────────────────────────────────────

/// Entity-table reads over one connection or open transaction.
struct EntityReads<'a> {
    conn: &'a Connection,
    table: &'a str,
}

impl ChangeLookup for EntityReads<'_> {
    fn find_head(&self, record_number: &str) -> LedgerResult<Option<ChainHead>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT hash, occurred_at FROM {} WHERE record_number = ?1 \
                     ORDER BY occurred_at DESC, id DESC LIMIT 1",
                    self.table
                ),
                params![record_number],
                head_from_row,
            )
            .optional()
            .map_err(read_error("entity chain head"))
    }

    fn find_record_number_for(&self, entity_type: &str, entity_id: &str) -> LedgerResult<Option<String>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT record_number FROM {} WHERE entity_type = ?1 AND entity_id = ?2 \
                     ORDER BY occurred_at ASC, id ASC LIMIT 1",
                    self.table
                ),
                params![entity_type, entity_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(read_error("record number"))
    }

    fn find_latest_record_number_with_prefix(&self, prefix: &str) -> LedgerResult<Option<String>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT record_number FROM {} WHERE substr(record_number, 1, length(?1)) = ?1 \
                     ORDER BY record_number DESC LIMIT 1",
                    self.table
                ),
                params![prefix],
                |row| row.get(0),
            )
            .optional()
            .map_err(read_error("latest record number"))
    }
}

fn insert_change(conn: &Connection, table: &str, provenance: &Provenance, entry: &ChangeEntry) -> LedgerResult<i64> {
    let metadata = to_json_column(&entry.metadata)?;
    let old_values = to_json_column(&entry.old_values)?;
    let new_values = to_json_column(&entry.new_values)?;

    let inserted = conn
        .execute(
            &format!(
                "INSERT INTO {} (occurred_at, audit_number, record_number, entity_type, entity_id, \
                 operation, performed_by, trace_id, metadata, old_values, new_values, change_summary, \
                 client_ip, user_agent, service_name, source_schema, source_table, prev_hash, hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                table
            ),
            params![
                to_micros(&entry.occurred_at),
                entry.audit_number,
                entry.record_number,
                entry.entity_type,
                entry.entity_id,
                entry.operation,
                entry.performed_by,
                entry.trace_id,
                metadata,
                old_values,
                new_values,
                entry.change_summary,
                entry.client_ip,
                entry.user_agent,
                provenance.service_name,
                provenance.source_schema,
                provenance.source_table,
                entry.prev_hash,
                entry.hash,
            ],
        )
        .map_err(|e| LedgerError::persistence_caused_by("failed to insert entity entry", e))?;

    let id = inserted_id(conn, inserted, table)?;
    debug!(id, table, record_number = %entry.record_number, "entity row inserted");
    Ok(id)
}

impl SqliteLedger {
    fn with_entity_reads<T>(&self, f: impl FnOnce(&EntityReads<'_>) -> LedgerResult<T>) -> LedgerResult<T> {
        let conn = self.lock()?;
        let reads = EntityReads {
            conn: &conn,
            table: &self.entity_table,
        };
        f(&reads)
    }
}

impl ChangeLookup for SqliteLedger {
    fn find_head(&self, record_number: &str) -> LedgerResult<Option<ChainHead>> {
        self.with_entity_reads(|reads| reads.find_head(record_number))
    }

    fn find_record_number_for(&self, entity_type: &str, entity_id: &str) -> LedgerResult<Option<String>> {
        self.with_entity_reads(|reads| reads.find_record_number_for(entity_type, entity_id))
    }

    fn find_latest_record_number_with_prefix(&self, prefix: &str) -> LedgerResult<Option<String>> {
        self.with_entity_reads(|reads| reads.find_latest_record_number_with_prefix(prefix))
    }
}

impl ChangeStore for SqliteLedger {
    fn save(&self, entry: &ChangeEntry) -> LedgerResult<i64> {
        insert_change(&*self.lock()?, &self.entity_table, &self.provenance, entry)
    }

    fn append(&self, build: &mut BuildChange<'_>) -> LedgerResult<ChangeEntry> {
        let mut conn = self.lock()?;
        let tx = begin_write(&mut conn)?;
        let mut entry = build(&EntityReads {
            conn: &tx,
            table: &self.entity_table,
        })?;
        let id = insert_change(&tx, &self.entity_table, &self.provenance, &entry)?;
        commit(tx, "entity entry")?;
        entry.id = Some(id);
        Ok(entry)
    }

    fn load_chain(&self, record_number: &str) -> LedgerResult<Vec<ChangeEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM {} WHERE record_number = ?1 ORDER BY occurred_at ASC, id ASC",
                CHANGE_COLUMNS, self.entity_table
            ))
            .map_err(read_error("entity chain"))?;
        let entries = stmt
            .query_map(params![record_number], row_to_change)
            .map_err(read_error("entity chain"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error("entity chain"))?;
        Ok(entries)
    }

    fn record_numbers(&self) -> LedgerResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT DISTINCT record_number FROM {} ORDER BY record_number ASC",
                self.entity_table
            ))
            .map_err(read_error("record numbers"))?;
        let numbers = stmt
            .query_map([], |row| row.get(0))
            .map_err(read_error("record numbers"))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(read_error("record numbers"))?;
        Ok(numbers)
    }
}
