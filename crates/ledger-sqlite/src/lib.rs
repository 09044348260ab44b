//! # ledger-sqlite
//!
//! Durable SQLite store for the audit ledger.
//!
//! [`SqliteLedger`] implements both `ActionStore` and `ChangeStore` over one
//! database file. Tables are created on open using the names from
//! `AuditSettings`, the connection runs in WAL mode, and all access goes
//! through one `Mutex<Connection>`. Appends run in `BEGIN IMMEDIATE`
//! transactions, so handles in different threads or processes can share a
//! file without forking its chains.
//!
//! ```rust,ignore
//! use ledger_sqlite::SqliteLedger;
//!
//! let store = Arc::new(SqliteLedger::open("audit.db", &settings)?);
//! let trail = ChangeTrail::new(store.clone(), engine, Arc::new(SystemClock));
//! ```

pub mod store;

pub use store::SqliteLedger;

// ── Tests ─────────────────────────────────────────────────────────────────────
