//! SQLite database - schema definitions and connection management
//!
//! This file contains:
//! - Database struct definition
//! - Connection pool management (new, init)
//! - Schema creation
//! - Timestamp/date encoding shared by the table modules
//!
//! All table operations are in the tables/ subdirectory.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::error::CoreResult;

pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// How long a writer waits for SQLite's write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    platform TEXT NOT NULL,
    bot_token TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'inactive',
    description TEXT NOT NULL DEFAULT '',
    timezone TEXT NOT NULL DEFAULT 'UTC',
    total_conversations INTEGER NOT NULL DEFAULT 0 CHECK (total_conversations >= 0),
    total_messages INTEGER NOT NULL DEFAULT 0 CHECK (total_messages >= 0),
    total_leads INTEGER NOT NULL DEFAULT 0 CHECK (total_leads >= 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_tenant ON agents(tenant_id, created_at);

CREATE TABLE IF NOT EXISTS knowledge_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    file_ref TEXT NOT NULL,
    file_type TEXT NOT NULL DEFAULT '',
    content_extracted TEXT NOT NULL DEFAULT '',
    extracted_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_knowledge_agent ON knowledge_documents(agent_id, created_at);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    user_name TEXT,
    started_at TEXT NOT NULL,
    last_message_at TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    is_lead INTEGER NOT NULL DEFAULT 0,
    lead_email TEXT NOT NULL DEFAULT '',
    lead_phone TEXT NOT NULL DEFAULT '',
    lead_captured_at TEXT,
    CHECK (last_message_at >= started_at)
);
CREATE INDEX IF NOT EXISTS idx_conversations_agent ON conversations(agent_id, last_message_at);
CREATE INDEX IF NOT EXISTS idx_conversations_started ON conversations(agent_id, started_at);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (conversation_id, created_at)
);

CREATE TABLE IF NOT EXISTS daily_analytics (
    agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    new_conversations INTEGER NOT NULL DEFAULT 0 CHECK (new_conversations >= 0),
    messages_sent INTEGER NOT NULL DEFAULT 0 CHECK (messages_sent >= 0),
    leads_captured INTEGER NOT NULL DEFAULT 0 CHECK (leads_captured >= 0),
    PRIMARY KEY (agent_id, date)
);

CREATE TABLE IF NOT EXISTS analytics_recompute_checkpoint (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    agent_id INTEGER NOT NULL,
    last_date TEXT,
    agent_complete INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL
);
";

/// Main database wrapper around a pool of SQLite connections (WAL mode)
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database file and initialize the schema
    pub fn new(database_url: &str, pool_size: u32) -> CoreResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let manager = SqliteConnectionManager::file(database_url).with_init(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        });

        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        let db = Self { pool };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        log::debug!("[DB] Schema ready");
        Ok(())
    }

    /// Check out a pooled connection
    pub(crate) fn conn(&self) -> CoreResult<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` in an IMMEDIATE transaction. The write lock is taken up front,
    /// so reads inside `f` see the state the writes will apply to.
    pub(crate) fn write_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> CoreResult<T>) -> CoreResult<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Fixed-width RFC 3339 (microseconds, `Z` suffix) so text order is time order
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn to_db_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Read a timestamp column written by [`to_db_time`]
pub(crate) fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_time(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e))
}

pub(crate) fn opt_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_time(&s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e))
    })
    .transpose()
}

pub(crate) fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a text column into any `FromStr` enum (platform, status, role)
pub(crate) fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error + Send + Sync>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Database;
    use tempfile::TempDir;

    /// A database in a fresh temporary directory; keep the guard alive for
    /// the duration of the test.
    pub(crate) fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botdesk.db");
        let db = Database::new(path.to_str().unwrap(), 8).unwrap();
        (dir, db)
    }
}
