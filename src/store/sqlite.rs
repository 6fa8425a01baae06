//! SQLite mapping store

use super::{InsertOutcome, MappingRecord, MappingStatus};
use crate::config::validation::is_valid_table_name;
use crate::config::StoreConfig;
use crate::{HubError, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

/// Persistent card/issue mappings
///
/// One connection shared by every flow; each operation runs under the lock.
pub struct MappingStore {
    conn: Mutex<Connection>,
    table: String,
}

impl MappingStore {
    /// Open or create the store described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path.display(), table = %config.table, "Opening mapping store");

        let conn = Connection::open(&config.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::with_connection(conn, &config.table)
    }

    /// In-memory store, used by tests and dry runs
    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(HubError::Storage(format!("invalid table name: {}", table)));
        }

        init_schema(&conn, table)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    /// Run raw SQL against the store's connection
    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().await.execute_batch(sql)?;
        Ok(())
    }

    /// Insert a record unless its card cycle or issue is already mapped
    pub async fn insert(&self, record: &MappingRecord) -> Result<InsertOutcome> {
        let conn = self.conn.lock().await;

        let changed = conn.execute(
            &format!(
                "INSERT INTO {} (card_id, issue_id, status, cycle, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT DO NOTHING",
                self.table
            ),
            params![
                record.card_id,
                record.issue_id,
                record.status.as_str(),
                record.cycle,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;

        if changed == 0 {
            tracing::warn!(
                card_id = %record.card_id,
                issue_id = record.issue_id,
                cycle = record.cycle,
                "Mapping already present, insert skipped"
            );
            Ok(InsertOutcome::AlreadyMapped)
        } else {
            tracing::debug!(card_id = %record.card_id, issue_id = record.issue_id, "Mapping stored");
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Find the record pointing at a tracker issue
    pub async fn find_by_issue(&self, issue_id: i64) -> Result<Option<MappingRecord>> {
        let conn = self.conn.lock().await;

        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM {} WHERE issue_id = ?1", self.table),
                params![issue_id],
                row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    /// Find the open record for a card, if its cycle is still running
    pub async fn find_open_by_card(&self, card_id: &str) -> Result<Option<MappingRecord>> {
        let conn = self.conn.lock().await;

        let record = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM {} WHERE card_id = ?1 AND status = 'open'
                     ORDER BY cycle DESC LIMIT 1",
                    self.table
                ),
                params![card_id],
                row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    /// Cycle number to use for the card's next mapping
    pub async fn next_cycle(&self, card_id: &str) -> Result<u32> {
        let conn = self.conn.lock().await;

        let current: Option<u32> = conn.query_row(
            &format!("SELECT MAX(cycle) FROM {} WHERE card_id = ?1", self.table),
            params![card_id],
            |row| row.get(0),
        )?;

        Ok(current.map_or(1, |c| c + 1))
    }

    /// Close the mapping for one card cycle
    ///
    /// Only an `open` record is touched. Returns false when nothing changed.
    pub async fn mark_closed(&self, card_id: &str, cycle: u32) -> Result<bool> {
        let conn = self.conn.lock().await;

        let changed = conn.execute(
            &format!(
                "UPDATE {} SET status = 'closed', updated_at = ?1
                 WHERE card_id = ?2 AND cycle = ?3 AND status = 'open'",
                self.table
            ),
            params![Utc::now().to_rfc3339(), card_id, cycle],
        )?;

        Ok(changed == 1)
    }

    /// List mappings, newest first
    pub async fn list(&self, status: Option<MappingStatus>) -> Result<Vec<MappingRecord>> {
        let conn = self.conn.lock().await;

        let mut sql = format!("SELECT {COLUMNS} FROM {}", self.table);
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY created_at DESC, card_id");

        let mut stmt = conn.prepare(&sql)?;
        let rows = match status {
            Some(status) => stmt.query_map(params![status.as_str()], row_to_record)?,
            None => stmt.query_map([], row_to_record)?,
        };

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

/// Initialize database schema
///
/// `(card_id, cycle)` is the idempotency key; `issue_id` is unique too.
fn init_schema(conn: &Connection, t: &str) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {t} (
            card_id TEXT NOT NULL,
            issue_id INTEGER NOT NULL UNIQUE,
            status TEXT NOT NULL CHECK (status IN ('open', 'closed')),
            cycle INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (card_id, cycle)
        );

        CREATE INDEX IF NOT EXISTS idx_{t}_card_status ON {t}(card_id, status);
        "#
    ))?;

    Ok(())
}

const COLUMNS: &str = "card_id, issue_id, status, cycle, created_at, updated_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MappingRecord> {
    let status: String = row.get(2)?;
    let status = status
        .parse::<MappingStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(MappingRecord {
        card_id: row.get(0)?,
        issue_id: row.get(1)?,
        status,
        cycle: row.get(3)?,
        created_at: parse_timestamp(row, 4)?,
        updated_at: parse_timestamp(row, 5)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn store() -> MappingStore {
        MappingStore::open_in_memory("hub").unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_by_issue() {
        let store = store();
        let record = MappingRecord::open("abc123", 42, 1);

        assert_eq!(store.insert(&record).await.unwrap(), InsertOutcome::Inserted);

        let found = store.find_by_issue(42).await.unwrap().unwrap();
        assert_eq!(found.card_id, "abc123");
        assert_eq!(found.issue_id, 42);
        assert_eq!(found.status, MappingStatus::Open);
        assert_eq!(found.cycle, 1);

        assert!(store.find_by_issue(43).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_cycle_is_not_inserted() {
        let store = store();
        store.insert(&MappingRecord::open("abc123", 42, 1)).await.unwrap();

        let outcome = store.insert(&MappingRecord::open("abc123", 43, 1)).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyMapped);
        assert!(store.find_by_issue(43).await.unwrap().is_none());
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_issue_is_not_inserted() {
        let store = store();
        store.insert(&MappingRecord::open("abc123", 42, 1)).await.unwrap();

        let outcome = store.insert(&MappingRecord::open("other", 42, 1)).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyMapped);
    }

    #[tokio::test]
    async fn test_mark_closed_only_once() {
        let store = store();
        store.insert(&MappingRecord::open("abc123", 42, 1)).await.unwrap();

        assert!(store.mark_closed("abc123", 1).await.unwrap());
        assert!(!store.mark_closed("abc123", 1).await.unwrap());

        let found = store.find_by_issue(42).await.unwrap().unwrap();
        assert_eq!(found.status, MappingStatus::Closed);
        assert!(found.updated_at >= found.created_at);
        assert!(store.find_open_by_card("abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cycles_per_card() {
        let store = store();
        assert_eq!(store.next_cycle("abc123").await.unwrap(), 1);

        store.insert(&MappingRecord::open("abc123", 42, 1)).await.unwrap();
        store.mark_closed("abc123", 1).await.unwrap();
        assert_eq!(store.next_cycle("abc123").await.unwrap(), 2);

        store.insert(&MappingRecord::open("abc123", 77, 2)).await.unwrap();
        let open = store.find_open_by_card("abc123").await.unwrap().unwrap();
        assert_eq!(open.issue_id, 77);
        assert_eq!(open.cycle, 2);

        assert_eq!(store.next_cycle("someone-else").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let store = store();
        store.insert(&MappingRecord::open("a", 1, 1)).await.unwrap();
        store.insert(&MappingRecord::open("b", 2, 1)).await.unwrap();
        store.mark_closed("b", 1).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);

        let open = store.list(Some(MappingStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].card_id, "a");

        let closed = store.list(Some(MappingStatus::Closed)).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].card_id, "b");
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let temp = NamedTempFile::new().unwrap();
        let config = StoreConfig {
            path: PathBuf::from(temp.path()),
            table: "card_map".to_string(),
        };

        {
            let store = MappingStore::open(&config).unwrap();
            store.insert(&MappingRecord::open("abc123", 42, 1)).await.unwrap();
        }

        let reopened = MappingStore::open(&config).unwrap();
        assert!(reopened.find_by_issue(42).await.unwrap().is_some());
    }

    #[test]
    fn test_rejects_bad_table_name() {
        assert!(MappingStore::open_in_memory("hub; DROP TABLE hub").is_err());
    }
}
