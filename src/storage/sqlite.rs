//! SQLite storage backend
//!
//! Two tables mirror the persisted model:
//!
//! - `dnas(uuid, dna, type, classified_at)`: one row per classified sample,
//!   `dna` holds the JSON-encoded rows.
//! - `stats(dna_type, type_count)`: one counter per kind, bumped with an
//!   upsert so the increment happens inside SQLite.

use super::{DnaStore, StoreError};
use crate::dna::{DnaKind, DnaRecord};
use crate::stats::Stat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS dnas (
        uuid          TEXT PRIMARY KEY,
        dna           TEXT NOT NULL,
        type          TEXT NOT NULL,
        classified_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS stats (
        dna_type   TEXT PRIMARY KEY,
        type_count INTEGER NOT NULL DEFAULT 0
    );
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database file with WAL journaling
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        Self::init(conn)
    }

    /// Private in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        debug!("SQLite schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
        f(&conn)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(())
}

fn row_to_record(
    uuid: String,
    dna: String,
    kind: String,
    classified_at: String,
) -> Result<DnaRecord, StoreError> {
    let uuid = Uuid::parse_str(&uuid)
        .map_err(|e| StoreError::Corrupt(format!("uuid {uuid:?}: {e}")))?;
    let classified_at = DateTime::parse_from_rfc3339(&classified_at)
        .map_err(|e| StoreError::Corrupt(format!("timestamp {classified_at:?}: {e}")))?
        .with_timezone(&Utc);
    Ok(DnaRecord {
        uuid,
        dna: serde_json::from_str(&dna)?,
        kind: kind.parse()?,
        classified_at,
    })
}

#[async_trait]
impl DnaStore for SqliteStore {
    async fn save_dna(&self, record: &DnaRecord) -> Result<bool, StoreError> {
        let dna = serde_json::to_string(&record.dna)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO dnas (uuid, dna, type, classified_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.uuid.to_string(),
                    dna,
                    record.kind.as_str(),
                    record.classified_at.to_rfc3339(),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    async fn increment_stat(&self, kind: DnaKind) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stats (dna_type, type_count) VALUES (?1, 1)
                 ON CONFLICT(dna_type) DO UPDATE SET type_count = type_count + 1",
                params![kind.as_str()],
            )?;
            Ok(())
        })
    }

    async fn load_stats(&self) -> Result<Stat, StoreError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT dna_type, type_count FROM stats")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut counts = Vec::with_capacity(rows.len());
        for (label, count) in &rows {
            let count = u64::try_from(*count)
                .map_err(|_| StoreError::Corrupt(format!("negative count for {label}")))?;
            counts.push((label.as_str(), count));
        }

        let mut stat = Stat::default();
        stat.set_values(counts)?;
        Ok(stat)
    }

    async fn get_dna(&self, uuid: Uuid) -> Result<Option<DnaRecord>, StoreError> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT uuid, dna, type, classified_at FROM dnas WHERE uuid = ?1",
                    params![uuid.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(|(uuid, dna, kind, classified_at)| row_to_record(uuid, dna, kind, classified_at))
            .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna::DnaError;
    use crate::storage::persist_record;

    fn sample(kind: DnaKind) -> DnaRecord {
        DnaRecord::new(
            vec![
                "ATGCGA".to_string(),
                "CAGTGC".to_string(),
                "TTATGT".to_string(),
            ],
            kind,
        )
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = sample(DnaKind::Mutant);

        assert!(store.save_dna(&record).await.unwrap());
        let loaded = store.get_dna(record.uuid).await.unwrap().unwrap();

        assert_eq!(loaded.uuid, record.uuid);
        assert_eq!(loaded.dna, record.dna);
        assert_eq!(loaded.kind, DnaKind::Mutant);
        assert_eq!(
            loaded.classified_at.timestamp_micros(),
            record.classified_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_duplicate_uuid_is_ignored() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = sample(DnaKind::Human);

        assert!(store.save_dna(&record).await.unwrap());
        assert!(!store.save_dna(&record).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_and_load_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        for _ in 0..40 {
            store.increment_stat(DnaKind::Mutant).await.unwrap();
        }
        for _ in 0..100 {
            store.increment_stat(DnaKind::Human).await.unwrap();
        }

        let stat = store.load_stats().await.unwrap();
        assert_eq!(stat, Stat::from_counts(40, 100));
        assert_eq!(stat.ratio, 0.4);
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stat = store.load_stats().await.unwrap();
        assert_eq!(stat.mutant, 0);
        assert_eq!(stat.human, 0);
        assert_eq!(stat.ratio, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_stored_kind_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO stats (dna_type, type_count) VALUES ('Cyborg', 3)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let err = store.load_stats().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Kind(DnaError::UnsupportedKind(ref label)) if label == "Cyborg"
        ));
    }

    #[tokio::test]
    async fn test_persist_record_updates_both_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = sample(DnaKind::Mutant);

        assert!(persist_record(&store, &record).await.unwrap());
        assert!(!persist_record(&store, &record).await.unwrap());

        let stat = store.load_stats().await.unwrap();
        assert_eq!(stat.mutant, 1);
        assert!(store.get_dna(record.uuid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ping() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ping().await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");
    }
}
