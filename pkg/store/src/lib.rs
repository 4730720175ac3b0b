use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use schema::{
    Outlet, OutletCode, OutletPatch, PhoenixDocument, ValidationError, iso8601_from_millis,
    millis_from_iso8601, unix_timestamp_millis, validate_outlet,
};
use serde::Serialize;
use tracing::{debug, info};

/// Fixed key of the single document row.
pub const MAIN_DOCUMENT_ID: &str = "main";
pub const DEFAULT_BACKUP_LIST_LIMIT: usize = 10;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS phoenix_data (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS phoenix_backups (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database read error: {0}")]
    Read(String),
    #[error("Database write error: {0}")]
    Write(String),
    #[error("outlet not found: {0}")]
    OutletNotFound(String),
    #[error("backup not found: {0}")]
    BackupNotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StoreError {
    fn read(err: impl std::fmt::Display) -> Self {
        Self::Read(err.to_string())
    }

    fn write(err: impl std::fmt::Display) -> Self {
        Self::Write(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub id: String,
    pub created_at: String,
    pub data: PhoenixDocument,
}

/// SQLite-backed document store: one `main` row plus an append-only backup
/// table. Every mutation draws its stamp from one monotonic millisecond
/// counter, so `lastUpdated` never moves backwards.
pub struct SqliteStore {
    conn: Connection,
    last_stamp_millis: i64,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(StoreError::read)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::read)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL).map_err(StoreError::write)?;
        let last_backup_millis = conn
            .query_row(
                "SELECT id FROM phoenix_backups ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StoreError::read)?
            .and_then(|id| parse_backup_millis(&id))
            .unwrap_or(0);
        let last_document_millis = conn
            .query_row(
                "SELECT updated_at FROM phoenix_data WHERE id = ?1",
                params![MAIN_DOCUMENT_ID],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StoreError::read)?
            .and_then(|stamp| millis_from_iso8601(&stamp))
            .unwrap_or(0);
        Ok(Self {
            conn,
            last_stamp_millis: last_backup_millis.max(last_document_millis),
        })
    }

    /// Current document, or an empty one when nothing has been written yet.
    pub fn get(&self) -> Result<PhoenixDocument, StoreError> {
        let raw = self
            .conn
            .query_row(
                "SELECT data FROM phoenix_data WHERE id = ?1",
                params![MAIN_DOCUMENT_ID],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StoreError::read)?;
        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(StoreError::read),
            None => Ok(PhoenixDocument::empty()),
        }
    }

    /// Replaces the document, stamps `lastUpdated` and appends a backup copy.
    /// Returns the stamp written.
    pub fn put(&mut self, mut doc: PhoenixDocument) -> Result<String, StoreError> {
        let backup_millis = self.next_stamp_millis();
        let stamp = iso8601_from_millis(backup_millis);
        doc.set_last_updated(stamp.clone());
        let data = serde_json::to_string(&doc).map_err(StoreError::write)?;

        let tx = self.conn.transaction().map_err(StoreError::write)?;
        write_main_row(&tx, &data, &stamp)?;
        let backup_id = insert_backup(&tx, backup_millis, &data)?;
        tx.commit().map_err(StoreError::write)?;

        info!(
            outlets = doc.outlet_count(),
            backup_id = %backup_id,
            "phoenix document saved"
        );
        Ok(stamp)
    }

    pub fn get_outlet(&self, code: &OutletCode) -> Result<Outlet, StoreError> {
        self.get()?
            .outlet(code)
            .cloned()
            .ok_or_else(|| StoreError::OutletNotFound(code.to_string()))
    }

    /// Merges `patch` over the outlet (creating it when absent) and writes the
    /// document back without a backup.
    pub fn put_outlet(
        &mut self,
        code: &OutletCode,
        patch: OutletPatch,
    ) -> Result<Outlet, StoreError> {
        let mut doc = self.get()?;
        let now = iso8601_from_millis(self.next_stamp_millis());
        let outlet = doc.outlets.entry(code.as_str().to_string()).or_default();
        outlet.apply_patch(patch, &now);
        validate_outlet(outlet)?;
        let updated = outlet.clone();

        doc.set_last_updated(now.clone());
        self.write_document(&doc, &now)?;
        info!(outlet = %code, "outlet updated");
        Ok(updated)
    }

    pub fn delete_outlet(&mut self, code: &OutletCode) -> Result<Outlet, StoreError> {
        let mut doc = self.get()?;
        let removed = doc
            .outlets
            .remove(code.as_str())
            .ok_or_else(|| StoreError::OutletNotFound(code.to_string()))?;
        let now = iso8601_from_millis(self.next_stamp_millis());
        doc.set_last_updated(now.clone());
        self.write_document(&doc, &now)?;
        info!(outlet = %code, "outlet deleted");
        Ok(removed)
    }

    /// Snapshots the current document into the backup log, then resets it to
    /// an empty one. Returns the id of the snapshot.
    pub fn clear_all(&mut self) -> Result<String, StoreError> {
        let current = self.get()?;
        let current_data = serde_json::to_string(&current).map_err(StoreError::write)?;
        let backup_millis = self.next_stamp_millis();
        let mut empty = PhoenixDocument::empty();
        let stamp = iso8601_from_millis(backup_millis);
        empty.set_last_updated(stamp.clone());
        let empty_data = serde_json::to_string(&empty).map_err(StoreError::write)?;

        let tx = self.conn.transaction().map_err(StoreError::write)?;
        let backup_id = insert_backup(&tx, backup_millis, &current_data)?;
        write_main_row(&tx, &empty_data, &stamp)?;
        tx.commit().map_err(StoreError::write)?;

        info!(
            cleared_outlets = current.outlet_count(),
            backup_id = %backup_id,
            "phoenix document cleared"
        );
        Ok(backup_id)
    }

    /// Newest first.
    pub fn list_backups(&self, limit: usize) -> Result<Vec<BackupSummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, created_at FROM phoenix_backups
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            )
            .map_err(StoreError::read)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(BackupSummary {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                })
            })
            .map_err(StoreError::read)?;
        let backups = rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::read)?;
        Ok(backups)
    }

    pub fn get_backup(&self, id: &str) -> Result<BackupRecord, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, created_at, data FROM phoenix_backups WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::read)?;
        let (id, created_at, raw) = row.ok_or_else(|| StoreError::BackupNotFound(id.to_string()))?;
        let data = serde_json::from_str(&raw).map_err(StoreError::read)?;
        Ok(BackupRecord {
            id,
            created_at,
            data,
        })
    }

    /// Writes a backup's document back as the current one. The restore is
    /// itself a `put`, so it appends a fresh backup.
    pub fn restore_backup(&mut self, id: &str) -> Result<String, StoreError> {
        let backup = self.get_backup(id)?;
        let stamp = self.put(backup.data)?;
        info!(backup_id = %id, "backup restored");
        Ok(stamp)
    }

    fn write_document(&self, doc: &PhoenixDocument, stamp: &str) -> Result<(), StoreError> {
        let data = serde_json::to_string(doc).map_err(StoreError::write)?;
        write_main_row(&self.conn, &data, stamp)
    }

    /// Wall-clock millis, advanced past the previous stamp so backup ids stay
    /// unique and stamps stay ordered when writes land in the same millisecond
    /// or the clock is behind what is already stored.
    fn next_stamp_millis(&mut self) -> i64 {
        let millis = unix_timestamp_millis().max(self.last_stamp_millis + 1);
        self.last_stamp_millis = millis;
        millis
    }
}

fn write_main_row(conn: &Connection, data: &str, stamp: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO phoenix_data (id, data, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        params![MAIN_DOCUMENT_ID, data, stamp],
    )
    .map_err(StoreError::write)?;
    Ok(())
}

fn insert_backup(conn: &Connection, millis: i64, data: &str) -> Result<String, StoreError> {
    let id = format!("backup_{millis}");
    conn.execute(
        "INSERT INTO phoenix_backups (id, data, created_at) VALUES (?1, ?2, ?3)",
        params![id, data, iso8601_from_millis(millis)],
    )
    .map_err(StoreError::write)?;
    debug!(backup_id = %id, "backup appended");
    Ok(id)
}

fn parse_backup_millis(id: &str) -> Option<i64> {
    id.strip_prefix("backup_")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{OkrPatch, outlet_builder};

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory store should open")
    }

    fn backups_len(store: &SqliteStore) -> i64 {
        store
            .conn
            .query_row("SELECT COUNT(*) FROM phoenix_backups", [], |row| row.get(0))
            .unwrap()
    }

    fn code(raw: &str) -> OutletCode {
        OutletCode::parse(raw).unwrap()
    }

    fn doc_with(outlets: &[(&str, Outlet)]) -> PhoenixDocument {
        let mut doc = PhoenixDocument::empty();
        for (code, outlet) in outlets {
            doc.outlets.insert((*code).to_string(), outlet.clone());
        }
        doc
    }

    #[test]
    fn get_on_fresh_store_returns_empty_document() {
        let store = store();
        assert_eq!(store.get().unwrap(), PhoenixDocument::empty());
        assert!(store.list_backups(10).unwrap().is_empty());
    }

    #[test]
    fn put_then_get_round_trips_except_last_updated() {
        let mut store = store();
        let doc = doc_with(&[("A1", outlet_builder("Store A", "Grow", &["k1"]))]);

        let stamp = store.put(doc.clone()).unwrap();
        let loaded = store.get().unwrap();

        assert_eq!(loaded.outlets, doc.outlets);
        assert_eq!(loaded.last_updated(), Some(stamp.as_str()));
    }

    #[test]
    fn backups_are_append_only_and_newest_first() {
        let mut store = store();
        for idx in 0..5 {
            let doc = doc_with(&[(
                "A1",
                outlet_builder(&format!("Store {idx}"), "Grow", &[]),
            )]);
            store.put(doc).unwrap();
        }

        let backups = store.list_backups(5).unwrap();
        assert_eq!(backups.len(), 5);
        for pair in backups.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
        let oldest = store.get_backup(&backups[4].id).unwrap();
        assert_eq!(oldest.data.outlets["A1"].name.as_deref(), Some("Store 0"));

        store.put(PhoenixDocument::empty()).unwrap();
        let again = store.get_backup(&backups[4].id).unwrap();
        assert_eq!(again, oldest);
        assert_eq!(backups_len(&store), 6);
    }

    #[test]
    fn list_backups_honours_limit() {
        let mut store = store();
        for _ in 0..12 {
            store.put(PhoenixDocument::empty()).unwrap();
        }
        assert_eq!(
            store.list_backups(DEFAULT_BACKUP_LIST_LIMIT).unwrap().len(),
            10
        );
    }

    #[test]
    fn backup_ids_use_epoch_millis() {
        let mut store = store();
        store.put(PhoenixDocument::empty()).unwrap();
        let backups = store.list_backups(1).unwrap();
        assert!(backups[0].id.starts_with("backup_"));
        assert!(parse_backup_millis(&backups[0].id).is_some());
    }

    #[test]
    fn get_outlet_reports_missing_code() {
        let store = store();
        let err = store.get_outlet(&code("nope")).unwrap_err();
        assert!(matches!(err, StoreError::OutletNotFound(ref c) if c == "NOPE"));
    }

    #[test]
    fn put_outlet_merges_and_keeps_date_added() {
        let mut store = store();
        let existing = Outlet {
            date_added: Some("2024-01-01".into()),
            name: Some("A".into()),
            ..Outlet::default()
        };
        store.put(doc_with(&[("A1", existing)])).unwrap();

        let patch = OutletPatch {
            name: Some("B".into()),
            ..OutletPatch::default()
        };
        let updated = store.put_outlet(&code("a1"), patch).unwrap();

        assert_eq!(updated.date_added.as_deref(), Some("2024-01-01"));
        assert_eq!(updated.name.as_deref(), Some("B"));
        assert!(updated.last_modified.is_some());
        assert_eq!(store.get_outlet(&code("A1")).unwrap(), updated);
    }

    #[test]
    fn put_outlet_creates_missing_outlet_without_backup() {
        let mut store = store();
        let patch = OutletPatch {
            okr: Some(OkrPatch {
                objective: Some("Launch".into()),
                ..OkrPatch::default()
            }),
            ..OutletPatch::default()
        };
        let created = store.put_outlet(&code("z9"), patch).unwrap();

        assert!(created.date_added.is_some());
        assert_eq!(store.get().unwrap().outlet_count(), 1);
        assert!(store.get().unwrap().last_updated().is_some());
        assert_eq!(backups_len(&store), 0);
    }

    #[test]
    fn put_outlet_rejects_invalid_action_plan() {
        let mut store = store();
        let patch: OutletPatch = serde_json::from_str(
            r#"{"okr":{"actionPlans":{"kr1":{"completed":4,"total":2}}}}"#,
        )
        .unwrap();
        let err = store.put_outlet(&code("A1"), patch).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.get().unwrap().is_empty());
    }

    #[test]
    fn delete_outlet_removes_only_that_outlet() {
        let mut store = store();
        store
            .put(doc_with(&[
                ("A1", outlet_builder("Store A", "Grow", &[])),
                ("B2", outlet_builder("Store B", "Hold", &[])),
            ]))
            .unwrap();

        let removed = store.delete_outlet(&code("a1")).unwrap();
        assert_eq!(removed.name.as_deref(), Some("Store A"));
        let doc = store.get().unwrap();
        assert_eq!(doc.outlets.keys().collect::<Vec<_>>(), vec!["B2"]);
        assert!(matches!(
            store.delete_outlet(&code("a1")),
            Err(StoreError::OutletNotFound(_))
        ));
    }

    #[test]
    fn clear_all_backs_up_before_resetting() {
        let mut store = store();
        store
            .put(doc_with(&[("A1", outlet_builder("Store A", "Grow", &[]))]))
            .unwrap();

        let backup_id = store.clear_all().unwrap();

        assert!(store.get().unwrap().is_empty());
        let snapshot = store.get_backup(&backup_id).unwrap();
        assert_eq!(snapshot.data.outlet_count(), 1);
        assert_eq!(store.list_backups(1).unwrap()[0].id, backup_id);
    }

    #[test]
    fn restore_backup_reinstates_snapshot() {
        let mut store = store();
        store
            .put(doc_with(&[("A1", outlet_builder("Store A", "Grow", &[]))]))
            .unwrap();
        let backup_id = store.clear_all().unwrap();

        store.restore_backup(&backup_id).unwrap();
        assert_eq!(store.get().unwrap().outlet_count(), 1);
        assert!(matches!(
            store.restore_backup("backup_0"),
            Err(StoreError::BackupNotFound(_))
        ));
    }

    #[test]
    fn reopening_file_store_keeps_document_and_backup_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phoenix.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .put(doc_with(&[("A1", outlet_builder("Store A", "Grow", &[]))]))
                .unwrap();
        }
        let mut store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get().unwrap().outlet_count(), 1);
        let before = store.list_backups(1).unwrap()[0].clone();
        store.put(PhoenixDocument::empty()).unwrap();
        let after = store.list_backups(1).unwrap()[0].clone();
        assert!(after.created_at > before.created_at);
    }

    #[test]
    fn last_updated_never_decreases_across_mixed_writes() {
        let mut store = store();
        let doc = doc_with(&[
            ("A1", outlet_builder("Store A", "Grow", &[])),
            ("B2", outlet_builder("Store B", "Hold", &[])),
        ]);
        let mut previous = String::new();
        for _ in 0..200 {
            let stamp = store.put(doc.clone()).unwrap();
            assert!(stamp > previous, "{stamp} after {previous}");
            previous = stamp;
        }

        let updated = store.put_outlet(&code("A1"), OutletPatch::default()).unwrap();
        let after_outlet = store.get().unwrap().last_updated().unwrap().to_string();
        assert!(after_outlet > previous, "{after_outlet} after {previous}");
        assert_eq!(updated.last_modified.as_deref(), Some(after_outlet.as_str()));

        store.delete_outlet(&code("B2")).unwrap();
        let after_delete = store.get().unwrap().last_updated().unwrap().to_string();
        assert!(after_delete > after_outlet, "{after_delete} after {after_outlet}");

        store.clear_all().unwrap();
        let after_clear = store.get().unwrap().last_updated().unwrap().to_string();
        assert!(after_clear > after_delete, "{after_clear} after {after_delete}");
    }

    #[test]
    fn reopened_store_stamps_after_stored_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phoenix.db");
        let future = iso8601_from_millis(unix_timestamp_millis() + 3_600_000);
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .put(doc_with(&[("A1", outlet_builder("Store A", "Grow", &[]))]))
                .unwrap();
            let mut doc = store.get().unwrap();
            doc.set_last_updated(future.clone());
            store.write_document(&doc, &future).unwrap();
        }

        let mut store = SqliteStore::open(&path).unwrap();
        store.put_outlet(&code("A1"), OutletPatch::default()).unwrap();
        let stamp = store.get().unwrap().last_updated().unwrap().to_string();
        assert!(stamp > future, "{stamp} after {future}");
    }

    #[test]
    fn corrupt_main_row_surfaces_read_error() {
        let store = store();
        store
            .conn
            .execute(
                "INSERT INTO phoenix_data (id, data, updated_at) VALUES ('main', 'not json', 'x')",
                [],
            )
            .unwrap();
        let err = store.get().unwrap_err();
        assert!(err.to_string().starts_with("Database read error:"));
    }
}
