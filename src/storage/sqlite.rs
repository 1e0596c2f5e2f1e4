//! SQLite storage backend
//!
//! A single database file with one `records` table of named JSON documents.
//! Thread-safe via internal mutex on the connection; multi-record writes run
//! inside one transaction.

use super::traits::{OpenStore, StateStore, StorageResult};
use crate::coordinator::{AutomationConfig, OtpRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

const REC_AUTOMATION: &str = "automation";
const REC_SNAPSHOT: &str = "otp_snapshot";
const REC_USED_CODES: &str = "used_codes";

/// SQLite-backed state store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                name TEXT PRIMARY KEY,
                value_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- WAL so status readers don't block the coordinator's writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn read_record<T: DeserializeOwned>(
        conn: &Connection,
        name: &str,
    ) -> StorageResult<Option<T>> {
        let json: Option<String> = conn
            .query_row(
                "SELECT value_json FROM records WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_record<T: Serialize>(conn: &Connection, name: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_string(value)?;
        conn.execute(
            "INSERT INTO records (name, value_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value_json = ?2, updated_at = ?3",
            params![name, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete_record(conn: &Connection, name: &str) -> StorageResult<()> {
        conn.execute("DELETE FROM records WHERE name = ?1", params![name])?;
        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn load_automation(&self) -> StorageResult<Option<AutomationConfig>> {
        let conn = self.conn.lock().unwrap();
        Self::read_record(&conn, REC_AUTOMATION)
    }

    fn save_automation(&self, config: &AutomationConfig) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_record(&conn, REC_AUTOMATION, config)
    }

    fn load_snapshot(&self) -> StorageResult<Option<OtpRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::read_record(&conn, REC_SNAPSHOT)
    }

    fn save_snapshot(&self, record: &OtpRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_record(&conn, REC_SNAPSHOT, record)
    }

    fn clear_snapshot(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::delete_record(&conn, REC_SNAPSHOT)
    }

    fn load_used_codes(&self) -> StorageResult<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::read_record(&conn, REC_USED_CODES)?.unwrap_or_default())
    }

    fn save_used_codes(&self, codes: &HashSet<String>) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_record(&conn, REC_USED_CODES, codes)
    }

    fn save_snapshot_and_codes(
        &self,
        record: Option<&OtpRecord>,
        codes: &HashSet<String>,
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        match record {
            Some(record) => Self::write_record(&tx, REC_SNAPSHOT, record)?,
            None => Self::delete_record(&tx, REC_SNAPSHOT)?,
        }
        Self::write_record(&tx, REC_USED_CODES, codes)?;
        tx.commit()?;
        Ok(())
    }

    fn clear_all(&self) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::delete_record(&tx, REC_AUTOMATION)?;
        Self::delete_record(&tx, REC_SNAPSHOT)?;
        Self::delete_record(&tx, REC_USED_CODES)?;
        tx.commit()?;
        Ok(())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(code: &str) -> OtpRecord {
        OtpRecord {
            code: code.to_string(),
            captured_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            source_timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 59, 0).unwrap()),
            valid: true,
        }
    }

    #[test]
    fn automation_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load_automation().unwrap().is_none());

        let config = AutomationConfig {
            enabled: false,
            auto_submit_enabled: true,
        };
        store.save_automation(&config).unwrap();
        assert_eq!(store.load_automation().unwrap(), Some(config));
    }

    #[test]
    fn snapshot_round_trips_and_clears() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_snapshot(&record("483920")).unwrap();

        let loaded = store.load_snapshot().unwrap().expect("snapshot");
        assert_eq!(loaded.code, "483920");
        assert!(loaded.valid);

        store.clear_snapshot().unwrap();
        assert!(store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn used_codes_default_to_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load_used_codes().unwrap().is_empty());
    }

    #[test]
    fn combined_write_is_atomic_per_record_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut codes = HashSet::new();
        codes.insert("111222".to_string());

        store
            .save_snapshot_and_codes(Some(&record("483920")), &codes)
            .unwrap();
        assert_eq!(store.load_snapshot().unwrap().unwrap().code, "483920");
        assert_eq!(store.load_used_codes().unwrap(), codes);

        // Clearing the snapshot while keeping codes, in one call.
        store.save_snapshot_and_codes(None, &codes).unwrap();
        assert!(store.load_snapshot().unwrap().is_none());
        assert_eq!(store.load_used_codes().unwrap(), codes);
    }

    #[test]
    fn clear_all_drops_every_record() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_automation(&AutomationConfig::default())
            .unwrap();
        store.save_snapshot(&record("483920")).unwrap();
        store.clear_all().unwrap();
        assert!(store.load_automation().unwrap().is_none());
        assert!(store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_snapshot(&record("483920")).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load_snapshot().unwrap().unwrap().code, "483920");
    }
}
