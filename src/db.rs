use crate::error::{IngestError, Result};
use crate::storage::Storage;
use crate::types::{ActivityLogEntry, ChangeDocumentRecord, TransactionUsageEntry};
use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// SQLite-backed storage. `seq` columns make insertion order explicit so the
/// merge pass's first-wins join sees records in the order they were created.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;
            CREATE TABLE IF NOT EXISTS sessions (
                id          TEXT PRIMARY KEY,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE TABLE IF NOT EXISTS change_documents (
                id               TEXT PRIMARY KEY,
                session_id       TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                client           TEXT NOT NULL,
                object           TEXT NOT NULL,
                object_value     TEXT NOT NULL,
                doc_number       TEXT NOT NULL,
                username         TEXT NOT NULL,
                entry_date       TEXT NOT NULL,
                entry_time       TEXT NOT NULL,
                tcode            TEXT NOT NULL,
                table_name       TEXT NOT NULL,
                table_key        TEXT NOT NULL,
                field_name       TEXT NOT NULL,
                change_indicator TEXT NOT NULL,
                text_flag        TEXT NOT NULL,
                unit             TEXT NOT NULL,
                currency         TEXT NOT NULL,
                new_value        TEXT NOT NULL,
                old_value        TEXT NOT NULL,
                seq              INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_change_documents_session
                ON change_documents(session_id);
            CREATE TABLE IF NOT EXISTS activity_log (
                id          TEXT PRIMARY KEY,
                session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                sap_system  TEXT NOT NULL,
                instance    TEXT NOT NULL,
                entry_date  TEXT NOT NULL,
                entry_time  TEXT NOT NULL,
                client      TEXT NOT NULL,
                event       TEXT NOT NULL,
                username    TEXT NOT NULL,
                group_name  TEXT NOT NULL,
                terminal    TEXT NOT NULL,
                peer        TEXT NOT NULL,
                source_tcode TEXT NOT NULL,
                program     TEXT NOT NULL,
                message     TEXT NOT NULL,
                note        TEXT NOT NULL,
                variable_1  TEXT NOT NULL,
                variable_2  TEXT NOT NULL,
                variable_3  TEXT NOT NULL,
                seq         INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_log_session
                ON activity_log(session_id);
            CREATE TABLE IF NOT EXISTS usage_log (
                id          TEXT PRIMARY KEY,
                session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                time        TEXT NOT NULL,
                tcode       TEXT NOT NULL,
                program     TEXT NOT NULL,
                seq         INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_usage_log_session
                ON usage_log(session_id);
            "#,
        )?;
        info!("Opened ingest database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn next_seq(conn: &Connection, table: &str) -> Result<i64> {
        let sql = format!("SELECT COALESCE(MAX(seq), 0) + 1 FROM {table}");
        let seq: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(seq)
    }
}

fn change_doc_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeDocumentRecord> {
    let id: String = row.get(0)?;
    Ok(ChangeDocumentRecord {
        id: Uuid::parse_str(&id).ok(),
        session_id: row.get(1)?,
        client: row.get(2)?,
        object: row.get(3)?,
        object_value: row.get(4)?,
        doc_number: row.get(5)?,
        username: row.get(6)?,
        entry_date: row.get(7)?,
        entry_time: row.get(8)?,
        tcode: row.get(9)?,
        table_name: row.get(10)?,
        table_key: row.get(11)?,
        field_name: row.get(12)?,
        change_indicator: row.get(13)?,
        text_flag: row.get(14)?,
        unit: row.get(15)?,
        currency: row.get(16)?,
        new_value: row.get(17)?,
        old_value: row.get(18)?,
    })
}

fn insert_change_doc(
    conn: &Connection,
    record: &mut ChangeDocumentRecord,
    seq: i64,
) -> Result<()> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO change_documents (
            id, session_id, client, object, object_value, doc_number, username,
            entry_date, entry_time, tcode, table_name, table_key, field_name,
            change_indicator, text_flag, unit, currency, new_value, old_value, seq
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            id.to_string(),
            record.session_id,
            record.client,
            record.object,
            record.object_value,
            record.doc_number,
            record.username,
            record.entry_date,
            record.entry_time,
            record.tcode,
            record.table_name,
            record.table_key,
            record.field_name,
            record.change_indicator,
            record.text_flag,
            record.unit,
            record.currency,
            record.new_value,
            record.old_value,
            seq,
        ],
    )?;
    record.id = Some(id);
    Ok(())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sessions (id) VALUES (?1)",
            params![session_id],
        )?;
        if inserted == 0 {
            return Err(IngestError::Validation(format!(
                "Session already exists: {session_id}"
            )));
        }
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(())
    }

    async fn insert_change_docs(&self, records: &mut [ChangeDocumentRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut seq = Self::next_seq(&tx, "change_documents")?;
        for record in records.iter_mut() {
            insert_change_doc(&tx, record, seq)?;
            seq += 1;
        }
        tx.commit()?;
        Ok(())
    }

    async fn change_docs_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ChangeDocumentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, client, object, object_value, doc_number, username,
                    entry_date, entry_time, tcode, table_name, table_key, field_name,
                    change_indicator, text_flag, unit, currency, new_value, old_value
             FROM change_documents WHERE session_id = ?1 ORDER BY seq",
        )?;
        let records = stmt
            .query_map(params![session_id], change_doc_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn commit_merge(
        &self,
        new_records: &mut [ChangeDocumentRecord],
        retired: &[Uuid],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut seq = Self::next_seq(&tx, "change_documents")?;
        for record in new_records.iter_mut() {
            insert_change_doc(&tx, record, seq)?;
            seq += 1;
        }
        for id in retired {
            tx.execute(
                "DELETE FROM change_documents WHERE id = ?1",
                params![id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn insert_activity_entries(&self, entries: &mut [ActivityLogEntry]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut seq = Self::next_seq(&tx, "activity_log")?;
        for entry in entries.iter_mut() {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO activity_log (
                    id, session_id, sap_system, instance, entry_date, entry_time,
                    client, event, username, group_name, terminal, peer,
                    source_tcode, program, message, note, variable_1, variable_2,
                    variable_3, seq
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                params![
                    id.to_string(),
                    entry.session_id,
                    entry.sap_system,
                    entry.instance,
                    entry.entry_date,
                    entry.entry_time,
                    entry.client,
                    entry.event,
                    entry.username,
                    entry.group_name,
                    entry.terminal,
                    entry.peer,
                    entry.source_tcode,
                    entry.program,
                    entry.message,
                    entry.note,
                    entry.variable_1,
                    entry.variable_2,
                    entry.variable_3,
                    seq,
                ],
            )?;
            entry.id = Some(id);
            seq += 1;
        }
        tx.commit()?;
        Ok(())
    }

    async fn activity_for_session(&self, session_id: &str) -> Result<Vec<ActivityLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, sap_system, instance, entry_date, entry_time,
                    client, event, username, group_name, terminal, peer,
                    source_tcode, program, message, note, variable_1, variable_2, variable_3
             FROM activity_log WHERE session_id = ?1 ORDER BY seq",
        )?;
        let entries = stmt
            .query_map(params![session_id], |row| {
                let id: String = row.get(0)?;
                Ok(ActivityLogEntry {
                    id: Uuid::parse_str(&id).ok(),
                    session_id: row.get(1)?,
                    sap_system: row.get(2)?,
                    instance: row.get(3)?,
                    entry_date: row.get(4)?,
                    entry_time: row.get(5)?,
                    client: row.get(6)?,
                    event: row.get(7)?,
                    username: row.get(8)?,
                    group_name: row.get(9)?,
                    terminal: row.get(10)?,
                    peer: row.get(11)?,
                    source_tcode: row.get(12)?,
                    program: row.get(13)?,
                    message: row.get(14)?,
                    note: row.get(15)?,
                    variable_1: row.get(16)?,
                    variable_2: row.get(17)?,
                    variable_3: row.get(18)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    async fn insert_usage_entries(&self, entries: &mut [TransactionUsageEntry]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut seq = Self::next_seq(&tx, "usage_log")?;
        for entry in entries.iter_mut() {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO usage_log (id, session_id, time, tcode, program, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    entry.session_id,
                    entry.time,
                    entry.tcode,
                    entry.program,
                    seq,
                ],
            )?;
            entry.id = Some(id);
            seq += 1;
        }
        tx.commit()?;
        Ok(())
    }

    async fn usage_for_session(&self, session_id: &str) -> Result<Vec<TransactionUsageEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, time, tcode, program
             FROM usage_log WHERE session_id = ?1 ORDER BY seq",
        )?;
        let entries = stmt
            .query_map(params![session_id], |row| {
                let id: String = row.get(0)?;
                Ok(TransactionUsageEntry {
                    id: Uuid::parse_str(&id).ok(),
                    session_id: row.get(1)?,
                    time: row.get(2)?,
                    tcode: row.get(3)?,
                    program: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
