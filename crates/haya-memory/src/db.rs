// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::debug;

use crate::entry::MemoryEntry;

/// A transactional store for [`MemoryEntry`] records with an optional FTS5
/// lexical index (spec.md §6 "Memory DB: a transactional store with two
/// optional indices").
#[async_trait]
pub trait MemoryDatabase: Send + Sync {
    async fn insert(&self, entry: MemoryEntry) -> anyhow::Result<()>;
    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<MemoryEntry>>;
    /// Returns up to `limit` `(id, rank)` pairs ordered best-first. `rank`
    /// follows the FTS5 convention: more negative is a better match.
    async fn search_lexical(&self, query: &str, limit: usize) -> anyhow::Result<Vec<(String, f64)>>;
}

/// SQLite-backed [`MemoryDatabase`] with an FTS5 virtual table mirroring
/// `content`, kept in sync via triggers (grounded on the teacher's
/// `rusqlite` usage for local persistent stores — SPEC_FULL.md §4.7
/// supplement). Guarded by a single mutex: rusqlite connections are not
/// `Sync`, and this store sees modest write volume (memory entries are
/// only written by the `save_memory` tool).
pub struct SqliteMemoryDatabase {
    conn: Mutex<Connection>,
}

impl SqliteMemoryDatabase {
    pub fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory_entries (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                metadata TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
                id UNINDEXED, content, content='memory_entries', content_rowid='rowid'
            );
            CREATE TRIGGER IF NOT EXISTS memory_entries_ai AFTER INSERT ON memory_entries BEGIN
                INSERT INTO memory_fts(rowid, id, content) VALUES (new.rowid, new.id, new.content);
            END;
            CREATE TRIGGER IF NOT EXISTS memory_entries_ad AFTER DELETE ON memory_entries BEGIN
                INSERT INTO memory_fts(memory_fts, rowid, id, content) VALUES ('delete', old.rowid, old.id, old.content);
            END;
            CREATE TRIGGER IF NOT EXISTS memory_entries_au AFTER UPDATE ON memory_entries BEGIN
                INSERT INTO memory_fts(memory_fts, rowid, id, content) VALUES ('delete', old.rowid, old.id, old.content);
                INSERT INTO memory_fts(rowid, id, content) VALUES (new.rowid, new.id, new.content);
            END;",
        )?;
        Ok(())
    }
}

#[async_trait]
impl MemoryDatabase for SqliteMemoryDatabase {
    async fn insert(&self, entry: MemoryEntry) -> anyhow::Result<()> {
        debug!(id = %entry.id, source = %entry.source, "persisting memory entry");
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute(
            "INSERT INTO memory_entries (id, content, source, metadata) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET content=excluded.content, source=excluded.source, metadata=excluded.metadata",
            rusqlite::params![entry.id, entry.content, entry.source, entry.metadata.to_string()],
        )?;
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<MemoryEntry>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare("SELECT id, content, source, metadata FROM memory_entries WHERE id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![id])?;
        if let Some(row) = rows.next()? {
            let metadata: String = row.get(3)?;
            Ok(Some(MemoryEntry {
                id: row.get(0)?,
                content: row.get(1)?,
                source: row.get(2)?,
                metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            }))
        } else {
            Ok(None)
        }
    }

    async fn search_lexical(&self, query: &str, limit: usize) -> anyhow::Result<Vec<(String, f64)>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, rank FROM memory_fts WHERE memory_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![query, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, content: &str) -> MemoryEntry {
        MemoryEntry { id: id.to_string(), content: content.to_string(), source: "test".to_string(), metadata: json!({}) }
    }

    #[tokio::test]
    async fn insert_then_get_by_id_round_trips() {
        let db = SqliteMemoryDatabase::open_in_memory().unwrap();
        db.insert(entry("m1", "the user prefers dark mode")).await.unwrap();
        let got = db.get_by_id("m1").await.unwrap().unwrap();
        assert_eq!(got.content, "the user prefers dark mode");
    }

    #[tokio::test]
    async fn get_by_id_missing_returns_none() {
        let db = SqliteMemoryDatabase::open_in_memory().unwrap();
        assert!(db.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_lexical_finds_matching_entries() {
        let db = SqliteMemoryDatabase::open_in_memory().unwrap();
        db.insert(entry("m1", "the user prefers dark mode")).await.unwrap();
        db.insert(entry("m2", "the user lives in Stockholm")).await.unwrap();
        let results = db.search_lexical("Stockholm", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "m2");
    }

    #[tokio::test]
    async fn insert_upserts_on_conflicting_id() {
        let db = SqliteMemoryDatabase::open_in_memory().unwrap();
        db.insert(entry("m1", "first")).await.unwrap();
        db.insert(entry("m1", "second")).await.unwrap();
        let got = db.get_by_id("m1").await.unwrap().unwrap();
        assert_eq!(got.content, "second");
    }
}
