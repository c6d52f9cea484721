//! On-disk index snapshot.
//!
//! Persists the built vector index in `<index.dir>/index.sqlite` so a restart
//! with unchanged documents and embedding settings can skip re-embedding.
//! A snapshot is only reused when its fingerprint matches the current one;
//! anything else (mismatch, missing tables, undecodable rows) means rebuild.

use anyhow::{Context, Result};
use onboard_rag_core::embedding::{blob_to_vec, vec_to_blob};
use onboard_rag_core::index::IndexEntry;
use onboard_rag_core::models::Chunk;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::loader::LoadedDocument;

pub const SNAPSHOT_FILE: &str = "index.sqlite";

/// Inputs that decide whether a stored snapshot is still valid.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    pub model: &'a str,
    pub dims: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub documents: &'a [LoadedDocument],
}

/// Hex SHA-256 over the model, chunking parameters, and every document's
/// name and content hash (documents are already in lexical order).
pub fn fingerprint(input: &FingerprintInput<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"onboard-index-v1\0");
    hasher.update(input.model.as_bytes());
    hasher.update(b"\0");
    hasher.update((input.dims as u64).to_le_bytes());
    hasher.update((input.chunk_size as u64).to_le_bytes());
    hasher.update((input.chunk_overlap as u64).to_le_bytes());
    for doc in input.documents {
        hasher.update(doc.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(doc.sha256.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Open (creating if needed) the snapshot database inside `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index dir: {}", dir.display()))?;
        let db_path = dir.join(SNAPSHOT_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                fingerprint TEXT NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                position INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                page INTEGER NOT NULL,
                index_in_page INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the stored entries if the snapshot matches `fingerprint`.
    pub async fn load(&self, fingerprint: &str) -> Result<Option<Vec<IndexEntry>>> {
        let meta = sqlx::query("SELECT fingerprint, dims FROM snapshot_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(meta) = meta else {
            return Ok(None);
        };
        let stored: String = meta.try_get("fingerprint")?;
        if stored != fingerprint {
            tracing::debug!("index snapshot fingerprint mismatch");
            return Ok(None);
        }
        let dims = meta.try_get::<i64, _>("dims")? as usize;

        let rows = sqlx::query(
            "SELECT position, source, page, index_in_page, text, vector FROM entries ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (expected, row) in rows.iter().enumerate() {
            let position = row.try_get::<i64, _>("position")? as usize;
            let blob: Vec<u8> = row.try_get("vector")?;
            let vector = blob_to_vec(&blob);
            if position != expected || vector.len() != dims {
                tracing::warn!(position, "index snapshot is inconsistent, ignoring it");
                return Ok(None);
            }
            entries.push(IndexEntry::new(
                vector,
                Chunk {
                    text: row.try_get("text")?,
                    source: row.try_get("source")?,
                    page: row.try_get::<i64, _>("page")? as usize,
                    position,
                    index_in_page: row.try_get::<i64, _>("index_in_page")? as usize,
                },
            ));
        }

        Ok(Some(entries))
    }

    /// Replace the stored snapshot in one transaction.
    pub async fn save(&self, fingerprint: &str, model: &str, entries: &[IndexEntry]) -> Result<()> {
        let dims = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entries").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM snapshot_meta")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO snapshot_meta (id, fingerprint, model, dims, created_at) VALUES (1, ?, ?, ?, ?)",
        )
        .bind(fingerprint)
        .bind(model)
        .bind(dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        for entry in entries {
            let chunk = &entry.chunk;
            sqlx::query(
                "INSERT INTO entries (position, source, page, index_in_page, text, vector) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(chunk.position as i64)
            .bind(&chunk.source)
            .bind(chunk.page as i64)
            .bind(chunk.index_in_page as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
