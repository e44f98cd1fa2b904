//! Scan history persisted in SQLite.

use deepcheck_core::DetectionReport;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scan_history (
    id          TEXT PRIMARY KEY,
    filename    TEXT NOT NULL,
    file_type   TEXT NOT NULL,
    prediction  TEXT NOT NULL,
    confidence  REAL NOT NULL,
    reasoning   TEXT NOT NULL,
    sha256      TEXT,
    timestamp   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scan_history_timestamp ON scan_history (timestamp);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("database: {0}")]
    Database(#[from] tokio_rusqlite::Error),
}

/// Kind of media a scan was run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Image,
    Video,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
        }
    }
}

/// One persisted detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub prediction: String,
    pub confidence: f64,
    pub reasoning: String,
    pub sha256: Option<String>,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl ScanRecord {
    /// Build a fresh record for `report`, stamped now. `sha256` is the hex
    /// digest of the scanned file, when one was taken.
    pub fn new(filename: &str, file_type: FileType, report: &DetectionReport, sha256: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            file_type: file_type.as_str().to_string(),
            prediction: report.label.to_string(),
            confidence: report.confidence,
            reasoning: report.reasoning.clone(),
            sha256,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Hex SHA-256 of an in-memory file.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hex SHA-256 of a file on disk, streamed rather than read whole.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Handle to the history database. Cheap to clone.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "opened scan history");
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub async fn record(&self, record: ScanRecord) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO scan_history
                        (id, filename, file_type, prediction, confidence, reasoning, sha256, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        record.id,
                        record.filename,
                        record.file_type,
                        record.prediction,
                        record.confidence,
                        record.reasoning,
                        record.sha256,
                        record.timestamp,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// The `limit` most recent scans, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ScanRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, filename, file_type, prediction, confidence, reasoning, sha256, timestamp
                     FROM scan_history
                     ORDER BY timestamp DESC, rowid DESC
                     LIMIT ?1",
                )?;
                let rows = stmt.query_map([limit], |row| {
                    Ok(ScanRecord {
                        id: row.get(0)?,
                        filename: row.get(1)?,
                        file_type: row.get(2)?,
                        prediction: row.get(3)?,
                        confidence: row.get(4)?,
                        reasoning: row.get(5)?,
                        sha256: row.get(6)?,
                        timestamp: row.get(7)?,
                    })
                })?;
                let records = rows.collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(records)
            })
            .await?;
        Ok(records)
    }
}
