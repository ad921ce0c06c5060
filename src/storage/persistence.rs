//! Snapshot persistence for file-backed databases.
//!
//! The whole database is written as one MessagePack image after every
//! committed write. Writes go to a temporary file in the same directory
//! which is then renamed over the previous snapshot.

use crate::core::{DbError, Result};
use crate::storage::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SNAPSHOT_FILE: &str = "vera.snapshot";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    pub tables: HashMap<String, Table>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub row_count: usize,
    pub table_count: usize,
}

impl DatabaseSnapshot {
    pub fn new(tables: HashMap<String, Table>) -> Self {
        let row_count = tables.values().map(|t| t.row_count()).sum();
        let table_count = tables.len();

        Self {
            version: SNAPSHOT_VERSION,
            tables,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                row_count,
                table_count,
            },
        }
    }
}

#[derive(Debug)]
pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    /// Snapshot stored as `vera.snapshot` inside `data_dir`; the directory
    /// is created when missing.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| {
            DbError::StorageUnavailable(format!(
                "Cannot create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            snapshot_path: data_dir.join(SNAPSHOT_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn save(&self, tables: &HashMap<String, Table>) -> Result<()> {
        let snapshot = DatabaseSnapshot::new(tables.clone());
        let dir = self.snapshot_path.parent().unwrap_or_else(|| Path::new("."));

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| DbError::IoError(format!("Failed to create temp file: {}", e)))?;
        let serialized = rmp_serde::to_vec(&snapshot)
            .map_err(|e| DbError::ExecutionError(format!("Failed to serialize snapshot: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| DbError::IoError(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| DbError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to replace snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<DatabaseSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: DatabaseSnapshot = rmp_serde::from_slice(&data)
            .map_err(|e| DbError::ExecutionError(format!("Failed to deserialize snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DbError::ExecutionError(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}
