use crate::core::{DbError, Result, Row, Value};
use crate::storage::{SnapshotManager, Table, TableSchema};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One durable change to a table.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert { table: String, row: Row },
    Update { table: String, key: String, row: Row },
    Delete { table: String, key: String },
}

impl WriteOp {
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }
}

/// Inverse of an applied op, replayed when a batch fails part-way.
enum Undo {
    Remove { table: String, key: String },
    Restore { table: String, key: String, row: Row },
    Reinsert { table: String, row: Row },
}

/// Where the database keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Memory(String),
    File(PathBuf),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(name) => write!(f, "in-memory database '{}'", name),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Tables of all registered entity types plus the constraints spanning
/// them. Shared behind an async `RwLock` by every connection of a pool.
pub struct Database {
    tables: HashMap<String, Table>,
    location: Location,
    snapshots: Option<SnapshotManager>,
}

impl Database {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            tables: HashMap::new(),
            location: Location::Memory(name.into()),
            snapshots: None,
        }
    }

    /// Open (or create) a file-backed database in `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let snapshots = SnapshotManager::open(data_dir)?;
        let tables = match snapshots.load() {
            Ok(Some(snapshot)) => {
                info!(
                    path = %snapshots.path().display(),
                    tables = snapshot.metadata.table_count,
                    rows = snapshot.metadata.row_count,
                    "database snapshot loaded"
                );
                snapshot.tables
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                return Err(DbError::StorageUnavailable(format!(
                    "Cannot read database at {}: {}",
                    data_dir.display(),
                    e
                )));
            }
        };

        Ok(Self {
            tables,
            location: Location::File(data_dir.to_path_buf()),
            snapshots: Some(snapshots),
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_durable(&self) -> bool {
        self.snapshots.is_some()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let name = schema.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }
        self.tables.insert(name, Table::new(schema));
        self.flush()
    }

    /// Create the table unless a table with the same layout exists. Returns
    /// whether the table was created. An existing table issued by another
    /// id strategy is switched to the new one; its old keys stay valid.
    pub fn ensure_table(&mut self, schema: TableSchema) -> Result<bool> {
        let Some(existing) = self.tables.get_mut(schema.name()) else {
            self.create_table(schema)?;
            return Ok(true);
        };

        if !existing.schema().same_layout(&schema) {
            return Err(DbError::ConfigError(format!(
                "Table '{}' exists with a different column layout",
                schema.name()
            )));
        }

        if existing.schema().key_strategy() != schema.key_strategy() {
            warn!(
                table = schema.name(),
                from = existing.schema().key_strategy(),
                to = schema.key_strategy(),
                "key strategy changed; existing keys are kept"
            );
            existing.schema_mut().set_key_strategy(schema.key_strategy());
            self.flush()?;
        }
        Ok(false)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, table: &str, key: &str) -> Result<Option<Row>> {
        Ok(self.table(table)?.get(key).cloned())
    }

    pub fn scan(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self.table(table)?.scan().cloned().collect())
    }

    /// Check a row against its table's column constraints without writing.
    pub fn validate(&self, table: &str, row: &Row) -> Result<()> {
        self.table(table)?.validate_row(row)
    }

    /// Apply all ops or none. On the first failure every op already applied
    /// is undone in reverse order and the error is returned.
    pub fn apply(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut undo_log = Vec::with_capacity(ops.len());
        for op in ops {
            match self.apply_one(op) {
                Ok(undo) => undo_log.push(undo),
                Err(e) => {
                    debug!(undone = undo_log.len(), error = %e, "write batch rejected");
                    self.revert(undo_log);
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.flush() {
            self.revert(undo_log);
            return Err(e);
        }
        Ok(())
    }

    fn apply_one(&mut self, op: WriteOp) -> Result<Undo> {
        match op {
            WriteOp::Insert { table, row } => {
                self.check_references(&table, &row)?;
                let key = self.table_mut(&table)?.insert(row)?;
                Ok(Undo::Remove { table, key })
            }
            WriteOp::Update { table, key, row } => {
                self.check_references(&table, &row)?;
                let old = self.table_mut(&table)?.update(&key, row)?;
                Ok(Undo::Restore { table, key, row: old })
            }
            WriteOp::Delete { table, key } => {
                self.check_not_referenced(&table, &key)?;
                let old = self
                    .table_mut(&table)?
                    .delete(&key)
                    .ok_or_else(|| DbError::NotFound(table.clone(), key.clone()))?;
                Ok(Undo::Reinsert { table, row: old })
            }
        }
    }

    fn revert(&mut self, undo_log: Vec<Undo>) {
        for undo in undo_log.into_iter().rev() {
            let reverted = match undo {
                Undo::Remove { table, key } => self.table_mut(&table).map(|t| {
                    t.delete(&key);
                }),
                Undo::Restore { table, key, row } => {
                    self.table_mut(&table).and_then(|t| t.update(&key, row).map(|_| ()))
                }
                Undo::Reinsert { table, row } => {
                    self.table_mut(&table).and_then(|t| t.insert(row).map(|_| ()))
                }
            };
            if let Err(e) = reverted {
                warn!(error = %e, "failed to undo write");
            }
        }
    }

    /// Every non-null reference in `row` must name an existing key.
    fn check_references(&self, table: &str, row: &Row) -> Result<()> {
        let schema = self.table(table)?.schema().schema();
        for (idx, fk) in schema.foreign_keys() {
            let Some(Value::Text(target_key)) = row.get(idx) else {
                continue;
            };
            let target = self.table(&fk.table)?;
            if !target.contains_key(target_key) {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' of '{}' references non-existent key '{}' in '{}'",
                    schema.columns()[idx].name,
                    table,
                    target_key,
                    fk.table
                )));
            }
        }
        Ok(())
    }

    /// Deleting a row still referenced from another table is refused.
    fn check_not_referenced(&self, table: &str, key: &str) -> Result<()> {
        for (name, other) in &self.tables {
            for (idx, fk) in other.schema().schema().foreign_keys() {
                if fk.table == table && other.any_references(idx, key) {
                    return Err(DbError::ConstraintViolation(format!(
                        "Delete of '{}' in '{}' violates foreign key constraint from '{}'",
                        key, table, name
                    )));
                }
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if let Some(snapshots) = &self.snapshots {
            snapshots.save(&self.tables)?;
        }
        Ok(())
    }
}
