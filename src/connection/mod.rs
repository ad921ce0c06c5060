pub mod config;
pub mod pool;

use crate::core::{DbError, Result, Row};
use crate::facade::{Database, WriteOp};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Database connection handle
///
/// Outside a transaction every write is applied (and made durable) at once.
/// Inside one, writes are validated against column constraints and buffered;
/// `commit` applies the whole buffer atomically and `rollback` discards it.
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// User id the pool was configured with
    username: String,
    /// Shared database instance
    db: Arc<RwLock<Database>>,
    /// Connection state
    state: ConnectionState,
    /// Writes of the open transaction, in issue order
    pending: Vec<WriteOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    InTransaction,
    Closed,
}

impl Connection {
    pub(crate) fn new(id: u64, username: String, db: Arc<RwLock<Database>>) -> Self {
        Self {
            id,
            username,
            db,
            state: ConnectionState::Active,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(DbError::ExecutionError("Connection is closed".into()));
        }
        Ok(())
    }

    /// Issue one write.
    ///
    /// In a transaction the row is checked against its table's column
    /// constraints right away; references and key uniqueness are checked at
    /// commit, when the whole batch is applied.
    pub async fn execute(&mut self, op: WriteOp) -> Result<()> {
        self.ensure_open()?;

        if self.state == ConnectionState::InTransaction {
            {
                let db = self.db.read().await;
                match &op {
                    WriteOp::Insert { table, row } | WriteOp::Update { table, row, .. } => {
                        db.validate(table, row)?
                    }
                    WriteOp::Delete { table, .. } => {
                        db.table(table)?;
                    }
                }
            }
            self.pending.push(op);
            return Ok(());
        }

        debug!(connection = self.id, table = op.table(), "write");
        self.db.write().await.apply(vec![op])
    }

    /// Row stored under `key`, as seen by this connection.
    pub async fn get(&self, table: &str, key: &str) -> Result<Option<Row>> {
        self.ensure_open()?;
        let db = self.db.read().await;
        let mut row = db.get(table, key)?;
        if self.pending.is_empty() {
            return Ok(row);
        }

        let key_index = db.table(table)?.schema().key_index();
        for op in self.pending.iter().filter(|op| op.table() == table) {
            match op {
                WriteOp::Insert { row: new, .. } if row_key(new, key_index) == Some(key) => {
                    row = Some(new.clone())
                }
                WriteOp::Update { key: k, row: new, .. } if k == key => row = Some(new.clone()),
                WriteOp::Delete { key: k, .. } if k == key => row = None,
                _ => {}
            }
        }
        Ok(row)
    }

    /// All rows of `table` in key order, as seen by this connection.
    pub async fn scan(&self, table: &str) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let db = self.db.read().await;
        if self.pending.is_empty() {
            return db.scan(table);
        }

        let key_index = db.table(table)?.schema().key_index();
        let mut rows: BTreeMap<String, Row> = db
            .scan(table)?
            .into_iter()
            .filter_map(|row| row_key(&row, key_index).map(str::to_string).map(|k| (k, row)))
            .collect();

        for op in self.pending.iter().filter(|op| op.table() == table) {
            match op {
                WriteOp::Insert { row, .. } => {
                    if let Some(k) = row_key(row, key_index) {
                        rows.insert(k.to_string(), row.clone());
                    }
                }
                WriteOp::Update { key, row, .. } => {
                    rows.insert(key.clone(), row.clone());
                }
                WriteOp::Delete { key, .. } => {
                    rows.remove(key);
                }
            }
        }
        Ok(rows.into_values().collect())
    }

    pub fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.state == ConnectionState::InTransaction {
            return Err(DbError::ExecutionError("Transaction already active".into()));
        }

        self.state = ConnectionState::InTransaction;
        Ok(())
    }

    /// Apply the buffered writes. On failure nothing is written and the
    /// transaction is over.
    pub async fn commit(&mut self) -> Result<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(DbError::ExecutionError("No active transaction".into()));
        }

        let pending = std::mem::take(&mut self.pending);
        self.state = ConnectionState::Active;
        debug!(connection = self.id, writes = pending.len(), "commit");
        self.db.write().await.apply(pending)
    }

    pub fn rollback(&mut self) -> Result<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(DbError::ExecutionError("No active transaction".into()));
        }

        if !self.pending.is_empty() {
            debug!(connection = self.id, discarded = self.pending.len(), "rollback");
        }
        self.pending.clear();
        self.state = ConnectionState::Active;
        Ok(())
    }

    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::InTransaction {
            self.rollback()?;
        }

        self.state = ConnectionState::Closed;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn row_key(row: &Row, key_index: usize) -> Option<&str> {
    row.get(key_index).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, Value};
    use crate::storage::TableSchema;

    fn create_test_connection() -> Connection {
        let mut db = Database::in_memory("test");
        db.create_table(TableSchema::new(
            "items",
            vec![
                Column::new("id", DataType::Text).primary_key(),
                Column::new("name", DataType::Text).not_null().max_length(8),
            ],
            "uuid4-compact",
        ))
        .unwrap();
        Connection::new(1, "sa".into(), Arc::new(RwLock::new(db)))
    }

    fn insert(key: &str, name: &str) -> WriteOp {
        WriteOp::Insert {
            table: "items".into(),
            row: vec![Value::from(key), Value::from(name)],
        }
    }

    #[tokio::test]
    async fn test_connection_creation() {
        let conn = create_test_connection();
        assert_eq!(conn.id(), 1);
        assert_eq!(conn.username(), "sa");
        assert!(conn.is_active());
        assert!(!conn.is_in_transaction());
    }

    #[tokio::test]
    async fn test_autocommit_write() {
        let mut conn = create_test_connection();
        conn.execute(insert("a", "apple")).await.unwrap();
        assert!(conn.get("items", "a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transaction_sees_own_writes() {
        let mut conn = create_test_connection();
        conn.execute(insert("a", "apple")).await.unwrap();

        conn.begin().unwrap();
        conn.execute(insert("b", "banana")).await.unwrap();
        conn.execute(WriteOp::Delete {
            table: "items".into(),
            key: "a".into(),
        })
        .await
        .unwrap();

        assert!(conn.get("items", "a").await.unwrap().is_none());
        assert!(conn.get("items", "b").await.unwrap().is_some());
        assert_eq!(conn.scan("items").await.unwrap().len(), 1);
        assert_eq!(conn.pending_writes(), 2);

        conn.commit().await.unwrap();
        assert!(!conn.is_in_transaction());
        assert_eq!(conn.scan("items").await.unwrap()[0][0], Value::from("b"));
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let mut conn = create_test_connection();

        conn.begin().unwrap();
        conn.execute(insert("a", "apple")).await.unwrap();
        conn.rollback().unwrap();

        assert!(!conn.is_in_transaction());
        assert!(conn.scan("items").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_row_rejected_inside_transaction() {
        let mut conn = create_test_connection();
        conn.begin().unwrap();
        let err = conn.execute(insert("a", "far too long")).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(conn.pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let mut conn = create_test_connection();
        conn.begin().unwrap();
        conn.execute(insert("a", "apple")).await.unwrap();
        conn.execute(insert("a", "again")).await.unwrap();

        assert!(conn.commit().await.is_err());
        assert!(conn.scan("items").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_close() {
        let mut conn = create_test_connection();

        assert!(conn.close().is_ok());
        assert!(!conn.is_active());
        assert!(conn.execute(insert("a", "apple")).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_without_transaction_fails() {
        let mut conn = create_test_connection();
        assert!(conn.commit().await.is_err());
        assert!(conn.rollback().is_err());
    }
}
