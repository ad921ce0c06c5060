use super::{Connection, config::{ConnectionConfig, StorageUrl}};
use crate::core::{DbError, Result};
use crate::facade::Database;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Connection pool
///
/// Hands out connections to one shared [`Database`]. Connections come back
/// through [`PoolGuard`] and are reused until they exceed `max_lifetime` or
/// sit idle longer than `idle_timeout`.
pub struct ConnectionPool {
    /// Pool configuration
    config: ConnectionConfig,
    /// Available connections
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// Total number of connections created
    total_connections: Arc<AtomicUsize>,
    /// Shared database instance
    db: Arc<RwLock<Database>>,
    /// Next connection ID
    next_id: Arc<Mutex<u64>>,
}

/// A connection from the pool
struct PooledConnection {
    connection: Connection,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Connection) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|lifetime| self.created_at.elapsed() > lifetime)
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        idle_timeout.is_some_and(|timeout| self.last_used.elapsed() > timeout)
    }
}

impl ConnectionPool {
    /// Open the database named by `config.url` and pool connections to it.
    pub async fn open(config: ConnectionConfig) -> Result<Self> {
        config.validate().map_err(DbError::ConfigError)?;

        let db = match &config.url {
            StorageUrl::Memory(name) => Database::in_memory(name.clone()),
            StorageUrl::File(path) => Database::open(path)?,
        };
        info!(url = %config.url, user = %config.username, "opening connection pool");
        Self::new_with_db(config, Arc::new(RwLock::new(db))).await
    }

    /// Pool connections to an already open database.
    pub async fn new_with_db(config: ConnectionConfig, db: Arc<RwLock<Database>>) -> Result<Self> {
        config.validate().map_err(DbError::ConfigError)?;

        let pool = Self {
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            db,
            next_id: Arc::new(Mutex::new(1)),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections().await;

        Ok(pool)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<RwLock<Database>> {
        &self.db
    }

    /// Get a connection from the pool, waiting up to `connect_timeout`.
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            if let Some(mut pooled) = self.try_get_available().await {
                pooled.last_used = Instant::now();
                return Ok(self.guard(pooled.connection));
            }

            if let Some(conn) = self.try_create_connection().await {
                return Ok(self.guard(conn));
            }

            if start.elapsed() > self.config.connect_timeout {
                return Err(DbError::StorageUnavailable(format!(
                    "Connection pool timeout: no connection available within {:?}",
                    self.config.connect_timeout
                )));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn guard(&self, connection: Connection) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            pool: self.available.clone(),
            total_connections: self.total_connections.clone(),
        }
    }

    /// Pop an available connection, evicting expired and idle ones first.
    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let before = available.len();
        available.retain(|pooled| {
            !pooled.is_expired(self.config.max_lifetime)
                && !pooled.is_idle_too_long(self.config.idle_timeout)
        });
        let removed = before - available.len();
        if removed > 0 {
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
        }

        available.pop_front()
    }

    async fn try_create_connection(&self) -> Option<Connection> {
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < self.config.max_connections).then_some(total + 1)
            });
        if reserved.is_err() {
            return None;
        }

        Some(self.new_connection().await)
    }

    async fn new_connection(&self) -> Connection {
        let mut next_id = self.next_id.lock().await;
        let id = *next_id;
        *next_id += 1;
        Connection::new(id, self.config.username.clone(), Arc::clone(&self.db))
    }

    async fn ensure_min_connections(&self) {
        let mut created = Vec::new();
        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            self.total_connections.fetch_add(1, Ordering::SeqCst);
            created.push(PooledConnection::new(self.new_connection().await));
        }
        self.available.lock().await.extend(created);
    }

    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when closed or dropped. An open
/// transaction is rolled back first.
pub struct PoolGuard {
    connection: Option<Connection>,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
}

impl PoolGuard {
    pub fn connection(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| DbError::ExecutionError("Connection already returned to pool".into()))
    }

    pub fn connection_ref(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| DbError::ExecutionError("Connection already returned to pool".into()))
    }

    /// Return the connection to the pool.
    pub async fn close(mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            let connection = reset(connection)?;
            match connection {
                Some(connection) => self.pool.lock().await.push_back(PooledConnection::new(connection)),
                None => {
                    self.total_connections.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }
}

/// Roll back an open transaction. A closed connection is not reusable.
fn reset(mut connection: Connection) -> Result<Option<Connection>> {
    if connection.is_in_transaction() {
        warn!(
            connection = connection.id(),
            discarded = connection.pending_writes(),
            "connection returned with an open transaction; rolling back"
        );
        connection.rollback()?;
    }
    Ok(connection.is_active().then_some(connection))
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let connection = match reset(connection) {
            Ok(Some(connection)) => connection,
            _ => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        };

        // Try to return to pool if we can acquire the lock immediately
        if let Ok(mut pool) = self.pool.try_lock() {
            pool.push_back(PooledConnection::new(connection));
        } else {
            warn!(connection = connection.id(), "pool lock busy; dropping connection");
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, Value};
    use crate::facade::WriteOp;
    use crate::storage::TableSchema;

    fn config() -> ConnectionConfig {
        ConnectionConfig::memory("pool-test")
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = ConnectionPool::open(config().min_connections(2).max_connections(5))
            .await
            .unwrap();
        let stats = pool.stats().await;

        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.available_connections, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = ConnectionPool::open(config().max_connections(0)).await;
        assert!(matches!(result, Err(DbError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_get_connection() {
        let pool = ConnectionPool::open(config()).await.unwrap();
        let mut guard = pool.get_connection().await.unwrap();

        assert!(guard.connection().unwrap().is_active());
        assert_eq!(guard.connection_ref().unwrap().username(), "sa");
    }

    #[tokio::test]
    async fn test_connection_return_to_pool() {
        let pool = ConnectionPool::open(config().min_connections(1).max_connections(5))
            .await
            .unwrap();

        {
            let _conn = pool.get_connection().await.unwrap();
            let stats = pool.stats().await;
            assert_eq!(stats.active_connections, 1);
            assert_eq!(stats.available_connections, 0);
        }

        let stats = pool.stats().await;
        assert_eq!(stats.available_connections, 1);
    }

    #[tokio::test]
    async fn test_max_connections_limit() {
        let pool = ConnectionPool::open(
            config()
                .min_connections(0)
                .max_connections(2)
                .connect_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        let _conn1 = pool.get_connection().await.unwrap();
        let _conn2 = pool.get_connection().await.unwrap();

        let result = pool.get_connection().await;
        assert!(matches!(result, Err(DbError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transaction() {
        let mut db = Database::in_memory("rollback");
        db.create_table(TableSchema::new(
            "items",
            vec![Column::new("id", DataType::Text).primary_key()],
            "uuid4-compact",
        ))
        .unwrap();
        let pool = ConnectionPool::new_with_db(config(), Arc::new(RwLock::new(db)))
            .await
            .unwrap();

        let mut guard = pool.get_connection().await.unwrap();
        let conn = guard.connection().unwrap();
        conn.begin().unwrap();
        conn.execute(WriteOp::Insert {
            table: "items".into(),
            row: vec![Value::from("a")],
        })
        .await
        .unwrap();
        guard.close().await.unwrap();

        let mut guard = pool.get_connection().await.unwrap();
        let conn = guard.connection().unwrap();
        assert!(!conn.is_in_transaction());
        assert!(conn.scan("items").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_url_opens_durable_database() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(ConnectionConfig::file(dir.path()))
            .await
            .unwrap();
        assert!(pool.database().read().await.is_durable());
    }
}
