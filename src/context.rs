//! Data contexts: connection-scoped units of work over entities.

use crate::connection::Connection;
use crate::connection::pool::{ConnectionPool, PoolGuard};
use crate::core::{DbError, Result, Row};
use crate::entity::{Entity, EntityMapping, EntityRef};
use crate::facade::WriteOp;
use crate::identity::IdStrategy;
use crate::query::{QCriteria, QSelection};
use crate::registry::EntityCatalog;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Hands out data contexts. Obtained from an initialized
/// [`crate::registry::PersistenceRegistry`]; shared and read-only.
pub struct DataContextFactory {
    pool: Arc<ConnectionPool>,
    catalog: Arc<EntityCatalog>,
    ids: Arc<dyn IdStrategy>,
}

impl fmt::Debug for DataContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContextFactory")
            .field("catalog", &self.catalog)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl DataContextFactory {
    pub(crate) fn new(
        pool: Arc<ConnectionPool>,
        catalog: Arc<EntityCatalog>,
        ids: Arc<dyn IdStrategy>,
    ) -> Self {
        Self { pool, catalog, ids }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub async fn get_data_context(&self) -> Result<DataContext> {
        let guard = self.pool.get_connection().await?;
        Ok(DataContext {
            guard,
            catalog: Arc::clone(&self.catalog),
            ids: Arc::clone(&self.ids),
        })
    }
}

/// Reads and writes entities over one pooled connection.
///
/// Without [`begin`](Self::begin) every write is committed immediately.
/// The connection goes back to the pool on [`close`](Self::close) or drop;
/// an open transaction is rolled back then.
pub struct DataContext {
    guard: PoolGuard,
    catalog: Arc<EntityCatalog>,
    ids: Arc<dyn IdStrategy>,
}

impl DataContext {
    fn mapping<E: Entity>(&self) -> Result<&'static EntityMapping> {
        let mapping = E::mapping();
        if self.catalog.get(mapping.table).is_none() {
            return Err(DbError::UnknownEntity(mapping.entity.to_string()));
        }
        Ok(mapping)
    }

    fn conn(&self) -> Result<&Connection> {
        self.guard.connection_ref()
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.guard.connection()
    }

    /// Insert or update `entity`.
    ///
    /// An entity without a key gets a freshly generated one before the
    /// write. An entity with a key keeps it: the row is updated, or
    /// inserted under that key if absent. The key stays assigned even when
    /// the write is rejected.
    pub async fn save<E: Entity>(&mut self, entity: &mut E) -> Result<()> {
        let mapping = self.mapping::<E>()?;

        let op = match entity.id().map(str::to_string) {
            None => {
                entity.set_id(self.ids.generate());
                WriteOp::Insert {
                    table: mapping.table.to_string(),
                    row: entity.to_row(),
                }
            }
            Some(id) => {
                if self.conn()?.get(mapping.table, &id).await?.is_some() {
                    WriteOp::Update {
                        table: mapping.table.to_string(),
                        key: id,
                        row: entity.to_row(),
                    }
                } else {
                    WriteOp::Insert {
                        table: mapping.table.to_string(),
                        row: entity.to_row(),
                    }
                }
            }
        };

        debug!(entity = mapping.entity, op = op_kind(&op), "save");
        self.conn_mut()?.execute(op).await
    }

    pub async fn find<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let mapping = self.mapping::<E>()?;
        match self.conn()?.get(mapping.table, id).await? {
            Some(row) => E::from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`find`](Self::find), but a missing row is `NotFound`.
    pub async fn get<E: Entity>(&self, id: &str) -> Result<E> {
        self.find::<E>(id)
            .await?
            .ok_or_else(|| DbError::NotFound(E::mapping().table.to_string(), id.to_string()))
    }

    /// Load the target of a many-to-one reference.
    pub async fn resolve<E: Entity>(&self, reference: &EntityRef<E>) -> Result<E> {
        self.get(reference.id()).await
    }

    pub async fn query<E: Entity>(&self, criteria: &QCriteria<E>) -> Result<Vec<E>> {
        let mapping = self.mapping::<E>()?;
        let rows = self.conn()?.scan(mapping.table).await?;
        criteria.apply(rows)?.iter().map(E::from_row).collect()
    }

    /// At most one match expected; more is an error.
    pub async fn query_one<E: Entity>(&self, criteria: &QCriteria<E>) -> Result<Option<E>> {
        let mut found = self.query(criteria).await?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            n => Err(DbError::ExecutionError(format!(
                "query_one on '{}' matched {} rows",
                E::mapping().entity,
                n
            ))),
        }
    }

    pub async fn select<E: Entity>(&self, selection: &QSelection<E>) -> Result<Vec<Row>> {
        let mapping = self.mapping::<E>()?;
        let rows = self.conn()?.scan(mapping.table).await?;
        selection.apply(rows)
    }

    /// Remove the entity's row. Refused while other rows reference it.
    pub async fn delete<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let mapping = self.mapping::<E>()?;
        let id = entity.id().ok_or_else(|| {
            DbError::InvalidIdentifier(format!("Cannot delete an unsaved {}", mapping.entity))
        })?;
        let op = WriteOp::Delete {
            table: mapping.table.to_string(),
            key: id.to_string(),
        };
        self.conn_mut()?.execute(op).await
    }

    pub fn begin(&mut self) -> Result<()> {
        self.conn_mut()?.begin()
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.conn_mut()?.commit().await
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.conn_mut()?.rollback()
    }

    pub fn is_in_transaction(&self) -> bool {
        self.conn().is_ok_and(Connection::is_in_transaction)
    }

    /// Return the connection to the pool, rolling back an open transaction.
    pub async fn close(self) -> Result<()> {
        self.guard.close().await
    }
}

fn op_kind(op: &WriteOp) -> &'static str {
    match op {
        WriteOp::Insert { .. } => "insert",
        WriteOp::Update { .. } => "update",
        WriteOp::Delete { .. } => "delete",
    }
}
