//! Process-level persistence registration.
//!
//! A [`PersistenceRegistry`] binds a fixed [`EntityCatalog`] and an id
//! strategy to a connection pool exactly once, then hands out the
//! [`DataContextFactory`] through which all entity reads and writes go.

use crate::connection::pool::ConnectionPool;
use crate::context::DataContextFactory;
use crate::core::{DbError, Result};
use crate::entity::{Entity, EntityMapping};
use crate::identity::IdStrategy;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// The fixed set of entity types a registry manages.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    mappings: Vec<&'static EntityMapping>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity type. Registering the same type twice has no effect.
    pub fn with<E: Entity>(mut self) -> Self {
        let mapping = E::mapping();
        if self.get(mapping.table).is_none() {
            self.mappings.push(mapping);
        }
        self
    }

    pub fn mappings(&self) -> &[&'static EntityMapping] {
        &self.mappings
    }

    pub fn get(&self, table: &str) -> Option<&'static EntityMapping> {
        self.mappings.iter().copied().find(|m| m.table == table)
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.get(E::mapping().table).is_some()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Every key column must hold the strategy's keys and every reference
    /// must point at a member of the catalog.
    pub fn validate(&self, ids: &dyn IdStrategy) -> Result<()> {
        for mapping in &self.mappings {
            let key_length = mapping.key.length.unwrap_or(usize::MAX);
            if key_length < ids.encoded_len() {
                return Err(DbError::ConfigError(format!(
                    "Key column '{}.{}' holds {} characters but '{}' keys are {} long",
                    mapping.table,
                    mapping.key.column,
                    key_length,
                    ids.name(),
                    ids.encoded_len()
                )));
            }

            for reference in mapping.references() {
                let Some(target) = reference.reference else {
                    continue;
                };
                if self.get(target).is_none() {
                    return Err(DbError::ConfigError(format!(
                        "'{}.{}' references '{}', which is not a registered entity table",
                        mapping.entity, reference.field, target
                    )));
                }
            }
        }
        Ok(())
    }
}

enum RegistryState {
    Uninitialized,
    Initializing,
    Ready(Arc<DataContextFactory>),
}

/// Initialize-once registry. Build a fresh one per process (or per test).
pub struct PersistenceRegistry {
    catalog: Arc<EntityCatalog>,
    ids: Arc<dyn IdStrategy>,
    state: Mutex<RegistryState>,
}

impl PersistenceRegistry {
    pub fn new(catalog: EntityCatalog, ids: Arc<dyn IdStrategy>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            ids,
            state: Mutex::new(RegistryState::Uninitialized),
        }
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn id_strategy(&self) -> &Arc<dyn IdStrategy> {
        &self.ids
    }

    /// Register the catalog with `pool`: check the mappings, make sure the
    /// pool can hand out a connection, then create missing tables.
    ///
    /// Fails with `AlreadyInitialized` unless the registry is uninitialized;
    /// of concurrent callers exactly one gets past this check. A failed
    /// initialization leaves the registry uninitialized.
    pub async fn initialize(&self, pool: Arc<ConnectionPool>) -> Result<Arc<DataContextFactory>> {
        {
            let mut state = self.state.lock()?;
            if !matches!(*state, RegistryState::Uninitialized) {
                return Err(DbError::AlreadyInitialized);
            }
            *state = RegistryState::Initializing;
        }

        match self.register(pool).await {
            Ok(factory) => {
                *self.state.lock()? = RegistryState::Ready(Arc::clone(&factory));
                info!(
                    entities = self.catalog.len(),
                    id_strategy = self.ids.name(),
                    "persistence registry initialized"
                );
                Ok(factory)
            }
            Err(e) => {
                *self.state.lock()? = RegistryState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn register(&self, pool: Arc<ConnectionPool>) -> Result<Arc<DataContextFactory>> {
        self.catalog.validate(self.ids.as_ref())?;

        let probe = pool.get_connection().await.map_err(|e| match e {
            DbError::StorageUnavailable(_) => e,
            other => DbError::StorageUnavailable(other.to_string()),
        })?;
        probe.close().await?;

        {
            let mut db = pool.database().write().await;
            for mapping in self.catalog.mappings() {
                let created = db.ensure_table(mapping.table_schema(self.ids.name()))?;
                debug!(entity = mapping.entity, table = mapping.table, created, "entity registered");
            }
        }

        Ok(Arc::new(DataContextFactory::new(
            pool,
            Arc::clone(&self.catalog),
            Arc::clone(&self.ids),
        )))
    }

    pub fn context_factory(&self) -> Result<Arc<DataContextFactory>> {
        match &*self.state.lock()? {
            RegistryState::Ready(factory) => Ok(Arc::clone(factory)),
            _ => Err(DbError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, RegistryState::Ready(_)))
            .unwrap_or(false)
    }

    /// Back to uninitialized. Contexts already handed out keep working
    /// until they are closed.
    pub fn teardown(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if !matches!(*state, RegistryState::Ready(_)) {
            return Err(DbError::NotInitialized);
        }
        *state = RegistryState::Uninitialized;
        info!("persistence registry torn down");
        Ok(())
    }
}
