//! Application bootstrap: configuration, pool, registry.

use crate::config::{AppConfig, DatabaseSource};
use crate::connection::config::ConnectionConfig;
use crate::connection::pool::ConnectionPool;
use crate::context::DataContextFactory;
use crate::core::Result;
use crate::identity::{IdStrategy, default_strategy};
use crate::model::vera_catalog;
use crate::registry::PersistenceRegistry;
use std::sync::Arc;
use tracing::info;

/// A started vera application. Everything it hands out is shared and
/// read-only until [`shutdown`](Self::shutdown).
pub struct VeraApplication {
    config: AppConfig,
    pool: Arc<ConnectionPool>,
    registry: PersistenceRegistry,
    contexts: Arc<DataContextFactory>,
}

impl VeraApplication {
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        Self::initialize_with(config, default_strategy()).await
    }

    pub async fn initialize_with(config: AppConfig, ids: Arc<dyn IdStrategy>) -> Result<Self> {
        let pool_config = match &config.database {
            DatabaseSource::Pool(pool) => pool.clone(),
            DatabaseSource::Temporary(path) => {
                info!("Database path is {}", path.display());
                ConnectionConfig::file(path)
            }
        };

        let pool = Arc::new(ConnectionPool::open(pool_config).await?);
        let registry = PersistenceRegistry::new(vera_catalog(), ids);
        let contexts = registry.initialize(Arc::clone(&pool)).await?;

        if let Some(url) = &config.application_url {
            info!(url = %url, "application url set");
        }

        Ok(Self {
            config,
            pool,
            registry,
            contexts,
        })
    }

    pub fn data_contexts(&self) -> &Arc<DataContextFactory> {
        &self.contexts
    }

    pub fn registry(&self) -> &PersistenceRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn application_url(&self) -> Option<&str> {
        self.config.application_url.as_deref()
    }

    pub async fn shutdown(self) -> Result<()> {
        let stats = self.pool.stats().await;
        info!(%stats, "shutting down");
        self.registry.teardown()
    }
}
