// ============================================================================
// vera: entity persistence with UUID surrogate keys
// ============================================================================

pub mod app;
pub mod config;
pub mod connection;
pub mod context;
pub mod core;
pub mod entity;
pub mod facade;
pub mod identity;
pub mod model;
pub mod query;
pub mod registry;
pub mod storage;

// Re-export main types for convenience
pub use crate::core::{DataType, DbError, Result, Row, Value};
pub use facade::{Database, WriteOp};

pub use app::VeraApplication;
pub use config::{AppConfig, ConfigLocator, DatabaseSource, Properties};
pub use context::{DataContext, DataContextFactory};
pub use entity::{ColumnMapping, Entity, EntityMapping, EntityRef, Property};
pub use identity::{CompactUuidStrategy, HyphenatedUuidStrategy, IdStrategy};
pub use model::{Attribute, Class, Domain, vera_catalog};
pub use query::{QCriteria, QSelection, Restriction};
pub use registry::{EntityCatalog, PersistenceRegistry};

// Re-export connection API
pub use connection::{
    Connection,
    config::{ConnectionConfig, StorageUrl},
    pool::{ConnectionPool, PoolGuard, PoolStats},
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_in_memory_application() {
        let config = AppConfig {
            property_file: None,
            application_url: Some("http://localhost:8080/vera/".into()),
            database: DatabaseSource::Pool(ConnectionConfig::memory("lib-test")),
        };
        let app = VeraApplication::initialize(config).await.unwrap();
        assert_eq!(app.application_url(), Some("http://localhost:8080/vera/"));

        let mut dc = app.data_contexts().get_data_context().await.unwrap();
        let mut domain = Domain::new("Finance", "FIN", "FF0000");
        dc.save(&mut domain).await.unwrap();
        dc.close().await.unwrap();

        assert!(app.registry().is_initialized());
        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_temporary_database_is_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_properties(&Properties::default())
            .unwrap()
            .with_temp_path(dir.path().join("data"));

        let app = VeraApplication::initialize_with(config, Arc::new(CompactUuidStrategy))
            .await
            .unwrap();
        assert!(app.pool().database().read().await.is_durable());
        assert!(dir.path().join("data").exists());
    }
}
