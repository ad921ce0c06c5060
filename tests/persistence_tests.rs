use std::sync::Arc;
use vera::identity::{KEY_COLUMN_LENGTH, default_strategy};
use vera::{
    Attribute, Class, ConnectionConfig, ConnectionPool, DataContextFactory, DbError, Domain,
    Entity, EntityCatalog, EntityRef, PersistenceRegistry, QCriteria, vera_catalog,
};

async fn setup(name: &str) -> (PersistenceRegistry, Arc<DataContextFactory>) {
    let pool = ConnectionPool::open(ConnectionConfig::memory(name)).await.unwrap();
    let registry = PersistenceRegistry::new(vera_catalog(), default_strategy());
    let factory = registry.initialize(Arc::new(pool)).await.unwrap();
    (registry, factory)
}

#[tokio::test]
async fn test_finance_domain_round_trip() {
    let (_registry, factory) = setup("finance").await;
    let mut dc = factory.get_data_context().await.unwrap();

    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    assert!(domain.id().is_none());
    dc.save(&mut domain).await.unwrap();

    let id = domain.id().unwrap().to_string();
    assert!(!id.is_empty());
    assert!(id.len() <= KEY_COLUMN_LENGTH);

    let loaded: Domain = dc.get(&id).await.unwrap();
    assert_eq!(loaded, domain);
    assert_eq!(loaded.name, "Finance");
    assert_eq!(loaded.mnemonic, "FIN");
    assert_eq!(loaded.rgb_color, "FF0000");
}

#[tokio::test]
async fn test_save_never_changes_assigned_key() {
    let (_registry, factory) = setup("idempotent").await;
    let mut dc = factory.get_data_context().await.unwrap();

    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    dc.save(&mut domain).await.unwrap();
    let id = domain.id().unwrap().to_string();

    domain.name = "Treasury".into();
    dc.save(&mut domain).await.unwrap();
    dc.save(&mut domain).await.unwrap();

    assert_eq!(domain.id(), Some(id.as_str()));
    let all = dc.query(&QCriteria::<Domain>::create()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Treasury");
}

#[tokio::test]
async fn test_preassigned_key_is_inserted_as_is() {
    let (_registry, factory) = setup("preassigned").await;
    let mut dc = factory.get_data_context().await.unwrap();

    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    domain.set_id("imported-key-0001".into());
    dc.save(&mut domain).await.unwrap();

    assert_eq!(domain.id(), Some("imported-key-0001"));
    assert!(dc.find::<Domain>("imported-key-0001").await.unwrap().is_some());
}

#[tokio::test]
async fn test_class_with_missing_domain_is_rejected() {
    let (_registry, factory) = setup("dangling").await;
    let mut dc = factory.get_data_context().await.unwrap();

    let mut class = Class::new("Ledger", EntityRef::from_id("no-such-domain"));
    let err = dc.save(&mut class).await.unwrap_err();

    assert!(matches!(err, DbError::ConstraintViolation(_)));
    assert!(err.is_validation());
    let id = class.id().unwrap().to_string();
    assert!(dc.find::<Class>(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_column_constraints_are_validation_failures() {
    let (_registry, factory) = setup("lengths").await;
    let mut dc = factory.get_data_context().await.unwrap();

    let mut domain = Domain::new("Finance", "FINANCE", "FF0000");
    let err = dc.save(&mut domain).await.unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("dom_mnemonic"));

    let mut domain = Domain::new("x".repeat(129), "FIN", "FF0000");
    assert!(dc.save(&mut domain).await.unwrap_err().is_validation());

    assert!(dc.query(&QCriteria::<Domain>::create()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resolve_many_to_one() {
    let (_registry, factory) = setup("resolve").await;
    let mut dc = factory.get_data_context().await.unwrap();

    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    dc.save(&mut domain).await.unwrap();
    let mut class = Class::new("Ledger", EntityRef::to(&domain).unwrap());
    dc.save(&mut class).await.unwrap();
    let mut attribute = Attribute::new("amount", EntityRef::to(&class).unwrap());
    dc.save(&mut attribute).await.unwrap();

    let loaded: Attribute = dc.get(attribute.id().unwrap()).await.unwrap();
    let class = dc.resolve(&loaded.class).await.unwrap();
    let domain = dc.resolve(&class.domain).await.unwrap();
    assert_eq!(class.name, "Ledger");
    assert_eq!(domain.name, "Finance");
}

#[tokio::test]
async fn test_reference_to_unsaved_entity_fails() {
    let domain = Domain::new("Finance", "FIN", "FF0000");
    assert!(matches!(
        EntityRef::to(&domain),
        Err(DbError::ConstraintViolation(_))
    ));
}

#[tokio::test]
async fn test_delete_restricted_while_referenced() {
    let (_registry, factory) = setup("restrict").await;
    let mut dc = factory.get_data_context().await.unwrap();

    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    dc.save(&mut domain).await.unwrap();
    let mut class = Class::new("Ledger", EntityRef::to(&domain).unwrap());
    dc.save(&mut class).await.unwrap();

    let err = dc.delete(&domain).await.unwrap_err();
    assert!(err.is_validation());

    dc.delete(&class).await.unwrap();
    dc.delete(&domain).await.unwrap();
    assert!(dc.find::<Domain>(domain.id().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_unsaved_entity_fails() {
    let (_registry, factory) = setup("delete-unsaved").await;
    let mut dc = factory.get_data_context().await.unwrap();
    let domain = Domain::new("Finance", "FIN", "FF0000");
    assert!(matches!(
        dc.delete(&domain).await,
        Err(DbError::InvalidIdentifier(_))
    ));
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let (_registry, factory) = setup("transactions").await;
    let mut dc = factory.get_data_context().await.unwrap();

    dc.begin().unwrap();
    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    dc.save(&mut domain).await.unwrap();
    let mut class = Class::new("Ledger", EntityRef::to(&domain).unwrap());
    dc.save(&mut class).await.unwrap();

    // Own writes are visible before commit, other contexts see nothing yet.
    assert!(dc.find::<Class>(class.id().unwrap()).await.unwrap().is_some());
    let other = factory.get_data_context().await.unwrap();
    assert!(other.find::<Domain>(domain.id().unwrap()).await.unwrap().is_none());

    dc.rollback().unwrap();
    assert!(dc.find::<Domain>(domain.id().unwrap()).await.unwrap().is_none());

    dc.begin().unwrap();
    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    dc.save(&mut domain).await.unwrap();
    dc.commit().await.unwrap();
    assert!(other.find::<Domain>(domain.id().unwrap()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_commit_leaves_no_partial_write() {
    let (_registry, factory) = setup("atomic").await;
    let mut dc = factory.get_data_context().await.unwrap();

    dc.begin().unwrap();
    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    dc.save(&mut domain).await.unwrap();
    let mut orphan = Class::new("Orphan", EntityRef::from_id("missing"));
    dc.save(&mut orphan).await.unwrap();

    assert!(dc.commit().await.is_err());
    assert!(!dc.is_in_transaction());
    assert!(dc.query(&QCriteria::<Domain>::create()).await.unwrap().is_empty());
    assert!(dc.query(&QCriteria::<Class>::create()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_close_rolls_back_open_transaction() {
    let (_registry, factory) = setup("close").await;

    let mut dc = factory.get_data_context().await.unwrap();
    dc.begin().unwrap();
    let mut domain = Domain::new("Finance", "FIN", "FF0000");
    dc.save(&mut domain).await.unwrap();
    dc.close().await.unwrap();

    let dc = factory.get_data_context().await.unwrap();
    assert!(dc.find::<Domain>(domain.id().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unregistered_entity_is_rejected() {
    let pool = ConnectionPool::open(ConnectionConfig::memory("partial")).await.unwrap();
    let registry = PersistenceRegistry::new(EntityCatalog::new().with::<Domain>(), default_strategy());
    let factory = registry.initialize(Arc::new(pool)).await.unwrap();
    let dc = factory.get_data_context().await.unwrap();

    let err = dc.find::<Class>("any").await.unwrap_err();
    assert!(matches!(err, DbError::UnknownEntity(name) if name == "Class"));
}

#[tokio::test]
async fn test_concurrent_saves_get_distinct_keys() {
    let (_registry, factory) = setup("concurrent").await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move {
                let mut dc = factory.get_data_context().await.unwrap();
                let mut domain = Domain::new(format!("Domain {}", i), "DOM", "00FF00");
                dc.save(&mut domain).await.unwrap();
                dc.close().await.unwrap();
                domain.id().unwrap().to_string()
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        assert!(ids.insert(task.await.unwrap()));
    }

    let dc = factory.get_data_context().await.unwrap();
    assert_eq!(dc.query(&QCriteria::<Domain>::create()).await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_file_backed_data_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let pool = ConnectionPool::open(ConnectionConfig::file(dir.path())).await.unwrap();
        let registry = PersistenceRegistry::new(vera_catalog(), default_strategy());
        let factory = registry.initialize(Arc::new(pool)).await.unwrap();
        let mut dc = factory.get_data_context().await.unwrap();
        let mut domain = Domain::new("Finance", "FIN", "FF0000");
        dc.save(&mut domain).await.unwrap();
        dc.close().await.unwrap();
        registry.teardown().unwrap();
        domain.id().unwrap().to_string()
    };

    let pool = ConnectionPool::open(ConnectionConfig::file(dir.path())).await.unwrap();
    let registry = PersistenceRegistry::new(vera_catalog(), default_strategy());
    let factory = registry.initialize(Arc::new(pool)).await.unwrap();
    let dc = factory.get_data_context().await.unwrap();

    let domain: Domain = dc.get(&id).await.unwrap();
    assert_eq!(domain.mnemonic, "FIN");
}
