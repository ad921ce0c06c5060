use std::sync::Arc;
use vera::identity::default_strategy;
use vera::query::Restriction;
use vera::{
    Class, ConnectionConfig, ConnectionPool, DataContext, DbError, Domain, Entity, EntityRef,
    PersistenceRegistry, QCriteria, QSelection, Value, vera_catalog,
};

async fn seeded(name: &str) -> (PersistenceRegistry, DataContext) {
    let pool = ConnectionPool::open(ConnectionConfig::memory(name)).await.unwrap();
    let registry = PersistenceRegistry::new(vera_catalog(), default_strategy());
    let factory = registry.initialize(Arc::new(pool)).await.unwrap();
    let mut dc = factory.get_data_context().await.unwrap();

    for (name, mnemonic, color) in [
        ("Finance", "FIN", "FF0000"),
        ("Human Resources", "HR", "00FF00"),
        ("Logistics", "LOG", "0000FF"),
        ("Legal", "LEG", "FF0000"),
    ] {
        let mut domain = Domain::new(name, mnemonic, color);
        dc.save(&mut domain).await.unwrap();
    }
    (registry, dc)
}

fn names(domains: &[Domain]) -> Vec<&str> {
    domains.iter().map(|d| d.name.as_str()).collect()
}

#[tokio::test]
async fn test_eq_and_ne() {
    let (_r, dc) = seeded("eq").await;

    let found = dc
        .query(&QCriteria::<Domain>::create().eq(Domain::MNEMONIC, "FIN"))
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Finance"]);

    let found = dc
        .query(
            &QCriteria::<Domain>::create()
                .ne(Domain::RGB_COLOR, "FF0000")
                .ascending(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Human Resources", "Logistics"]);
}

#[tokio::test]
async fn test_range_restrictions() {
    let (_r, dc) = seeded("range").await;

    let found = dc
        .query(
            &QCriteria::<Domain>::create()
                .between(Domain::NAME, "F", "Le")
                .ascending(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Finance", "Human Resources"]);

    let found = dc
        .query(
            &QCriteria::<Domain>::create()
                .ge(Domain::NAME, "L")
                .lt(Domain::NAME, "Lo")
                .ascending(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Legal"]);

    let found = dc
        .query(&QCriteria::<Domain>::create().gt(Domain::NAME, "Legal").le(Domain::NAME, "Logistics"))
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Logistics"]);
}

#[tokio::test]
async fn test_like_and_ilike() {
    let (_r, dc) = seeded("like").await;

    let found = dc
        .query(
            &QCriteria::<Domain>::create()
                .like(Domain::NAME, "L%")
                .ascending(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Legal", "Logistics"]);

    let found = dc
        .query(&QCriteria::<Domain>::create().like(Domain::NAME, "l%"))
        .await
        .unwrap();
    assert!(found.is_empty());

    let found = dc
        .query(
            &QCriteria::<Domain>::create()
                .ilike(Domain::NAME, "%RES%")
                .ascending(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Human Resources"]);
}

#[tokio::test]
async fn test_null_checks() {
    let (_r, dc) = seeded("nulls").await;

    let all = dc
        .query(&QCriteria::<Domain>::create().is_not_null(Domain::NAME))
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    let none = dc
        .query(&QCriteria::<Domain>::create().is_null(Domain::MNEMONIC))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_boolean_combinations() {
    let (_r, dc) = seeded("bool").await;

    let either = Restriction::eq(Domain::MNEMONIC, "FIN").or(Restriction::eq(Domain::MNEMONIC, "HR"));
    let found = dc
        .query(&QCriteria::<Domain>::create().add(either).ascending(Domain::NAME))
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Finance", "Human Resources"]);

    let red_not_legal = Restriction::eq(Domain::RGB_COLOR, "FF0000")
        .and(Restriction::eq(Domain::MNEMONIC, "LEG").not());
    let found = dc
        .query(&QCriteria::<Domain>::create().add(red_not_legal))
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Finance"]);
}

#[tokio::test]
async fn test_order_start_and_limit() {
    let (_r, dc) = seeded("window").await;

    let found = dc
        .query(
            &QCriteria::<Domain>::create()
                .descending(Domain::NAME)
                .start(1)
                .limit(2),
        )
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Legal", "Human Resources"]);

    let found = dc
        .query(
            &QCriteria::<Domain>::create()
                .ascending(Domain::RGB_COLOR)
                .descending(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(
        names(&found),
        vec!["Logistics", "Human Resources", "Legal", "Finance"]
    );
}

#[tokio::test]
async fn test_query_one() {
    let (_r, dc) = seeded("one").await;

    let finance = dc
        .query_one(&QCriteria::<Domain>::create().eq(Domain::MNEMONIC, "FIN"))
        .await
        .unwrap();
    assert_eq!(finance.map(|d| d.name), Some("Finance".to_string()));

    let missing = dc
        .query_one(&QCriteria::<Domain>::create().eq(Domain::MNEMONIC, "XXX"))
        .await
        .unwrap();
    assert!(missing.is_none());

    let ambiguous = dc
        .query_one(&QCriteria::<Domain>::create().eq(Domain::RGB_COLOR, "FF0000"))
        .await;
    assert!(matches!(ambiguous, Err(DbError::ExecutionError(_))));
}

#[tokio::test]
async fn test_query_by_reference() {
    let (_r, mut dc) = seeded("by-reference").await;

    let finance = dc
        .query_one(&QCriteria::<Domain>::create().eq(Domain::MNEMONIC, "FIN"))
        .await
        .unwrap()
        .unwrap();
    for name in ["Ledger", "Invoice"] {
        let mut class = Class::new(name, EntityRef::to(&finance).unwrap());
        dc.save(&mut class).await.unwrap();
    }

    let classes = dc
        .query(
            &QCriteria::<Class>::create()
                .eq(Class::DOMAIN, EntityRef::to(&finance).unwrap())
                .ascending(Class::NAME),
        )
        .await
        .unwrap();
    let found: Vec<_> = classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(found, vec!["Invoice", "Ledger"]);
}

#[tokio::test]
async fn test_aggregate_selection() {
    let (_r, dc) = seeded("aggregates").await;

    let rows = dc
        .select(
            &QSelection::<Domain>::create()
                .row_count()
                .count(Domain::NAME)
                .count_distinct(Domain::RGB_COLOR)
                .min(Domain::NAME)
                .max(Domain::NAME),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0],
        vec![
            Value::Integer(4),
            Value::Integer(4),
            Value::Integer(3),
            Value::from("Finance"),
            Value::from("Logistics"),
        ]
    );
}

#[tokio::test]
async fn test_selection_respects_restrictions() {
    let (_r, dc) = seeded("filtered-aggregates").await;

    let rows = dc
        .select(
            &QSelection::<Domain>::create()
                .add(Restriction::eq(Domain::RGB_COLOR, "FF0000"))
                .row_count(),
        )
        .await
        .unwrap();
    assert_eq!(rows[0][0], Value::Integer(2));
}

#[tokio::test]
async fn test_sum_of_text_is_type_mismatch() {
    let (_r, dc) = seeded("sum").await;
    let result = dc.select(&QSelection::<Domain>::create().sum(Domain::NAME)).await;
    assert!(matches!(result, Err(DbError::TypeMismatch(_))));

    let empty = dc
        .select(
            &QSelection::<Domain>::with_criteria(
                QCriteria::<Domain>::create().eq(Domain::MNEMONIC, "XXX"),
            )
            .avg(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(empty[0][0], Value::Null);
}

#[tokio::test]
async fn test_property_selection() {
    let (_r, dc) = seeded("projection").await;

    let rows = dc
        .select(
            &QSelection::<Domain>::with_criteria(
                QCriteria::<Domain>::create().ascending(Domain::MNEMONIC).limit(2),
            )
            .select_property(Domain::MNEMONIC)
            .select_property(Domain::NAME),
        )
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::from("FIN"), Value::from("Finance")],
            vec![Value::from("HR"), Value::from("Human Resources")],
        ]
    );
}

#[tokio::test]
async fn test_mixed_selection_is_rejected() {
    let (_r, dc) = seeded("mixed").await;
    let result = dc
        .select(
            &QSelection::<Domain>::create()
                .select_property(Domain::NAME)
                .row_count(),
        )
        .await;
    assert!(matches!(result, Err(DbError::ExecutionError(_))));
}

#[tokio::test]
async fn test_property_descriptor_resolves_column() {
    let mapping = Domain::MNEMONIC.mapping().unwrap();
    assert_eq!(mapping.column, "dom_mnemonic");
    assert_eq!(Domain::mapping().table, "vra_domain");
}

#[tokio::test]
async fn test_negated_null_comparison_matches_nothing() {
    let (_r, dc) = seeded("null-logic").await;

    let compared = dc
        .query(&QCriteria::<Domain>::create().add(Restriction::eq(Domain::ID, None::<String>)))
        .await
        .unwrap();
    assert!(compared.is_empty());

    let negated = dc
        .query(&QCriteria::<Domain>::create().add(Restriction::eq(Domain::ID, None::<String>).not()))
        .await
        .unwrap();
    assert!(negated.is_empty());

    // UNKNOWN OR TRUE is TRUE; NOT (UNKNOWN AND FALSE) is TRUE.
    let either = Restriction::eq(Domain::ID, None::<String>).or(Restriction::eq(Domain::MNEMONIC, "FIN"));
    let found = dc.query(&QCriteria::<Domain>::create().add(either)).await.unwrap();
    assert_eq!(names(&found), vec!["Finance"]);

    let neither = Restriction::eq(Domain::ID, None::<String>)
        .and(Restriction::eq(Domain::MNEMONIC, "FIN"))
        .not();
    let found = dc
        .query(&QCriteria::<Domain>::create().add(neither).ascending(Domain::NAME))
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["Human Resources", "Legal", "Logistics"]);
}
