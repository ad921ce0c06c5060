use crate::core::{Column, DbError, Result, Row, Schema, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows of one entity type, keyed by their surrogate key.
///
/// The table enforces column-level constraints (type, nullability,
/// length) and key uniqueness. Cross-table references are checked by
/// [`crate::facade::Database`], which sees all tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<String, Row>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut TableSchema {
        &mut self.schema
    }

    pub fn insert(&mut self, row: Row) -> Result<String> {
        self.validate_row(&row)?;
        let key = self.key_of(&row)?;

        if self.rows.contains_key(&key) {
            return Err(DbError::ConstraintViolation(format!(
                "Unique constraint violation: Column '{}' already contains value {}",
                self.schema.key_column().name,
                key
            )));
        }

        self.rows.insert(key.clone(), row);
        Ok(key)
    }

    /// Replace the row stored under `key`, returning the previous row.
    pub fn update(&mut self, key: &str, row: Row) -> Result<Row> {
        self.validate_row(&row)?;
        let new_key = self.key_of(&row)?;
        if new_key != key {
            return Err(DbError::ConstraintViolation(format!(
                "Key of '{}' cannot change from '{}' to '{}'",
                self.schema.name, key, new_key
            )));
        }

        let slot = self
            .rows
            .get_mut(key)
            .ok_or_else(|| DbError::NotFound(self.schema.name.clone(), key.to_string()))?;
        Ok(std::mem::replace(slot, row))
    }

    pub fn delete(&mut self, key: &str) -> Option<Row> {
        self.rows.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.rows.contains_key(key)
    }

    /// Rows in key order.
    pub fn scan(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether any row holds `key` in column `col_idx`.
    pub fn any_references(&self, col_idx: usize, key: &str) -> bool {
        self.rows
            .values()
            .any(|row| matches!(&row[col_idx], Value::Text(v) if v == key))
    }

    pub fn validate_row(&self, row: &Row) -> Result<()> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn key_of(&self, row: &Row) -> Result<String> {
        match &row[self.schema.key_index] {
            Value::Text(key) if !key.is_empty() => Ok(key.clone()),
            other => Err(DbError::InvalidIdentifier(format!(
                "Key of '{}' must be non-empty text, got {}",
                self.schema.name, other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    schema: Schema,
    key_index: usize,
    /// Name of the id strategy issuing keys for new rows.
    key_strategy: String,
}

impl TableSchema {
    /// The first primary-key column is the key; without one, the first column.
    pub fn new(name: impl Into<String>, columns: Vec<Column>, key_strategy: impl Into<String>) -> Self {
        let schema = Schema::new(columns);
        let key_index = schema.primary_key_index().unwrap_or(0);
        Self {
            name: name.into(),
            schema,
            key_index,
            key_strategy: key_strategy.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_index(&self) -> usize {
        self.key_index
    }

    pub fn key_column(&self) -> &Column {
        &self.schema.columns()[self.key_index]
    }

    pub fn key_strategy(&self) -> &str {
        &self.key_strategy
    }

    pub fn set_key_strategy(&mut self, strategy: impl Into<String>) {
        self.key_strategy = strategy.into();
    }

    /// Same columns, ignoring the key strategy.
    pub fn same_layout(&self, other: &TableSchema) -> bool {
        let ours = self.schema.columns();
        let theirs = other.schema.columns();
        ours.len() == theirs.len()
            && ours.iter().zip(theirs).all(|(a, b)| {
                a.name == b.name
                    && a.data_type == b.data_type
                    && a.nullable == b.nullable
                    && a.max_length == b.max_length
                    && a.references == b.references
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn domain_table() -> Table {
        Table::new(TableSchema::new(
            "vra_domain",
            vec![
                Column::new("dom_id", DataType::Text).primary_key().max_length(23),
                Column::new("dom_name", DataType::Text).not_null().max_length(128),
            ],
            "uuid4-compact",
        ))
    }

    fn row(key: &str, name: &str) -> Row {
        vec![Value::from(key), Value::from(name)]
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = domain_table();
        let key = table.insert(row("k1", "Finance")).unwrap();
        assert_eq!(key, "k1");
        assert_eq!(table.get("k1").unwrap()[1], Value::from("Finance"));
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut table = domain_table();
        table.insert(row("k1", "Finance")).unwrap();
        let err = table.insert(row("k1", "Sales")).unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));
        assert_eq!(table.get("k1").unwrap()[1], Value::from("Finance"));
    }

    #[test]
    fn test_null_key_rejected() {
        let mut table = domain_table();
        let err = table.insert(vec![Value::Null, Value::from("x")]).unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));
    }

    #[test]
    fn test_update_keeps_key() {
        let mut table = domain_table();
        table.insert(row("k1", "Finance")).unwrap();

        let old = table.update("k1", row("k1", "Treasury")).unwrap();
        assert_eq!(old[1], Value::from("Finance"));

        let err = table.update("k1", row("k2", "Treasury")).unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));

        let err = table.update("k9", row("k9", "Nope")).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_, _)));
    }

    #[test]
    fn test_scan_is_key_ordered() {
        let mut table = domain_table();
        table.insert(row("b", "B")).unwrap();
        table.insert(row("a", "A")).unwrap();
        let names: Vec<_> = table.scan().map(|r| r[1].to_string()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_same_layout_ignores_strategy() {
        let a = domain_table().schema().clone();
        let mut b = a.clone();
        b.set_key_strategy("uuid4-hyphenated");
        assert!(a.same_layout(&b));
    }
}
