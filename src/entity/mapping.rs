use crate::core::{Column, DataType};
use crate::storage::TableSchema;

/// One attribute of an entity and the column it is stored in.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub field: &'static str,
    pub column: &'static str,
    pub data_type: DataType,
    pub length: Option<usize>,
    pub nullable: bool,
    /// Table whose key this column references (many-to-one).
    pub reference: Option<&'static str>,
}

impl ColumnMapping {
    pub fn new(field: &'static str, column: &'static str, data_type: DataType) -> Self {
        Self {
            field,
            column,
            data_type,
            length: None,
            nullable: true,
            reference: None,
        }
    }

    pub fn text(field: &'static str, column: &'static str, length: usize) -> Self {
        Self::new(field, column, DataType::Text).length(length)
    }

    /// Many-to-one reference stored as the target's key. The column takes
    /// the target key column's declared length.
    pub fn many_to_one(field: &'static str, column: &'static str, target: &EntityMapping) -> Self {
        let mut mapping = Self::new(field, column, DataType::Text);
        mapping.length = target.key.length;
        mapping.reference = Some(target.table);
        mapping
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn to_column(&self) -> Column {
        let mut column = Column::new(self.column, self.data_type);
        if !self.nullable {
            column = column.not_null();
        }
        if let Some(length) = self.length {
            column = column.max_length(length);
        }
        if let Some(target) = self.reference {
            column = column.references(target);
        }
        column
    }
}

/// Declarative mapping of an entity type onto a table. Row layout is the
/// key column first, then `columns` in declaration order.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub entity: &'static str,
    pub table: &'static str,
    pub key: ColumnMapping,
    pub columns: Vec<ColumnMapping>,
}

impl EntityMapping {
    pub fn new(
        entity: &'static str,
        table: &'static str,
        key_column: &'static str,
        key_length: usize,
    ) -> Self {
        Self {
            entity,
            table,
            key: ColumnMapping::text("id", key_column, key_length).not_null(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnMapping) -> Self {
        self.columns.push(column);
        self
    }

    /// All mapped attributes, key first.
    pub fn fields(&self) -> impl Iterator<Item = &ColumnMapping> {
        std::iter::once(&self.key).chain(self.columns.iter())
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields().position(|mapping| mapping.field == field)
    }

    pub fn field(&self, field: &str) -> Option<&ColumnMapping> {
        self.fields().find(|mapping| mapping.field == field)
    }

    pub fn width(&self) -> usize {
        self.columns.len() + 1
    }

    pub fn references(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|mapping| mapping.reference.is_some())
    }

    pub fn table_schema(&self, key_strategy: &str) -> TableSchema {
        let key = self.key.to_column().primary_key();
        let columns = std::iter::once(key)
            .chain(self.columns.iter().map(ColumnMapping::to_column))
            .collect();
        TableSchema::new(self.table, columns, key_strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> EntityMapping {
        EntityMapping::new("Parent", "t_parent", "par_id", 23)
            .column(ColumnMapping::text("name", "par_name", 40).not_null())
    }

    #[test]
    fn test_field_positions() {
        let mapping = parent();
        assert_eq!(mapping.field_index("id"), Some(0));
        assert_eq!(mapping.field_index("name"), Some(1));
        assert_eq!(mapping.field_index("missing"), None);
        assert_eq!(mapping.width(), 2);
    }

    #[test]
    fn test_many_to_one_takes_target_key_length() {
        let parent = parent();
        let child = EntityMapping::new("Child", "t_child", "chd_id", 23)
            .column(ColumnMapping::many_to_one("parent", "par_id", &parent).not_null());

        let link = child.field("parent").unwrap();
        assert_eq!(link.length, Some(23));
        assert_eq!(link.reference, Some("t_parent"));
        assert_eq!(child.references().count(), 1);
    }

    #[test]
    fn test_table_schema() {
        let schema = parent().table_schema("uuid4-compact");
        assert_eq!(schema.name(), "t_parent");
        assert_eq!(schema.key_strategy(), "uuid4-compact");

        let columns = schema.schema().columns();
        assert!(columns[0].primary_key);
        assert_eq!(columns[0].max_length, Some(23));
        assert!(!columns[1].nullable);
        assert_eq!(columns[1].name, "par_name");
    }
}
