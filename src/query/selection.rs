use super::criteria::{QCriteria, Restriction, field_value};
use crate::core::{DbError, Result, Row, Value};
use crate::entity::{Entity, EntityMapping, Property};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionItem {
    Property(&'static str),
    Count(&'static str),
    CountDistinct(&'static str),
    Min(&'static str),
    Max(&'static str),
    Sum(&'static str),
    Avg(&'static str),
    RowCount,
}

impl SelectionItem {
    fn is_aggregate(&self) -> bool {
        !matches!(self, Self::Property(_))
    }

    /// Column heading for rendered results.
    pub fn label(&self) -> String {
        match self {
            Self::Property(field) => field.to_string(),
            Self::Count(field) => format!("count({})", field),
            Self::CountDistinct(field) => format!("count(distinct {})", field),
            Self::Min(field) => format!("min({})", field),
            Self::Max(field) => format!("max({})", field),
            Self::Sum(field) => format!("sum({})", field),
            Self::Avg(field) => format!("avg({})", field),
            Self::RowCount => "count(*)".to_string(),
        }
    }
}

/// Projection over the rows matched by a criteria: either plain
/// properties (one result row per match) or aggregates (one result row).
/// The two kinds cannot be mixed; there is no grouping.
pub struct QSelection<E> {
    criteria: QCriteria<E>,
    items: Vec<SelectionItem>,
}

impl<E> fmt::Debug for QSelection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QSelection")
            .field("criteria", &self.criteria)
            .field("items", &self.items)
            .finish()
    }
}

impl<E: Entity> Default for QSelection<E> {
    fn default() -> Self {
        Self::create()
    }
}

impl<E: Entity> QSelection<E> {
    pub fn create() -> Self {
        Self::with_criteria(QCriteria::create())
    }

    pub fn with_criteria(criteria: QCriteria<E>) -> Self {
        Self {
            criteria,
            items: Vec::new(),
        }
    }

    pub fn add(mut self, restriction: Restriction) -> Self {
        self.criteria = self.criteria.add(restriction);
        self
    }

    fn item(mut self, item: SelectionItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn select_property<V>(self, property: Property<E, V>) -> Self {
        self.item(SelectionItem::Property(property.name()))
    }

    /// Number of non-null values.
    pub fn count<V>(self, property: Property<E, V>) -> Self {
        self.item(SelectionItem::Count(property.name()))
    }

    pub fn count_distinct<V>(self, property: Property<E, V>) -> Self {
        self.item(SelectionItem::CountDistinct(property.name()))
    }

    pub fn min<V>(self, property: Property<E, V>) -> Self {
        self.item(SelectionItem::Min(property.name()))
    }

    pub fn max<V>(self, property: Property<E, V>) -> Self {
        self.item(SelectionItem::Max(property.name()))
    }

    pub fn sum<V>(self, property: Property<E, V>) -> Self {
        self.item(SelectionItem::Sum(property.name()))
    }

    pub fn avg<V>(self, property: Property<E, V>) -> Self {
        self.item(SelectionItem::Avg(property.name()))
    }

    pub fn row_count(self) -> Self {
        self.item(SelectionItem::RowCount)
    }

    pub fn items(&self) -> &[SelectionItem] {
        &self.items
    }

    pub fn criteria(&self) -> &QCriteria<E> {
        &self.criteria
    }

    pub fn apply(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        if self.items.is_empty() {
            return Err(DbError::ExecutionError("Selection has no items".into()));
        }

        let aggregates = self.items.iter().filter(|item| item.is_aggregate()).count();
        if aggregates == 0 {
            return self.project(rows);
        }
        if aggregates != self.items.len() {
            return Err(DbError::ExecutionError(
                "Cannot mix aggregate and plain property selections".into(),
            ));
        }

        let mapping = E::mapping();
        let rows = self.criteria.filter(rows)?;
        let mut result = Vec::with_capacity(self.items.len());
        for item in &self.items {
            result.push(aggregate(mapping, &rows, item)?);
        }
        Ok(vec![result])
    }

    fn project(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mapping = E::mapping();
        let mut indexes = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if let SelectionItem::Property(field) = item {
                let idx = mapping.field_index(field).ok_or_else(|| {
                    DbError::ColumnNotFound(field.to_string(), mapping.table.to_string())
                })?;
                indexes.push(idx);
            }
        }

        Ok(self
            .criteria
            .apply(rows)?
            .into_iter()
            .map(|row| indexes.iter().map(|&idx| row[idx].clone()).collect())
            .collect())
    }
}

fn aggregate(mapping: &EntityMapping, rows: &[Row], item: &SelectionItem) -> Result<Value> {
    let field = match item {
        SelectionItem::RowCount => return Ok(Value::Integer(rows.len() as i64)),
        SelectionItem::Property(field)
        | SelectionItem::Count(field)
        | SelectionItem::CountDistinct(field)
        | SelectionItem::Min(field)
        | SelectionItem::Max(field)
        | SelectionItem::Sum(field)
        | SelectionItem::Avg(field) => *field,
    };

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let value = field_value(mapping, row, field)?;
        if !value.is_null() {
            values.push(value);
        }
    }

    match item {
        SelectionItem::Count(_) => Ok(Value::Integer(values.len() as i64)),
        SelectionItem::CountDistinct(_) => {
            let distinct: HashSet<&Value> = values.into_iter().collect();
            Ok(Value::Integer(distinct.len() as i64))
        }
        SelectionItem::Min(_) => extreme(values, Ordering::Less),
        SelectionItem::Max(_) => extreme(values, Ordering::Greater),
        SelectionItem::Sum(_) => sum(field, &values),
        SelectionItem::Avg(_) => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let total = sum(field, &values)?.as_f64().unwrap_or_default();
            Ok(Value::Float(total / values.len() as f64))
        }
        SelectionItem::Property(_) | SelectionItem::RowCount => Ok(Value::Null),
    }
}

fn extreme(values: Vec<&Value>, wanted: Ordering) -> Result<Value> {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            Some(current) if value.compare(current)? != wanted => Some(current),
            _ => Some(value),
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

fn sum(field: &str, values: &[&Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }

    if values.iter().all(|v| matches!(v, Value::Integer(_))) {
        let mut total: i64 = 0;
        for value in values {
            let n = value.as_i64().unwrap_or_default();
            total = total.checked_add(n).ok_or_else(|| {
                DbError::ExecutionError(format!("Integer overflow summing '{}'", field))
            })?;
        }
        return Ok(Value::Integer(total));
    }

    let mut total = 0.0;
    for value in values {
        total += value.as_f64().ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "Cannot sum '{}': {} is not numeric",
                field,
                value.type_name()
            ))
        })?;
    }
    Ok(Value::Float(total))
}
