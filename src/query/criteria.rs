use super::pattern::eval_like;
use crate::core::{DbError, Result, Row, Value};
use crate::entity::{Entity, EntityMapping, Property};
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// A condition on the fields of one entity type.
///
/// Evaluated with SQL three-valued logic: a comparison involving NULL is
/// UNKNOWN, `NOT` of UNKNOWN stays UNKNOWN, and a row matches only when the
/// whole restriction is true. Use [`Restriction::is_null`] to find missing
/// values.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    Compare {
        field: &'static str,
        op: CompareOp,
        value: Value,
    },
    Between {
        field: &'static str,
        low: Value,
        high: Value,
    },
    Like {
        field: &'static str,
        pattern: String,
        case_sensitive: bool,
    },
    IsNull(&'static str),
    IsNotNull(&'static str),
    And(Vec<Restriction>),
    Or(Vec<Restriction>),
    Not(Box<Restriction>),
}

impl Restriction {
    pub fn compare<E, V: Into<Value>>(
        property: Property<E, V>,
        op: CompareOp,
        value: impl Into<V>,
    ) -> Self {
        Self::Compare {
            field: property.name(),
            op,
            value: value.into().into(),
        }
    }

    pub fn eq<E, V: Into<Value>>(property: Property<E, V>, value: impl Into<V>) -> Self {
        Self::compare(property, CompareOp::Eq, value)
    }

    pub fn ne<E, V: Into<Value>>(property: Property<E, V>, value: impl Into<V>) -> Self {
        Self::compare(property, CompareOp::Ne, value)
    }

    pub fn lt<E, V: Into<Value>>(property: Property<E, V>, value: impl Into<V>) -> Self {
        Self::compare(property, CompareOp::Lt, value)
    }

    pub fn le<E, V: Into<Value>>(property: Property<E, V>, value: impl Into<V>) -> Self {
        Self::compare(property, CompareOp::Le, value)
    }

    pub fn gt<E, V: Into<Value>>(property: Property<E, V>, value: impl Into<V>) -> Self {
        Self::compare(property, CompareOp::Gt, value)
    }

    pub fn ge<E, V: Into<Value>>(property: Property<E, V>, value: impl Into<V>) -> Self {
        Self::compare(property, CompareOp::Ge, value)
    }

    /// Inclusive on both ends.
    pub fn between<E, V: Into<Value>>(
        property: Property<E, V>,
        low: impl Into<V>,
        high: impl Into<V>,
    ) -> Self {
        Self::Between {
            field: property.name(),
            low: low.into().into(),
            high: high.into().into(),
        }
    }

    pub fn like<E>(property: Property<E, String>, pattern: &str) -> Self {
        Self::Like {
            field: property.name(),
            pattern: pattern.to_string(),
            case_sensitive: true,
        }
    }

    pub fn ilike<E>(property: Property<E, String>, pattern: &str) -> Self {
        Self::Like {
            field: property.name(),
            pattern: pattern.to_string(),
            case_sensitive: false,
        }
    }

    pub fn is_null<E, V>(property: Property<E, V>) -> Self {
        Self::IsNull(property.name())
    }

    pub fn is_not_null<E, V>(property: Property<E, V>) -> Self {
        Self::IsNotNull(property.name())
    }

    pub fn and(self, other: Restriction) -> Self {
        match self {
            Self::And(mut all) => {
                all.push(other);
                Self::And(all)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Restriction) -> Self {
        match self {
            Self::Or(mut any) => {
                any.push(other);
                Self::Or(any)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Whether `row` satisfies the restriction. UNKNOWN counts as no match.
    pub fn matches(&self, mapping: &EntityMapping, row: &Row) -> Result<bool> {
        Ok(self.evaluate(mapping, row)? == Some(true))
    }

    /// Three-valued evaluation: `None` is SQL UNKNOWN.
    fn evaluate(&self, mapping: &EntityMapping, row: &Row) -> Result<Option<bool>> {
        match self {
            Self::Compare { field, op, value } => {
                let actual = field_value(mapping, row, field)?;
                if actual.is_null() || value.is_null() {
                    return Ok(None);
                }
                Ok(Some(op.accepts(actual.compare(value)?)))
            }
            Self::Between { field, low, high } => {
                let actual = field_value(mapping, row, field)?;
                if actual.is_null() || low.is_null() || high.is_null() {
                    return Ok(None);
                }
                Ok(Some(
                    actual.compare(low)? != Ordering::Less
                        && actual.compare(high)? != Ordering::Greater,
                ))
            }
            Self::Like {
                field,
                pattern,
                case_sensitive,
            } => match field_value(mapping, row, field)? {
                Value::Null => Ok(None),
                Value::Text(text) => eval_like(text, pattern, *case_sensitive).map(Some),
                other => Err(DbError::TypeMismatch(format!(
                    "LIKE on '{}' needs TEXT, got {}",
                    field,
                    other.type_name()
                ))),
            },
            Self::IsNull(field) => Ok(Some(field_value(mapping, row, field)?.is_null())),
            Self::IsNotNull(field) => Ok(Some(!field_value(mapping, row, field)?.is_null())),
            Self::And(all) => {
                let mut result = Some(true);
                for restriction in all {
                    match restriction.evaluate(mapping, row)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                Ok(result)
            }
            Self::Or(any) => {
                let mut result = Some(false);
                for restriction in any {
                    match restriction.evaluate(mapping, row)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                Ok(result)
            }
            Self::Not(inner) => Ok(inner.evaluate(mapping, row)?.map(|matched| !matched)),
        }
    }
}

pub(crate) fn field_value<'r>(
    mapping: &EntityMapping,
    row: &'r Row,
    field: &str,
) -> Result<&'r Value> {
    let idx = mapping
        .field_index(field)
        .ok_or_else(|| DbError::ColumnNotFound(field.to_string(), mapping.table.to_string()))?;
    row.get(idx).ok_or_else(|| {
        DbError::ExecutionError(format!("Row of '{}' has no value for '{}'", mapping.table, field))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub field: &'static str,
    pub descending: bool,
}

/// Typed query over one entity type: restrictions (all must hold), sort
/// order, then offset and limit.
///
/// ```ignore
/// let finance = QCriteria::<Domain>::create()
///     .eq(Domain::MNEMONIC, "FIN")
///     .ascending(Domain::NAME);
/// ```
pub struct QCriteria<E> {
    restrictions: Vec<Restriction>,
    order: Vec<Order>,
    start: usize,
    limit: Option<usize>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for QCriteria<E> {
    fn clone(&self) -> Self {
        Self {
            restrictions: self.restrictions.clone(),
            order: self.order.clone(),
            start: self.start,
            limit: self.limit,
            _marker: PhantomData,
        }
    }
}

impl<E> fmt::Debug for QCriteria<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QCriteria")
            .field("restrictions", &self.restrictions)
            .field("order", &self.order)
            .field("start", &self.start)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<E: Entity> Default for QCriteria<E> {
    fn default() -> Self {
        Self::create()
    }
}

impl<E: Entity> QCriteria<E> {
    pub fn create() -> Self {
        Self {
            restrictions: Vec::new(),
            order: Vec::new(),
            start: 0,
            limit: None,
            _marker: PhantomData,
        }
    }

    pub fn add(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    pub fn eq<V: Into<Value>>(self, property: Property<E, V>, value: impl Into<V>) -> Self {
        self.add(Restriction::eq(property, value))
    }

    pub fn ne<V: Into<Value>>(self, property: Property<E, V>, value: impl Into<V>) -> Self {
        self.add(Restriction::ne(property, value))
    }

    pub fn lt<V: Into<Value>>(self, property: Property<E, V>, value: impl Into<V>) -> Self {
        self.add(Restriction::lt(property, value))
    }

    pub fn le<V: Into<Value>>(self, property: Property<E, V>, value: impl Into<V>) -> Self {
        self.add(Restriction::le(property, value))
    }

    pub fn gt<V: Into<Value>>(self, property: Property<E, V>, value: impl Into<V>) -> Self {
        self.add(Restriction::gt(property, value))
    }

    pub fn ge<V: Into<Value>>(self, property: Property<E, V>, value: impl Into<V>) -> Self {
        self.add(Restriction::ge(property, value))
    }

    pub fn between<V: Into<Value>>(
        self,
        property: Property<E, V>,
        low: impl Into<V>,
        high: impl Into<V>,
    ) -> Self {
        self.add(Restriction::between(property, low, high))
    }

    pub fn like(self, property: Property<E, String>, pattern: &str) -> Self {
        self.add(Restriction::like(property, pattern))
    }

    pub fn ilike(self, property: Property<E, String>, pattern: &str) -> Self {
        self.add(Restriction::ilike(property, pattern))
    }

    pub fn is_null<V>(self, property: Property<E, V>) -> Self {
        self.add(Restriction::is_null(property))
    }

    pub fn is_not_null<V>(self, property: Property<E, V>) -> Self {
        self.add(Restriction::is_not_null(property))
    }

    pub fn ascending<V>(mut self, property: Property<E, V>) -> Self {
        self.order.push(Order {
            field: property.name(),
            descending: false,
        });
        self
    }

    pub fn descending<V>(mut self, property: Property<E, V>) -> Self {
        self.order.push(Order {
            field: property.name(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `start` matching rows.
    pub fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    /// Rows satisfying every restriction, in input order.
    pub fn filter(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mapping = E::mapping();
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if self.accepts(mapping, &row)? {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    fn accepts(&self, mapping: &EntityMapping, row: &Row) -> Result<bool> {
        for restriction in &self.restrictions {
            if !restriction.matches(mapping, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Filter, sort, then cut the `start`/`limit` window.
    pub fn apply(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut rows = self.filter(rows)?;
        self.sort(&mut rows)?;

        let window = rows.into_iter().skip(self.start);
        Ok(match self.limit {
            Some(limit) => window.take(limit).collect(),
            None => window.collect(),
        })
    }

    fn sort(&self, rows: &mut [Row]) -> Result<()> {
        if self.order.is_empty() {
            return Ok(());
        }

        let mapping = E::mapping();
        let mut indexes = Vec::with_capacity(self.order.len());
        for order in &self.order {
            let idx = mapping.field_index(order.field).ok_or_else(|| {
                DbError::ColumnNotFound(order.field.to_string(), mapping.table.to_string())
            })?;
            indexes.push((idx, order.descending));
        }

        let mut failure = None;
        rows.sort_by(|a, b| {
            for &(idx, descending) in &indexes {
                match a[idx].compare(&b[idx]) {
                    Ok(Ordering::Equal) => continue,
                    Ok(ordering) if descending => return ordering.reverse(),
                    Ok(ordering) => return ordering,
                    Err(e) => {
                        failure.get_or_insert(e);
                        return Ordering::Equal;
                    }
                }
            }
            Ordering::Equal
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
