//! The contract shared by all persisted entities.
//!
//! An entity owns an optional identifier (unset until first saved) and a
//! static [`EntityMapping`] describing how its attributes map to columns.
//! Conversion to and from rows is explicit; there is no reflection.

pub mod mapping;
pub mod property;

pub use mapping::{ColumnMapping, EntityMapping};
pub use property::Property;

use serde::{Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

use crate::core::{DbError, Result, Row, Value};

pub trait Entity: Sized + Send + Sync + 'static {
    fn mapping() -> &'static EntityMapping;

    /// `None` until the persistence layer assigns a key.
    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: String);

    /// Full row in mapping order, key first.
    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self>;
}

/// Lazily resolved many-to-one link: holds only the target's key. Load the
/// target through a data context.
pub struct EntityRef<E> {
    id: String,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityRef<E> {
    /// Reference a saved entity. Fails for an entity without a key.
    pub fn to(entity: &E) -> Result<Self> {
        entity.id().map(Self::from_id).ok_or_else(|| {
            DbError::ConstraintViolation(format!(
                "Cannot reference an unsaved {}",
                E::mapping().entity
            ))
        })
    }
}

impl<E> EntityRef<E> {
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<E> Clone for EntityRef<E> {
    fn clone(&self) -> Self {
        Self::from_id(self.id.clone())
    }
}

impl<E> PartialEq for EntityRef<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for EntityRef<E> {}

impl<E> fmt::Debug for EntityRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.id).finish()
    }
}

impl<E> Serialize for EntityRef<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

impl<E> From<EntityRef<E>> for Value {
    fn from(reference: EntityRef<E>) -> Self {
        Value::Text(reference.id)
    }
}

impl<E> From<&EntityRef<E>> for Value {
    fn from(reference: &EntityRef<E>) -> Self {
        Value::Text(reference.id.clone())
    }
}

/// Field-name based access to a stored row, used by `Entity::from_row`.
pub struct RowReader<'a> {
    mapping: &'static EntityMapping,
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    pub fn new(mapping: &'static EntityMapping, row: &'a Row) -> Result<Self> {
        if row.len() != mapping.width() {
            return Err(DbError::ExecutionError(format!(
                "Row for '{}' has {} values, mapping declares {}",
                mapping.table,
                row.len(),
                mapping.width()
            )));
        }
        Ok(Self { mapping, row })
    }

    fn value(&self, field: &str) -> Result<&'a Value> {
        let idx = self.mapping.field_index(field).ok_or_else(|| {
            DbError::ColumnNotFound(field.to_string(), self.mapping.table.to_string())
        })?;
        Ok(&self.row[idx])
    }

    pub fn key(&self) -> Result<Option<String>> {
        self.opt_text("id")
    }

    pub fn text(&self, field: &str) -> Result<String> {
        self.opt_text(field)?.ok_or_else(|| {
            DbError::ConstraintViolation(format!(
                "Field '{}' of '{}' is NULL",
                field, self.mapping.entity
            ))
        })
    }

    pub fn opt_text(&self, field: &str) -> Result<Option<String>> {
        match self.value(field)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(DbError::TypeMismatch(format!(
                "Field '{}' expects TEXT, got {}",
                field,
                other.type_name()
            ))),
        }
    }

    pub fn reference<T>(&self, field: &str) -> Result<EntityRef<T>> {
        self.text(field).map(EntityRef::from_id)
    }

    pub fn opt_reference<T>(&self, field: &str) -> Result<Option<EntityRef<T>>> {
        Ok(self.opt_text(field)?.map(EntityRef::from_id))
    }
}
