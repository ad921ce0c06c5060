use std::fmt;

use super::{ColumnMapping, Entity};

/// Typed reference to one attribute of an entity: the field name used to
/// find its column in the entity's mapping, plus an accessor for in-memory
/// values.
///
/// Declared as associated constants on the entity type:
///
/// ```ignore
/// impl Domain {
///     pub const NAME: Property<Domain, String> = Property::new("name", |d| d.name.clone());
/// }
/// ```
pub struct Property<E, V> {
    name: &'static str,
    get: fn(&E) -> V,
}

impl<E, V> Property<E, V> {
    pub const fn new(name: &'static str, get: fn(&E) -> V) -> Self {
        Self { name, get }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, entity: &E) -> V {
        (self.get)(entity)
    }
}

impl<E: Entity, V> Property<E, V> {
    pub fn mapping(&self) -> Option<&'static ColumnMapping> {
        E::mapping().field(self.name)
    }
}

impl<E, V> Clone for Property<E, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, V> Copy for Property<E, V> {}

impl<E, V> fmt::Debug for Property<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property").field("name", &self.name).finish()
    }
}
