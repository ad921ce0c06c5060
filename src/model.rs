//! The vera entities: domains own classes, classes own attributes.

use crate::core::{Result, Row, Value};
use crate::entity::{ColumnMapping, Entity, EntityMapping, EntityRef, Property, RowReader};
use crate::identity::KEY_COLUMN_LENGTH;
use crate::registry::EntityCatalog;
use serde::Serialize;

lazy_static::lazy_static! {
    static ref DOMAIN_MAPPING: EntityMapping =
        EntityMapping::new("Domain", "vra_domain", "dom_id", KEY_COLUMN_LENGTH)
            .column(ColumnMapping::text("name", "dom_name", 128).not_null())
            .column(ColumnMapping::text("rgb_color", "dom_color", 6).not_null())
            .column(ColumnMapping::text("mnemonic", "dom_mnemonic", 3).not_null());

    static ref CLASS_MAPPING: EntityMapping =
        EntityMapping::new("Class", "vra_class", "cls_id", KEY_COLUMN_LENGTH)
            .column(ColumnMapping::text("name", "cls_name", 128).not_null())
            .column(ColumnMapping::many_to_one("domain", "dom_id", &DOMAIN_MAPPING).not_null());

    static ref ATTRIBUTE_MAPPING: EntityMapping =
        EntityMapping::new("Attribute", "vra_attribute", "att_id", KEY_COLUMN_LENGTH)
            .column(ColumnMapping::text("name", "att_name", 128).not_null())
            .column(ColumnMapping::many_to_one("class", "cls_id", &CLASS_MAPPING).not_null());
}

/// All vera entity types, parents first.
pub fn vera_catalog() -> EntityCatalog {
    EntityCatalog::new()
        .with::<Domain>()
        .with::<Class>()
        .with::<Attribute>()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    id: Option<String>,
    pub name: String,
    /// Six hex digits, e.g. `FF0000`.
    pub rgb_color: String,
    pub mnemonic: String,
}

impl Domain {
    pub const ID: Property<Domain, Option<String>> = Property::new("id", |d: &Domain| d.id.clone());
    pub const NAME: Property<Domain, String> = Property::new("name", |d: &Domain| d.name.clone());
    pub const RGB_COLOR: Property<Domain, String> =
        Property::new("rgb_color", |d: &Domain| d.rgb_color.clone());
    pub const MNEMONIC: Property<Domain, String> =
        Property::new("mnemonic", |d: &Domain| d.mnemonic.clone());

    pub fn new(
        name: impl Into<String>,
        mnemonic: impl Into<String>,
        rgb_color: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            rgb_color: rgb_color.into(),
            mnemonic: mnemonic.into(),
        }
    }
}

impl Entity for Domain {
    fn mapping() -> &'static EntityMapping {
        &DOMAIN_MAPPING
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        vec![
            Value::from(self.id.clone()),
            Value::from(self.name.as_str()),
            Value::from(self.rgb_color.as_str()),
            Value::from(self.mnemonic.as_str()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new(Self::mapping(), row)?;
        Ok(Self {
            id: r.key()?,
            name: r.text("name")?,
            rgb_color: r.text("rgb_color")?,
            mnemonic: r.text("mnemonic")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Class {
    id: Option<String>,
    pub name: String,
    pub domain: EntityRef<Domain>,
}

impl Class {
    pub const ID: Property<Class, Option<String>> = Property::new("id", |c: &Class| c.id.clone());
    pub const NAME: Property<Class, String> = Property::new("name", |c: &Class| c.name.clone());
    pub const DOMAIN: Property<Class, EntityRef<Domain>> =
        Property::new("domain", |c: &Class| c.domain.clone());

    pub fn new(name: impl Into<String>, domain: EntityRef<Domain>) -> Self {
        Self {
            id: None,
            name: name.into(),
            domain,
        }
    }
}

impl Entity for Class {
    fn mapping() -> &'static EntityMapping {
        &CLASS_MAPPING
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        vec![
            Value::from(self.id.clone()),
            Value::from(self.name.as_str()),
            Value::from(&self.domain),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new(Self::mapping(), row)?;
        Ok(Self {
            id: r.key()?,
            name: r.text("name")?,
            domain: r.reference("domain")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    id: Option<String>,
    pub name: String,
    pub class: EntityRef<Class>,
}

impl Attribute {
    pub const ID: Property<Attribute, Option<String>> =
        Property::new("id", |a: &Attribute| a.id.clone());
    pub const NAME: Property<Attribute, String> =
        Property::new("name", |a: &Attribute| a.name.clone());
    pub const CLASS: Property<Attribute, EntityRef<Class>> =
        Property::new("class", |a: &Attribute| a.class.clone());

    pub fn new(name: impl Into<String>, class: EntityRef<Class>) -> Self {
        Self {
            id: None,
            name: name.into(),
            class,
        }
    }
}

impl Entity for Attribute {
    fn mapping() -> &'static EntityMapping {
        &ATTRIBUTE_MAPPING
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn to_row(&self) -> Row {
        vec![
            Value::from(self.id.clone()),
            Value::from(self.name.as_str()),
            Value::from(&self.class),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let r = RowReader::new(Self::mapping(), row)?;
        Ok(Self {
            id: r.key()?,
            name: r.text("name")?,
            class: r.reference("class")?,
        })
    }
}
