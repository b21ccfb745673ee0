//! Declarative per-type schema descriptions.
//!
//! An entity type describes itself once through [`Entity::descriptor`]; the metadata resolver
//! turns that description into an immutable [`crate::EntityMetadata`]. `#[derive(Entity)]`
//! generates all of this, but the builder below is public so an impl can be written by hand.

use crate::ParamValue;

/// Storage type of a persistent property, as declared by the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    I32,
    I64,
    Text,
    F64,
    Bool,
    /// A declared type outside the supported table; resolution rejects it.
    Unsupported(&'static str),
}

/// Declared metadata for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    name: String,
    column: Option<String>,
    storage: StorageType,
    nullable: bool,
    id: bool,
    generated: bool,
}

impl PropertyDescriptor {
    /// A non-nullable property with the default column name.
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into(),
            column: None,
            storage,
            nullable: false,
            id: false,
            generated: false,
        }
    }

    /// Override the column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark this property as the identity (primary key).
    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// Mark this property's value as assigned by the store.
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_override(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }
}

/// Declared metadata for an entity type: its name, optional table override and ordered properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    type_name: String,
    table: Option<String>,
    properties: Vec<PropertyDescriptor>,
}

impl EntityDescriptor {
    /// `type_name` is the simple type name; the default table name derives from it.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            properties: Vec::new(),
        }
    }

    /// Override the table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Append a property. Declaration order is the column order.
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table_override(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }
}

/// Failure of a generated getter/setter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("no property named `{0}`")]
    Unknown(String),
    #[error("cannot convert {found} into {expected}")]
    Coercion {
        expected: &'static str,
        found: &'static str,
    },
}

impl PropertyError {
    fn coercion(expected: &'static str, value: &ParamValue) -> Self {
        PropertyError::Coercion {
            expected,
            found: value.kind(),
        }
    }
}

/// An application type whose instances are persisted as rows of a table.
///
/// `Default` is the constructor used when mapping rows; properties are then assigned
/// one by one through [`Entity::set_property`].
pub trait Entity: Default + Send + Sync + 'static {
    /// Static schema description, resolved once per type.
    fn descriptor() -> EntityDescriptor;

    /// Getter: the current value of a property, or `None` for an unknown name.
    fn get_property(&self, name: &str) -> Option<ParamValue>;

    /// Setter: assign a (coerced) value to a property.
    fn set_property(&mut self, name: &str, value: ParamValue) -> Result<(), PropertyError>;
}

/// Conversion from a store value into a property type.
pub trait FromParam: Sized {
    fn from_param(value: ParamValue) -> Result<Self, PropertyError>;
}

/// Conversion from a property value into a bind parameter.
pub trait ToParam {
    fn to_param(&self) -> ParamValue;
}

impl FromParam for i32 {
    fn from_param(value: ParamValue) -> Result<Self, PropertyError> {
        match value {
            ParamValue::I32(i) => Ok(i),
            ParamValue::I64(i) => i32::try_from(i).map_err(|_| PropertyError::Coercion {
                expected: "i32",
                found: "out of range i64",
            }),
            other => Err(PropertyError::coercion("i32", &other)),
        }
    }
}

impl FromParam for i64 {
    fn from_param(value: ParamValue) -> Result<Self, PropertyError> {
        match value {
            ParamValue::I64(i) => Ok(i),
            ParamValue::I32(i) => Ok(i64::from(i)),
            other => Err(PropertyError::coercion("i64", &other)),
        }
    }
}

impl FromParam for f64 {
    fn from_param(value: ParamValue) -> Result<Self, PropertyError> {
        match value {
            ParamValue::F64(f) => Ok(f),
            ParamValue::I32(i) => Ok(f64::from(i)),
            ParamValue::I64(i) => Ok(i as f64),
            other => Err(PropertyError::coercion("f64", &other)),
        }
    }
}

impl FromParam for bool {
    fn from_param(value: ParamValue) -> Result<Self, PropertyError> {
        // SQLite stores booleans as 0/1 integers
        match value {
            ParamValue::Bool(b) => Ok(b),
            ParamValue::I64(0) | ParamValue::I32(0) => Ok(false),
            ParamValue::I64(1) | ParamValue::I32(1) => Ok(true),
            other => Err(PropertyError::coercion("bool", &other)),
        }
    }
}

impl FromParam for String {
    fn from_param(value: ParamValue) -> Result<Self, PropertyError> {
        match value {
            ParamValue::String(s) => Ok(s),
            other => Err(PropertyError::coercion("string", &other)),
        }
    }
}

impl<T: FromParam> FromParam for Option<T> {
    fn from_param(value: ParamValue) -> Result<Self, PropertyError> {
        match value {
            ParamValue::Null => Ok(None),
            other => T::from_param(other).map(Some),
        }
    }
}

impl ToParam for i32 {
    fn to_param(&self) -> ParamValue {
        ParamValue::I32(*self)
    }
}

impl ToParam for i64 {
    fn to_param(&self) -> ParamValue {
        ParamValue::I64(*self)
    }
}

impl ToParam for f64 {
    fn to_param(&self) -> ParamValue {
        ParamValue::F64(*self)
    }
}

impl ToParam for bool {
    fn to_param(&self) -> ParamValue {
        ParamValue::Bool(*self)
    }
}

impl ToParam for String {
    fn to_param(&self) -> ParamValue {
        ParamValue::String(self.clone())
    }
}

impl ToParam for str {
    fn to_param(&self) -> ParamValue {
        ParamValue::String(self.to_string())
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self) -> ParamValue {
        (**self).to_param()
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> ParamValue {
        self.as_ref().map_or(ParamValue::Null, ToParam::to_param)
    }
}
