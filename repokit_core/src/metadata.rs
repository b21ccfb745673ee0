//! Entity metadata resolver.
//!
//! Turns an [`EntityDescriptor`] into the ordered list of persistent properties used by the
//! DDL generator, the mapper and the repository dispatcher. Resolution is done once per type
//! and cached for the lifetime of the process.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::warn;

use crate::entity::{Entity, EntityDescriptor, StorageType};
use crate::DefinitionError;

/// A resolved persistent property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMetadata {
    name: String,
    column: String,
    storage: StorageType,
    column_type: &'static str,
    nullable: bool,
    id: bool,
    generated: bool,
}

impl PropertyMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    /// SQL column type from the static type table (e.g. `BIGINT`).
    pub fn column_type(&self) -> &'static str {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    /// True only for an identity whose value is assigned by the store.
    pub fn is_generated(&self) -> bool {
        self.generated
    }
}

/// Immutable resolved metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    type_name: String,
    table: String,
    properties: Vec<PropertyMetadata>,
    id_index: Option<usize>,
}

impl EntityMetadata {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Persistent properties in column order.
    pub fn properties(&self) -> &[PropertyMetadata] {
        &self.properties
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(PropertyMetadata::column)
    }

    pub fn identity(&self) -> Option<&PropertyMetadata> {
        self.id_index.map(|i| &self.properties[i])
    }

    pub fn has_generated_identity(&self) -> bool {
        self.identity().is_some_and(PropertyMetadata::is_generated)
    }

    /// Look up a property by its name.
    pub fn property(&self, name: &str) -> Option<&PropertyMetadata> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// The supported storage-type-to-column-type table.
pub fn column_type(storage: StorageType) -> Option<&'static str> {
    match storage {
        StorageType::I32 => Some("INTEGER"),
        StorageType::I64 => Some("BIGINT"),
        StorageType::Text => Some("VARCHAR(255)"),
        StorageType::F64 => Some("DOUBLE"),
        StorageType::Bool => Some("BOOLEAN"),
        StorageType::Unsupported(_) => None,
    }
}

fn storage_type_name(storage: StorageType) -> &'static str {
    match storage {
        StorageType::I32 => "i32",
        StorageType::I64 => "i64",
        StorageType::Text => "String",
        StorageType::F64 => "f64",
        StorageType::Bool => "bool",
        StorageType::Unsupported(name) => name,
    }
}

fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}

/// Resolve a descriptor into metadata.
///
/// Table and column names default to the upper-cased type/property name.
///
/// # Errors
/// [`DefinitionError`] when more than one property is an identity, a storage type has no
/// column type, a column is mapped twice, or a name is not a plain SQL identifier.
pub fn resolve(descriptor: &EntityDescriptor) -> Result<EntityMetadata, DefinitionError> {
    let entity = descriptor.type_name();
    let table = descriptor
        .table_override()
        .map(str::to_string)
        .unwrap_or_else(|| entity.to_uppercase());
    if !is_valid_ident(&table) {
        return Err(DefinitionError::InvalidIdentifier {
            entity: entity.to_string(),
            name: table,
        });
    }

    let mut properties: Vec<PropertyMetadata> = Vec::with_capacity(descriptor.properties().len());
    let mut id_index: Option<usize> = None;
    for (index, p) in descriptor.properties().iter().enumerate() {
        let column = p
            .column_override()
            .map(str::to_string)
            .unwrap_or_else(|| p.name().to_uppercase());
        if !is_valid_ident(&column) {
            return Err(DefinitionError::InvalidIdentifier {
                entity: entity.to_string(),
                name: column,
            });
        }
        if properties
            .iter()
            .any(|q| q.column.eq_ignore_ascii_case(&column))
        {
            return Err(DefinitionError::DuplicateColumn {
                entity: entity.to_string(),
                column,
            });
        }
        let column_type =
            column_type(p.storage()).ok_or_else(|| DefinitionError::UnsupportedType {
                entity: entity.to_string(),
                property: p.name().to_string(),
                type_name: storage_type_name(p.storage()).to_string(),
            })?;
        if p.is_id() {
            if let Some(first) = id_index {
                return Err(DefinitionError::MultipleIdentities {
                    entity: entity.to_string(),
                    first: properties[first].column.clone(),
                    second: column,
                });
            }
            id_index = Some(index);
        }
        if p.is_generated() && !p.is_id() {
            warn!(
                entity,
                property = p.name(),
                "generated value ignored on a non-identity property"
            );
        }
        properties.push(PropertyMetadata {
            name: p.name().to_string(),
            column,
            storage: p.storage(),
            column_type,
            nullable: p.is_nullable(),
            id: p.is_id(),
            generated: p.is_id() && p.is_generated(),
        });
    }

    Ok(EntityMetadata {
        type_name: entity.to_string(),
        table,
        properties,
        id_index,
    })
}

static CACHE: OnceLock<Mutex<HashMap<TypeId, Arc<EntityMetadata>>>> = OnceLock::new();

/// Resolved metadata for `E`, computed on first use and cached for the process lifetime.
///
/// # Errors
/// The [`DefinitionError`] from [`resolve`]; failures are not cached.
pub fn metadata<E: Entity>() -> Result<Arc<EntityMetadata>, DefinitionError> {
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let key = TypeId::of::<E>();
    if let Some(found) = cache
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(&key)
    {
        return Ok(found.clone());
    }
    // Resolve outside the lock; a concurrent resolution of the same type yields equal metadata.
    let resolved = Arc::new(resolve(&E::descriptor())?);
    let mut guard = cache.lock().unwrap_or_else(|e| e.into_inner());
    Ok(guard.entry(key).or_insert(resolved).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{PropertyDescriptor, PropertyError};
    use crate::ParamValue;

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("Person")
            .property(
                PropertyDescriptor::new("id", StorageType::I64)
                    .nullable()
                    .id()
                    .generated(),
            )
            .property(PropertyDescriptor::new("name", StorageType::Text))
    }

    #[test]
    fn names_default_to_upper_case() {
        let m = resolve(&person()).unwrap();
        assert_eq!(m.table(), "PERSON");
        assert_eq!(m.columns().collect::<Vec<_>>(), ["ID", "NAME"]);
        assert_eq!(m.identity().map(PropertyMetadata::column), Some("ID"));
        assert!(m.has_generated_identity());
        assert_eq!(m.property("name").map(PropertyMetadata::column_type), Some("VARCHAR(255)"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let d = EntityDescriptor::new("Person")
            .table("PEOPLE")
            .property(PropertyDescriptor::new("name", StorageType::Text).column("FULL_NAME"));
        let m = resolve(&d).unwrap();
        assert_eq!(m.table(), "PEOPLE");
        assert_eq!(m.columns().collect::<Vec<_>>(), ["FULL_NAME"]);
        assert!(m.identity().is_none());
    }

    #[test]
    fn two_identities_are_rejected() {
        let d = EntityDescriptor::new("Pair")
            .property(PropertyDescriptor::new("a", StorageType::I64).id())
            .property(PropertyDescriptor::new("b", StorageType::I64).id());
        assert_eq!(
            resolve(&d),
            Err(DefinitionError::MultipleIdentities {
                entity: "Pair".into(),
                first: "A".into(),
                second: "B".into(),
            })
        );
    }

    #[test]
    fn unsupported_storage_type_is_rejected() {
        let d = EntityDescriptor::new("Blob")
            .property(PropertyDescriptor::new("data", StorageType::Unsupported("Vec<u8>")));
        match resolve(&d) {
            Err(DefinitionError::UnsupportedType { type_name, .. }) => {
                assert_eq!(type_name, "Vec<u8>")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn duplicate_and_invalid_columns_are_rejected() {
        let dup = EntityDescriptor::new("Dup")
            .property(PropertyDescriptor::new("a", StorageType::I32).column("X"))
            .property(PropertyDescriptor::new("b", StorageType::I32).column("x"));
        assert!(matches!(
            resolve(&dup),
            Err(DefinitionError::DuplicateColumn { .. })
        ));

        let bad = EntityDescriptor::new("Bad")
            .property(PropertyDescriptor::new("a", StorageType::I32).column("A; DROP"));
        assert!(matches!(
            resolve(&bad),
            Err(DefinitionError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn generated_flag_only_applies_to_identity() {
        let d = EntityDescriptor::new("Counter")
            .property(PropertyDescriptor::new("hits", StorageType::I64).generated());
        let m = resolve(&d).unwrap();
        assert!(!m.properties()[0].is_generated());
        assert!(!m.has_generated_identity());
    }

    #[derive(Default)]
    struct Cached;

    impl Entity for Cached {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new("Cached").property(PropertyDescriptor::new("v", StorageType::I32))
        }
        fn get_property(&self, _name: &str) -> Option<ParamValue> {
            None
        }
        fn set_property(&mut self, name: &str, _value: ParamValue) -> Result<(), PropertyError> {
            Err(PropertyError::Unknown(name.to_string()))
        }
    }

    #[test]
    fn metadata_is_resolved_once_per_type() {
        let a = metadata::<Cached>().unwrap();
        let b = metadata::<Cached>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.table(), "CACHED");
    }
}
