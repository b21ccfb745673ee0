//! Row <-> entity mapping.
//!
//! Reads are positional: column `i` of a row is assigned to the `i`-th resolved property.
//! Any query whose rows go through [`to_entity`] must therefore select the columns in
//! resolver order (`SELECT *` over a table created from the same metadata does).

use crate::entity::Entity;
use crate::metadata::EntityMetadata;
use crate::{ParamValue, RepoError, RepoResult, Row};

#[derive(Debug, thiserror::Error)]
#[error("row has {found} columns, expected at least {expected}")]
struct MissingColumn {
    expected: usize,
    found: usize,
}

/// Build a new entity from a row: default-construct it, then call each setter in order.
pub fn to_entity<E: Entity>(row: &Row, metadata: &EntityMetadata) -> RepoResult<E> {
    let mut entity = E::default();
    for (index, property) in metadata.properties().iter().enumerate() {
        let value = row.get(index).cloned().ok_or_else(|| {
            RepoError::mapping(
                metadata.type_name(),
                property.name(),
                MissingColumn {
                    expected: metadata.properties().len(),
                    found: row.len(),
                },
            )
        })?;
        entity
            .set_property(property.name(), value)
            .map_err(|e| RepoError::mapping(metadata.type_name(), property.name(), e))?;
    }
    Ok(entity)
}

/// Read every property through its getter, in resolver order, as positional bind values.
pub fn bind_parameters<E: Entity>(
    entity: &E,
    metadata: &EntityMetadata,
) -> RepoResult<Vec<ParamValue>> {
    metadata
        .properties()
        .iter()
        .map(|property| {
            entity.get_property(property.name()).ok_or_else(|| {
                RepoError::mapping(
                    metadata.type_name(),
                    property.name(),
                    crate::PropertyError::Unknown(property.name().to_string()),
                )
            })
        })
        .collect()
}

/// Write a store-generated key back into the entity's identity property.
/// Does nothing when the entity has no identity.
pub fn write_generated_key<E: Entity>(
    entity: &mut E,
    metadata: &EntityMetadata,
    key: ParamValue,
) -> RepoResult<()> {
    match metadata.identity() {
        Some(id) => entity
            .set_property(id.name(), key)
            .map_err(|e| RepoError::mapping(metadata.type_name(), id.name(), e)),
        None => Ok(()),
    }
}
