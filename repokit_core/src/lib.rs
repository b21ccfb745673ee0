#![forbid(unsafe_code)]
//! Core types for the repokit ORM.
//!
//! This crate is database-agnostic: it knows how to describe entities, resolve their
//! persistent metadata, map rows to entities and back, and scope a store connection to a
//! transaction. SQL text generation lives in `repokit_sql_builder`, the repository
//! dispatcher in the `repokit` facade, and concrete stores in backend crates.

// Re-export for downstream macro expansions (used by repokit_macros::repository)
pub use async_trait::async_trait;

pub mod entity;
pub mod mapper;
pub mod metadata;
pub mod store;
pub mod transactions;

pub use entity::{
    Entity, EntityDescriptor, FromParam, PropertyDescriptor, PropertyError, StorageType, ToParam,
};
pub use metadata::{metadata, resolve, EntityMetadata, PropertyMetadata};
pub use store::{Connection, DataSource, Dialect};
pub use transactions::{in_transaction, run_in_transaction, Transaction, TransactionTemplate};

/// A backend-agnostic representation of a database value.
/// Used both for bind parameters and for the cells of a result [`Row`], so the core
/// never depends on a specific database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    I32(i32),
    I64(i64),
    F64(f64),
    Bool(bool),
    Null,
}

impl ParamValue {
    /// Short name of the variant, used in coercion error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::String(_) => "string",
            ParamValue::I32(_) => "i32",
            ParamValue::I64(_) => "i64",
            ParamValue::F64(_) => "f64",
            ParamValue::Bool(_) => "bool",
            ParamValue::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

/// One result row, read positionally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<ParamValue>,
}

impl Row {
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self { values }
    }

    /// Value at a zero-based column index.
    pub fn get(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<ParamValue> {
        self.values
    }
}

impl From<Vec<ParamValue>> for Row {
    fn from(values: Vec<ParamValue>) -> Self {
        Self::new(values)
    }
}

/// Invalid entity or repository metadata. Raised at resolution/registration time and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("multiple identity properties on {entity}: {first} and {second}")]
    MultipleIdentities {
        entity: String,
        first: String,
        second: String,
    },
    #[error("property {entity}.{property} has unsupported storage type `{type_name}`")]
    UnsupportedType {
        entity: String,
        property: String,
        type_name: String,
    },
    #[error("column {column} is mapped twice on {entity}")]
    DuplicateColumn { entity: String, column: String },
    #[error("invalid SQL identifier `{name}` on {entity}")]
    InvalidIdentifier { entity: String, name: String },
    #[error("{entity} has no identity property")]
    MissingIdentity { entity: String },
}

/// Error type shared by every layer of the ORM.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    /// A transaction handle was used after its block ended.
    #[error("no active transaction")]
    NoActiveTransaction,
    /// `run_in_transaction` was called while a block is already running on this task.
    #[error("a transaction is already active on this task")]
    NestedTransaction,
    #[error("{contract}::{method} refers to unknown property `{property}`")]
    UnknownProperty {
        contract: String,
        method: String,
        property: String,
    },
    #[error("unsupported repository method {contract}::{method}: {reason}")]
    UnsupportedRepositoryMethod {
        contract: String,
        method: String,
        reason: String,
    },
    /// A row value could not be coerced into the property type.
    #[error("cannot map column into {entity}.{property}")]
    Mapping {
        entity: String,
        property: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Opaque store error from the underlying driver or adapter.
    #[error("store error: {source}")]
    Store {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The primary failure of a transaction block together with a failed rollback.
    #[error("{primary} (rollback also failed: {suppressed})")]
    WithSuppressed {
        #[source]
        primary: Box<RepoError>,
        suppressed: Box<RepoError>,
    },
}

impl RepoError {
    /// Wrap a store/driver error.
    pub fn store<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Store {
            source: Box::new(e),
        }
    }

    /// Wrap a row-mapping error for the given property.
    pub fn mapping<E>(entity: &str, property: &str, e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Mapping {
            entity: entity.to_string(),
            property: property.to_string(),
            source: Box::new(e),
        }
    }

    /// Attach `suppressed` as a secondary failure; `self` stays the primary one.
    pub fn with_suppressed(self, suppressed: RepoError) -> Self {
        RepoError::WithSuppressed {
            primary: Box::new(self),
            suppressed: Box::new(suppressed),
        }
    }

    /// The original failure, looking through any attached rollback failure.
    pub fn primary(&self) -> &RepoError {
        match self {
            RepoError::WithSuppressed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    pub fn suppressed(&self) -> Option<&RepoError> {
        match self {
            RepoError::WithSuppressed { suppressed, .. } => Some(suppressed),
            _ => None,
        }
    }

    pub fn is_store(&self) -> bool {
        matches!(self.primary(), RepoError::Store { .. })
    }
}

/// Convenience alias for results returned by repository methods.
pub type RepoResult<T> = Result<T, RepoError>;
