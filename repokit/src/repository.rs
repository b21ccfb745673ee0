//! The repository dispatcher.
//!
//! A repository contract is a trait annotated with [`macro@crate::repository`]. The macro
//! generates a proxy type whose methods are thin calls into a shared [`Dispatcher`]; the
//! dispatcher classifies each method into a [`QueryShape`] the first time it is invoked,
//! caches the shape for its own lifetime, and builds a fresh [`BoundStatement`] per call.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use inflections::Inflect;
use repokit_core::mapper::{bind_parameters, to_entity, write_generated_key};
use repokit_core::{
    metadata, DefinitionError, Dialect, Entity, EntityMetadata, ParamValue, PropertyMetadata,
    RepoError, RepoResult, ToParam, Transaction,
};
use repokit_sql_builder::{select_all, select_by_column, upsert, BoundStatement};
use tracing::debug;

/// Static description of one repository method, as declared on the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: &'static str,
    /// Explicit query string from `#[query("...")]`.
    pub query: Option<&'static str>,
    /// Number of arguments besides the transaction handle.
    pub arity: usize,
}

impl MethodDescriptor {
    pub const fn new(name: &'static str, arity: usize) -> Self {
        Self {
            name,
            query: None,
            arity,
        }
    }

    pub const fn with_query(name: &'static str, query: &'static str, arity: usize) -> Self {
        Self {
            name,
            query: Some(query),
            arity,
        }
    }
}

const FIND_ALL: MethodDescriptor = MethodDescriptor::new("find_all", 0);
const FIND_BY_ID: MethodDescriptor = MethodDescriptor::new("find_by_id", 1);
const SAVE: MethodDescriptor = MethodDescriptor::new("save", 1);

/// The derived query shape of a repository method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryShape {
    /// Run the declared query verbatim, binding the arguments in order.
    ExplicitQuery { sql: String },
    FindAll,
    /// Upsert every property; read back the key when the identity is generated.
    Save { generated: bool },
    FindById { column: String },
    FindByProperty { property: String, column: String },
    /// Cached so the method fails the same way on every call.
    Unsupported { reason: String },
}

impl QueryShape {
    /// Classify a method against the entity's metadata.
    ///
    /// An explicit query wins over any naming convention. Method names are matched in snake
    /// case; camel-case names (`findByName`) are converted first.
    ///
    /// # Errors
    /// [`RepoError::UnknownProperty`] when a `find_by_<property>` names no property, and
    /// [`DefinitionError::MissingIdentity`] for `find_by_id` on an entity without identity.
    pub fn classify(
        contract: &str,
        method: &MethodDescriptor,
        metadata: &EntityMetadata,
    ) -> RepoResult<QueryShape> {
        if let Some(sql) = method.query {
            return Ok(QueryShape::ExplicitQuery {
                sql: sql.to_string(),
            });
        }
        let name = method.name.to_snake_case();
        let (shape, arity) = match name.as_str() {
            "find_all" => (QueryShape::FindAll, 0),
            "save" => (
                QueryShape::Save {
                    generated: metadata.has_generated_identity(),
                },
                1,
            ),
            "find_by_id" => {
                let id = metadata
                    .identity()
                    .ok_or_else(|| DefinitionError::MissingIdentity {
                        entity: metadata.type_name().to_string(),
                    })?;
                (
                    QueryShape::FindById {
                        column: id.column().to_string(),
                    },
                    1,
                )
            }
            other => match other.strip_prefix("find_by_") {
                Some(property) if !property.is_empty() => {
                    let found = find_property(metadata, property).ok_or_else(|| {
                        RepoError::UnknownProperty {
                            contract: contract.to_string(),
                            method: method.name.to_string(),
                            property: property.to_string(),
                        }
                    })?;
                    (
                        QueryShape::FindByProperty {
                            property: found.name().to_string(),
                            column: found.column().to_string(),
                        },
                        1,
                    )
                }
                _ => {
                    return Ok(QueryShape::Unsupported {
                        reason: "no query annotation and no recognized naming convention"
                            .to_string(),
                    })
                }
            },
        };
        if method.arity != arity {
            return Ok(QueryShape::Unsupported {
                reason: format!("expects {arity} argument(s), declared {}", method.arity),
            });
        }
        Ok(shape)
    }

    fn name(&self) -> &'static str {
        match self {
            QueryShape::ExplicitQuery { .. } => "explicit_query",
            QueryShape::FindAll => "find_all",
            QueryShape::Save { .. } => "save",
            QueryShape::FindById { .. } => "find_by_id",
            QueryShape::FindByProperty { .. } => "find_by_property",
            QueryShape::Unsupported { .. } => "unsupported",
        }
    }
}

/// Property named by a finder suffix. Camel-case conversion merges single-letter words
/// (`findByXCoord` gives `xcoord`), so an exact miss falls back to comparing names with
/// underscores removed.
fn find_property<'m>(
    metadata: &'m EntityMetadata,
    suffix: &str,
) -> Option<&'m PropertyMetadata> {
    metadata.property(suffix).or_else(|| {
        let squashed = suffix.replace('_', "");
        metadata
            .properties()
            .iter()
            .find(|p| p.name().replace('_', "") == squashed)
    })
}

/// Executes repository methods for one contract over entity `E`.
///
/// Holds the contract's method descriptors and the dispatch cache; shares the process-wide
/// entity metadata.
pub struct Dispatcher<E: Entity> {
    contract: &'static str,
    metadata: Arc<EntityMetadata>,
    methods: HashMap<&'static str, MethodDescriptor>,
    shapes: Mutex<HashMap<&'static str, Arc<QueryShape>>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("contract", &self.contract)
            .field("entity", &self.metadata.type_name())
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl<E: Entity> Dispatcher<E> {
    /// Build a dispatcher for `contract`. `find_all`, `find_by_id` and `save` are always
    /// registered; a declared method with the same name replaces the conventional one.
    pub fn new(
        contract: &'static str,
        metadata: Arc<EntityMetadata>,
        methods: impl IntoIterator<Item = MethodDescriptor>,
    ) -> Self {
        let mut registry: HashMap<&'static str, MethodDescriptor> = [FIND_ALL, FIND_BY_ID, SAVE]
            .into_iter()
            .map(|m| (m.name, m))
            .collect();
        registry.extend(methods.into_iter().map(|m| (m.name, m)));
        Self {
            contract,
            metadata,
            methods: registry,
            shapes: Mutex::new(HashMap::new()),
            _entity: PhantomData,
        }
    }

    pub fn contract(&self) -> &'static str {
        self.contract
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    /// The cached shape for `method`, classifying it on first use.
    ///
    /// # Errors
    /// Classification errors, which are not cached.
    pub fn shape(&self, method: &str) -> RepoResult<Arc<QueryShape>> {
        let descriptor = self.methods.get(method).copied().ok_or_else(|| {
            RepoError::UnsupportedRepositoryMethod {
                contract: self.contract.to_string(),
                method: method.to_string(),
                reason: "not declared on the contract".to_string(),
            }
        })?;
        let mut shapes = self.shapes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(shape) = shapes.get(descriptor.name) {
            return Ok(shape.clone());
        }
        let shape = Arc::new(QueryShape::classify(
            self.contract,
            &descriptor,
            &self.metadata,
        )?);
        debug!(
            contract = self.contract,
            method = descriptor.name,
            shape = shape.name(),
            "classified repository method"
        );
        shapes.insert(descriptor.name, shape.clone());
        Ok(shape)
    }

    fn unsupported(&self, method: &str, reason: impl Into<String>) -> RepoError {
        RepoError::UnsupportedRepositoryMethod {
            contract: self.contract.to_string(),
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// The SQL and bind values for a read-shaped method.
    ///
    /// # Errors
    /// [`RepoError::UnsupportedRepositoryMethod`] for `save` or unsupported shapes.
    pub fn bind(
        &self,
        method: &str,
        shape: &QueryShape,
        args: Vec<ParamValue>,
    ) -> RepoResult<BoundStatement> {
        let sql = match shape {
            QueryShape::ExplicitQuery { sql } => sql.clone(),
            QueryShape::FindAll => select_all(&self.metadata),
            QueryShape::FindById { column } | QueryShape::FindByProperty { column, .. } => {
                select_by_column(&self.metadata, column)
            }
            QueryShape::Save { .. } => {
                return Err(self.unsupported(method, "save takes the entity, not bind values"))
            }
            QueryShape::Unsupported { reason } => return Err(self.unsupported(method, reason)),
        };
        Ok(BoundStatement::new(sql, args))
    }

    /// Run a read-shaped method and map every returned row.
    pub async fn fetch(
        &self,
        tx: &Transaction,
        method: &str,
        args: Vec<ParamValue>,
    ) -> RepoResult<Vec<E>> {
        let shape = self.shape(method)?;
        let (sql, params) = self.bind(method, &shape, args)?.into_parts();
        debug!(
            contract = self.contract,
            method,
            table = self.metadata.table(),
            "dispatch"
        );
        let rows = tx.query(&sql, params).await?;
        rows.iter()
            .map(|row| to_entity::<E>(row, &self.metadata))
            .collect()
    }

    /// Run a read-shaped method with 0/1 cardinality: the first match, if any.
    pub async fn fetch_optional(
        &self,
        tx: &Transaction,
        method: &str,
        args: Vec<ParamValue>,
    ) -> RepoResult<Option<E>> {
        Ok(self.fetch(tx, method, args).await?.into_iter().next())
    }

    /// Upsert `entity` and, for a generated identity, write the store's key back into it.
    pub async fn save(&self, tx: &Transaction, method: &str, mut entity: E) -> RepoResult<E> {
        let shape = self.shape(method)?;
        let generated = match shape.as_ref() {
            QueryShape::Save { generated } => *generated,
            QueryShape::Unsupported { reason } => return Err(self.unsupported(method, reason)),
            _ => return Err(self.unsupported(method, "only save takes an entity argument")),
        };
        let dialect: Dialect = tx.dialect()?;
        let statement = BoundStatement::new(
            upsert(&self.metadata, dialect),
            bind_parameters(&entity, &self.metadata)?,
        );
        debug!(
            contract = self.contract,
            method,
            table = self.metadata.table(),
            generated,
            "dispatch save"
        );
        let (sql, params) = statement.into_parts();
        tx.execute(&sql, params).await?;
        if generated {
            if let Some(key) = tx.last_generated_key().await? {
                write_generated_key(&mut entity, &self.metadata, key)?;
            }
        }
        Ok(entity)
    }
}

/// Implemented by the proxy the `#[repository]` macro generates for a contract trait.
pub trait RepositoryContract: Send + Sync + Sized + 'static {
    type Entity: Entity;
    type Key: ToParam + Send + Sync + 'static;

    /// The contract trait's name.
    const NAME: &'static str;

    /// Every method declared on the contract trait.
    fn methods() -> Vec<MethodDescriptor>;

    fn from_dispatcher(dispatcher: Dispatcher<Self::Entity>) -> Self;

    fn dispatcher(&self) -> &Dispatcher<Self::Entity>;
}

/// The conventional operations every repository supports.
#[async_trait]
pub trait Repository<E: Entity, K: ToParam + Send + Sync + 'static>: Send + Sync {
    async fn find_all(&self, tx: &Transaction) -> RepoResult<Vec<E>>;

    /// `None` when no row has this identity.
    async fn find_by_id(&self, tx: &Transaction, id: &K) -> RepoResult<Option<E>>;

    /// Insert or replace by identity; returns the entity with any generated key assigned.
    async fn save(&self, tx: &Transaction, entity: E) -> RepoResult<E>;
}

#[async_trait]
impl<P> Repository<P::Entity, P::Key> for P
where
    P: RepositoryContract,
{
    async fn find_all(&self, tx: &Transaction) -> RepoResult<Vec<P::Entity>> {
        self.dispatcher().fetch(tx, FIND_ALL.name, Vec::new()).await
    }

    async fn find_by_id(&self, tx: &Transaction, id: &P::Key) -> RepoResult<Option<P::Entity>> {
        self.dispatcher()
            .fetch_optional(tx, FIND_BY_ID.name, vec![id.to_param()])
            .await
    }

    async fn save(&self, tx: &Transaction, entity: P::Entity) -> RepoResult<P::Entity> {
        self.dispatcher().save(tx, SAVE.name, entity).await
    }
}

/// Create the repository for contract `P`. Entity metadata is resolved here, so definition
/// errors surface at registration rather than at the first call.
pub fn create_repository<P: RepositoryContract>() -> RepoResult<P> {
    let metadata = metadata::<P::Entity>()?;
    debug!(
        contract = P::NAME,
        entity = metadata.type_name(),
        "created repository"
    );
    Ok(P::from_dispatcher(Dispatcher::new(
        P::NAME,
        metadata,
        P::methods(),
    )))
}
