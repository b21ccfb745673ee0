#![forbid(unsafe_code)]
//! Facade crate for the `repokit` ORM core.
//!
//! Add this single crate as a dependency: it re-exports the entity and transaction APIs
//! from `repokit_core`, the procedural macros, and provides the repository dispatcher.
//!
//! # Example
//!
//! ```ignore
//! // Non-runnable: needs a store. See `repokit/demos/` for a runnable libsql program.
//! use repokit::{create_repository, create_table, repository, run_in_transaction, Entity, Repository};
//!
//! #[derive(Entity, Debug, Default, Clone, PartialEq)]
//! pub struct Person {
//!     #[property(id, generated)]
//!     pub id: Option<i64>,
//!     pub name: String,
//! }
//!
//! #[repository]
//! pub trait People: Repository<Person, i64> {
//!     async fn find_by_name(&self, tx: &Transaction, name: String) -> RepoResult<Option<Person>>;
//! }
//!
//! let people: PeopleProxy = create_repository()?;
//! let ada = run_in_transaction(&source, |tx| async move {
//!     create_table::<Person>(&tx).await?;
//!     people.save(&tx, Person { id: None, name: "Ada".into() }).await
//! })
//! .await?;
//! assert!(ada.id.is_some());
//! ```

// Lets the macros' `::repokit::` paths resolve inside this crate's own tests.
extern crate self as repokit;

pub mod repository;
pub mod schema;

pub use repokit_core::{
    async_trait, in_transaction, mapper, metadata, resolve, run_in_transaction, Connection,
    DataSource, DefinitionError, Dialect, Entity, EntityDescriptor, EntityMetadata, FromParam,
    ParamValue, PropertyDescriptor, PropertyError, PropertyMetadata, RepoError, RepoResult, Row,
    StorageType, ToParam, Transaction, TransactionTemplate,
};
pub use repokit_core::transactions;
pub use repokit_macros::{repository, Entity};
pub use repokit_sql_builder as sql_builder;

pub use repository::{
    create_repository, Dispatcher, MethodDescriptor, QueryShape, Repository, RepositoryContract,
};
pub use schema::create_table;

/// Store adapters, gated by their features.
pub mod backends {
    #[cfg(feature = "libsql-backend")]
    pub use repokit_libsql::{LibsqlConfig, LibsqlConnection, LibsqlDataSource};
}
