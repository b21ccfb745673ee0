//! Common integration testing utilities and generic scenarios reusable across backends.

use std::sync::Once;

use repokit::{repository, Entity, RepoResult, Repository, Transaction};

pub mod memory;
pub mod scenarios;

pub use memory::MemoryDataSource;

#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Person {
    #[property(id, generated)]
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl Person {
    pub fn named(name: &str) -> Self {
        Self {
            id: None,
            name: Some(name.to_string()),
        }
    }
}

#[repository]
pub trait People: Repository<Person, i64> {
    async fn find_by_name(&self, tx: &Transaction, name: String) -> RepoResult<Option<Person>>;

    #[query("SELECT * FROM PERSON WHERE NAME = ?")]
    async fn named(&self, tx: &Transaction, name: String) -> RepoResult<Vec<Person>>;
}

/// Same entity, reached through the camel-case finder convention with every match returned.
#[repository(entity = Person, key = i64)]
pub trait PeopleByName {
    #[allow(non_snake_case)]
    async fn findByName(&self, tx: &Transaction, name: String) -> RepoResult<Vec<Person>>;
}

/// An entity whose table is never created: every statement against it fails in the store.
#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Ghost {
    #[property(id, generated)]
    pub id: Option<i64>,
    pub label: Option<String>,
}

#[repository]
pub trait Ghosts: Repository<Ghost, i64> {}

static LOGGING: Once = Once::new();

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, once per test binary.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
