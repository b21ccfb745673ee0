//! The narrow store interface the ORM runs against.
//!
//! Backends implement [`DataSource`] (hands out connections) and [`Connection`] (executes
//! parameterized statements, reads rows positionally, reports generated keys). The core is
//! otherwise store-agnostic.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ParamValue, RepoResult, Row};

/// SQL flavor spoken by a connection. Fixed per backend, never negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// H2-style: `AUTO_INCREMENT` columns and `MERGE INTO` upserts.
    #[default]
    Ansi,
    /// SQLite/libsql: rowid-alias identities and `INSERT OR REPLACE INTO` upserts.
    Sqlite,
}

/// A single store connection. Backends map driver failures with [`crate::RepoError::store`].
#[async_trait]
pub trait Connection: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Disable auto-commit: start a unit of work.
    async fn begin(&self) -> RepoResult<()>;

    async fn commit(&self) -> RepoResult<()>;

    async fn rollback(&self) -> RepoResult<()>;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<u64>;

    /// Run a query and read every row. The cursor is released before returning.
    async fn query(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<Vec<Row>>;

    /// Key generated by the last insert on this connection, if any.
    async fn last_generated_key(&self) -> RepoResult<Option<ParamValue>>;

    /// Release the connection.
    async fn close(&self) -> RepoResult<()> {
        Ok(())
    }
}

/// Connection factory.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Acquire a new connection, independent from any other one handed out.
    async fn connect(&self) -> RepoResult<Arc<dyn Connection>>;
}

#[async_trait]
impl<D: DataSource + ?Sized> DataSource for Arc<D> {
    async fn connect(&self) -> RepoResult<Arc<dyn Connection>> {
        (**self).connect().await
    }
}
