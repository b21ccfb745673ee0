#![forbid(unsafe_code)]
#![cfg_attr(
    not(feature = "libsql-backend"),
    doc = "Enable feature `libsql-backend` to use this adapter."
)]
//! libsql/SQLite store adapter.
//!
//! [`LibsqlDataSource`] hands out one [`LibsqlConnection`] per transaction block. Connections
//! speak [`repokit_core::Dialect::Sqlite`]: generated identities are rowid aliases read back
//! with `last_insert_rowid()`, and saves use `INSERT OR REPLACE`.
//!
//! Note that every connection to `:memory:` opens its own, separate database; use a file path
//! when more than one transaction must see the same data.

use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum LibsqlError {
    #[error("invalid value `{value}` for {key}")]
    InvalidConfig { key: &'static str, value: String },
    #[error("unsupported column value of type {0}")]
    UnsupportedValue(&'static str),
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibsqlConfig {
    /// Local database path (or `:memory:`).
    pub url: String,
    /// Applied to every connection with `PRAGMA busy_timeout`.
    pub busy_timeout: Duration,
}

impl LibsqlConfig {
    pub const URL_VAR: &'static str = "REPOKIT_DATABASE_URL";
    pub const BUSY_TIMEOUT_VAR: &'static str = "REPOKIT_BUSY_TIMEOUT_MS";
    pub const DEFAULT_URL: &'static str = "repokit.db";
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(1000);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            busy_timeout: Self::DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Read `REPOKIT_DATABASE_URL` and `REPOKIT_BUSY_TIMEOUT_MS`, falling back to defaults.
    pub fn from_env() -> Result<Self, LibsqlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LibsqlError> {
        let url = lookup(Self::URL_VAR).unwrap_or_else(|| Self::DEFAULT_URL.to_string());
        let busy_timeout = match lookup(Self::BUSY_TIMEOUT_VAR) {
            Some(raw) => Duration::from_millis(raw.trim().parse().map_err(|_| {
                LibsqlError::InvalidConfig {
                    key: Self::BUSY_TIMEOUT_VAR,
                    value: raw.clone(),
                }
            })?),
            None => Self::DEFAULT_BUSY_TIMEOUT,
        };
        Ok(Self { url, busy_timeout })
    }
}

impl Default for LibsqlConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_URL)
    }
}

#[cfg(feature = "libsql-backend")]
mod backend {
    use std::sync::Arc;
    use std::time::Instant;

    use async_trait::async_trait;
    use libsql::{Builder, Database, Value};
    use repokit_core::{Connection, DataSource, Dialect, ParamValue, RepoError, RepoResult, Row};
    use tracing::{debug, info};

    use crate::{LibsqlConfig, LibsqlError};

    #[inline]
    #[allow(unused_variables)]
    fn obs_record(op: &str, kind: &str, start: Instant, rows: usize, success: bool) {
        let elapsed = start.elapsed().as_millis() as u64;
        info!(
            sql_kind = kind,
            op = op,
            rows = rows,
            elapsed_ms = elapsed,
            success = success,
            "repo op"
        );
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("repo_ops_total", 1, "op" => op.to_string(), "kind" => kind.to_string(), "success" => success.to_string());
            metrics::histogram!("repo_op_duration_ms", elapsed as f64, "op" => op.to_string(), "kind" => kind.to_string());
            if !success {
                metrics::counter!("repo_op_errors_total", 1, "op" => op.to_string(), "kind" => kind.to_string());
            }
        }
    }

    /// Leading keyword of a statement, for observability labels.
    fn statement_kind(sql: &str) -> &str {
        sql.split_whitespace().next().unwrap_or("")
    }

    // Helper function to convert ParamValue to libsql::Value.
    pub(crate) fn to_libsql_value(p: ParamValue) -> Value {
        match p {
            ParamValue::String(s) => Value::Text(s),
            ParamValue::I32(i) => Value::Integer(i64::from(i)), // libsql uses i64 for integers
            ParamValue::I64(i) => Value::Integer(i),
            ParamValue::F64(f) => Value::Real(f),
            ParamValue::Bool(b) => Value::Integer(i64::from(b)), // SQLite bools are 0/1
            ParamValue::Null => Value::Null,
        }
    }

    pub(crate) fn from_libsql_value(v: Value) -> Result<ParamValue, LibsqlError> {
        match v {
            Value::Null => Ok(ParamValue::Null),
            Value::Integer(i) => Ok(ParamValue::I64(i)),
            Value::Real(f) => Ok(ParamValue::F64(f)),
            Value::Text(s) => Ok(ParamValue::String(s)),
            Value::Blob(_) => Err(LibsqlError::UnsupportedValue("BLOB")),
        }
    }

    /// Connection factory over one local libsql database.
    #[derive(Clone)]
    pub struct LibsqlDataSource {
        db: Arc<Database>,
        config: LibsqlConfig,
    }

    impl std::fmt::Debug for LibsqlDataSource {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LibsqlDataSource")
                .field("config", &self.config)
                .finish()
        }
    }

    impl LibsqlDataSource {
        /// Open (creating if needed) the database named by `config.url`.
        pub async fn open(config: LibsqlConfig) -> RepoResult<Self> {
            let db = Builder::new_local(&config.url)
                .build()
                .await
                .map_err(RepoError::store)?;
            debug!(url = %config.url, "opened libsql database");
            Ok(Self {
                db: Arc::new(db),
                config,
            })
        }

        /// Open the database configured through the environment.
        pub async fn from_env() -> RepoResult<Self> {
            Self::open(LibsqlConfig::from_env().map_err(RepoError::store)?).await
        }

        pub fn config(&self) -> &LibsqlConfig {
            &self.config
        }
    }

    #[async_trait]
    impl DataSource for LibsqlDataSource {
        async fn connect(&self) -> RepoResult<Arc<dyn Connection>> {
            let conn = self.db.connect().map_err(RepoError::store)?;
            // PRAGMA busy_timeout answers with a row, so it goes through query().
            conn.query(
                &format!(
                    "PRAGMA busy_timeout = {}",
                    self.config.busy_timeout.as_millis()
                ),
                (),
            )
            .await
            .map_err(RepoError::store)?;
            Ok(Arc::new(LibsqlConnection { conn }))
        }
    }

    /// One libsql connection.
    pub struct LibsqlConnection {
        conn: libsql::Connection,
    }

    impl LibsqlConnection {
        async fn control(&self, sql: &str) -> RepoResult<()> {
            let start = Instant::now();
            let result = self.conn.execute(sql, ()).await;
            obs_record("tx", sql, start, 0, result.is_ok());
            result.map(|_| ()).map_err(RepoError::store)
        }
    }

    #[async_trait]
    impl Connection for LibsqlConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn begin(&self) -> RepoResult<()> {
            self.control("BEGIN DEFERRED").await
        }

        async fn commit(&self) -> RepoResult<()> {
            self.control("COMMIT").await
        }

        async fn rollback(&self) -> RepoResult<()> {
            self.control("ROLLBACK").await
        }

        async fn execute(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<u64> {
            let start = Instant::now();
            let values: Vec<Value> = params.into_iter().map(to_libsql_value).collect();
            let result = self.conn.execute(sql, values).await;
            let rows = result.as_ref().map_or(0, |n| *n as usize);
            obs_record("execute", statement_kind(sql), start, rows, result.is_ok());
            result.map_err(RepoError::store)
        }

        async fn query(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<Vec<Row>> {
            let start = Instant::now();
            let values: Vec<Value> = params.into_iter().map(to_libsql_value).collect();
            let result = async {
                let mut rows = self
                    .conn
                    .query(sql, values)
                    .await
                    .map_err(RepoError::store)?;
                let mut out = Vec::new();
                while let Some(row) = rows.next().await.map_err(RepoError::store)? {
                    let values = (0..row.column_count())
                        .map(|i| {
                            row.get_value(i)
                                .map_err(RepoError::store)
                                .and_then(|v| from_libsql_value(v).map_err(RepoError::store))
                        })
                        .collect::<RepoResult<Vec<_>>>()?;
                    out.push(Row::new(values));
                }
                Ok::<_, RepoError>(out)
            }
            .await;
            let rows = result.as_ref().map_or(0, Vec::len);
            obs_record("query", statement_kind(sql), start, rows, result.is_ok());
            result
        }

        async fn last_generated_key(&self) -> RepoResult<Option<ParamValue>> {
            match self.conn.last_insert_rowid() {
                0 => Ok(None),
                id => Ok(Some(ParamValue::I64(id))),
            }
        }
    }
}

#[cfg(feature = "libsql-backend")]
pub use backend::{LibsqlConnection, LibsqlDataSource};
