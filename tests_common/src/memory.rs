//! An in-memory store speaking exactly the statements repokit generates.
//!
//! Tables are created from the generated DDL; `MERGE INTO`/`INSERT OR REPLACE INTO` upsert by
//! primary key (assigning the next key when it is bound as `NULL`); `SELECT * FROM t` with an
//! optional single `WHERE c = ?` filter reads rows back. Each connection works on a private copy
//! of the committed tables between `begin` and `commit`/`rollback`.
//!
//! Every statement is logged and every transaction call is counted, and failures can be
//! injected for statements containing a given text, for commits and for rollbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use repokit::{Connection, DataSource, Dialect, ParamValue, RepoError, RepoResult, Row};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("no such table: {0}")]
    UnknownTable(String),
    #[error("table {0} already exists")]
    TableExists(String),
    #[error("no such column: {0}")]
    UnknownColumn(String),
    #[error("unsupported statement: {0}")]
    Unsupported(String),
    #[error("injected failure: {0}")]
    Injected(String),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    key: Option<usize>,
    rows: Vec<Vec<ParamValue>>,
}

impl Table {
    fn column(&self, name: &str) -> Result<usize, MemoryError> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| MemoryError::UnknownColumn(name.to_string()))
    }

    fn next_key(&self, key: usize) -> i64 {
        self.rows
            .iter()
            .filter_map(|r| match r[key] {
                ParamValue::I64(v) => Some(v),
                ParamValue::I32(v) => Some(i64::from(v)),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1
    }
}

type Tables = HashMap<String, Table>;

/// Equality as a store compares values: integers of either width are equal by value.
fn same_value(a: &ParamValue, b: &ParamValue) -> bool {
    match (a, b) {
        (ParamValue::I32(x), ParamValue::I64(y)) | (ParamValue::I64(y), ParamValue::I32(x)) => {
            i64::from(*x) == *y
        }
        (ParamValue::Null, _) | (_, ParamValue::Null) => false,
        _ => a == b,
    }
}

/// A statement as received by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<ParamValue>,
}

#[derive(Default)]
struct Shared {
    dialect: Dialect,
    committed: Mutex<Tables>,
    log: Mutex<Vec<Executed>>,
    fail_on: Mutex<Option<String>>,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    connects: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
}

/// Connection factory for the in-memory store. Clones share the same store.
#[derive(Clone, Default)]
pub struct MemoryDataSource {
    shared: Arc<Shared>,
}

impl MemoryDataSource {
    /// A store speaking [`Dialect::Ansi`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            shared: Arc::new(Shared {
                dialect,
                ..Shared::default()
            }),
        }
    }

    /// Fail every statement whose text contains `needle`.
    pub fn fail_on(&self, needle: impl Into<String>) {
        *lock(&self.shared.fail_on) = Some(needle.into());
    }

    pub fn fail_commit(&self, fail: bool) {
        self.shared.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.shared.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Every executed statement with its bind values, in order.
    pub fn executed(&self) -> Vec<Executed> {
        lock(&self.shared.log).clone()
    }

    pub fn statements(&self) -> Vec<String> {
        lock(&self.shared.log)
            .iter()
            .map(|e| e.sql.clone())
            .collect()
    }

    /// Committed rows of `table`, or `None` when it does not exist.
    pub fn committed_rows(&self, table: &str) -> Option<usize> {
        lock(&self.shared.committed).get(table).map(|t| t.rows.len())
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.shared.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn connect(&self) -> RepoResult<Arc<dyn Connection>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            shared: self.shared.clone(),
            working: Mutex::new(None),
            last_key: Mutex::new(None),
        }))
    }
}

/// One connection to the in-memory store.
pub struct MemoryConnection {
    shared: Arc<Shared>,
    working: Mutex<Option<Tables>>,
    last_key: Mutex<Option<ParamValue>>,
}

impl MemoryConnection {
    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut working = lock(&self.working);
        match working.as_mut() {
            Some(tables) => f(tables),
            None => f(&mut lock(&self.shared.committed)),
        }
    }

    fn record(&self, sql: &str, params: &[ParamValue]) -> Result<(), MemoryError> {
        lock(&self.shared.log).push(Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match lock(&self.shared.fail_on).as_deref() {
            Some(needle) if sql.contains(needle) => Err(MemoryError::Injected(sql.to_string())),
            _ => Ok(()),
        }
    }

    fn run(&self, sql: &str, params: Vec<ParamValue>) -> Result<Vec<Row>, MemoryError> {
        self.record(sql, &params)?;
        let sql = sql.trim().trim_end_matches(';');
        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            return self.create(rest).map(|_| Vec::new());
        }
        if let Some(rest) = sql
            .strip_prefix("MERGE INTO ")
            .or_else(|| sql.strip_prefix("INSERT OR REPLACE INTO "))
        {
            return self.upsert(rest, params).map(|_| Vec::new());
        }
        if let Some(rest) = sql.strip_prefix("SELECT * FROM ") {
            return self.select(rest, params);
        }
        Err(MemoryError::Unsupported(sql.to_string()))
    }

    fn create(&self, rest: &str) -> Result<(), MemoryError> {
        let (name, body) = rest
            .split_once(" (")
            .ok_or_else(|| MemoryError::Unsupported(rest.to_string()))?;
        let body = body.strip_suffix(')').unwrap_or(body);
        let mut table = Table::default();
        let mut key_column = None;
        for part in body.split(", ") {
            if let Some(pk) = part.strip_prefix("PRIMARY KEY (") {
                key_column = Some(pk.trim_end_matches(')').to_string());
            } else if let Some(column) = part.split_whitespace().next() {
                table.columns.push(column.to_string());
            }
        }
        if let Some(column) = key_column {
            table.key = Some(table.column(&column)?);
        }
        self.with_tables(|tables| {
            if tables.contains_key(name) {
                return Err(MemoryError::TableExists(name.to_string()));
            }
            tables.insert(name.to_string(), table);
            Ok(())
        })
    }

    fn upsert(&self, rest: &str, params: Vec<ParamValue>) -> Result<(), MemoryError> {
        let (name, rest) = rest
            .split_once(" (")
            .ok_or_else(|| MemoryError::Unsupported(rest.to_string()))?;
        let (columns, _) = rest
            .split_once(')')
            .ok_or_else(|| MemoryError::Unsupported(rest.to_string()))?;
        let key = self.with_tables(|tables| {
            let table = tables
                .get_mut(name)
                .ok_or_else(|| MemoryError::UnknownTable(name.to_string()))?;
            let mut row = vec![ParamValue::Null; table.columns.len()];
            for (column, value) in columns.split(", ").zip(params) {
                row[table.column(column)?] = value;
            }
            let Some(key) = table.key else {
                table.rows.push(row);
                return Ok(None);
            };
            if row[key].is_null() {
                row[key] = ParamValue::I64(table.next_key(key));
            }
            let assigned = row[key].clone();
            match table
                .rows
                .iter_mut()
                .find(|r| same_value(&r[key], &assigned))
            {
                Some(existing) => *existing = row,
                None => table.rows.push(row),
            }
            Ok(Some(assigned))
        })?;
        *lock(&self.last_key) = key;
        Ok(())
    }

    fn select(&self, rest: &str, params: Vec<ParamValue>) -> Result<Vec<Row>, MemoryError> {
        let (name, filter) = match rest.split_once(" WHERE ") {
            Some((name, condition)) => {
                let column = condition
                    .strip_suffix(" = ?")
                    .ok_or_else(|| MemoryError::Unsupported(condition.to_string()))?;
                (name, Some(column))
            }
            None => (rest, None),
        };
        self.with_tables(|tables| {
            let table = tables
                .get(name)
                .ok_or_else(|| MemoryError::UnknownTable(name.to_string()))?;
            let filter = match (filter, params.first()) {
                (Some(column), Some(value)) => Some((table.column(column)?, value)),
                (Some(column), None) => return Err(MemoryError::Unsupported(column.to_string())),
                (None, _) => None,
            };
            Ok(table
                .rows
                .iter()
                .filter(|row| filter.map_or(true, |(i, v)| same_value(&row[i], v)))
                .map(|row| Row::new(row.clone()))
                .collect())
        })
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn dialect(&self) -> Dialect {
        self.shared.dialect
    }

    async fn begin(&self) -> RepoResult<()> {
        self.shared.begins.fetch_add(1, Ordering::SeqCst);
        let snapshot = lock(&self.shared.committed).clone();
        *lock(&self.working) = Some(snapshot);
        Ok(())
    }

    async fn commit(&self) -> RepoResult<()> {
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_commit.load(Ordering::SeqCst) {
            return Err(RepoError::store(MemoryError::Injected("COMMIT".into())));
        }
        if let Some(tables) = lock(&self.working).take() {
            *lock(&self.shared.committed) = tables;
        }
        Ok(())
    }

    async fn rollback(&self) -> RepoResult<()> {
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        lock(&self.working).take();
        if self.shared.fail_rollback.load(Ordering::SeqCst) {
            return Err(RepoError::store(MemoryError::Injected("ROLLBACK".into())));
        }
        Ok(())
    }

    async fn execute(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<u64> {
        self.run(sql, params).map_err(RepoError::store)?;
        Ok(1)
    }

    async fn query(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<Vec<Row>> {
        self.run(sql, params).map_err(RepoError::store)
    }

    async fn last_generated_key(&self) -> RepoResult<Option<ParamValue>> {
        Ok(lock(&self.last_key).clone())
    }

    async fn close(&self) -> RepoResult<()> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        lock(&self.working).take();
        Ok(())
    }
}
