//! Transaction context manager.
//!
//! [`run_in_transaction`] acquires a connection, disables auto-commit and hands the block an
//! explicit [`Transaction`] handle bound to that connection. The block's outcome decides
//! between commit and rollback. The handle is unbound on every exit path, after which any
//! use of it fails with [`RepoError::NoActiveTransaction`].
//!
//! One transaction may be open per tokio task at a time; nested blocks are rejected.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use futures::FutureExt;

use tracing::{debug, error, warn};

use crate::store::{Connection, DataSource, Dialect};
use crate::{ParamValue, RepoError, RepoResult, Row};

// Marker set for the duration of a transaction block on the current task.
tokio::task_local! {
    static IN_TRANSACTION: ();
}

/// Handle to the connection of the currently running transaction block.
///
/// Cheap to clone; every clone observes the same binding.
#[derive(Clone)]
pub struct Transaction {
    binding: Arc<Mutex<Option<Arc<dyn Connection>>>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Transaction {
    fn bind(connection: Arc<dyn Connection>) -> Self {
        Self {
            binding: Arc::new(Mutex::new(Some(connection))),
        }
    }

    fn unbind(&self) {
        self.binding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// True while the owning block is running.
    pub fn is_active(&self) -> bool {
        self.binding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The bound connection.
    ///
    /// # Errors
    /// [`RepoError::NoActiveTransaction`] once the block has ended.
    pub fn connection(&self) -> RepoResult<Arc<dyn Connection>> {
        self.binding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(RepoError::NoActiveTransaction)
    }

    pub fn dialect(&self) -> RepoResult<Dialect> {
        Ok(self.connection()?.dialect())
    }

    /// Execute a statement on the bound connection.
    pub async fn execute(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<u64> {
        let connection = self.connection()?;
        debug!(sql, params = params.len(), "execute");
        connection.execute(sql, params).await
    }

    /// Run a query on the bound connection.
    pub async fn query(&self, sql: &str, params: Vec<ParamValue>) -> RepoResult<Vec<Row>> {
        let connection = self.connection()?;
        debug!(sql, params = params.len(), "query");
        connection.query(sql, params).await
    }

    pub async fn last_generated_key(&self) -> RepoResult<Option<ParamValue>> {
        self.connection()?.last_generated_key().await
    }

    /// Commit the work done so far and start a new unit on the same connection.
    pub async fn commit(&self) -> RepoResult<()> {
        let connection = self.connection()?;
        connection.commit().await?;
        connection.begin().await
    }
}

struct Unbind<'a>(&'a Transaction);

impl Drop for Unbind<'_> {
    fn drop(&mut self) {
        self.0.unbind();
    }
}

/// Whether a transaction block is running on the current task.
pub fn in_transaction() -> bool {
    IN_TRANSACTION.try_with(|_| ()).is_ok()
}

/// Run `block` in a new transaction on a fresh connection from `source`.
///
/// Commits when the block returns `Ok`, rolls back when it returns `Err` or when the commit
/// itself fails. A panic in the block also rolls back, then resumes unwinding once the
/// connection is closed. The caller observes the original failure; a failed rollback is
/// attached to it with [`RepoError::with_suppressed`].
///
/// # Errors
/// [`RepoError::NestedTransaction`] when called from inside another block on the same task,
/// otherwise whatever the block, the commit or the connection acquisition returned.
pub async fn run_in_transaction<S, R, F, Fut>(source: &S, block: F) -> RepoResult<R>
where
    S: DataSource + ?Sized,
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = RepoResult<R>>,
{
    if in_transaction() {
        return Err(RepoError::NestedTransaction);
    }
    IN_TRANSACTION
        .scope((), async move {
            let connection = source.connect().await?;
            let outcome = AssertUnwindSafe(run_bound(connection.clone(), block))
                .catch_unwind()
                .await;
            if let Err(e) = connection.close().await {
                warn!(error = %e, "failed to release connection");
            }
            match outcome {
                Ok(result) => result,
                Err(panic) => panic::resume_unwind(panic),
            }
        })
        .await
}

async fn run_bound<R, F, Fut>(connection: Arc<dyn Connection>, block: F) -> RepoResult<R>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = RepoResult<R>>,
{
    connection.begin().await?;
    let tx = Transaction::bind(connection.clone());
    let _unbind = Unbind(&tx);

    let run = AssertUnwindSafe(async { block(tx.clone()).await });
    let result = match run.catch_unwind().await {
        Ok(Ok(value)) => connection.commit().await.map(|()| value),
        Ok(Err(e)) => Err(e),
        Err(panic) => {
            match connection.rollback().await {
                Ok(()) => warn!("transaction rolled back after a panic in the block"),
                Err(e) => error!(rollback_error = %e, "rollback after panic failed"),
            }
            panic::resume_unwind(panic)
        }
    };
    match result {
        Ok(value) => {
            debug!("transaction committed");
            Ok(value)
        }
        Err(primary) => match connection.rollback().await {
            Ok(()) => {
                warn!(error = %primary, "transaction rolled back");
                Err(primary)
            }
            Err(rollback) => {
                error!(error = %primary, rollback_error = %rollback, "rollback failed");
                Err(primary.with_suppressed(rollback))
            }
        },
    }
}

/// Binds a data source once so call sites only pass the block.
#[derive(Debug, Clone)]
pub struct TransactionTemplate<S> {
    source: S,
}

impl<S: DataSource> TransactionTemplate<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn execute<R, F, Fut>(&self, block: F) -> RepoResult<R>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = RepoResult<R>>,
    {
        run_in_transaction(&self.source, block).await
    }
}
