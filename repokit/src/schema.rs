//! Table creation from entity metadata.

use repokit_core::{metadata, Entity, RepoResult, Transaction};
use repokit_sql_builder::create_table_statement;
use tracing::info;

/// Create the table for `E` on the transaction's connection, then commit.
///
/// The transaction stays open: later work in the same block runs in a new unit.
///
/// # Errors
/// A [`repokit_core::DefinitionError`] for invalid metadata, [`repokit_core::RepoError::NoActiveTransaction`]
/// for a handle whose block has ended, or the store's failure.
pub async fn create_table<E: Entity>(tx: &Transaction) -> RepoResult<()> {
    let metadata = metadata::<E>()?;
    let ddl = create_table_statement(&metadata, tx.dialect()?);
    tx.execute(&ddl, Vec::new()).await?;
    tx.commit().await?;
    info!(table = metadata.table(), "created table");
    Ok(())
}
