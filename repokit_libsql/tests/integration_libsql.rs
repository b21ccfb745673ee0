#![cfg(feature = "libsql-backend")]

use std::future::Future;

use repokit::{
    create_repository, create_table, run_in_transaction, Connection, DataSource, Dialect,
    RepoResult, Repository,
};
use repokit_libsql::{LibsqlConfig, LibsqlDataSource};
use tests_common::{init_test_logging, scenarios, PeopleProxy, Person};

/// Run `scenario` against a fresh database file that lives as long as the test.
async fn on_fresh_db<F, Fut>(scenario: F) -> RepoResult<()>
where
    F: FnOnce(LibsqlDataSource) -> Fut,
    Fut: Future<Output = RepoResult<()>>,
{
    init_test_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("repokit.db");
    let source = LibsqlDataSource::open(LibsqlConfig::new(path.to_string_lossy())).await?;
    scenario(source).await
}

#[tokio::test]
async fn save_assigns_generated_id() -> RepoResult<()> {
    on_fresh_db(|s| async move { scenarios::save_assigns_generated_id(&s).await }).await
}

#[tokio::test]
async fn find_by_property() -> RepoResult<()> {
    on_fresh_db(|s| async move { scenarios::find_by_property(&s).await }).await
}

#[tokio::test]
async fn save_then_find_by_id_round_trips() -> RepoResult<()> {
    on_fresh_db(|s| async move { scenarios::save_then_find_by_id_round_trips(&s).await }).await
}

#[tokio::test]
async fn save_existing_replaces_row() -> RepoResult<()> {
    on_fresh_db(|s| async move { scenarios::save_existing_replaces_row(&s).await }).await
}

#[tokio::test]
async fn committed_rows_are_visible() -> RepoResult<()> {
    on_fresh_db(|s| async move { scenarios::committed_rows_are_visible(&s).await }).await
}

#[tokio::test]
async fn failed_save_rolls_back() -> RepoResult<()> {
    on_fresh_db(|s| async move { scenarios::failed_save_rolls_back(&s).await }).await
}

#[tokio::test]
async fn explicit_and_multi_row_finders() -> RepoResult<()> {
    on_fresh_db(|s| async move { scenarios::explicit_and_multi_row_finders(&s).await }).await
}

#[tokio::test]
async fn connections_speak_sqlite() -> RepoResult<()> {
    on_fresh_db(|s| async move {
        let conn = s.connect().await?;
        assert_eq!(conn.dialect(), Dialect::Sqlite);
        assert_eq!(conn.last_generated_key().await?, None);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn generated_keys_increase() -> RepoResult<()> {
    on_fresh_db(|s| async move {
        run_in_transaction(&s, |tx| async move { create_table::<Person>(&tx).await }).await?;
        let people: PeopleProxy = create_repository()?;
        let (a, b) = run_in_transaction(&s, |tx| {
            let people = &people;
            async move {
                let a = people.save(&tx, Person::named("Ada")).await?;
                let b = people.save(&tx, Person::named("Grace")).await?;
                Ok::<_, repokit::RepoError>((a, b))
            }
        })
        .await?;
        assert!(a.id < b.id);
        Ok(())
    })
    .await
}
