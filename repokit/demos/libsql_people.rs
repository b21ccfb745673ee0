// Run with:
//   cargo run -p repokit --features libsql-backend --example libsql_people
// The database path comes from REPOKIT_DATABASE_URL (default: repokit.db); set RUST_LOG=debug
// to see every dispatched statement.

use repokit::backends::LibsqlDataSource;
use repokit::{
    create_repository, create_table, repository, run_in_transaction, Entity, RepoError,
    RepoResult, Repository, Transaction,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
#[entity(table = "PEOPLE")]
pub struct Person {
    #[property(id, generated)]
    pub id: Option<i64>,
    pub name: String,
    pub age: Option<i32>,
}

#[repository]
pub trait People: Repository<Person, i64> {
    async fn find_by_name(&self, tx: &Transaction, name: String) -> RepoResult<Option<Person>>;

    #[query("SELECT * FROM PEOPLE WHERE AGE IS NOT NULL")]
    async fn with_known_age(&self, tx: &Transaction) -> RepoResult<Vec<Person>>;
}

#[tokio::main]
async fn main() -> RepoResult<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let source = LibsqlDataSource::from_env().await?;
    let people: PeopleProxy = create_repository()?;

    // A second run finds the table in place; only the first one creates it.
    if let Err(e) =
        run_in_transaction(&source, |tx| async move { create_table::<Person>(&tx).await }).await
    {
        println!("skipping table creation: {e}");
    }

    let (ada, grace) = run_in_transaction(&source, |tx| {
        let people = &people;
        async move {
            let ada = people
                .save(
                    &tx,
                    Person {
                        id: None,
                        name: "Ada".into(),
                        age: Some(36),
                    },
                )
                .await?;
            let grace = people
                .save(
                    &tx,
                    Person {
                        id: None,
                        name: "Grace".into(),
                        age: None,
                    },
                )
                .await?;
            Ok::<_, RepoError>((ada, grace))
        }
    })
    .await?;
    println!("saved {ada:?} and {grace:?}");

    run_in_transaction(&source, |tx| {
        let people = &people;
        async move {
            println!("by name: {:?}", people.find_by_name(&tx, "Grace".into()).await?);
            println!("by id:   {:?}", people.find_by_id(&tx, &ada.id.unwrap_or_default()).await?);
            println!("aged:    {:?}", people.with_known_age(&tx).await?);
            println!("total:   {}", people.find_all(&tx).await?.len());
            Ok(())
        }
    })
    .await
}
