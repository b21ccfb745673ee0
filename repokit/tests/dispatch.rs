use repokit::{
    create_repository, create_table, repository, run_in_transaction, DefinitionError, Entity,
    ParamValue, RepoError, RepoResult, Repository, RepositoryContract, Transaction,
    TransactionTemplate,
};
use tests_common::memory::Executed;
use tests_common::{init_test_logging, MemoryDataSource, People, PeopleProxy, Person};

#[repository]
pub trait Nicknames: Repository<Person, i64> {
    async fn find_by_nickname(&self, tx: &Transaction, nickname: String)
        -> RepoResult<Option<Person>>;

    #[query("SELECT * FROM PERSON")]
    async fn find_by_alias(&self, tx: &Transaction) -> RepoResult<Vec<Person>>;
}

#[repository(entity = Person, key = i64)]
pub trait Oddities {
    async fn fetch_everyone(&self, tx: &Transaction) -> RepoResult<Vec<Person>>;

    async fn find_by_name(
        &self,
        tx: &Transaction,
        first: String,
        last: String,
    ) -> RepoResult<Vec<Person>>;
}

/// Keyless entity: only `find_by_id` is meaningless for it.
#[derive(Entity, Debug, Default, Clone, PartialEq)]
pub struct Tag {
    pub label: Option<String>,
}

#[repository]
pub trait Tags: Repository<Tag, String> {}

async fn store_with_people() -> RepoResult<(MemoryDataSource, PeopleProxy)> {
    init_test_logging();
    let source = MemoryDataSource::new();
    run_in_transaction(&source, |tx| async move { create_table::<Person>(&tx).await }).await?;
    Ok((source, create_repository()?))
}

#[tokio::test]
async fn create_table_emits_ddl_and_commits() -> RepoResult<()> {
    let (source, _) = store_with_people().await?;
    assert_eq!(
        source.statements(),
        ["CREATE TABLE PERSON (ID BIGINT AUTO_INCREMENT, NAME VARCHAR(255), PRIMARY KEY (ID));"]
    );
    assert_eq!(source.committed_rows("PERSON"), Some(0));
    // create_table commits itself, then the block commits the follow-up unit.
    assert_eq!(source.commits(), 2);
    assert_eq!(source.rollbacks(), 0);
    assert_eq!(source.closes(), source.connects());
    Ok(())
}

#[tokio::test]
async fn save_and_finders_emit_expected_statements() -> RepoResult<()> {
    let (source, people) = store_with_people().await?;
    run_in_transaction(&source, |tx| {
        let people = &people;
        async move {
            let ada = people.save(&tx, Person::named("Ada")).await?;
            people.find_by_name(&tx, "Ada".to_string()).await?;
            people.find_by_id(&tx, &ada.id.unwrap_or_default()).await?;
            people.find_all(&tx).await
        }
    })
    .await?;

    let executed = source.executed();
    assert_eq!(
        &executed[1..],
        [
            Executed {
                sql: "MERGE INTO PERSON (ID, NAME) VALUES (?, ?)".to_string(),
                params: vec![ParamValue::Null, ParamValue::String("Ada".to_string())],
            },
            Executed {
                sql: "SELECT * FROM PERSON WHERE NAME = ?".to_string(),
                params: vec![ParamValue::String("Ada".to_string())],
            },
            Executed {
                sql: "SELECT * FROM PERSON WHERE ID = ?".to_string(),
                params: vec![ParamValue::I64(1)],
            },
            Executed {
                sql: "SELECT * FROM PERSON".to_string(),
                params: vec![],
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn store_failure_rolls_back_exactly_once() -> RepoResult<()> {
    let (source, people) = store_with_people().await?;
    source.fail_on("MERGE INTO");
    let before = (source.commits(), source.rollbacks());
    let err = run_in_transaction(&source, |tx| {
        let people = &people;
        async move { people.save(&tx, Person::named("Ada")).await }
    })
    .await
    .unwrap_err();
    assert!(err.is_store());
    assert!(err.suppressed().is_none());
    assert_eq!(source.commits(), before.0);
    assert_eq!(source.rollbacks(), before.1 + 1);
    assert_eq!(source.committed_rows("PERSON"), Some(0));
    assert_eq!(source.closes(), source.connects());
    Ok(())
}

#[tokio::test]
async fn failed_commit_rolls_back_and_keeps_failed_rollback_as_suppressed() -> RepoResult<()> {
    let (source, people) = store_with_people().await?;
    source.fail_commit(true);
    source.fail_rollback(true);
    let err = run_in_transaction(&source, |tx| {
        let people = &people;
        async move { people.save(&tx, Person::named("Ada")).await }
    })
    .await
    .unwrap_err();
    assert!(err.is_store());
    assert!(err.primary().to_string().contains("COMMIT"));
    assert!(err
        .suppressed()
        .map_or(false, |s| s.to_string().contains("ROLLBACK")));
    assert_eq!(source.committed_rows("PERSON"), Some(0));
    Ok(())
}

#[tokio::test]
async fn handle_is_unbound_after_the_block() -> RepoResult<()> {
    let (source, people) = store_with_people().await?;
    let leaked = run_in_transaction(&source, |tx| async move { Ok(tx) }).await?;
    assert!(!leaked.is_active());
    let err = people.find_all(&leaked).await.unwrap_err();
    assert!(matches!(err, RepoError::NoActiveTransaction));
    Ok(())
}

#[tokio::test]
async fn nested_blocks_are_rejected() -> RepoResult<()> {
    let (source, _) = store_with_people().await?;
    let inner = run_in_transaction(&source, |_tx| {
        let source = &source;
        async move {
            Ok(run_in_transaction(source, |_inner| async move { Ok(()) })
                .await
                .unwrap_err())
        }
    })
    .await?;
    assert!(matches!(inner, RepoError::NestedTransaction));
    Ok(())
}

#[tokio::test]
async fn unknown_property_fails_on_every_call() -> RepoResult<()> {
    let (source, _) = store_with_people().await?;
    let nicknames: NicknamesProxy = create_repository()?;
    let before = source.statements().len();
    for _ in 0..2 {
        let err = run_in_transaction(&source, |tx| {
            let nicknames = &nicknames;
            async move { nicknames.find_by_nickname(&tx, "Ada".to_string()).await }
        })
        .await
        .unwrap_err();
        match err {
            RepoError::UnknownProperty {
                contract,
                method,
                property,
            } => {
                assert_eq!(contract, "Nicknames");
                assert_eq!(method, "find_by_nickname");
                assert_eq!(property, "nickname");
            }
            other => panic!("expected UnknownProperty, got {other}"),
        }
    }
    assert_eq!(source.statements().len(), before);
    Ok(())
}

#[tokio::test]
async fn explicit_query_wins_over_naming() -> RepoResult<()> {
    let (source, people) = store_with_people().await?;
    let nicknames: NicknamesProxy = create_repository()?;
    let all = run_in_transaction(&source, |tx| {
        let (people, nicknames) = (&people, &nicknames);
        async move {
            people.save(&tx, Person::named("Ada")).await?;
            nicknames.find_by_alias(&tx).await
        }
    })
    .await?;
    assert_eq!(all.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unrecognized_methods_are_unsupported() -> RepoResult<()> {
    let (source, _) = store_with_people().await?;
    let odd: OdditiesProxy = create_repository()?;
    let (everyone, by_two) = run_in_transaction(&source, |tx| {
        let odd = &odd;
        async move {
            Ok::<_, RepoError>((
                odd.fetch_everyone(&tx).await.unwrap_err(),
                odd.find_by_name(&tx, "Ada".into(), "Lovelace".into())
                    .await
                    .unwrap_err(),
            ))
        }
    })
    .await?;
    assert!(matches!(
        everyone,
        RepoError::UnsupportedRepositoryMethod { ref method, .. } if method == "fetch_everyone"
    ));
    assert!(matches!(
        by_two,
        RepoError::UnsupportedRepositoryMethod { ref reason, .. } if reason.contains("argument")
    ));
    assert!(odd.dispatcher().shape("delete_everything").is_err());
    Ok(())
}

#[tokio::test]
async fn find_by_id_needs_an_identity() -> RepoResult<()> {
    init_test_logging();
    let source = MemoryDataSource::new();
    let tags: TagsProxy = create_repository()?;
    let err = run_in_transaction(&source, |tx| {
        let tags = &tags;
        async move {
            create_table::<Tag>(&tx).await?;
            tags.save(&tx, Tag { label: Some("rust".into()) }).await?;
            tags.find_by_id(&tx, &"rust".to_string()).await
        }
    })
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Definition(DefinitionError::MissingIdentity { ref entity }) if entity == "Tag"
    ));
    Ok(())
}

#[tokio::test]
async fn template_binds_the_source() -> RepoResult<()> {
    let (source, people) = store_with_people().await?;
    let template = TransactionTemplate::new(source.clone());
    let saved = template
        .execute(|tx| {
            let people = &people;
            async move { people.save(&tx, Person::named("Ada")).await }
        })
        .await?;
    assert_eq!(saved.id, Some(1));
    assert_eq!(source.committed_rows("PERSON"), Some(1));
    Ok(())
}
