//! Backend-agnostic scenarios. Each one expects a fresh, empty store.

use repokit::{
    create_repository, create_table, run_in_transaction, DataSource, RepoError, RepoResult,
    Repository,
};

use crate::{Ghost, GhostsProxy, People, PeopleByName, PeopleByNameProxy, PeopleProxy, Person};

async fn setup<S: DataSource + ?Sized>(source: &S) -> RepoResult<PeopleProxy> {
    run_in_transaction(source, |tx| async move { create_table::<Person>(&tx).await }).await?;
    create_repository()
}

/// Saving an entity with a generated identity assigns the store's key to the returned entity.
pub async fn save_assigns_generated_id<S: DataSource + ?Sized>(source: &S) -> RepoResult<()> {
    let people = setup(source).await?;
    let saved = run_in_transaction(source, |tx| {
        let people = &people;
        async move { people.save(&tx, Person::named("Ada")).await }
    })
    .await?;
    assert!(saved.id.is_some());
    assert_eq!(saved.name.as_deref(), Some("Ada"));

    let all = run_in_transaction(source, |tx| {
        let people = &people;
        async move { people.find_all(&tx).await }
    })
    .await?;
    assert_eq!(all, vec![saved]);
    Ok(())
}

/// `find_by_name` returns exactly the saved entity, and nothing for an unknown name.
pub async fn find_by_property<S: DataSource + ?Sized>(source: &S) -> RepoResult<()> {
    let people = setup(source).await?;
    let (saved, found, missing) = run_in_transaction(source, |tx| {
        let people = &people;
        async move {
            let saved = people.save(&tx, Person::named("Ada")).await?;
            people.save(&tx, Person::named("Grace")).await?;
            let found = people.find_by_name(&tx, "Ada".to_string()).await?;
            let missing = people.find_by_name(&tx, "Linus".to_string()).await?;
            Ok::<_, RepoError>((saved, found, missing))
        }
    })
    .await?;
    assert_eq!(found, Some(saved));
    assert_eq!(missing, None);
    Ok(())
}

/// `find_by_id` with the written-back key returns a value equal to the saved entity.
pub async fn save_then_find_by_id_round_trips<S: DataSource + ?Sized>(
    source: &S,
) -> RepoResult<()> {
    let people = setup(source).await?;
    let saved = run_in_transaction(source, |tx| {
        let people = &people;
        async move { people.save(&tx, Person::named("Ada")).await }
    })
    .await?;
    let id = saved.id.unwrap_or_default();
    let (found, absent) = run_in_transaction(source, |tx| {
        let people = &people;
        async move {
            Ok::<_, RepoError>((
                people.find_by_id(&tx, &id).await?,
                people.find_by_id(&tx, &(id + 1000)).await?,
            ))
        }
    })
    .await?;
    assert_eq!(found, Some(saved));
    assert_eq!(absent, None);
    Ok(())
}

/// Saving an entity that already has its key replaces the row instead of adding one.
pub async fn save_existing_replaces_row<S: DataSource + ?Sized>(source: &S) -> RepoResult<()> {
    let people = setup(source).await?;
    let all = run_in_transaction(source, |tx| {
        let people = &people;
        async move {
            let mut ada = people.save(&tx, Person::named("Ada")).await?;
            ada.name = Some("Ada Lovelace".to_string());
            people.save(&tx, ada).await?;
            people.find_all(&tx).await
        }
    })
    .await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name.as_deref(), Some("Ada Lovelace"));
    Ok(())
}

/// A committed save in one transaction is visible to the next one.
pub async fn committed_rows_are_visible<S: DataSource + ?Sized>(source: &S) -> RepoResult<()> {
    let people = setup(source).await?;
    run_in_transaction(source, |tx| {
        let people = &people;
        async move { people.save(&tx, Person::named("Ada")).await }
    })
    .await?;
    let all = run_in_transaction(source, |tx| {
        let people = &people;
        async move { people.find_all(&tx).await }
    })
    .await?;
    assert_eq!(all.len(), 1);
    Ok(())
}

/// A store failure inside a block rolls back everything the block did; the caller sees the
/// store failure itself.
pub async fn failed_save_rolls_back<S: DataSource + ?Sized>(source: &S) -> RepoResult<()> {
    let people = setup(source).await?;
    let ghosts: GhostsProxy = create_repository()?;
    let outcome = run_in_transaction(source, |tx| {
        let (people, ghosts) = (&people, &ghosts);
        async move {
            people.save(&tx, Person::named("Ada")).await?;
            ghosts.save(&tx, Ghost::default()).await
        }
    })
    .await;
    match outcome {
        Err(e) => assert!(e.is_store(), "expected a store failure, got {e}"),
        Ok(_) => panic!("saving into a missing table must fail"),
    }

    let all = run_in_transaction(source, |tx| {
        let people = &people;
        async move { people.find_all(&tx).await }
    })
    .await?;
    assert!(all.is_empty());
    Ok(())
}

/// Explicit queries and the camel-case, all-matches finder.
pub async fn explicit_and_multi_row_finders<S: DataSource + ?Sized>(
    source: &S,
) -> RepoResult<()> {
    let people = setup(source).await?;
    let by_name: PeopleByNameProxy = create_repository()?;
    let (named, matches, first) = run_in_transaction(source, |tx| {
        let (people, by_name) = (&people, &by_name);
        async move {
            people.save(&tx, Person::named("Ada")).await?;
            people.save(&tx, Person::named("Ada")).await?;
            people.save(&tx, Person::named("Grace")).await?;
            Ok::<_, RepoError>((
                people.named(&tx, "Grace".to_string()).await?,
                by_name.findByName(&tx, "Ada".to_string()).await?,
                people.find_by_name(&tx, "Ada".to_string()).await?,
            ))
        }
    })
    .await?;
    assert_eq!(named.len(), 1);
    assert_eq!(matches.len(), 2);
    assert_eq!(first.map(|p| p.name), Some(Some("Ada".to_string())));
    Ok(())
}
