use repokit::{repository, Entity, MethodDescriptor, RepoResult, Repository, RepositoryContract, Transaction};

#[derive(Entity, Debug, Default, Clone, PartialEq)]
struct Person {
    #[property(id, generated)]
    id: Option<i64>,
    name: String,
}

#[repository]
trait People: Repository<Person, i64> {
    async fn find_by_name(&self, tx: &Transaction, name: String) -> RepoResult<Option<Person>>;

    #[query("SELECT * FROM PERSON WHERE NAME LIKE ?")]
    async fn search(&self, tx: &Transaction, pattern: String) -> RepoResult<Vec<Person>>;
}

fn main() {
    assert_eq!(<PeopleProxy as RepositoryContract>::NAME, "People");
    assert_eq!(
        PeopleProxy::methods(),
        vec![
            MethodDescriptor::new("find_by_name", 1),
            MethodDescriptor::with_query("search", "SELECT * FROM PERSON WHERE NAME LIKE ?", 1),
        ]
    );
    let people: PeopleProxy = repokit::create_repository().unwrap();
    let _: &dyn People = &people;
}
