use repokit::{repository, Entity, RepoResult, RepositoryContract, Transaction};

#[derive(Entity, Debug, Default)]
#[entity(table = "COUNTRIES")]
struct Country {
    #[property(id)]
    code: String,
    name: String,
}

#[repository(entity = Country, key = String)]
trait Countries {
    async fn find_by_name(&self, tx: &Transaction, name: String) -> RepoResult<Vec<Country>>;

    async fn save(&self, tx: &Transaction, country: Country) -> RepoResult<Country>;
}

fn main() {
    assert_eq!(CountriesProxy::methods().len(), 2);
    let repo: CountriesProxy = repokit::create_repository().unwrap();
    assert_eq!(repo.dispatcher().metadata().table(), "COUNTRIES");
}
