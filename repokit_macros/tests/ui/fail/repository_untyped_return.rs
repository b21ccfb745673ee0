use repokit::{repository, Entity, Repository, Transaction};

#[derive(Entity, Default)]
struct Person {
    #[property(id)]
    id: i64,
}

#[repository]
trait People: Repository<Person, i64> {
    async fn find_by_id_twice(&self, tx: &Transaction, id: i64);
}

fn main() {}
