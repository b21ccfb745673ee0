use repokit::{repository, RepoResult, Transaction};

#[repository]
trait Orphans {
    async fn find_all(&self, tx: &Transaction) -> RepoResult<Vec<i64>>;
}

fn main() {}
