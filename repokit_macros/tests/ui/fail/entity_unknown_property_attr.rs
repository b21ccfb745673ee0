use repokit::Entity;

#[derive(Entity, Default)]
struct Person {
    #[property(primary)]
    id: i64,
}

fn main() {}
