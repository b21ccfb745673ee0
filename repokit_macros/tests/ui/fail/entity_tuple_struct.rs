use repokit::Entity;

#[derive(Entity, Default)]
struct Pair(i64, String);

fn main() {}
