use repokit::{resolve, DefinitionError, Entity};

#[derive(Entity, Default)]
#[entity(table = "PEOPLE")]
struct Person {
    #[property(id, column = "PERSON_ID")]
    id: i64,
    #[property(column = "FULL_NAME")]
    name: String,
    #[property(skip)]
    cached_label: Vec<String>,
}

#[derive(Entity, Default)]
struct TwoIds {
    #[property(id)]
    a: i64,
    #[property(id)]
    b: i64,
}

#[derive(Entity, Default)]
struct Blob {
    data: Vec<u8>,
}

fn main() {
    let m = resolve(&Person::descriptor()).unwrap();
    assert_eq!(m.table(), "PEOPLE");
    assert_eq!(m.columns().collect::<Vec<_>>(), ["PERSON_ID", "FULL_NAME"]);
    assert_eq!(m.identity().unwrap().column(), "PERSON_ID");
    let _ = Person::default().cached_label;

    assert!(matches!(
        resolve(&TwoIds::descriptor()),
        Err(DefinitionError::MultipleIdentities { .. })
    ));
    assert!(matches!(
        resolve(&Blob::descriptor()),
        Err(DefinitionError::UnsupportedType { .. })
    ));
}
