use repokit::{resolve, Entity, StorageType};

#[derive(Entity, Default)]
struct Measurement {
    #[property(id, generated)]
    id: Option<::core::primitive::i64>,
    label: std::string::String,
    value: Option<core::primitive::f64>,
    valid: ::std::primitive::bool,
}

fn main() {
    let m = resolve(&Measurement::descriptor()).unwrap();
    let storage: Vec<StorageType> = m.properties().iter().map(|p| p.storage()).collect();
    assert_eq!(
        storage,
        [
            StorageType::I64,
            StorageType::Text,
            StorageType::F64,
            StorageType::Bool
        ]
    );
}
