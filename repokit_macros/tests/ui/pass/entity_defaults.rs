use repokit::{resolve, Entity, ParamValue};

#[derive(Entity, Debug, Default, PartialEq)]
struct Article {
    #[property(id, generated)]
    id: Option<i64>,
    title: String,
    views: i32,
    subtitle: Option<String>,
}

fn main() {
    let m = resolve(&Article::descriptor()).unwrap();
    assert_eq!(m.table(), "ARTICLE");
    assert_eq!(
        m.columns().collect::<Vec<_>>(),
        ["ID", "TITLE", "VIEWS", "SUBTITLE"]
    );
    assert!(m.has_generated_identity());
    assert!(!m.property("views").unwrap().is_nullable());
    assert!(m.property("subtitle").unwrap().is_nullable());

    let mut a = Article::default();
    a.set_property("title", ParamValue::String("t".into())).unwrap();
    a.set_property("id", ParamValue::I64(5)).unwrap();
    assert_eq!(a.get_property("id"), Some(ParamValue::I64(5)));
    assert_eq!(a.get_property("subtitle"), Some(ParamValue::Null));
    assert_eq!(a.get_property("missing"), None);
    assert!(a.set_property("views", ParamValue::String("x".into())).is_err());
}
