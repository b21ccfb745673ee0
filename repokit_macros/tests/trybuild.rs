#[test]
fn ui_pass() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/pass/entity_defaults.rs");
    t.pass("tests/ui/pass/entity_overrides.rs");
    t.pass("tests/ui/pass/entity_qualified_types.rs");
    t.pass("tests/ui/pass/repository_supertrait.rs");
    t.pass("tests/ui/pass/repository_explicit_entity.rs");
}

#[test]
#[ignore = "expected stderr is regenerated with TRYBUILD=overwrite after compiler upgrades"]
fn ui_compile_fail() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/ui/fail/entity_unknown_property_attr.rs");
    t.compile_fail("tests/ui/fail/entity_tuple_struct.rs");
    t.compile_fail("tests/ui/fail/repository_missing_entity.rs");
    t.compile_fail("tests/ui/fail/repository_untyped_return.rs");
}
