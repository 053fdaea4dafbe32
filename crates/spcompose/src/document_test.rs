// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn origin(source: &str) -> Origin {
    Origin {
        source: source.to_string(),
        working_dir: PathBuf::from(format!("/{source}")),
    }
}

#[rstest]
fn test_parse_empty_is_mapping() {
    let tree = parse("", "empty").unwrap();
    assert_eq!(tree, Value::Mapping(Mapping::new()));
}

#[rstest]
#[case("- a\n- b\n")]
#[case("just a string")]
fn test_parse_rejects_non_mapping(#[case] content: &str) {
    let err = parse(content, "bad").unwrap_err();
    assert!(matches!(err, crate::Error::ValidationFailed(_)));
}

#[rstest]
fn test_parse_invalid_yaml() {
    let err = parse("services: [unclosed", "broken.yaml").unwrap_err();
    match err {
        crate::Error::InvalidYaml { origin, .. } => assert_eq!(origin, "broken.yaml"),
        other => panic!("Expected InvalidYaml, got {other:?}"),
    }
}

#[rstest]
fn test_parse_preserves_order() {
    let tree = parse("services:\n  zeta: {}\n  alpha: {}\n", "order").unwrap();
    let names: Vec<_> = tree["services"]
        .as_mapping()
        .unwrap()
        .keys()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
}

#[rstest]
fn test_fragment_load_defaults_working_dir() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("compose.yaml");
    std::fs::write(&path, "services:\n  web:\n    image: nginx\n").unwrap();

    let fragment = Fragment::load(&path, None).expect("Should load fragment");
    let canonical = dunce::canonicalize(&path).unwrap();
    assert_eq!(fragment.path.as_deref(), Some(canonical.as_path()));
    assert_eq!(fragment.working_dir, canonical.parent().unwrap());
    assert_eq!(fragment.source, canonical.display().to_string());
}

#[rstest]
fn test_fragment_load_missing() {
    let tmp = TempDir::new().unwrap();
    let err = Fragment::load(tmp.path().join("nope.yaml"), None).unwrap_err();
    assert!(matches!(err, crate::Error::ReadFailed { .. }));
}

#[rstest]
fn test_origin_falls_back_to_ancestor() {
    let tree = parse("services:\n  web:\n    image: nginx\n", "a").unwrap();
    let mut doc = MergedDocument::new(tree, origin("a"));
    let other = MergedDocument::new(Value::Null, origin("b"));
    let b = doc.import_origins(&other)[0];
    doc.record(&pointer(["services", "web", "image"]), b);

    let image = doc.origin_of(&pointer(["services", "web", "image"])).unwrap();
    assert_eq!(image.source, "b");
    let web = doc.origin_of(&pointer(["services", "web"])).unwrap();
    assert_eq!(web.source, "a");
    let unknown = doc.origin_of(&pointer(["services", "web", "ports"])).unwrap();
    assert_eq!(unknown.source, "a");
}

#[rstest]
fn test_remove_key_clears_provenance() {
    let tree = parse("include:\n  - other.yaml\nservices: {}\n", "a").unwrap();
    let mut doc = MergedDocument::new(tree, origin("a"));
    doc.record(&pointer(["include"]), 0);

    let removed = doc.remove_key(INCLUDE_KEY);
    assert!(removed.is_some());
    assert!(doc.get(&pointer(["include"])).is_none());
    assert!(doc.remove_key(INCLUDE_KEY).is_none());
}

#[rstest]
fn test_graft_carries_provenance() {
    let base = parse("services:\n  web:\n    image: nginx\n", "base").unwrap();
    let other = parse("services:\n  db:\n    image: postgres\n", "other").unwrap();
    let mut doc = MergedDocument::new(base, origin("base"));
    let other = MergedDocument::new(other, origin("other"));

    doc.graft("services", &Value::from("db"), &other);

    assert_eq!(
        doc.get(&pointer(["services", "db", "image"])),
        Some(&Value::from("postgres"))
    );
    let db = doc.origin_of(&pointer(["services", "db", "image"])).unwrap();
    assert_eq!(db.source, "other");
    let web = doc.origin_of(&pointer(["services", "web", "image"])).unwrap();
    assert_eq!(web.source, "base");
}

#[rstest]
fn test_graft_creates_missing_section() {
    let mut doc = MergedDocument::new(parse("", "base").unwrap(), origin("base"));
    let other = MergedDocument::new(
        parse("volumes:\n  data: {}\n", "other").unwrap(),
        origin("other"),
    );

    doc.graft("volumes", &Value::from("data"), &other);

    assert!(doc.section("volumes").unwrap().contains_key("data"));
    assert_eq!(doc.origins().len(), 2);
}

#[rstest]
fn test_import_origins_dedupes() {
    let mut doc = MergedDocument::new(Value::Null, origin("a"));
    let other = MergedDocument::new(Value::Null, origin("a"));
    assert_eq!(doc.import_origins(&other), vec![0]);
    assert_eq!(doc.origins().len(), 1);
}
