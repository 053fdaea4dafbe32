// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use rstest::rstest;
use serde_yaml::Value;

use super::*;
use crate::document::Origin;

fn doc(source: &str, yaml: &str) -> MergedDocument {
    MergedDocument::new(
        serde_yaml::from_str(yaml).unwrap(),
        Origin {
            source: source.to_string(),
            working_dir: PathBuf::from("/"),
        },
    )
}

#[rstest]
fn test_tag_resources() {
    let document = doc(
        "a.yaml",
        "services:\n  web: {}\nvolumes:\n  data:\nx-other: {}\n",
    );
    let sources = tag_resources(&document, "a.yaml");

    assert_eq!(sources.len(), 2);
    assert_eq!(
        sources.get(&ResourceKey::new(Section::Services, "web")).map(String::as_str),
        Some("a.yaml")
    );
    assert!(sources.contains_key(&ResourceKey::new(Section::Volumes, "data")));
}

#[rstest]
fn test_fold_inserts_new_resources() {
    let mut accumulator = doc("main.yaml", "services:\n  foo:\n    image: foo\n");
    let mut accumulator_sources = tag_resources(&accumulator, "main.yaml");
    let incoming = doc("lib.yaml", "services:\n  bar:\n    image: bar\n");
    let incoming_sources = tag_resources(&incoming, "lib.yaml");

    fold(
        &mut accumulator,
        &mut accumulator_sources,
        &incoming,
        &incoming_sources,
    )
    .unwrap();

    let services = accumulator.section("services").unwrap();
    let names: Vec<_> = services.keys().filter_map(Value::as_str).collect();
    assert_eq!(names, vec!["foo", "bar"]);
    assert_eq!(
        accumulator_sources
            .get(&ResourceKey::new(Section::Services, "bar"))
            .map(String::as_str),
        Some("lib.yaml")
    );
    let origin = accumulator
        .origin_of(&pointer(["services", "bar", "image"]))
        .unwrap();
    assert_eq!(origin.source, "lib.yaml");
}

#[rstest]
fn test_fold_conflict_from_distinct_sources() {
    let mut accumulator = doc("main.yaml", "services:\n  bar:\n    image: mine\n");
    let mut accumulator_sources = tag_resources(&accumulator, "main.yaml");
    let incoming = doc("lib.yaml", "services:\n  bar:\n    image: theirs\n");
    let incoming_sources = tag_resources(&incoming, "lib.yaml");

    let err = fold(
        &mut accumulator,
        &mut accumulator_sources,
        &incoming,
        &incoming_sources,
    )
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "services.bar conflicts with imported resource"
    );
    assert_eq!(
        accumulator.section("services").unwrap()["bar"]["image"],
        Value::from("mine")
    );
}

#[rstest]
fn test_fold_same_source_overwrites() {
    let mut accumulator = doc("lib.yaml", "networks:\n  shared: {}\n");
    let mut accumulator_sources = tag_resources(&accumulator, "lib.yaml");
    let incoming = doc("lib.yaml", "networks:\n  shared:\n    driver: bridge\n");
    let incoming_sources = tag_resources(&incoming, "lib.yaml");

    fold(
        &mut accumulator,
        &mut accumulator_sources,
        &incoming,
        &incoming_sources,
    )
    .unwrap();

    assert_eq!(
        accumulator.section("networks").unwrap()["shared"]["driver"],
        Value::from("bridge")
    );
}

#[rstest]
fn test_fold_conflict_in_any_section() {
    let mut accumulator = doc("main.yaml", "secrets:\n  token:\n    file: ./a\n");
    let mut accumulator_sources = tag_resources(&accumulator, "main.yaml");
    let incoming = doc("lib.yaml", "secrets:\n  token:\n    file: ./b\n");
    let incoming_sources = tag_resources(&incoming, "lib.yaml");

    let err = fold(
        &mut accumulator,
        &mut accumulator_sources,
        &incoming,
        &incoming_sources,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Conflict { ref section, ref name } if section == "secrets" && name == "token"
    ));
}
