// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use rstest::rstest;

use super::*;
use crate::document::{Origin, pointer};

fn doc(source: &str, yaml: &str) -> MergedDocument {
    let tree: Value = serde_yaml::from_str(yaml).unwrap();
    MergedDocument::new(
        tree,
        Origin {
            source: source.to_string(),
            working_dir: PathBuf::from(format!("/{source}")),
        },
    )
}

fn yaml(content: &str) -> Value {
    serde_yaml::from_str(content).unwrap()
}

fn merged(base: &str, overlay: &str) -> Value {
    merge(doc("base", base), &doc("overlay", overlay)).into_tree()
}

#[rstest]
fn test_scalars_override() {
    let result = merged(
        "services:\n  web:\n    image: nginx\n    restart: always\n",
        "services:\n  web:\n    image: nginx:1.25\n",
    );
    assert_eq!(
        result,
        yaml("services:\n  web:\n    image: nginx:1.25\n    restart: always\n")
    );
}

#[rstest]
fn test_unknown_lists_replace() {
    let result = merged(
        "services:\n  web:\n    command: [a, b]\n",
        "services:\n  web:\n    command: [c]\n",
    );
    assert_eq!(result["services"]["web"]["command"], yaml("[c]"));
}

#[rstest]
fn test_new_resources_append() {
    let result = merged(
        "services:\n  web:\n    image: nginx\n",
        "services:\n  db:\n    image: postgres\nvolumes:\n  data: {}\n",
    );
    let names: Vec<_> = result["services"]
        .as_mapping()
        .unwrap()
        .keys()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(names, vec!["web", "db"]);
    assert!(result["volumes"]["data"].is_mapping());
}

#[rstest]
#[case::cap_add("cap_add")]
#[case::dns("dns")]
#[case::profiles("profiles")]
#[case::security_opt("security_opt")]
#[case::env_file("env_file")]
fn test_union_fields(#[case] field: &str) {
    let result = merged(
        &format!("services:\n  web:\n    {field}: [a, b]\n"),
        &format!("services:\n  web:\n    {field}: [b, c]\n"),
    );
    assert_eq!(result["services"]["web"][field], yaml("[a, b, c]"));
}

#[rstest]
fn test_environment_list_and_map() {
    let result = merged(
        "services:\n  web:\n    environment:\n      - A=1\n      - B=2\n",
        "services:\n  web:\n    environment:\n      B: three\n      C: \"4\"\n",
    );
    assert_eq!(
        result["services"]["web"]["environment"],
        yaml("{A: \"1\", B: three, C: \"4\"}")
    );
}

#[rstest]
fn test_extra_hosts_separators() {
    let result = merged(
        "services:\n  web:\n    extra_hosts:\n      - \"db=10.0.0.1\"\n",
        "services:\n  web:\n    extra_hosts:\n      - \"db:10.0.0.2\"\n      - \"cache:10.0.0.3\"\n",
    );
    assert_eq!(
        result["services"]["web"]["extra_hosts"],
        yaml("{db: 10.0.0.2, cache: 10.0.0.3}")
    );
}

#[rstest]
fn test_ports_by_key() {
    let result = merged(
        "services:\n  web:\n    ports:\n      - published: \"8080\"\n        target: 80\n      - \"9000:9000\"\n",
        "services:\n  web:\n    ports:\n      - published: \"8080\"\n        target: 80\n        host_ip: \"\"\n        mode: host\n      - \"9001:9001\"\n",
    );
    let ports = result["services"]["web"]["ports"].as_sequence().unwrap();
    assert_eq!(ports.len(), 3);
    assert_eq!(ports[0]["mode"], Value::from("host"));
    assert_eq!(ports[1], Value::from("9000:9000"));
    assert_eq!(ports[2], Value::from("9001:9001"));
}

#[rstest]
#[case::short_and_long("- \"8080:80\"", "- published: \"8080\"\n        target: 80\n        mode: host")]
#[case::default_protocol("- \"8080:80\"", "- \"8080:80/tcp\"")]
#[case::host_ip("- \"127.0.0.1:8080:80\"", "- host_ip: 127.0.0.1\n        published: 8080\n        target: 80")]
fn test_ports_match_across_syntaxes(#[case] base: &str, #[case] overlay: &str) {
    let result = merged(
        &format!("services:\n  web:\n    ports:\n      {base}\n"),
        &format!("services:\n  web:\n    ports:\n      {overlay}\n"),
    );
    let ports = result["services"]["web"]["ports"].as_sequence().unwrap();
    assert_eq!(ports.len(), 1, "ports were not matched: {ports:?}");
}

#[rstest]
fn test_ports_with_other_protocol_are_distinct() {
    let result = merged(
        "services:\n  web:\n    ports: [\"53:53\"]\n",
        "services:\n  web:\n    ports: [\"53:53/udp\"]\n",
    );
    assert_eq!(result["services"]["web"]["ports"], yaml("[\"53:53\", \"53:53/udp\"]"));
}

#[rstest]
fn test_empty_overlay_keeps_base() {
    let result = merged("services:\n  web:\n    image: nginx\n", "services:\n");
    assert_eq!(result, yaml("services:\n  web:\n    image: nginx\n"));

    let result = merged(
        "services:\n  web:\n    image: nginx\n    ports: [\"80:80\"]\n",
        "services:\n  web:\n    image:\n    ports:\n",
    );
    assert_eq!(result["services"]["web"]["image"], Value::from("nginx"));
    assert_eq!(result["services"]["web"]["ports"], yaml("[\"80:80\"]"));
}

#[rstest]
fn test_volumes_by_target() {
    let result = merged(
        "services:\n  web:\n    volumes:\n      - ./data:/data\n      - ./logs:/logs\n",
        "services:\n  web:\n    volumes:\n      - ./other:/data:ro\n",
    );
    assert_eq!(
        result["services"]["web"]["volumes"],
        yaml("[\"./other:/data:ro\", \"./logs:/logs\"]")
    );
}

#[rstest]
fn test_secrets_by_source() {
    let result = merged(
        "services:\n  web:\n    secrets:\n      - token\n",
        "services:\n  web:\n    secrets:\n      - source: token\n        target: /run/token\n      - other\n",
    );
    assert_eq!(
        result["services"]["web"]["secrets"],
        yaml("[{source: token, target: /run/token}, other]")
    );
}

#[rstest]
fn test_depends_on_mixed_forms() {
    let result = merged(
        "services:\n  web:\n    depends_on:\n      db:\n        condition: service_healthy\n",
        "services:\n  web:\n    depends_on:\n      - db\n      - cache\n",
    );
    assert_eq!(
        result["services"]["web"]["depends_on"],
        yaml("{db: {condition: service_healthy}, cache: {condition: service_started}}")
    );
}

#[rstest]
fn test_depends_on_lists_union() {
    let result = merged(
        "services:\n  web:\n    depends_on: [db]\n",
        "services:\n  web:\n    depends_on: [cache, db]\n",
    );
    assert_eq!(result["services"]["web"]["depends_on"], yaml("[db, cache]"));
}

#[rstest]
fn test_networks_mixed_forms() {
    let result = merged(
        "services:\n  web:\n    networks: [front]\n",
        "services:\n  web:\n    networks:\n      back:\n        aliases: [api]\n",
    );
    assert_eq!(
        result["services"]["web"]["networks"],
        yaml("{front: null, back: {aliases: [api]}}")
    );
}

#[rstest]
fn test_provenance_follows_overlay() {
    let result = merge(
        doc("base", "services:\n  web:\n    image: nginx\n    build: ./web\n"),
        &doc("overlay", "services:\n  web:\n    image: nginx:1.25\n"),
    );
    let image = result
        .origin_of(&pointer(["services", "web", "image"]))
        .unwrap();
    assert_eq!(image.source, "overlay");
    let build = result
        .origin_of(&pointer(["services", "web", "build"]))
        .unwrap();
    assert_eq!(build.source, "base");
}

#[rstest]
fn test_provenance_of_appended_union_entries() {
    let result = merge(
        doc("base", "services:\n  web:\n    env_file: [a.env]\n"),
        &doc("overlay", "services:\n  web:\n    env_file: [b.env]\n"),
    );
    let first = pointer(["services", "web", "env_file"]);
    let mut second = first.clone();
    second.push(Segment::Index(1));
    let mut zeroth = first;
    zeroth.push(Segment::Index(0));

    assert_eq!(result.origin_of(&zeroth).unwrap().source, "base");
    assert_eq!(result.origin_of(&second).unwrap().source, "overlay");
}

#[rstest]
fn test_merge_is_associative() {
    let a = doc(
        "a",
        "services:\n  web:\n    image: a\n    environment: [X=1]\n    ports: [\"80:80\"]\n",
    );
    let b = doc(
        "b",
        "services:\n  web:\n    environment: {Y: \"2\"}\n    ports: [\"443:443\"]\n  db:\n    image: b\n",
    );
    let c = doc(
        "c",
        "services:\n  web:\n    image: c\n    environment: [X=3]\n  db:\n    command: [run]\n",
    );

    let left = merge(merge(a.clone(), &b), &c);
    let right = merge(a, &merge(b, &c));

    assert_eq!(left.tree(), right.tree());
    for field in ["image", "environment"] {
        let ptr = pointer(["services", "web", field]);
        assert_eq!(
            left.origin_of(&ptr).map(|o| &o.source),
            right.origin_of(&ptr).map(|o| &o.source)
        );
    }
}

#[rstest]
fn test_merge_all_folds_left_to_right() {
    let result = merge_all(vec![
        doc("a", "services:\n  web:\n    image: a\n"),
        doc("b", "services:\n  web:\n    image: b\n"),
        doc("c", "services:\n  web:\n    image: c\n"),
    ]);
    assert_eq!(result.tree()["services"]["web"]["image"], Value::from("c"));
    assert_eq!(
        result
            .origin_of(&pointer(["services", "web", "image"]))
            .unwrap()
            .source,
        "c"
    );
}

#[rstest]
#[case(pointer(["services", "web", "ports"]), true)]
#[case(pointer(["services", "web", "image"]), false)]
#[case(pointer(["services", "web"]), false)]
#[case(vec![Segment::Key("services".into()), Segment::Index(0), Segment::Key("ports".into())], false)]
fn test_strategy_lookup(#[case] ptr: Pointer, #[case] listed: bool) {
    assert_eq!(strategy_for(&ptr).is_some(), listed);
}

#[rstest]
fn test_pairs_to_mapping() {
    let value = yaml("[A=1, B, \"C=x=y\"]");
    assert_eq!(
        pairs_to_mapping(&value, &['=']),
        yaml("{A: \"1\", B: null, C: \"x=y\"}")
    );
}
