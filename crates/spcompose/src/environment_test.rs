// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn env(pairs: &[(&str, &str)]) -> Environment {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse(content: &str) -> Environment {
    parse_env_content(content, Path::new(".env"), &Environment::new()).unwrap()
}

#[rstest]
#[case("FOO=bar", "bar")]
#[case("export FOO=bar", "bar")]
#[case("FOO = bar", "bar")]
#[case("FOO=bar # trailing comment", "bar")]
#[case("FOO=bar#not-a-comment", "bar#not-a-comment")]
#[case("FOO='literal $HOME'", "literal $HOME")]
#[case("FOO=\"line\\nbreak\"", "line\nbreak")]
#[case("FOO=\"quote \\\" inside\"", "quote \" inside")]
#[case("FOO=\"cost \\$5\"", "cost $5")]
#[case("FOO=", "")]
fn test_parse_values(#[case] content: &str, #[case] expected: &str) {
    let parsed = parse(content);
    assert_eq!(parsed.get("FOO").map(String::as_str), Some(expected));
}

#[rstest]
fn test_parse_skips_comments_and_blanks() {
    let parsed = parse("# header\n\nA=1\n   # indented\nB=2\n");
    assert_eq!(parsed, env(&[("A", "1"), ("B", "2")]));
}

#[rstest]
fn test_parse_interpolates_earlier_lines() {
    let parsed = parse("HOST=db\nURL=postgres://${HOST}:5432\n");
    assert_eq!(parsed["URL"], "postgres://db:5432");
}

#[rstest]
fn test_parse_interpolates_from_base() {
    let base = env(&[("USER", "alice")]);
    let parsed = parse_env_content("HOME_DIR=/home/$USER\n", Path::new(".env"), &base).unwrap();
    assert_eq!(parsed["HOME_DIR"], "/home/alice");
}

#[rstest]
fn test_bare_key_copies_from_base() {
    let base = env(&[("TOKEN", "secret")]);
    let parsed = parse_env_content("TOKEN\nMISSING\n", Path::new(".env"), &base).unwrap();
    assert_eq!(parsed, env(&[("TOKEN", "secret")]));
}

#[rstest]
#[case("1FOO=bar", 1)]
#[case("A=1\nBAD KEY=2", 2)]
#[case("A='unterminated", 1)]
#[case("A=\"unterminated", 1)]
fn test_parse_invalid(#[case] content: &str, #[case] expected_line: usize) {
    let err = parse_env_content(content, Path::new("bad.env"), &Environment::new()).unwrap_err();
    match err {
        Error::InvalidEnvFile { path, line, .. } => {
            assert_eq!(path, Path::new("bad.env"));
            assert_eq!(line, expected_line);
        }
        other => panic!("Expected InvalidEnvFile, got {other:?}"),
    }
}

#[rstest]
fn test_build_environment_later_files_win() {
    let tmp = TempDir::new().unwrap();
    let first = tmp.path().join("first.env");
    let second = tmp.path().join("second.env");
    std::fs::write(&first, "A=first\nB=first\n").unwrap();
    std::fs::write(&second, "B=second\n").unwrap();

    let base = env(&[("A", "ambient"), ("C", "ambient")]);
    let built = build_environment(&[first, second], &base).unwrap();

    assert_eq!(
        built,
        env(&[("A", "first"), ("B", "second"), ("C", "ambient")])
    );
}

#[rstest]
fn test_missing_env_file() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing.env");
    let err = build_environment(&[missing.clone()], &Environment::new()).unwrap_err();
    assert!(matches!(err, Error::EnvFileNotFound(path) if path == missing));
}

#[rstest]
fn test_top_level_scope_hides_ambient_from_includes() {
    let tmp = TempDir::new().unwrap();
    let top_env = tmp.path().join("top.env");
    let include_env = tmp.path().join("include.env");
    std::fs::write(&top_env, "TOP=1\n").unwrap();
    std::fs::write(&include_env, "INCLUDED=1\n").unwrap();

    let ambient = env(&[("AMBIENT", "1")]);
    let top = EnvironmentScope::top_level(&[top_env], &ambient, false).unwrap();
    assert_eq!(top.get("TOP"), Some("1"));
    assert_eq!(top.get("AMBIENT"), Some("1"));

    let included = top.for_include(&[include_env]).unwrap();
    assert_eq!(included.get("INCLUDED"), Some("1"));
    assert_eq!(included.get("TOP"), None);
    assert_eq!(included.get("AMBIENT"), None);
}

#[rstest]
fn test_top_level_scope_shares_ambient() {
    let ambient = env(&[("AMBIENT", "1")]);
    let top = EnvironmentScope::top_level(&[], &ambient, true).unwrap();
    let included = top.for_include(&[]).unwrap();
    assert_eq!(included.get("AMBIENT"), Some("1"));
}

#[rstest]
fn test_nested_include_inherits_enclosing_scope() {
    let tmp = TempDir::new().unwrap();
    let outer_env = tmp.path().join("outer.env");
    let inner_env = tmp.path().join("inner.env");
    std::fs::write(&outer_env, "OUTER=1\nSHARED=outer\n").unwrap();
    std::fs::write(&inner_env, "SHARED=inner\n").unwrap();

    let top = EnvironmentScope::top_level(&[], &Environment::new(), false).unwrap();
    let outer = top.for_include(&[outer_env]).unwrap();
    let inner = outer.for_include(&[inner_env]).unwrap();

    assert_eq!(inner.get("OUTER"), Some("1"));
    assert_eq!(inner.get("SHARED"), Some("inner"));
    assert_eq!(outer.get("SHARED"), Some("outer"));
}
