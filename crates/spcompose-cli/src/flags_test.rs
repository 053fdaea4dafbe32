// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, "services: {}\n").unwrap();
}

#[rstest]
fn test_default_file_and_env() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("compose.yaml"));
    touch(&tmp.path().join(".env"));

    let details = ProjectFlags::default()
        .details_in(tmp.path(), Environment::new())
        .unwrap();

    assert_eq!(details.working_dir, tmp.path());
    assert_eq!(details.sources.len(), 1);
    assert_eq!(details.sources[0].filename, tmp.path().join("compose.yaml"));
    assert_eq!(details.sources[0].env_files, vec![tmp.path().join(".env")]);
}

#[rstest]
fn test_no_default_file() {
    let tmp = TempDir::new().unwrap();
    assert!(
        ProjectFlags::default()
            .details_in(tmp.path(), Environment::new())
            .is_err()
    );
}

#[rstest]
fn test_explicit_files_and_project_directory() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("deploy/base.yaml"));
    touch(&tmp.path().join("deploy/prod.yaml"));

    let flags = ProjectFlags {
        files: vec!["deploy/base.yaml".into(), "deploy/prod.yaml".into()],
        env_files: vec!["prod.env".into()],
        ..Default::default()
    };
    let details = flags.details_in(tmp.path(), Environment::new()).unwrap();
    assert_eq!(details.working_dir, tmp.path().join("deploy"));
    assert_eq!(details.sources.len(), 2);
    assert_eq!(details.sources[1].env_files, vec![tmp.path().join("prod.env")]);

    let flags = ProjectFlags {
        project_directory: Some(".".into()),
        ..flags
    };
    let details = flags.details_in(tmp.path(), Environment::new()).unwrap();
    assert_eq!(details.working_dir, tmp.path().join("."));
}

#[rstest]
fn test_options() {
    let flags = ProjectFlags {
        project_name: Some("demo".into()),
        include_roots: vec!["/shared".into()],
        ..Default::default()
    };
    let options = flags.options();
    assert_eq!(options.project_name.as_deref(), Some("demo"));
    assert_eq!(options.include_search_roots, vec![PathBuf::from("/shared")]);
    assert!(options.resolve_paths);
}
