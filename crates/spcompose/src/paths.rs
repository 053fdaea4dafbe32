// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Resolution of relative filesystem references.
//!
//! Relative references are resolved against the working directory of the
//! fragment that contributed them, which the merged document records per
//! value. Resolution is purely lexical; referenced files need not exist.

use std::path::{Component, Path, PathBuf};

use serde_yaml::Value;

use crate::document::{MergedDocument, Pointer, Segment, pointer};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./paths_test.rs"]
mod paths_test;

/// Rewrites relative references into absolute paths.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    enabled: bool,
    sandbox: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(enabled: bool, sandbox: Option<PathBuf>) -> Self {
        Self {
            enabled,
            sandbox: sandbox.map(|root| normalize_lexically(&root)),
        }
    }

    /// Resolve a path field value, or return it untouched when disabled.
    pub fn resolve(&self, value: &str, base_dir: &Path) -> Result<String> {
        if !self.enabled {
            return Ok(value.to_string());
        }
        let resolved = self.resolve_always(value, base_dir)?;
        Ok(resolved.to_string_lossy().into_owned())
    }

    /// Resolve regardless of the enabled flag. Used for references the
    /// loader itself must open, such as includes and env files.
    ///
    /// Absolute values are returned as written.
    pub fn resolve_always(&self, value: &str, base_dir: &Path) -> Result<PathBuf> {
        let path = if let Some(home_relative) = expand_home(value)? {
            normalize_lexically(&home_relative)
        } else if Path::new(value).is_absolute() {
            PathBuf::from(value)
        } else {
            normalize_lexically(&base_dir.join(value))
        };
        self.check_sandbox(&path)?;
        Ok(path)
    }

    /// Fail if `path` lies outside the sandbox root.
    pub fn check_sandbox(&self, path: &Path) -> Result<()> {
        match &self.sandbox {
            Some(root) if !normalize_lexically(path).starts_with(root) => Err(Error::InvalidPath {
                path: path.to_path_buf(),
                root: root.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Resolve every path field in the document against the working
    /// directory of the fragment that set it.
    pub fn resolve_document(&self, document: &mut MergedDocument, fallback_dir: &Path) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut updates = Vec::new();
        for (ptr, value) in path_fields(document.tree()) {
            let base_dir = document
                .origin_of(&ptr)
                .map(|origin| origin.working_dir.as_path())
                .unwrap_or(fallback_dir);
            let resolved = match value {
                PathField::Plain(raw) => self.resolve(&raw, base_dir)?,
                PathField::VolumeShort { source, rest } => {
                    format!("{}:{rest}", self.resolve(&source, base_dir)?)
                }
            };
            updates.push((ptr, resolved));
        }

        for (ptr, resolved) in updates {
            document.set_value(&ptr, Value::String(resolved));
        }
        Ok(())
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(value: &str) -> Result<Option<PathBuf>> {
    if value != "~" && !value.starts_with("~/") {
        return Ok(None);
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::ValidationFailed("Cannot resolve ~ without HOME".to_string()))?;
    let rel = value.strip_prefix("~/").unwrap_or("");
    Ok(Some(home.join(rel)))
}

/// Remove `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

enum PathField {
    Plain(String),
    /// `source:target[:mode]` volume entry whose source is a host path.
    VolumeShort { source: String, rest: String },
}

fn is_remote(context: &str) -> bool {
    context.contains("://") || context.starts_with("git@") || context.starts_with("github.com/")
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('.') || source.starts_with('~') || source.starts_with('/')
}

/// Every path-valued field of the tree with its location.
fn path_fields(tree: &Value) -> Vec<(Pointer, PathField)> {
    let mut fields = Vec::new();

    if let Some(Value::Mapping(services)) = tree.get("services") {
        for (name, service) in services {
            let Some(name) = name.as_str() else { continue };
            let at = pointer(["services", name]);
            service_path_fields(&at, service, &mut fields);
        }
    }

    for section in ["configs", "secrets"] {
        let Some(Value::Mapping(entries)) = tree.get(section) else {
            continue;
        };
        for (name, entry) in entries {
            let Some(name) = name.as_str() else { continue };
            if let Some(file) = entry.get("file").and_then(Value::as_str) {
                fields.push((pointer([section, name, "file"]), PathField::Plain(file.to_string())));
            }
        }
    }

    fields
}

fn child(at: &Pointer, segment: Segment) -> Pointer {
    let mut ptr = at.clone();
    ptr.push(segment);
    ptr
}

fn key(at: &Pointer, name: &str) -> Pointer {
    child(at, Segment::Key(name.to_string()))
}

fn service_path_fields(at: &Pointer, service: &Value, fields: &mut Vec<(Pointer, PathField)>) {
    match service.get("build") {
        Some(Value::String(context)) if !is_remote(context) => {
            fields.push((key(at, "build"), PathField::Plain(context.clone())));
        }
        Some(build @ Value::Mapping(_)) => {
            if let Some(context) = build.get("context").and_then(Value::as_str) {
                if !is_remote(context) {
                    let ptr = key(&key(at, "build"), "context");
                    fields.push((ptr, PathField::Plain(context.to_string())));
                }
            }
        }
        _ => {}
    }

    match service.get("env_file") {
        Some(Value::String(file)) => {
            fields.push((key(at, "env_file"), PathField::Plain(file.clone())));
        }
        Some(Value::Sequence(files)) => {
            let list = key(at, "env_file");
            for (i, file) in files.iter().enumerate() {
                match file {
                    Value::String(file) => {
                        fields.push((child(&list, Segment::Index(i)), PathField::Plain(file.clone())));
                    }
                    Value::Mapping(_) => {
                        if let Some(path) = file.get("path").and_then(Value::as_str) {
                            let ptr = key(&child(&list, Segment::Index(i)), "path");
                            fields.push((ptr, PathField::Plain(path.to_string())));
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    if let Some(Value::Sequence(volumes)) = service.get("volumes") {
        let list = key(at, "volumes");
        for (i, volume) in volumes.iter().enumerate() {
            let entry = child(&list, Segment::Index(i));
            match volume {
                Value::String(spec) => {
                    let Some((source, rest)) = spec.split_once(':') else {
                        continue;
                    };
                    if is_host_path(source) {
                        fields.push((
                            entry,
                            PathField::VolumeShort {
                                source: source.to_string(),
                                rest: rest.to_string(),
                            },
                        ));
                    }
                }
                Value::Mapping(_) => {
                    let is_bind = volume.get("type").and_then(Value::as_str) == Some("bind");
                    if let Some(source) = volume.get("source").and_then(Value::as_str) {
                        if is_bind && !source.is_empty() {
                            fields.push((key(&entry, "source"), PathField::Plain(source.to_string())));
                        }
                    }
                }
                _ => {}
            }
        }
    }
}
