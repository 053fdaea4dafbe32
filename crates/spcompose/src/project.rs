// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! The resolved project model.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./project_test.rs"]
mod project_test;

/// A top-level section holding named resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Services,
    Networks,
    Volumes,
    Secrets,
    Configs,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Services,
        Section::Networks,
        Section::Volumes,
        Section::Secrets,
        Section::Configs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Services => "services",
            Section::Networks => "networks",
            Section::Volumes => "volumes",
            Section::Secrets => "secrets",
            Section::Configs => "configs",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| Error::ValidationFailed(format!("unknown section {s:?}")))
    }
}

/// Identity of a named resource: `(section, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub section: Section,
    pub name: String,
}

impl ResourceKey {
    pub fn new(section: Section, name: impl Into<String>) -> Self {
        Self {
            section,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.name)
    }
}

/// Which source declared each resource.
pub type ResourceSources = IndexMap<ResourceKey, String>;

/// Fully resolved project.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub working_dir: PathBuf,
    /// Resource definitions, in section then declaration order.
    pub resources: IndexMap<ResourceKey, Value>,
    /// Source that declared each resource.
    pub sources: ResourceSources,
    /// Every file read while loading, in read order.
    pub source_files: Vec<PathBuf>,
    /// `x-*` extension fields of the merged document.
    pub extensions: Mapping,
}

impl Project {
    /// Split a merged tree into the project model.
    pub fn from_tree(
        name: String,
        working_dir: PathBuf,
        tree: Value,
        sources: ResourceSources,
        source_files: Vec<PathBuf>,
    ) -> Self {
        let mut resources = IndexMap::new();
        let mut extensions = Mapping::new();

        if let Value::Mapping(root) = &tree {
            for section in Section::ALL {
                let Some(Value::Mapping(entries)) = root.get(section.as_str()) else {
                    continue;
                };
                for (resource, definition) in entries {
                    let Some(resource) = resource.as_str() else {
                        continue;
                    };
                    resources.insert(ResourceKey::new(section, resource), definition.clone());
                }
            }
            for (key, value) in root {
                if key.as_str().is_some_and(|k| k.starts_with("x-")) {
                    extensions.insert(key.clone(), value.clone());
                }
            }
        }

        let sources = resources
            .keys()
            .filter_map(|key| sources.get(key).map(|source| (key.clone(), source.clone())))
            .collect();

        Self {
            name,
            working_dir,
            resources,
            sources,
            source_files,
            extensions,
        }
    }

    pub fn get(&self, section: Section, name: &str) -> Option<&Value> {
        self.resources.get(&ResourceKey::new(section, name))
    }

    pub fn service(&self, name: &str) -> Option<&Value> {
        self.get(Section::Services, name)
    }

    /// Names of the resources in one section, in declaration order.
    pub fn names(&self, section: Section) -> Vec<&str> {
        self.resources
            .keys()
            .filter(|key| key.section == section)
            .map(|key| key.name.as_str())
            .collect()
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.names(Section::Services)
    }

    pub fn source_of(&self, section: Section, name: &str) -> Option<&str> {
        self.sources
            .get(&ResourceKey::new(section, name))
            .map(String::as_str)
    }

    /// Render back into a single document.
    pub fn to_document(&self) -> Value {
        let mut root = Mapping::new();
        root.insert("name".into(), self.name.clone().into());
        for section in Section::ALL {
            let entries: Mapping = self
                .resources
                .iter()
                .filter(|(key, _)| key.section == section)
                .map(|(key, value)| (Value::from(key.name.clone()), value.clone()))
                .collect();
            if !entries.is_empty() {
                root.insert(section.as_str().into(), Value::Mapping(entries));
            }
        }
        for (key, value) in &self.extensions {
            root.insert(key.clone(), value.clone());
        }
        Value::Mapping(root)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.to_document()).map_err(|e| Error::Render(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_document()).map_err(|e| Error::Render(e.to_string()))
    }

    /// SHA-256 of a service definition, stable across key order.
    pub fn service_hash(&self, name: &str) -> Result<String> {
        let service = self
            .service(name)
            .ok_or_else(|| Error::ValidationFailed(format!("no such service: {name}")))?;
        // serde_json's default map type sorts keys
        let canonical: serde_json::Value =
            serde_json::to_value(service).map_err(|e| Error::Render(e.to_string()))?;
        let bytes = serde_json::to_vec(&canonical).map_err(|e| Error::Render(e.to_string()))?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_-]").expect("valid project name pattern"));

/// Lowercase, drop unsupported characters and any leading `_` or `-`.
pub fn normalize_project_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let cleaned = INVALID_NAME_CHARS.replace_all(&lowered, "");
    cleaned
        .trim_start_matches(|c: char| c == '_' || c == '-')
        .to_string()
}

/// Pick the project name: explicit override, then the document's `name`,
/// then the working directory's base name.
pub fn project_name(
    explicit: Option<&str>,
    tree: &Value,
    working_dir: &Path,
) -> Result<String> {
    let candidate = explicit
        .map(str::to_string)
        .or_else(|| tree.get("name").and_then(Value::as_str).map(str::to_string))
        .or_else(|| {
            working_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    let name = normalize_project_name(&candidate);
    if name.is_empty() {
        return Err(Error::ValidationFailed(format!(
            "project name {candidate:?} must contain at least one lowercase letter or digit"
        )));
    }
    Ok(name)
}
