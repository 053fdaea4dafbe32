// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Parsed documents and the provenance-tracking merged document.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

#[cfg(test)]
#[path = "./document_test.rs"]
mod document_test;

/// Top-level key holding include directives.
pub const INCLUDE_KEY: &str = "include";

/// One step into a document tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Location of a node inside a document tree, from the root.
pub type Pointer = Vec<Segment>;

/// Build a pointer made only of mapping keys.
pub fn pointer<I, S>(keys: I) -> Pointer
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter().map(|k| Segment::Key(k.into())).collect()
}

/// Segment for a mapping key. Non-string keys use their YAML rendering.
pub(crate) fn key_segment(key: &Value) -> Segment {
    match key {
        Value::String(s) => Segment::Key(s.clone()),
        Value::Bool(b) => Segment::Key(b.to_string()),
        Value::Number(n) => Segment::Key(n.to_string()),
        other => Segment::Key(
            serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default(),
        ),
    }
}

/// Look up the node at `ptr`.
pub fn get_at<'a>(value: &'a Value, ptr: &[Segment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in ptr {
        current = match (segment, current) {
            (Segment::Key(key), Value::Mapping(map)) => map.get(key.as_str())?,
            (Segment::Index(index), Value::Sequence(seq)) => seq.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable variant of [`get_at`].
pub fn get_at_mut<'a>(value: &'a mut Value, ptr: &[Segment]) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in ptr {
        current = match (segment, current) {
            (Segment::Key(key), Value::Mapping(map)) => map.get_mut(key.as_str())?,
            (Segment::Index(index), Value::Sequence(seq)) => seq.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Parse document text into an ordered tree.
///
/// An empty document is an empty mapping. Anything other than a mapping at
/// the top level is rejected.
pub fn parse(content: &str, origin: &str) -> crate::Result<Value> {
    let value: Value = serde_yaml::from_str(content).map_err(|error| crate::Error::InvalidYaml {
        origin: origin.to_string(),
        error,
    })?;
    match value {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(value),
        _ => Err(crate::Error::ValidationFailed(format!(
            "top-level of {origin} must be a mapping"
        ))),
    }
}

/// Where a piece of the merged document came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Source identity: canonical path, or a synthetic name for in-memory content.
    pub source: String,
    /// Directory used to resolve relative references authored in that source.
    pub working_dir: PathBuf,
}

/// One parsed document.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Canonical path of the file, when loaded from disk.
    pub path: Option<PathBuf>,
    /// Source identity used for deduplication and conflict tagging.
    pub source: String,
    /// Directory relative references inside this document resolve against.
    pub working_dir: PathBuf,
    /// Parsed tree; always a mapping.
    pub tree: Value,
    /// Environment files declared for this fragment's own interpolation.
    pub env_files: Vec<PathBuf>,
}

impl Fragment {
    /// Parse a fragment from in-memory content.
    pub fn from_yaml<S: Into<String>>(
        content: &str,
        source: S,
        working_dir: impl Into<PathBuf>,
    ) -> crate::Result<Self> {
        let source = source.into();
        let tree = parse(content, &source)?;
        Ok(Self {
            path: None,
            source,
            working_dir: working_dir.into(),
            tree,
            env_files: Vec::new(),
        })
    }

    /// Load a fragment from a file. The working directory defaults to the
    /// file's parent directory.
    pub fn load<P: AsRef<Path>>(path: P, working_dir: Option<&Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| crate::Error::ReadFailed {
            path: path.to_path_buf(),
            error: e,
        })?;
        let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let working_dir = match working_dir {
            Some(dir) => dir.to_path_buf(),
            None => canonical
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        tracing::debug!(path = %canonical.display(), "loaded fragment");
        let mut fragment = Self::from_yaml(&content, canonical.display().to_string(), working_dir)?;
        fragment.path = Some(canonical);
        Ok(fragment)
    }

    /// Attach declared environment files.
    pub fn with_env_files(mut self, env_files: Vec<PathBuf>) -> Self {
        self.env_files = env_files;
        self
    }

    pub fn origin(&self) -> Origin {
        Origin {
            source: self.source.clone(),
            working_dir: self.working_dir.clone(),
        }
    }
}

/// A document tree plus the origin of every value in it.
///
/// Provenance is a side table from location to origin. A location without
/// an entry belongs to the origin of its nearest recorded ancestor.
#[derive(Debug, Clone)]
pub struct MergedDocument {
    pub(crate) tree: Value,
    origins: Vec<Origin>,
    provenance: BTreeMap<Pointer, usize>,
}

impl Default for MergedDocument {
    fn default() -> Self {
        Self {
            tree: Value::Mapping(Mapping::new()),
            origins: Vec::new(),
            provenance: BTreeMap::new(),
        }
    }
}

impl MergedDocument {
    /// Start a document owned entirely by one origin.
    pub fn new(tree: Value, origin: Origin) -> Self {
        let mut provenance = BTreeMap::new();
        provenance.insert(Vec::new(), 0);
        Self {
            tree,
            origins: vec![origin],
            provenance,
        }
    }

    pub fn from_fragment(fragment: &Fragment) -> Self {
        Self::new(fragment.tree.clone(), fragment.origin())
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn into_tree(self) -> Value {
        self.tree
    }

    pub fn origins(&self) -> &[Origin] {
        &self.origins
    }

    pub fn get(&self, ptr: &[Segment]) -> Option<&Value> {
        get_at(&self.tree, ptr)
    }

    /// A top-level section as a mapping, if present.
    pub fn section(&self, name: &str) -> Option<&Mapping> {
        self.tree.get(name).and_then(Value::as_mapping)
    }

    /// Origin of the value at `ptr`.
    pub fn origin_of(&self, ptr: &[Segment]) -> Option<&Origin> {
        self.origin_index_of(ptr).map(|i| &self.origins[i])
    }

    pub(crate) fn origin_index_of(&self, ptr: &[Segment]) -> Option<usize> {
        (0..=ptr.len())
            .rev()
            .find_map(|len| self.provenance.get(&ptr[..len]).copied())
    }

    /// Remove a top-level key along with its provenance.
    pub fn remove_key(&mut self, key: &str) -> Option<Value> {
        let removed = self.tree.as_mapping_mut()?.remove(key);
        if removed.is_some() {
            self.clear_under(&pointer([key]));
        }
        removed
    }

    /// Replace the value at `ptr` without changing its provenance.
    pub(crate) fn set_value(&mut self, ptr: &[Segment], value: Value) {
        if let Some(slot) = get_at_mut(&mut self.tree, ptr) {
            *slot = value;
        }
    }

    /// Copy `other`'s origins into this document, returning the index each
    /// of them now has here.
    pub(crate) fn import_origins(&mut self, other: &MergedDocument) -> Vec<usize> {
        other
            .origins
            .iter()
            .map(|origin| match self.origins.iter().position(|o| o == origin) {
                Some(index) => index,
                None => {
                    self.origins.push(origin.clone());
                    self.origins.len() - 1
                }
            })
            .collect()
    }

    /// Drop every provenance entry at or below `ptr`.
    pub(crate) fn clear_under(&mut self, ptr: &[Segment]) {
        self.provenance.retain(|key, _| !key.starts_with(ptr));
    }

    /// Record that the node at `to` now holds what `from` held at `from_ptr`.
    pub(crate) fn adopt_provenance(
        &mut self,
        to: &[Segment],
        from: &MergedDocument,
        from_ptr: &[Segment],
        remap: &[usize],
    ) {
        self.clear_under(to);
        if let Some(index) = from.origin_index_of(from_ptr) {
            self.provenance.insert(to.to_vec(), remap[index]);
        }
        for (key, index) in from.provenance.range(from_ptr.to_vec()..) {
            if !key.starts_with(from_ptr) {
                break;
            }
            if key.len() == from_ptr.len() {
                continue;
            }
            let mut rebased = to.to_vec();
            rebased.extend_from_slice(&key[from_ptr.len()..]);
            self.provenance.insert(rebased, remap[*index]);
        }
    }

    /// Record an origin for `ptr` directly.
    pub(crate) fn record(&mut self, ptr: &[Segment], origin: usize) {
        self.provenance.insert(ptr.to_vec(), origin);
    }

    /// Insert `other`'s `section.name` resource into this document,
    /// carrying its provenance along.
    pub(crate) fn graft(&mut self, section: &str, name: &Value, other: &MergedDocument) {
        let Some(value) = other
            .section(section)
            .and_then(|resources| resources.get(name))
            .cloned()
        else {
            return;
        };
        let remap = self.import_origins(other);

        let Some(root) = self.tree.as_mapping_mut() else {
            return;
        };
        if !root.get(section).is_some_and(Value::is_mapping) {
            root.insert(
                Value::String(section.to_string()),
                Value::Mapping(Mapping::new()),
            );
        }
        if let Some(Value::Mapping(resources)) = root.get_mut(section) {
            resources.insert(name.clone(), value);
        }

        let ptr = vec![Segment::Key(section.to_string()), key_segment(name)];
        self.adopt_provenance(&ptr, other, &ptr, &remap);
    }
}
