// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Include directives and the recursive resolution of included fragments.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;

use crate::conflict::{fold, tag_resources};
use crate::document::{Fragment, INCLUDE_KEY, MergedDocument};
use crate::environment::EnvironmentScope;
use crate::interpolate::{interpolate_tree, resolve_environment};
use crate::loader::LoadOptions;
use crate::merge::merge;
use crate::paths::{PathResolver, expand_home};
use crate::project::ResourceSources;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./include_test.rs"]
mod include_test;

/// Where to look for an include path, in order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IncludeSearchOrder {
    /// The declaring fragment's working directory, then the search roots.
    #[default]
    WorkingDirFirst,
    /// The search roots, then the declaring fragment's working directory.
    SearchRootsFirst,
}

/// One entry of a fragment's `include` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeDirective {
    /// Files merged, in order, into one sub-project.
    pub paths: Vec<String>,
    /// Env files forming the sub-project's own environment.
    pub env_files: Vec<String>,
    /// Working directory of the sub-project, instead of the first file's.
    pub project_directory: Option<String>,
    /// Display name for the sub-project.
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LongSyntax {
    path: OneOrMany,
    #[serde(default)]
    env_file: Option<OneOrMany>,
    #[serde(default)]
    project_directory: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDirective {
    Short(String),
    Long(LongSyntax),
}

impl IncludeDirective {
    /// Parse the value of an `include` section.
    pub fn parse_all(section: &Value) -> Result<Vec<Self>> {
        let entries = match section {
            Value::Null => return Ok(Vec::new()),
            Value::Sequence(entries) => entries,
            _ => {
                return Err(Error::ValidationFailed(
                    "include must be a list".to_string(),
                ));
            }
        };

        entries
            .iter()
            .map(|entry| {
                let raw: RawDirective = serde_yaml::from_value(entry.clone()).map_err(|e| {
                    Error::ValidationFailed(format!("invalid include entry: {e}"))
                })?;
                let directive = match raw {
                    RawDirective::Short(path) => Self {
                        paths: vec![path],
                        ..Default::default()
                    },
                    RawDirective::Long(long) => Self {
                        paths: long.path.into(),
                        env_files: long.env_file.map(Vec::from).unwrap_or_default(),
                        project_directory: long.project_directory,
                        name: long.name,
                    },
                };
                if directive.paths.is_empty() {
                    return Err(Error::ValidationFailed(
                        "include entry must declare at least one path".to_string(),
                    ));
                }
                Ok(directive)
            })
            .collect()
    }
}

/// A resolved fragment: its document with includes folded in, and the
/// source that declared each resource.
#[derive(Debug, Clone, Default)]
pub struct SubProject {
    pub document: MergedDocument,
    pub sources: ResourceSources,
}

/// State shared by every include resolved during one load.
pub struct Resolver<'a> {
    options: &'a LoadOptions,
    paths: PathResolver,
    /// Canonical paths already loaded; loading one again is a no-op.
    loaded: HashSet<PathBuf>,
    /// Canonical paths of the fragments currently being resolved.
    stack: Vec<PathBuf>,
    source_files: Vec<PathBuf>,
}

impl<'a> Resolver<'a> {
    pub fn new(options: &'a LoadOptions) -> Self {
        Self {
            options,
            paths: PathResolver::new(options.resolve_paths, options.sandbox_root.clone()),
            loaded: HashSet::new(),
            stack: Vec::new(),
            source_files: Vec::new(),
        }
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Every file read so far, in read order.
    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    pub fn into_source_files(self) -> Vec<PathBuf> {
        self.source_files
    }

    /// Record an env file as read.
    pub(crate) fn track_file(&mut self, path: &Path) {
        if !self.source_files.iter().any(|p| p == path) {
            self.source_files.push(path.to_path_buf());
        }
    }

    /// Resolve a top-level fragment.
    pub fn resolve_top_level(
        &mut self,
        fragment: &Fragment,
        scope: &EnvironmentScope,
    ) -> Result<SubProject> {
        if let Some(path) = &fragment.path {
            self.loaded.insert(path.clone());
            self.track_file(path);
        }
        self.resolve_fragment(fragment, scope)
    }

    /// Interpolate a fragment and fold in everything it includes.
    pub fn resolve_fragment(
        &mut self,
        fragment: &Fragment,
        scope: &EnvironmentScope,
    ) -> Result<SubProject> {
        let mut tree = fragment.tree.clone();
        if !self.options.skip_interpolation {
            interpolate_tree(&mut tree, scope)?;
            resolve_environment(&mut tree, scope);
        }

        let mut document = MergedDocument::new(tree, fragment.origin());
        let includes = document.remove_key(INCLUDE_KEY);
        let mut sources = tag_resources(&document, &fragment.source);

        let Some(includes) = includes else {
            return Ok(SubProject { document, sources });
        };

        if let Some(path) = &fragment.path {
            self.stack.push(path.clone());
        }
        let result = self.fold_includes(&includes, fragment, scope, &mut document, &mut sources);
        if fragment.path.is_some() {
            self.stack.pop();
        }
        result?;

        Ok(SubProject { document, sources })
    }

    fn fold_includes(
        &mut self,
        includes: &Value,
        fragment: &Fragment,
        scope: &EnvironmentScope,
        document: &mut MergedDocument,
        sources: &mut ResourceSources,
    ) -> Result<()> {
        for directive in IncludeDirective::parse_all(includes)? {
            let Some(sub) = self.resolve_include(&directive, &fragment.working_dir, scope)? else {
                continue;
            };
            fold(document, sources, &sub.document, &sub.sources)?;
        }
        Ok(())
    }

    /// Load the files an include directive names into one sub-project.
    ///
    /// Returns `None` when every file was already loaded elsewhere.
    pub fn resolve_include(
        &mut self,
        directive: &IncludeDirective,
        declaring_dir: &Path,
        scope: &EnvironmentScope,
    ) -> Result<Option<SubProject>> {
        let files = directive
            .paths
            .iter()
            .map(|path| self.find_include(path, declaring_dir))
            .collect::<Result<Vec<_>>>()?;

        let env_files = directive
            .env_files
            .iter()
            .map(|env_file| self.paths.resolve_always(env_file, declaring_dir))
            .collect::<Result<Vec<_>>>()?;
        let Some(first) = files.first().cloned() else {
            return Ok(None);
        };
        let child_scope = scope
            .for_include(&env_files)
            .map_err(|e| e.in_include(&first))?;
        for env_file in &env_files {
            self.track_file(env_file);
        }

        let working_dir = match &directive.project_directory {
            Some(dir) => self.paths.resolve_always(dir, declaring_dir)?,
            None => first
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| declaring_dir.to_path_buf()),
        };

        let mut combined: Option<SubProject> = None;
        for file in files {
            if self.stack.contains(&file) {
                return Err(Error::CyclicInclude(file));
            }
            if !self.loaded.insert(file.clone()) {
                tracing::debug!(path = %file.display(), "already included, skipping");
                continue;
            }
            self.track_file(&file);

            tracing::debug!(
                path = %file.display(),
                name = directive.name.as_deref().unwrap_or(""),
                "resolving include"
            );
            let sub = Fragment::load(&file, Some(working_dir.as_path()))
                .and_then(|fragment| self.resolve_fragment(&fragment, &child_scope))
                .map_err(|e| e.in_include(&file))?;

            combined = Some(match combined {
                None => sub,
                Some(mut acc) => {
                    acc.document = merge(acc.document, &sub.document);
                    acc.sources.extend(sub.sources);
                    acc
                }
            });
        }
        Ok(combined)
    }

    /// Locate an include path: the first existing candidate wins.
    pub fn find_include(&self, path: &str, declaring_dir: &Path) -> Result<PathBuf> {
        let candidates = if expand_home(path)?.is_some() || Path::new(path).is_absolute() {
            vec![self.paths.resolve_always(path, declaring_dir)?]
        } else {
            let local = std::iter::once(declaring_dir.to_path_buf());
            let roots = self.options.include_search_roots.iter().cloned();
            let dirs: Vec<PathBuf> = match self.options.include_search_order {
                IncludeSearchOrder::WorkingDirFirst => local.chain(roots).collect(),
                IncludeSearchOrder::SearchRootsFirst => roots.chain(local).collect(),
            };
            dirs.iter()
                .map(|dir| self.paths.resolve_always(path, dir))
                .collect::<Result<Vec<_>>>()?
        };

        let found = candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::IncludeNotFound {
                path: path.to_string(),
                searched: candidates.clone(),
            })?;

        dunce::canonicalize(found).map_err(|e| Error::ReadFailed {
            path: found.clone(),
            error: e,
        })
    }
}
