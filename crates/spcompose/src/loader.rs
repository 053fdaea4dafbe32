// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! The load pipeline: from configuration sources to a resolved [`Project`].

use std::path::{Path, PathBuf};

use crate::document::{Fragment, MergedDocument};
use crate::environment::{Environment, EnvironmentScope};
use crate::include::{IncludeSearchOrder, Resolver};
use crate::merge::merge;
use crate::normalize::{Normalizer, ShorthandNormalizer};
use crate::project::{Project, ResourceSources, project_name};
use crate::validate::{StructureValidator, Validator};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./loader_test.rs"]
mod loader_test;

/// One top-level configuration source.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Path of the file, or a synthetic name for in-memory content.
    pub filename: PathBuf,
    /// In-memory content; when absent the file is read from disk.
    pub content: Option<String>,
    /// Overrides the project working directory for this source.
    pub working_dir: Option<PathBuf>,
    /// Env files interpolating this source, in precedence order.
    pub env_files: Vec<PathBuf>,
}

impl ConfigSource {
    /// A source read from disk.
    pub fn file<P: Into<PathBuf>>(filename: P) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// A source with in-memory content.
    pub fn inline<P: Into<PathBuf>, S: Into<String>>(filename: P, content: S) -> Self {
        Self {
            filename: filename.into(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_working_dir<P: Into<PathBuf>>(mut self, working_dir: P) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, env_file: P) -> Self {
        self.env_files.push(env_file.into());
        self
    }
}

/// Everything one load starts from.
#[derive(Debug, Clone, Default)]
pub struct ConfigDetails {
    /// Project working directory.
    pub working_dir: PathBuf,
    /// Top-level sources, merged in order.
    pub sources: Vec<ConfigSource>,
    /// Ambient environment, typically the process environment.
    pub environment: Environment,
}

impl ConfigDetails {
    pub fn new<P: Into<PathBuf>>(working_dir: P) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

/// Options controlling a load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Rewrite relative path fields into absolute paths.
    pub resolve_paths: bool,
    pub skip_normalization: bool,
    pub skip_validation: bool,
    pub skip_interpolation: bool,
    /// Takes precedence over the document's `name` field.
    pub project_name: Option<String>,
    /// Extra directories searched for relative include paths.
    pub include_search_roots: Vec<PathBuf>,
    pub include_search_order: IncludeSearchOrder,
    /// When set, every resolved path must stay inside this directory.
    pub sandbox_root: Option<PathBuf>,
    /// Let includes see the ambient environment.
    pub share_ambient_with_includes: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            resolve_paths: true,
            skip_normalization: false,
            skip_validation: false,
            skip_interpolation: false,
            project_name: None,
            include_search_roots: Vec::new(),
            include_search_order: IncludeSearchOrder::default(),
            sandbox_root: None,
            share_ambient_with_includes: false,
        }
    }
}

/// Loads projects with a fixed set of options and collaborators.
pub struct Loader {
    options: LoadOptions,
    normalizer: Box<dyn Normalizer>,
    validator: Box<dyn Validator>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoadOptions::default())
    }
}

impl Loader {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            normalizer: Box::new(ShorthandNormalizer),
            validator: Box::new(StructureValidator),
        }
    }

    pub fn with_normalizer<N: Normalizer + 'static>(mut self, normalizer: N) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load, merge and resolve every source into one project.
    ///
    /// Each top-level source has its includes resolved and folded in
    /// before the sources are merged, so a later source may override a
    /// resource an earlier one pulled in through an include.
    pub fn load(&self, details: &ConfigDetails) -> Result<Project> {
        if details.sources.is_empty() {
            return Err(Error::ValidationFailed(
                "No configuration source provided".to_string(),
            ));
        }

        let mut resolver = Resolver::new(&self.options);
        let mut document = MergedDocument::default();
        let mut sources = ResourceSources::new();

        for source in &details.sources {
            let fragment = self.read_source(source, &details.working_dir, &resolver)?;
            let scope = EnvironmentScope::top_level(
                &fragment.env_files,
                &details.environment,
                self.options.share_ambient_with_includes,
            )?;
            for env_file in &fragment.env_files {
                resolver.track_file(env_file);
            }

            let sub = resolver.resolve_top_level(&fragment, &scope)?;
            document = merge(document, &sub.document);
            // an override keeps the source that first declared the resource
            for (key, source) in sub.sources {
                sources.entry(key).or_insert(source);
            }
        }

        resolver
            .paths()
            .resolve_document(&mut document, &details.working_dir)?;

        let name = project_name(
            self.options.project_name.as_deref(),
            document.tree(),
            &details.working_dir,
        )?;

        let mut tree = document.into_tree();
        if !self.options.skip_normalization {
            tree = self.normalizer.normalize(tree)?;
        }
        if !self.options.skip_validation {
            self.validator.validate(&tree)?;
        }

        tracing::debug!(project = %name, "project loaded");
        Ok(Project::from_tree(
            name,
            details.working_dir.clone(),
            tree,
            sources,
            resolver.into_source_files(),
        ))
    }

    fn read_source(
        &self,
        source: &ConfigSource,
        project_dir: &Path,
        resolver: &Resolver<'_>,
    ) -> Result<Fragment> {
        let working_dir = source
            .working_dir
            .clone()
            .unwrap_or_else(|| project_dir.to_path_buf());
        let env_files = source
            .env_files
            .iter()
            .map(|env_file| {
                resolver
                    .paths()
                    .resolve_always(&env_file.to_string_lossy(), &working_dir)
            })
            .collect::<Result<Vec<_>>>()?;

        let fragment = match &source.content {
            Some(content) => Fragment::from_yaml(
                content,
                source.filename.display().to_string(),
                working_dir,
            )?,
            None => {
                let path = resolver
                    .paths()
                    .resolve_always(&source.filename.to_string_lossy(), project_dir)?;
                Fragment::load(path, Some(working_dir.as_path()))?
            }
        };
        Ok(fragment.with_env_files(env_files))
    }
}

/// Load a project with the default normalizer and validator.
pub fn load(details: &ConfigDetails, options: LoadOptions) -> Result<Project> {
    Loader::new(options).load(details)
}
