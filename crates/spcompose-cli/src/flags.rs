// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Flags shared by every command that loads a project.

use std::path::{Path, PathBuf};

use clap::Args;
use miette::Result;
use spcompose::{ConfigDetails, ConfigSource, Environment, LoadOptions};

#[cfg(test)]
#[path = "./flags_test.rs"]
mod flags_test;

/// Env file read from the working directory when none is given.
const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Args, Clone, Debug, Default)]
pub struct ProjectFlags {
    /// Compose configuration files, merged in order
    #[clap(
        short = 'f',
        long = "file",
        env = "SPCOMPOSE_FILE",
        value_delimiter = ','
    )]
    pub files: Vec<PathBuf>,

    /// Alternate working directory (default: directory of the first file)
    #[clap(long, env = "SPCOMPOSE_PROJECT_DIRECTORY")]
    pub project_directory: Option<PathBuf>,

    /// Project name
    #[clap(short = 'p', long, env = "SPCOMPOSE_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Alternate environment files
    #[clap(long = "env-file", env = "SPCOMPOSE_ENV_FILE", value_delimiter = ',')]
    pub env_files: Vec<PathBuf>,

    /// Additional directory searched for relative include paths
    #[clap(long = "include-root")]
    pub include_roots: Vec<PathBuf>,
}

impl ProjectFlags {
    /// Load options selected by these flags.
    pub fn options(&self) -> LoadOptions {
        LoadOptions {
            project_name: self.project_name.clone(),
            include_search_roots: self.include_roots.clone(),
            ..Default::default()
        }
    }

    /// Build the load input from the process environment.
    pub fn details(&self) -> Result<ConfigDetails> {
        let cwd = std::env::current_dir()
            .map_err(|e| miette::miette!("Failed to get current directory: {e}"))?;
        self.details_in(&cwd, std::env::vars().collect())
    }

    /// Build the load input relative to `cwd`.
    pub fn details_in(&self, cwd: &Path, environment: Environment) -> Result<ConfigDetails> {
        let project_directory = self.project_directory.as_ref().map(|dir| cwd.join(dir));

        let files = if self.files.is_empty() {
            let search_dir = project_directory.as_deref().unwrap_or(cwd);
            let found = spcompose::find_default_file(search_dir).ok_or_else(|| {
                miette::miette!(
                    help = "Pass a file with -f/--file",
                    "No configuration file found in {}",
                    search_dir.display()
                )
            })?;
            vec![found]
        } else {
            self.files.iter().map(|file| cwd.join(file)).collect()
        };

        let working_dir = match project_directory {
            Some(dir) => dir,
            None => files[0]
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf()),
        };

        let env_files: Vec<PathBuf> = if self.env_files.is_empty() {
            let default = working_dir.join(DEFAULT_ENV_FILE);
            default.is_file().then_some(default).into_iter().collect()
        } else {
            self.env_files.iter().map(|file| cwd.join(file)).collect()
        };

        tracing::debug!(
            working_dir = %working_dir.display(),
            files = files.len(),
            env_files = env_files.len(),
            "resolved project flags"
        );

        let mut details = ConfigDetails::new(working_dir).with_environment(environment);
        for file in files {
            let mut source = ConfigSource::file(file);
            source.env_files = env_files.clone();
            details = details.with_source(source);
        }
        Ok(details)
    }
}
