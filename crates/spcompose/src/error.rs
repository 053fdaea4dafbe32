// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for spcompose operations.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience Result type with spcompose Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a project.
///
/// Every variant is terminal for the enclosing load; the pipeline never
/// returns a partially merged project.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Malformed document
    #[error("Invalid document {origin}: {error}")]
    #[diagnostic(code(spcompose::invalid_yaml), help("Check the YAML syntax of this file"))]
    InvalidYaml {
        origin: String,
        #[source]
        error: serde_yaml::Error,
    },

    /// Failed to read file
    #[error("Failed to read file: {path:?}")]
    #[diagnostic(code(spcompose::read_failed))]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// No candidate for an include path exists
    #[error("Include file not found: {path} (searched {searched:?})")]
    #[diagnostic(
        code(spcompose::include_not_found),
        help("Check that the include path is correct and the file exists")
    )]
    IncludeNotFound { path: String, searched: Vec<PathBuf> },

    /// An include leads back to a file that is still being resolved
    #[error("Circular include detected: {0:?}")]
    #[diagnostic(
        code(spcompose::cyclic_include),
        help("Remove the circular reference in your includes")
    )]
    CyclicInclude(PathBuf),

    /// Declared environment file is missing
    #[error("Environment file not found: {0:?}")]
    #[diagnostic(code(spcompose::env_file_not_found))]
    EnvFileNotFound(PathBuf),

    /// Environment file contains a line that cannot be parsed
    #[error("Invalid environment file {path:?} at line {line}: {message}")]
    #[diagnostic(code(spcompose::invalid_env_file))]
    InvalidEnvFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Two independent sources define the same resource
    #[error("{section}.{name} conflicts with imported resource")]
    #[diagnostic(
        code(spcompose::conflict),
        help("Rename one of the resources, or override it from a later top-level file")
    )]
    Conflict { section: String, name: String },

    /// A resolved path escapes the configured sandbox
    #[error("Path {path:?} is outside of the allowed root {root:?}")]
    #[diagnostic(code(spcompose::invalid_path))]
    InvalidPath { path: PathBuf, root: PathBuf },

    /// Variable substitution failed
    #[error("Failed to interpolate {value:?}: {message}")]
    #[diagnostic(code(spcompose::interpolation))]
    Interpolation { value: String, message: String },

    /// Validation error
    #[error("Validation failed: {0}")]
    #[diagnostic(code(spcompose::validation_failed))]
    ValidationFailed(String),

    /// The resolved model could not be serialized
    #[error("Failed to render project: {0}")]
    #[diagnostic(code(spcompose::render_failed))]
    Render(String),

    /// Failure inside an included file, with the include that led there
    #[error("Failed to resolve include {path:?}: {source}")]
    #[diagnostic(code(spcompose::include_failed))]
    Include {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// IO error passthrough
    #[error(transparent)]
    #[diagnostic(code(spcompose::io_error))]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap this error with the include that was being resolved.
    pub fn in_include(self, path: impl Into<PathBuf>) -> Self {
        Error::Include {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any include context.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Include { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
