// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! spcompose - Compose File Loader
//!
//! This crate turns one or more compose documents into a single resolved
//! project model: includes are pulled in, documents are merged, variables
//! are interpolated and relative paths are made absolute.
//!
//! # Overview
//!
//! Each top-level document is interpolated against its own environment and
//! has its `include` section resolved into sub-projects. Every include is
//! interpolated against only the env files it declares, so variables set
//! for the top-level project never leak into it. Resources pulled in from
//! an include may not clash with resources declared elsewhere, while a
//! later top-level document may still override them.
//!
//! # Example
//!
//! ```yaml
//! # compose.yaml
//! name: shop
//!
//! include:
//!   - ../database/compose.yaml
//!   - path: ./monitoring/compose.yaml
//!     env_file: ./monitoring/.env
//!
//! services:
//!   web:
//!     build: .
//!     depends_on:
//!       - db
//! ```

pub mod conflict;
pub mod document;
pub mod environment;
pub mod error;
pub mod include;
pub mod interpolate;
pub mod loader;
pub mod merge;
pub mod normalize;
pub mod paths;
pub mod project;
pub mod validate;

pub use document::{Fragment, MergedDocument, Origin, Pointer, Segment};
pub use environment::{Environment, EnvironmentScope};
pub use error::{Error, Result};
pub use include::{IncludeDirective, IncludeSearchOrder};
pub use loader::{ConfigDetails, ConfigSource, LoadOptions, Loader, load};
pub use merge::{Strategy, merge, merge_all};
pub use normalize::{Normalizer, ShorthandNormalizer};
pub use paths::PathResolver;
pub use project::{Project, ResourceKey, Section};
pub use validate::{StructureValidator, Validator};

/// Well-known compose filenames, in lookup order.
pub const DEFAULT_FILENAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yml",
    "docker-compose.yaml",
];

/// Find the first well-known compose file in `dir`.
pub fn find_default_file<P: AsRef<std::path::Path>>(dir: P) -> Option<std::path::PathBuf> {
    DEFAULT_FILENAMES
        .iter()
        .map(|name| dir.as_ref().join(name))
        .find(|path| path.is_file())
}
