// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Environment scopes used to interpolate fragments.
//!
//! Every fragment is interpolated against exactly one scope. A top-level
//! fragment sees its declared env files layered over the ambient
//! environment. An include sees only the env files its directive declares,
//! layered over whatever its declaring fragment passes down:
//!
//! - a top-level fragment passes down nothing, or the ambient environment
//!   when it is shared with includes,
//! - an included fragment passes down its whole scope.
//!
//! So the top-level env files never leak into includes, while an include's
//! env files stay visible to its own nested includes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::interpolate::interpolate_str;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./environment_test.rs"]
mod environment_test;

/// Variable name to value.
pub type Environment = BTreeMap<String, String>;

static ENV_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid env key pattern"));

/// Variables visible while interpolating one fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentScope {
    vars: Environment,
    /// What scopes for this fragment's includes start from.
    inherited: Environment,
}

impl EnvironmentScope {
    /// Scope for a top-level fragment.
    pub fn top_level(
        declared: &[PathBuf],
        ambient: &Environment,
        share_ambient_with_includes: bool,
    ) -> Result<Self> {
        let vars = build_environment(declared, ambient)?;
        let inherited = if share_ambient_with_includes {
            ambient.clone()
        } else {
            Environment::new()
        };
        Ok(Self { vars, inherited })
    }

    /// Scope for a fragment pulled in by an include declared inside the
    /// fragment this scope belongs to.
    pub fn for_include(&self, declared: &[PathBuf]) -> Result<Self> {
        let vars = build_environment(declared, &self.inherited)?;
        Ok(Self {
            inherited: vars.clone(),
            vars,
        })
    }

    /// Scope holding exactly `vars`, passed down unchanged to includes.
    #[cfg(test)]
    pub(crate) fn from_vars(vars: Environment) -> Self {
        Self {
            inherited: vars.clone(),
            vars,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> &Environment {
        &self.vars
    }
}

/// Layer env files over `base`, later files winning.
pub fn build_environment(declared: &[PathBuf], base: &Environment) -> Result<Environment> {
    let mut env = base.clone();
    for path in declared {
        let entries = load_env_file(path, &env)?;
        env.extend(entries);
    }
    Ok(env)
}

/// Read one env file. Values may reference variables from `base` or from
/// earlier lines of the same file.
pub fn load_env_file(path: &Path, base: &Environment) -> Result<Environment> {
    if !path.is_file() {
        return Err(Error::EnvFileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFailed {
        path: path.to_path_buf(),
        error: e,
    })?;
    tracing::debug!(path = %path.display(), "loaded env file");
    parse_env_content(&content, path, base)
}

/// Parse dotenv-style content.
pub fn parse_env_content(content: &str, path: &Path, base: &Environment) -> Result<Environment> {
    let mut entries = Environment::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let invalid = |message: &str| Error::InvalidEnvFile {
            path: path.to_path_buf(),
            line: line_no,
            message: message.to_string(),
        };

        let Some((key, raw_value)) = line.split_once('=') else {
            // bare name: take it from the surrounding environment, if any
            if !ENV_KEY.is_match(line) {
                return Err(invalid("invalid variable name"));
            }
            if let Some(value) = entries.get(line).or_else(|| base.get(line)).cloned() {
                entries.insert(line.to_string(), value);
            }
            continue;
        };

        let key = key.trim_end();
        if !ENV_KEY.is_match(key) {
            return Err(invalid("invalid variable name"));
        }

        let lookup = |name: &str| entries.get(name).or_else(|| base.get(name)).cloned();
        let raw_value = raw_value.trim_start();
        let value = if let Some(rest) = raw_value.strip_prefix('\'') {
            let Some(end) = rest.find('\'') else {
                return Err(invalid("unterminated single quote"));
            };
            rest[..end].to_string()
        } else if let Some(rest) = raw_value.strip_prefix('"') {
            let unescaped = unescape_double_quoted(rest).ok_or_else(|| invalid("unterminated double quote"))?;
            interpolate_str(&unescaped, &lookup)?
        } else {
            let unquoted = match raw_value.find(" #") {
                Some(pos) => &raw_value[..pos],
                None => raw_value,
            };
            interpolate_str(unquoted.trim_end(), &lookup)?
        };

        entries.insert(key.to_string(), value);
    }

    Ok(entries)
}

/// Content of a double-quoted value up to its closing quote. `\$` becomes
/// `$$` so interpolation leaves a literal dollar sign.
fn unescape_double_quoted(rest: &str) -> Option<String> {
    let mut out = String::with_capacity(rest.len());
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '$' => out.push_str("$$"),
                other => out.push(other),
            },
            other => out.push(other),
        }
    }
    None
}
