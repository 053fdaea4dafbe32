// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Structural checks on the merged tree.

use serde_yaml::Value;

use crate::project::Section;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./validate_test.rs"]
mod validate_test;

/// Accepts or rejects a merged tree.
pub trait Validator {
    fn validate(&self, tree: &Value) -> Result<()>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<()>,
{
    fn validate(&self, tree: &Value) -> Result<()> {
        self(tree)
    }
}

/// Checks the shape of the resource sections and that every service says
/// how to get its image.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureValidator;

impl Validator for StructureValidator {
    fn validate(&self, tree: &Value) -> Result<()> {
        let Value::Mapping(root) = tree else {
            return Err(Error::ValidationFailed(
                "top-level object must be a mapping".to_string(),
            ));
        };

        for section in Section::ALL {
            let entries = match root.get(section.as_str()) {
                None | Some(Value::Null) => continue,
                Some(Value::Mapping(entries)) => entries,
                Some(_) => {
                    return Err(Error::ValidationFailed(format!(
                        "{section} must be a mapping"
                    )));
                }
            };

            for (name, definition) in entries {
                let Some(name) = name.as_str() else {
                    return Err(Error::ValidationFailed(format!(
                        "{section} names must be strings"
                    )));
                };
                match (section, definition) {
                    (Section::Services, Value::Mapping(service)) => {
                        if !service.contains_key("image") && !service.contains_key("build") {
                            return Err(Error::ValidationFailed(format!(
                                "service {name:?} has neither an image nor a build context specified"
                            )));
                        }
                    }
                    (Section::Services, _) => {
                        return Err(Error::ValidationFailed(format!(
                            "{section}.{name} must be a mapping"
                        )));
                    }
                    (_, Value::Null | Value::Mapping(_)) => {}
                    (_, _) => {
                        return Err(Error::ValidationFailed(format!(
                            "{section}.{name} must be a mapping"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
