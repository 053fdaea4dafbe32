// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Expansion of shorthand syntax into canonical form.

use serde_yaml::{Mapping, Value};

use crate::merge::pairs_to_mapping;
use crate::Result;

#[cfg(test)]
#[path = "./normalize_test.rs"]
mod normalize_test;

/// Rewrites a merged tree before it is validated.
pub trait Normalizer {
    fn normalize(&self, tree: Value) -> Result<Value>;
}

impl<F> Normalizer for F
where
    F: Fn(Value) -> Result<Value>,
{
    fn normalize(&self, tree: Value) -> Result<Value> {
        self(tree)
    }
}

/// Expands the short forms of service fields:
///
/// - `build: <context>` becomes `build: {context: <context>}`
/// - `KEY=VALUE` lists under `environment`, `labels` and `annotations`
///   become mappings
/// - a `depends_on` list becomes a mapping with `condition: service_started`
/// - a single `env_file` string becomes a list
#[derive(Debug, Clone, Copy, Default)]
pub struct ShorthandNormalizer;

impl Normalizer for ShorthandNormalizer {
    fn normalize(&self, mut tree: Value) -> Result<Value> {
        let Some(Value::Mapping(services)) = tree.get_mut("services") else {
            return Ok(tree);
        };
        for (_, service) in services.iter_mut() {
            if let Value::Mapping(service) = service {
                normalize_service(service);
            }
        }
        Ok(tree)
    }
}

fn normalize_service(service: &mut Mapping) {
    if let Some(build) = service.get_mut("build") {
        if let Value::String(context) = build {
            let mut expanded = Mapping::new();
            expanded.insert("context".into(), Value::String(context.clone()));
            *build = Value::Mapping(expanded);
        }
    }

    for field in ["environment", "labels", "annotations"] {
        if let Some(value) = service.get_mut(field) {
            if value.is_sequence() {
                *value = pairs_to_mapping(value, &['=']);
            }
        }
    }

    if let Some(depends_on) = service.get_mut("depends_on") {
        if let Value::Sequence(names) = depends_on {
            let expanded: Mapping = names
                .iter()
                .map(|name| {
                    let mut condition = Mapping::new();
                    condition.insert("condition".into(), "service_started".into());
                    (name.clone(), Value::Mapping(condition))
                })
                .collect();
            *depends_on = Value::Mapping(expanded);
        }
    }

    if let Some(env_file) = service.get_mut("env_file") {
        if env_file.is_string() {
            *env_file = Value::Sequence(vec![env_file.clone()]);
        }
    }
}
