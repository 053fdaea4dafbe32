// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Variable substitution in document values.
//!
//! Supported forms:
//!
//! | syntax | result |
//! |--------|--------|
//! | `$VAR`, `${VAR}` | value, or empty when unset |
//! | `${VAR:-default}` | `default` when unset or empty |
//! | `${VAR-default}` | `default` when unset |
//! | `${VAR:?message}` | error when unset or empty |
//! | `${VAR?message}` | error when unset |
//! | `${VAR:+alt}` | `alt` when set and non-empty |
//! | `${VAR+alt}` | `alt` when set |
//! | `$$` | a literal `$` |
//!
//! Defaults and alternatives may themselves contain references.

use serde_yaml::Value;

use crate::environment::EnvironmentScope;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./interpolate_test.rs"]
mod interpolate_test;

/// Substitute every variable reference in `input`.
pub fn interpolate_str<F>(input: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = matching_brace(body).ok_or_else(|| Error::Interpolation {
                value: input.to_string(),
                message: "unclosed variable reference".to_string(),
            })?;
            out.push_str(&expand_braced(&body[..end], input, lookup)?);
            rest = &body[end + 1..];
        } else {
            let len = name_len(after);
            if len == 0 {
                out.push('$');
                rest = after;
            } else {
                let name = &after[..len];
                out.push_str(&lookup_or_warn(name, lookup));
                rest = &after[len..];
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Byte length of the variable name at the start of `s`.
fn name_len(s: &str) -> usize {
    let mut len = 0;
    for (i, c) in s.char_indices() {
        let valid = c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit());
        if !valid {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

/// Position of the `}` closing a `${`, honouring nested references.
fn matching_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 1;
            }
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

fn lookup_or_warn<F>(name: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).unwrap_or_else(|| {
        tracing::warn!("The {name:?} variable is not set. Defaulting to a blank string.");
        String::new()
    })
}

fn expand_braced<F>(body: &str, input: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let len = name_len(body);
    let invalid = || Error::Interpolation {
        value: input.to_string(),
        message: format!("invalid variable reference ${{{body}}}"),
    };
    if len == 0 {
        return Err(invalid());
    }
    let name = &body[..len];
    let op = &body[len..];
    let value = lookup(name);

    let (strict, op) = match op.strip_prefix(':') {
        Some(op) => (true, op),
        None => (false, op),
    };
    // with `:` an empty value counts as unset
    let is_set = match &value {
        Some(v) => !(strict && v.is_empty()),
        None => false,
    };

    if op.is_empty() {
        if strict {
            return Err(invalid());
        }
        return Ok(lookup_or_warn(name, lookup));
    }

    let (kind, arg) = match op.chars().next() {
        Some(c @ ('-' | '?' | '+')) => (c, &op[1..]),
        _ => return Err(invalid()),
    };
    match kind {
        '-' if is_set => Ok(value.unwrap_or_default()),
        '-' => interpolate_str(arg, lookup),
        '?' if is_set => Ok(value.unwrap_or_default()),
        '?' => {
            let message = interpolate_str(arg, lookup)?;
            Err(Error::Interpolation {
                value: input.to_string(),
                message: if message.is_empty() {
                    format!("required variable {name} is missing a value")
                } else {
                    format!("required variable {name} is missing a value: {message}")
                },
            })
        }
        '+' if is_set => interpolate_str(arg, lookup),
        _ => Ok(String::new()),
    }
}

/// Interpolate every string value in the tree. Mapping keys are left alone.
pub fn interpolate_tree(value: &mut Value, scope: &EnvironmentScope) -> Result<()> {
    let lookup = |name: &str| scope.get(name).map(str::to_string);
    interpolate_value(value, &lookup)
}

fn interpolate_value<F>(value: &mut Value, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate_str(s, lookup)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, lookup)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, lookup)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, lookup)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Fill service environment entries declared without a value from the scope.
///
/// `- NAME` and `NAME:` take the scope's value when it defines one and are
/// left unset otherwise.
pub fn resolve_environment(tree: &mut Value, scope: &EnvironmentScope) {
    let Some(Value::Mapping(services)) = tree.get_mut("services") else {
        return;
    };
    for (_, service) in services.iter_mut() {
        let Some(environment) = service.get_mut("environment") else {
            continue;
        };
        match environment {
            Value::Sequence(entries) => {
                for entry in entries.iter_mut() {
                    if let Value::String(name) = entry {
                        if name.contains('=') {
                            continue;
                        }
                        if let Some(value) = scope.get(name) {
                            *name = format!("{name}={value}");
                        }
                    }
                }
            }
            Value::Mapping(entries) => {
                for (key, value) in entries.iter_mut() {
                    if !value.is_null() {
                        continue;
                    }
                    if let Some(found) = key.as_str().and_then(|name| scope.get(name)) {
                        *value = Value::String(found.to_string());
                    }
                }
            }
            _ => {}
        }
    }
}
