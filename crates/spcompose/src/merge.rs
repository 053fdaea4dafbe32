// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Merging of document trees.
//!
//! Documents are processed in order, with later documents layering on top
//! of earlier ones. How two values combine depends on where they live; the
//! [`STRATEGIES`] table maps field locations to a [`Strategy`] and
//! everything not listed falls back to:
//!
//! - mappings: merged key by key, recursively
//! - sequences and scalars: the overlay replaces the base
//!
//! Every value written from the overlay carries the overlay's provenance
//! into the result.

use serde_yaml::{Mapping, Value};

use crate::document::{MergedDocument, Pointer, Segment, key_segment};

#[cfg(test)]
#[path = "./merge_test.rs"]
mod merge_test;

/// How two values at the same location combine.
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// The overlay wins.
    Replace,
    /// Sequences are concatenated, skipping entries already present.
    Union,
    /// Like [`Strategy::Union`], but if either side is a mapping both are
    /// merged as mappings, with list entries becoming `entry: default()`.
    UnionOrMapping(fn() -> Value),
    /// Sequence elements with the same key are merged with each other;
    /// elements with a new key are appended.
    ByKey(fn(&Value) -> Option<String>),
    /// `KEY<sep>VALUE` sequences and mappings are both merged as mappings.
    Mapping(&'static [char]),
    /// Mappings merge key by key.
    Recurse,
}

/// Field locations with a non-default strategy. `*` matches any key.
pub static STRATEGIES: &[(&str, Strategy)] = &[
    ("services.*.annotations", Strategy::Mapping(&['='])),
    ("services.*.cap_add", Strategy::Union),
    ("services.*.cap_drop", Strategy::Union),
    ("services.*.configs", Strategy::ByKey(source_key)),
    ("services.*.depends_on", Strategy::UnionOrMapping(depends_on_entry)),
    ("services.*.devices", Strategy::ByKey(device_key)),
    ("services.*.dns", Strategy::Union),
    ("services.*.dns_opt", Strategy::Union),
    ("services.*.dns_search", Strategy::Union),
    ("services.*.env_file", Strategy::Union),
    ("services.*.environment", Strategy::Mapping(&['='])),
    ("services.*.external_links", Strategy::Union),
    ("services.*.extra_hosts", Strategy::Mapping(&['=', ':'])),
    ("services.*.group_add", Strategy::Union),
    ("services.*.labels", Strategy::Mapping(&['='])),
    ("services.*.links", Strategy::Union),
    ("services.*.networks", Strategy::UnionOrMapping(network_entry)),
    ("services.*.ports", Strategy::ByKey(port_key)),
    ("services.*.profiles", Strategy::Union),
    ("services.*.secrets", Strategy::ByKey(source_key)),
    ("services.*.security_opt", Strategy::Union),
    ("services.*.sysctls", Strategy::Mapping(&['='])),
    ("services.*.volumes", Strategy::ByKey(volume_key)),
    ("services.*.volumes_from", Strategy::Union),
];

/// The strategy for a location in the tree.
pub fn strategy_for(ptr: &[Segment]) -> Option<Strategy> {
    STRATEGIES
        .iter()
        .find(|(pattern, _)| pattern_matches(pattern, ptr))
        .map(|(_, strategy)| *strategy)
}

fn pattern_matches(pattern: &str, ptr: &[Segment]) -> bool {
    let parts: Vec<&str> = pattern.split('.').collect();
    parts.len() == ptr.len()
        && parts.iter().zip(ptr).all(|(part, segment)| match segment {
            Segment::Key(key) => *part == "*" || part == key,
            Segment::Index(_) => false,
        })
}

fn depends_on_entry() -> Value {
    let mut entry = Mapping::new();
    entry.insert("condition".into(), "service_started".into());
    Value::Mapping(entry)
}

fn network_entry() -> Value {
    Value::Null
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field(value: &Value, name: &str) -> String {
    value.get(name).and_then(scalar_string).unwrap_or_default()
}

/// `host_ip:published:target/protocol` identity for a port entry, in
/// either syntax.
fn port_key(value: &Value) -> Option<String> {
    let (host_ip, published, target, protocol) = match value {
        Value::Mapping(_) => (
            field(value, "host_ip"),
            field(value, "published"),
            field(value, "target"),
            field(value, "protocol"),
        ),
        other => parse_short_port(&scalar_string(other)?)?,
    };
    let protocol = if protocol.is_empty() { "tcp".to_string() } else { protocol };
    Some(format!("{host_ip}:{published}:{target}/{protocol}"))
}

/// Split `[host_ip:][published:]target[/protocol]`.
fn parse_short_port(spec: &str) -> Option<(String, String, String, String)> {
    let (addr, protocol) = spec.rsplit_once('/').unwrap_or((spec, ""));
    let (host_ip, rest) = match addr.strip_prefix('[') {
        Some(bracketed) => bracketed.split_once("]:")?,
        None => ("", addr),
    };
    let parts: Vec<&str> = rest.split(':').collect();
    let (host_ip, published, target) = match parts.as_slice() {
        [target] => (host_ip, "", *target),
        [published, target] => (host_ip, *published, *target),
        [ip, published, target] if host_ip.is_empty() => (*ip, *published, *target),
        _ => return Some((String::new(), String::new(), spec.to_string(), String::new())),
    };
    Some((
        host_ip.to_string(),
        published.to_string(),
        target.to_string(),
        protocol.to_string(),
    ))
}

/// Mount target of a volume entry, in either syntax.
fn volume_key(value: &Value) -> Option<String> {
    match value {
        Value::Mapping(_) => value.get("target").and_then(scalar_string),
        Value::String(s) => {
            let mut parts = s.split(':');
            let first = parts.next()?;
            Some(parts.next().unwrap_or(first).to_string())
        }
        _ => None,
    }
}

fn source_key(value: &Value) -> Option<String> {
    match value {
        Value::Mapping(_) => value.get("source").and_then(scalar_string),
        other => scalar_string(other),
    }
}

fn device_key(value: &Value) -> Option<String> {
    match value {
        Value::Mapping(_) => value.get("target").and_then(scalar_string),
        Value::String(s) => {
            let mut parts = s.split(':');
            let first = parts.next()?;
            Some(parts.next().unwrap_or(first).to_string())
        }
        _ => None,
    }
}

/// Merge `overlay` on top of `base`.
pub fn merge(base: MergedDocument, overlay: &MergedDocument) -> MergedDocument {
    let mut result = base;
    let remap = result.import_origins(overlay);
    let mut tree = std::mem::replace(&mut result.tree, Value::Null);

    let mut merger = Merger {
        result: &mut result,
        overlay,
        remap: &remap,
    };
    merger.merge_at(&mut tree, overlay.tree(), &Vec::new(), &Vec::new());

    result.tree = tree;
    result
}

/// Merge documents left to right.
pub fn merge_all<I>(documents: I) -> MergedDocument
where
    I: IntoIterator<Item = MergedDocument>,
{
    documents
        .into_iter()
        .fold(MergedDocument::default(), |acc, doc| merge(acc, &doc))
}

struct Merger<'a> {
    result: &'a mut MergedDocument,
    overlay: &'a MergedDocument,
    remap: &'a [usize],
}

impl Merger<'_> {
    fn merge_at(&mut self, base: &mut Value, overlay: &Value, at: &Pointer, from: &Pointer) {
        let strategy = strategy_for(at).unwrap_or(Strategy::Recurse);
        if overlay.is_null() && !matches!(strategy, Strategy::Replace) {
            // An empty key sets nothing.
            return;
        }

        match strategy {
            Strategy::Replace => self.replace(base, overlay, at, from),

            Strategy::Union | Strategy::UnionOrMapping(_)
                if base.is_sequence() && overlay.is_sequence() =>
            {
                if let (Value::Sequence(items), Value::Sequence(extra)) = (base, overlay) {
                    self.union(items, extra, at, from);
                }
            }

            Strategy::UnionOrMapping(entry) if base.is_mapping() || overlay.is_mapping() => {
                *base = list_to_mapping(base, entry);
                let from_list = overlay.is_sequence();
                let converted = list_to_mapping(overlay, entry);
                self.merge_mappings(base, &converted, at, from, from_list);
            }

            Strategy::ByKey(key_of) if base.is_sequence() && overlay.is_sequence() => {
                if let (Value::Sequence(items), Value::Sequence(extra)) = (base, overlay) {
                    self.merge_by_key(items, extra, key_of, at, from);
                }
            }

            Strategy::Mapping(separators)
                if is_list_or_mapping(base) && is_list_or_mapping(overlay) =>
            {
                self.merge_pairs(base, overlay, separators, at, from);
            }

            _ if base.is_mapping() && overlay.is_mapping() => {
                self.merge_mappings(base, overlay, at, from, false)
            }

            _ => self.replace(base, overlay, at, from),
        }
    }

    /// Mappings merge key by key. When `from_list` is set the overlay was
    /// rebuilt from a list: its entries only assert presence, so existing
    /// keys are kept and new keys take the overlay field's origin.
    fn merge_mappings(
        &mut self,
        base: &mut Value,
        overlay: &Value,
        at: &Pointer,
        from: &Pointer,
        from_list: bool,
    ) {
        let (Value::Mapping(base_map), Value::Mapping(overlay_map)) = (base, overlay) else {
            return;
        };
        for (key, value) in overlay_map {
            let mut key_at = at.clone();
            key_at.push(key_segment(key));

            if from_list {
                if !base_map.contains_key(key) {
                    base_map.insert(key.clone(), value.clone());
                    self.record_origin(&key_at, from);
                }
                continue;
            }

            let mut key_from = from.clone();
            key_from.push(key_segment(key));
            match base_map.get_mut(key) {
                Some(existing) => self.merge_at(existing, value, &key_at, &key_from),
                None => {
                    base_map.insert(key.clone(), value.clone());
                    self.adopt(&key_at, &key_from);
                }
            }
        }
    }

    fn merge_by_key(
        &mut self,
        items: &mut Vec<Value>,
        extra: &[Value],
        key_of: fn(&Value) -> Option<String>,
        at: &Pointer,
        from: &Pointer,
    ) {
        for (j, element) in extra.iter().enumerate() {
            let mut element_from = from.clone();
            element_from.push(Segment::Index(j));

            let matched = key_of(element).and_then(|key| {
                items
                    .iter()
                    .position(|item| key_of(item).as_ref() == Some(&key))
            });
            let mut element_at = at.clone();
            match matched {
                Some(i) => {
                    element_at.push(Segment::Index(i));
                    let existing = &mut items[i];
                    if existing.is_mapping() && element.is_mapping() {
                        self.merge_mappings(existing, element, &element_at, &element_from, false);
                    } else {
                        self.replace(existing, element, &element_at, &element_from);
                    }
                }
                None => {
                    element_at.push(Segment::Index(items.len()));
                    items.push(element.clone());
                    self.adopt(&element_at, &element_from);
                }
            }
        }
    }

    /// `KEY=VALUE` lists and mappings, merged as mappings of scalars.
    fn merge_pairs(
        &mut self,
        base: &mut Value,
        overlay: &Value,
        separators: &[char],
        at: &Pointer,
        from: &Pointer,
    ) {
        let base_origin = self.result.origin_index_of(at);
        let mut merged = match pairs_to_mapping(base, separators) {
            Value::Mapping(map) => map,
            _ => Mapping::new(),
        };
        self.result.clear_under(at);
        if let Some(origin) = base_origin {
            self.result.record(at, origin);
        }

        if let Value::Mapping(extra) = pairs_to_mapping(overlay, separators) {
            for (key, value) in extra {
                let mut key_at = at.clone();
                key_at.push(key_segment(&key));
                merged.insert(key, value);
                self.record_origin(&key_at, from);
            }
        }
        *base = Value::Mapping(merged);
    }

    fn union(&mut self, items: &mut Vec<Value>, extra: &[Value], at: &Pointer, from: &Pointer) {
        for (j, element) in extra.iter().enumerate() {
            if items.contains(element) {
                continue;
            }
            let mut element_at = at.clone();
            element_at.push(Segment::Index(items.len()));
            let mut element_from = from.clone();
            element_from.push(Segment::Index(j));
            items.push(element.clone());
            self.adopt(&element_at, &element_from);
        }
    }

    fn replace(&mut self, base: &mut Value, overlay: &Value, at: &Pointer, from: &Pointer) {
        *base = overlay.clone();
        self.adopt(at, from);
    }

    /// `at` now holds the overlay's subtree from `from`.
    fn adopt(&mut self, at: &Pointer, from: &Pointer) {
        self.result.adopt_provenance(at, self.overlay, from, self.remap);
    }

    /// `at` now holds a value derived from the overlay's `from`.
    fn record_origin(&mut self, at: &Pointer, from: &Pointer) {
        self.result.clear_under(at);
        if let Some(index) = self.overlay.origin_index_of(from) {
            self.result.record(at, self.remap[index]);
        }
    }
}

fn is_list_or_mapping(value: &Value) -> bool {
    value.is_sequence() || value.is_mapping()
}

fn list_to_mapping(value: &Value, entry: fn() -> Value) -> Value {
    match value {
        Value::Sequence(items) => Value::Mapping(
            items
                .iter()
                .map(|item| (item.clone(), entry()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Turn `KEY=VALUE` entries into a mapping. A bare `KEY` maps to null.
pub fn pairs_to_mapping(value: &Value, separators: &[char]) -> Value {
    match value {
        Value::Sequence(items) => Value::Mapping(
            items
                .iter()
                .filter_map(|item| {
                    let entry = scalar_string(item)?;
                    Some(match entry.split_once(separators) {
                        Some((key, value)) => (Value::from(key), Value::from(value)),
                        None => (Value::from(entry), Value::Null),
                    })
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
