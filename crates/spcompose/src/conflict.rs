// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Folding included resources into the document that included them.

use crate::document::{MergedDocument, pointer};
use crate::project::{ResourceKey, ResourceSources, Section};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./conflict_test.rs"]
mod conflict_test;

/// Tag every resource in `document` as declared by `source`.
pub fn tag_resources(document: &MergedDocument, source: &str) -> ResourceSources {
    let mut sources = ResourceSources::new();
    for section in Section::ALL {
        let Some(entries) = document.section(section.as_str()) else {
            continue;
        };
        for name in entries.keys().filter_map(|name| name.as_str()) {
            sources.insert(ResourceKey::new(section, name), source.to_string());
        }
    }
    sources
}

/// Fold the resources of `incoming` into `accumulator`.
///
/// A resource new to the accumulator is inserted. One already there from
/// the same source is a re-derivation of that source and is overwritten.
/// One already there from any other source is a conflict.
pub fn fold(
    accumulator: &mut MergedDocument,
    accumulator_sources: &mut ResourceSources,
    incoming: &MergedDocument,
    incoming_sources: &ResourceSources,
) -> Result<()> {
    for section in Section::ALL {
        let Some(entries) = incoming.section(section.as_str()) else {
            continue;
        };
        for name in entries.keys() {
            let Some(resource) = name.as_str() else {
                continue;
            };
            let key = ResourceKey::new(section, resource);
            let source = incoming_sources
                .get(&key)
                .cloned()
                .or_else(|| {
                    incoming
                        .origin_of(&pointer([section.as_str(), resource]))
                        .map(|origin| origin.source.clone())
                })
                .unwrap_or_default();

            match accumulator_sources.get(&key) {
                Some(existing) if *existing != source => {
                    return Err(Error::Conflict {
                        section: section.to_string(),
                        name: resource.to_string(),
                    });
                }
                Some(_) => {
                    tracing::debug!(resource = %key, "re-imported from the same source");
                }
                None => {}
            }

            accumulator.graft(section.as_str(), name, incoming);
            accumulator_sources.insert(key, source);
        }
    }
    Ok(())
}
