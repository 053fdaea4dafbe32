// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `spcompose config` command.

use clap::Args;
use miette::Result;

use crate::flags::ProjectFlags;

/// Print the resolved project
#[derive(Debug, Args)]
pub struct CmdConfig {
    #[clap(flatten)]
    project: ProjectFlags,

    /// Output format: yaml, json
    #[clap(long, default_value = "yaml")]
    format: String,

    /// Print the hash of the given services, or `*` for all of them
    #[clap(long, value_name = "SERVICE")]
    hash: Option<String>,

    /// Print only the service names
    #[clap(long)]
    services: bool,

    /// Keep relative paths as written
    #[clap(long)]
    no_resolve_paths: bool,

    /// Keep short syntax as written
    #[clap(long)]
    no_normalize: bool,

    /// Leave variable references unexpanded
    #[clap(long)]
    no_interpolate: bool,
}

impl CmdConfig {
    pub fn run(&mut self) -> Result<i32> {
        let details = self.project.details()?;
        let options = spcompose::LoadOptions {
            resolve_paths: !self.no_resolve_paths,
            skip_normalization: self.no_normalize,
            skip_interpolation: self.no_interpolate,
            ..self.project.options()
        };
        let project = spcompose::load(&details, options)?;

        if self.services {
            for name in project.service_names() {
                println!("{name}");
            }
            return Ok(0);
        }

        if let Some(selection) = &self.hash {
            let names: Vec<&str> = if selection == "*" {
                project.service_names()
            } else {
                selection.split(',').map(str::trim).collect()
            };
            for name in names {
                println!("{name} {}", project.service_hash(name)?);
            }
            return Ok(0);
        }

        let rendered = match self.format.as_str() {
            "yaml" => project.to_yaml()?,
            "json" => project.to_json()?,
            other => {
                return Err(miette::miette!(
                    help = "Use one of: yaml, json",
                    "Unknown output format: {other}"
                ));
            }
        };
        print!("{rendered}");
        if !rendered.ends_with('\n') {
            println!();
        }
        Ok(0)
    }
}
