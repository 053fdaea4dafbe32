// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `spcompose ls` command.

use clap::Args;
use colored::Colorize;
use miette::Result;
use spcompose::{Project, Section};

use crate::flags::ProjectFlags;

/// List resources and the file that declared each
#[derive(Debug, Args)]
pub struct CmdLs {
    #[clap(flatten)]
    project: ProjectFlags,

    /// Only list this section (services, networks, volumes, secrets, configs)
    #[clap(long)]
    section: Option<Section>,

    /// Also list every file read while loading
    #[clap(long)]
    files: bool,
}

impl CmdLs {
    pub fn run(&mut self) -> Result<i32> {
        let details = self.project.details()?;
        let project = spcompose::load(&details, self.project.options())?;

        println!("{} {}", "Project:".bold(), project.name.green());
        println!();

        let sections = match self.section {
            Some(section) => vec![section],
            None => Section::ALL.to_vec(),
        };
        for section in sections {
            self.show_section(&project, section);
        }

        if self.files {
            println!("{}", "Files:".bold());
            for (i, path) in project.source_files.iter().enumerate() {
                println!("  {}. {}", i + 1, path.display().to_string().cyan());
            }
        }

        Ok(0)
    }

    fn show_section(&self, project: &Project, section: Section) {
        let names = project.names(section);
        if names.is_empty() && self.section.is_none() {
            return;
        }

        println!("{}", format!("{section}:").bold());
        if names.is_empty() {
            println!("  {}", "(none)".dimmed());
        }
        for name in names {
            let source = project.source_of(section, name).unwrap_or("<unknown>");
            println!("  {} {}", name.cyan(), source.dimmed());
        }
        println!();
    }
}
