// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Load and validate a project without printing it.

use clap::Args;
use colored::Colorize;
use miette::Result;

use crate::flags::ProjectFlags;

/// Load and validate the project
#[derive(Debug, Args)]
pub struct CmdCheck {
    #[clap(flatten)]
    project: ProjectFlags,
}

impl CmdCheck {
    pub fn run(&mut self) -> Result<i32> {
        let details = self.project.details()?;
        let project = spcompose::load(&details, self.project.options())?;

        println!(
            "{} {} ({} services, {} files)",
            "✓".green(),
            project.name,
            project.service_names().len(),
            project.source_files.len()
        );
        Ok(0)
    }
}
