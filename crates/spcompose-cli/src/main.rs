// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! spcompose - Compose File Loader CLI

use clap::{Parser, Subcommand};
use miette::Result;

mod cmd_check;
mod cmd_config;
mod cmd_ls;
mod flags;

use cmd_check::CmdCheck;
use cmd_config::CmdConfig;
use cmd_ls::CmdLs;

#[derive(Parser)]
#[clap(
    name = "spcompose",
    about = "Compose File Loader",
    version,
    long_about = "Resolve compose files, their includes and variables into one project"
)]
struct Opt {
    #[clap(flatten)]
    logging: Logging,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Parser)]
struct Logging {
    /// Increase verbosity (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[clap(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved project
    Config(CmdConfig),

    /// List resources and the file that declared each
    Ls(CmdLs),

    /// Load and validate the project
    Check(CmdCheck),
}

impl Opt {
    fn run(self) -> Result<i32> {
        let log_level = match (self.logging.quiet, self.logging.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, 2) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .init();

        match self.cmd {
            Command::Config(mut cmd) => cmd.run(),
            Command::Ls(mut cmd) => cmd.run(),
            Command::Check(mut cmd) => cmd.run(),
        }
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    let code = opt.run()?;
    std::process::exit(code);
}
