//! Library surface of the `rainode` binary, exposed for integration tests.

use std::path::PathBuf;

use clap::Args;

pub mod commands;
pub mod common;
pub mod errors;

/// Options shared by every subcommand.
#[derive(Args, Clone, Default)]
pub struct GlobalOpts {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Interpreter binary used to run scripts
    #[arg(long, global = true, default_value = "node")]
    pub node: PathBuf,

    /// TOML file providing host options, variables, and sections
    #[arg(long, global = true, value_name = "FILE")]
    pub host_config: Option<PathBuf>,
}

impl GlobalOpts {
    pub fn verbosity_level(&self) -> u8 {
        self.verbose
    }
}
