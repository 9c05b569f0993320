//! `rainode wrapper`: emit the generated wrapper program for inspection.

use std::path::PathBuf;

use clap::Args;

use crate::common::ScriptArgs;
use crate::errors::CliError;

#[derive(Args)]
pub struct WrapperCommand {
    #[command(flatten)]
    pub script: ScriptArgs,

    /// Write the wrapper to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub fn handle_wrapper(cmd: WrapperCommand) -> Result<(), CliError> {
    let source = cmd.script.source()?;
    let text = rainode_wrapper::generate(&source);
    match cmd.output {
        Some(path) => {
            std::fs::write(&path, text)?;
            rainode_logger::success(&format!("wrapper written to {}", path.display()));
        }
        None => print!("{text}"),
    }
    Ok(())
}
