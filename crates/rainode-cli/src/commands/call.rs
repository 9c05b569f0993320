//! `rainode call`: invoke one exported function and print its result.

use std::path::PathBuf;

use clap::Args;
use rainode_core::Registry;
use rainode_wrapper::ScriptSource;

use crate::common;
use crate::errors::CliError;
use crate::GlobalOpts;

#[derive(Args)]
pub struct CallCommand {
    /// Function name followed by its arguments, e.g. `add 2 3`
    #[arg(required = true, num_args = 1.., value_name = "EXPR")]
    pub expression: Vec<String>,

    /// Path to the script module
    #[arg(short, long, conflicts_with = "lines")]
    pub script: Option<PathBuf>,

    /// Inline script line; repeat the flag for multiple lines
    #[arg(long = "line", value_name = "JS")]
    pub lines: Vec<String>,
}

impl CallCommand {
    fn source(&self) -> Result<ScriptSource, CliError> {
        if let Some(path) = &self.script {
            return Ok(ScriptSource::File(path.clone()));
        }
        if !self.lines.is_empty() {
            return Ok(ScriptSource::Inline(self.lines.clone()));
        }
        Err(CliError::NoScript)
    }
}

pub fn handle_call(cmd: CallCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let source = cmd.source()?;
    let host = common::load_host(global)?;
    let registry = Registry::new(common::settings(global)?);

    let measure = registry.register(host);
    measure.reload(Some(source));

    match measure.call(&cmd.expression) {
        Some(result) => println!("{result}"),
        None => rainode_logger::warn("call produced no result"),
    }

    registry.finalize_all();
    Ok(())
}
