//! Shared plumbing for subcommands: host construction, settings, and the
//! script-source argument group.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use rainode_core::BridgeSettings;
use rainode_host::{HostApi, HostConfig, StaticHost};
use rainode_wrapper::ScriptSource;

use crate::errors::CliError;
use crate::GlobalOpts;

/// Script selection: a module path, or inline lines via repeated `--line`.
#[derive(Args, Clone)]
pub struct ScriptArgs {
    /// Path to the script module
    pub script: Option<PathBuf>,

    /// Inline script line; repeat the flag for multiple lines
    #[arg(long = "line", value_name = "JS", conflicts_with = "script")]
    pub lines: Vec<String>,
}

impl ScriptArgs {
    pub fn source(&self) -> Result<ScriptSource, CliError> {
        if let Some(path) = &self.script {
            return Ok(ScriptSource::File(path.clone()));
        }
        if !self.lines.is_empty() {
            return Ok(ScriptSource::Inline(self.lines.clone()));
        }
        Err(CliError::NoScript)
    }
}

/// Build the host boundary from `--host-config`, or an empty one.
pub fn load_host(global: &GlobalOpts) -> Result<Arc<dyn HostApi>, CliError> {
    let config = match &global.host_config {
        Some(path) => HostConfig::from_path(path)?,
        None => HostConfig::default(),
    };
    Ok(Arc::new(StaticHost::new(config)))
}

/// Bridge settings with the interpreter resolved against `PATH`.
pub fn settings(global: &GlobalOpts) -> Result<BridgeSettings, CliError> {
    let settings = BridgeSettings {
        node_command: global.node.clone(),
        ..BridgeSettings::default()
    };
    Ok(settings.locate_interpreter()?)
}
