//! `rainode run`: load a script and drive update cycles against it.

use std::time::Duration;

use clap::Args;
use colored::Colorize;
use rainode_core::Registry;

use crate::common::{self, ScriptArgs};
use crate::errors::CliError;
use crate::GlobalOpts;

#[derive(Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub script: ScriptArgs,

    /// Number of update cycles to run
    #[arg(long, default_value_t = 3)]
    pub updates: u32,

    /// Delay between update cycles, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub interval: u64,
}

pub fn handle_run(cmd: RunCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let source = cmd.script.source()?;
    let host = common::load_host(global)?;
    let registry = Registry::new(common::settings(global)?);

    let measure = registry.register(host);
    rainode_logger::spinner_start("Initializing script");
    measure.reload(Some(source));
    rainode_logger::spinner_stop();

    for cycle in 1..=cmd.updates {
        measure.update();
        // The cycle runs in the background; give it the interval to land.
        std::thread::sleep(Duration::from_millis(cmd.interval));
        let display = measure
            .string_value()
            .unwrap_or_else(|| measure.value().to_string());
        println!("update {cycle}: {}", display.cyan());
    }

    let final_value = measure
        .string_value()
        .unwrap_or_else(|| measure.value().to_string());
    rainode_logger::success(&format!("final value: {final_value}"));

    registry.finalize_all();
    Ok(())
}
