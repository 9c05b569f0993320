use clap::{Parser, Subcommand};
use rainode::{
    commands::{call, run, wrapper},
    GlobalOpts,
};
use rainode_logger as logger;

#[derive(Parser)]
#[command(name = "rainode")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Run Node.js measure scripts against a host boundary",
    long_about = "rainode loads a Node.js measure script into a wrapped interpreter \
subprocess and drives its initialize/update/custom lifecycle over a tagged line protocol."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a script and run update cycles against it
    Run(run::RunCommand),
    /// Invoke one exported function and print its result
    Call(call::CallCommand),
    /// Emit the generated wrapper program for inspection
    Wrapper(wrapper::WrapperCommand),
    /// Show the log file location
    LogPath,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_with_verbosity(cli.global.verbosity_level()) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }

    match cli.command {
        Commands::Run(cmd) => {
            if let Err(e) = run::handle_run(cmd, &cli.global) {
                logger::error(&format!("Run command failed: {}", e));
                std::process::exit(1);
            }
        }
        Commands::Call(cmd) => {
            if let Err(e) = call::handle_call(cmd, &cli.global) {
                logger::error(&format!("Call command failed: {}", e));
                std::process::exit(1);
            }
        }
        Commands::Wrapper(cmd) => {
            if let Err(e) = wrapper::handle_wrapper(cmd) {
                logger::error(&format!("Wrapper command failed: {}", e));
                std::process::exit(1);
            }
        }
        Commands::LogPath => {
            logger::show_log_path();
        }
    }
}
