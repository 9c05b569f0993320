use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    HostConfig(#[from] rainode_host::HostConfigError),

    #[error(transparent)]
    Bridge(#[from] rainode_core::BridgeError),

    #[error("no script given; pass a script path or --line")]
    NoScript,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
