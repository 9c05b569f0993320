//! The host boundary of the bridge.
//!
//! [`HostApi`] is the synchronous capability surface a script subprocess can
//! reach through tagged request lines: execute a host command, read options
//! and variables from host configuration, query identity strings. The real
//! host supplies its own implementation; [`StaticHost`] is a TOML-backed
//! stand-in used by the CLI and tests.

use rainode_protocol::Severity;
use thiserror::Error;

mod dispatcher;
mod static_host;

pub use dispatcher::respond;
pub use static_host::{HostConfig, HostConfigError, StaticHost};

/// Error surfaced by a host-side read operation. The dispatcher never
/// propagates these; they degrade to the request's declared default.
#[derive(Error, Debug)]
#[error("host operation failed: {0}")]
pub struct HostError(pub String);

/// Synchronous host capability surface.
///
/// All reads are side-effect free; `execute` is the only operation that may
/// mutate host-visible state.
pub trait HostApi: Send + Sync {
    /// Fire-and-forget host action. No response line is written.
    fn execute(&self, command: &str);

    /// Replace `#Name#` variable references in `text`. Unknown references
    /// are left verbatim, which is how callers detect an undefined variable.
    fn replace_variable(&self, text: &str) -> Result<String, HostError>;

    fn read_string(&self, option: &str, default: &str) -> Result<String, HostError>;
    fn read_string_from_section(
        &self,
        section: &str,
        option: &str,
        default: &str,
    ) -> Result<String, HostError>;
    fn read_double(&self, option: &str, default: f64) -> Result<f64, HostError>;
    fn read_double_from_section(
        &self,
        section: &str,
        option: &str,
        default: f64,
    ) -> Result<f64, HostError>;
    fn read_int(&self, option: &str, default: i32) -> Result<i32, HostError>;
    fn read_int_from_section(
        &self,
        section: &str,
        option: &str,
        default: i32,
    ) -> Result<i32, HostError>;

    fn measure_name(&self) -> String;
    fn skin_name(&self) -> String;
    /// Opaque skin handle, stringified.
    fn skin(&self) -> String;
    /// Opaque skin window handle, stringified.
    fn skin_window(&self) -> String;

    fn log(&self, severity: Severity, message: &str);
}
