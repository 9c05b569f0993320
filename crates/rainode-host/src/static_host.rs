//! TOML-backed [`HostApi`] implementation.
//!
//! The real host owns its configuration store; this stand-in loads a static
//! snapshot from a TOML file so the CLI and tests can run scripts against a
//! fully functional host boundary.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rainode_protocol::Severity;
use serde::Deserialize;
use thiserror::Error;

use crate::{HostApi, HostError};

#[derive(Error, Debug)]
pub enum HostConfigError {
    #[error("failed to read host config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse host config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Static host configuration snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Name reported for the calling measure.
    pub measure_name: String,
    /// Name reported for the owning skin.
    pub skin_name: String,
    /// Options of the measure's own section (`ReadString` et al.).
    pub options: BTreeMap<String, String>,
    /// `#Variable#` values for `GetVariable`.
    pub variables: BTreeMap<String, String>,
    /// Options of other sections (`ReadStringFromSection` et al.).
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl HostConfig {
    pub fn from_toml(text: &str) -> Result<Self, HostConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, HostConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| HostConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

/// [`HostApi`] over a [`HostConfig`] snapshot. Executed commands are
/// recorded so callers (and tests) can observe them.
#[derive(Default)]
pub struct StaticHost {
    config: HostConfig,
    executed: Mutex<Vec<String>>,
}

impl StaticHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Commands received through `execute`, in order.
    pub fn executed_commands(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|cmds| cmds.clone())
            .unwrap_or_default()
    }

    fn option(&self, section: &str, option: &str) -> Option<&String> {
        if section.is_empty() {
            self.config.options.get(option)
        } else {
            self.config.sections.get(section)?.get(option)
        }
    }
}

impl HostApi for StaticHost {
    fn execute(&self, command: &str) {
        rainode_logger::notice(&format!("Execute: {command}"));
        if let Ok(mut cmds) = self.executed.lock() {
            cmds.push(command.to_string());
        }
    }

    fn replace_variable(&self, text: &str) -> Result<String, HostError> {
        let mut out = text.to_string();
        for (name, value) in &self.config.variables {
            out = out.replace(&format!("#{name}#"), value);
        }
        Ok(out)
    }

    fn read_string(&self, option: &str, default: &str) -> Result<String, HostError> {
        Ok(self
            .option("", option)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }

    fn read_string_from_section(
        &self,
        section: &str,
        option: &str,
        default: &str,
    ) -> Result<String, HostError> {
        Ok(self
            .option(section, option)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }

    fn read_double(&self, option: &str, default: f64) -> Result<f64, HostError> {
        Ok(self
            .option("", option)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }

    fn read_double_from_section(
        &self,
        section: &str,
        option: &str,
        default: f64,
    ) -> Result<f64, HostError> {
        Ok(self
            .option(section, option)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }

    fn read_int(&self, option: &str, default: i32) -> Result<i32, HostError> {
        Ok(self
            .option("", option)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }

    fn read_int_from_section(
        &self,
        section: &str,
        option: &str,
        default: i32,
    ) -> Result<i32, HostError> {
        Ok(self
            .option(section, option)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }

    fn measure_name(&self) -> String {
        self.config.measure_name.clone()
    }

    fn skin_name(&self) -> String {
        self.config.skin_name.clone()
    }

    fn skin(&self) -> String {
        // Opaque handle; a static host has none.
        String::new()
    }

    fn skin_window(&self) -> String {
        String::new()
    }

    fn log(&self, severity: Severity, message: &str) {
        rainode_logger::script(severity, message);
    }
}
