//! Wrapper program generation.
//!
//! A wrapper is a self-contained Node.js program wrapped around a user
//! script. It redirects console output to tagged protocol lines, exposes the
//! `RM` host facade, loads the script once per process lifetime, and
//! dispatches the `init` / `update` / `custom` / `persistent` run modes.
//! Generation is pure; writing the artifact to the temp directory is a
//! separate step so callers control the file's lifecycle.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

mod call_expr;
mod codegen;

pub use call_expr::build_call_expression;

/// Where the user script comes from. The two forms are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Path to a script module loaded with `require`.
    File(PathBuf),
    /// Ordered inline source lines, joined with `\n` and compiled in-process.
    Inline(Vec<String>),
}

impl ScriptSource {
    /// The directory the subprocess should run in: the script's own
    /// directory for file scripts, the host's cwd otherwise.
    pub fn working_dir(&self) -> Option<PathBuf> {
        match self {
            ScriptSource::File(path) => path.parent().map(Path::to_path_buf),
            ScriptSource::Inline(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ScriptSource::File(path) => path.as_os_str().is_empty(),
            ScriptSource::Inline(lines) => lines.iter().all(|l| l.trim().is_empty()),
        }
    }
}

#[derive(Error, Debug)]
pub enum WrapperError {
    #[error("failed to write wrapper file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Generate the complete wrapper program text for a script source.
pub fn generate(source: &ScriptSource) -> String {
    codegen::generate(source)
}

/// Write wrapper text to a uniquely named file in the system temp directory.
///
/// The name carries a random suffix so concurrent instances never share a
/// wrapper artifact.
pub fn write_to_temp(wrapper_text: &str) -> Result<PathBuf, WrapperError> {
    let name = format!("RainNodeWrapper_{}.js", Uuid::new_v4().simple());
    let path = std::env::temp_dir().join(name);
    fs::write(&path, wrapper_text).map_err(|source| WrapperError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Best-effort removal of a previously written wrapper file.
pub fn remove_wrapper(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }
    let _ = fs::remove_file(path);
}
