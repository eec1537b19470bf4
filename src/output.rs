//! Publishing the result to the surrounding CI job.
//!
//! GitHub Actions reads step outputs from the file named by `GITHUB_OUTPUT`
//! and exported variables from the file named by `GITHUB_ENV`; both take
//! `key=value` lines appended by the step. Outside Actions neither variable
//! is set and only the stdout line is written.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Step output name.
pub const OUTPUT_KEY: &str = "build-number";

/// Environment variable exported to later steps.
pub const ENV_KEY: &str = "BUILD_NUMBER";

/// Where the final value is published besides stdout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputSink {
    /// Step output file (`GITHUB_OUTPUT`).
    pub output_file: Option<PathBuf>,
    /// Job environment file (`GITHUB_ENV`).
    pub env_file: Option<PathBuf>,
}

impl OutputSink {
    /// Read the Actions file locations from the environment. Empty values
    /// count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            output_file: var("GITHUB_OUTPUT"),
            env_file: var("GITHUB_ENV"),
        }
    }

    /// Write `build-number=<value>` to `stdout` and append the output and
    /// env lines to whichever Actions files are configured.
    ///
    /// # Errors
    /// Any I/O error writing stdout or appending to the files.
    pub fn publish(&self, value: u64, stdout: &mut impl Write) -> io::Result<()> {
        writeln!(stdout, "{OUTPUT_KEY}={value}")?;
        stdout.flush()?;
        if let Some(path) = &self.output_file {
            append_line(path, &format!("{OUTPUT_KEY}={value}"))?;
        }
        if let Some(path) = &self.env_file {
            append_line(path, &format!("{ENV_KEY}={value}"))?;
        }
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    debug!(path = %path.display(), "{line}");
    Ok(())
}

/// Workflow command that marks the step failed in the Actions UI.
///
/// The message is escaped so multi-line errors stay one annotation.
#[must_use]
pub fn failure_annotation(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::Action failed with error: {escaped}")
}
