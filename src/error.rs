//! Error taxonomy for the build pipeline.
//!
//! Every project-scoped error carries the project name so that a failed run
//! can always say which library broke and in which stage. Tool failures keep
//! the full command line and captured output so the failing step can be
//! reproduced by hand.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a project-scoped error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lock,
    Fetch,
    Prepare,
    Bootstrap,
    Build,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Lock => write!(f, "lock"),
            Stage::Fetch => write!(f, "fetch"),
            Stage::Prepare => write!(f, "prepare"),
            Stage::Bootstrap => write!(f, "bootstrap"),
            Stage::Build => write!(f, "build"),
            Stage::Verify => write!(f, "verify"),
        }
    }
}

/// Captured output of an external tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Command line as it would be typed in a shell.
    pub command: String,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  command: {}", self.command)?;
        match self.status {
            Some(code) => write!(f, "\n  exit code: {}", code)?,
            None => write!(f, "\n  exit code: none (killed)")?,
        }
        if !self.stdout.trim().is_empty() {
            write!(f, "\n  stdout:\n{}", self.stdout.trim_end())?;
        }
        if !self.stderr.trim().is_empty() {
            write!(f, "\n  stderr:\n{}", self.stderr.trim_end())?;
        }
        Ok(())
    }
}

fn with_output(output: &Option<ToolOutput>) -> String {
    match output {
        Some(out) => format!("\n{}", out),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Downloaded or cached archive does not match its declared digest.
    #[error("{project}: checksum mismatch for {url}\n  expected: {expected}\n  actual:   {actual}")]
    Integrity {
        project: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("{project}: failed to fetch {url}: {message}")]
    Fetch {
        project: String,
        url: String,
        message: String,
    },

    #[error("{project}: failed to extract '{}': {message}", .archive.display())]
    Extraction {
        project: String,
        archive: PathBuf,
        message: String,
    },

    #[error("{project}: failed to patch '{}': {message}{}", .file.display(), with_output(.output))]
    Patch {
        project: String,
        file: PathBuf,
        message: String,
        output: Option<ToolOutput>,
    },

    #[error("{project}: bootstrap failed: {message}{}", with_output(.output))]
    Bootstrap {
        project: String,
        message: String,
        output: Option<ToolOutput>,
    },

    #[error("{project}: build failed: {message}{}", with_output(.output))]
    Build {
        project: String,
        message: String,
        output: Option<ToolOutput>,
    },

    /// The build tools succeeded but none of the project's sentinels exist.
    #[error("{project}: build finished but installed none of: {}", .sentinels.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    Verify {
        project: String,
        sentinels: Vec<PathBuf>,
    },

    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{project}: locked by another invocation ({})", .path.display())]
    Lock { project: String, path: PathBuf },

    #[error("{project}: lock file '{}': {message}", .path.display())]
    LockFile {
        project: String,
        path: PathBuf,
        message: String,
    },

    #[error("{project}: cancelled during {stage}")]
    Cancelled { project: String, stage: Stage },

    #[error("missing required host tools:\n{0}")]
    Preflight(String),
}

impl Error {
    /// Project the error belongs to, if it is project-scoped.
    pub fn project(&self) -> Option<&str> {
        match self {
            Error::Integrity { project, .. }
            | Error::Fetch { project, .. }
            | Error::Extraction { project, .. }
            | Error::Patch { project, .. }
            | Error::Bootstrap { project, .. }
            | Error::Build { project, .. }
            | Error::Verify { project, .. }
            | Error::Lock { project, .. }
            | Error::LockFile { project, .. }
            | Error::Cancelled { project, .. } => Some(project),
            Error::Cycle { .. } | Error::Config(_) | Error::Preflight(_) => None,
        }
    }

    /// Stage the error originated from, if it is project-scoped.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Integrity { .. } | Error::Fetch { .. } => Some(Stage::Fetch),
            Error::Extraction { .. } | Error::Patch { .. } => Some(Stage::Prepare),
            Error::Bootstrap { .. } => Some(Stage::Bootstrap),
            Error::Build { .. } => Some(Stage::Build),
            Error::Verify { .. } => Some(Stage::Verify),
            Error::Lock { .. } | Error::LockFile { .. } => Some(Stage::Lock),
            Error::Cancelled { stage, .. } => Some(*stage),
            Error::Cycle { .. } | Error::Config(_) | Error::Preflight(_) => None,
        }
    }

    pub(crate) fn build(project: &str, message: impl Into<String>) -> Self {
        Error::Build {
            project: project.to_string(),
            message: message.into(),
            output: None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_output_is_included_in_build_errors() {
        let err = Error::Build {
            project: "opus".to_string(),
            message: "`make` exited with status 2".to_string(),
            output: Some(ToolOutput {
                command: "make -j4".to_string(),
                status: Some(2),
                stdout: String::new(),
                stderr: "undefined reference to `foo'".to_string(),
            }),
        };
        let text = err.to_string();
        assert!(text.starts_with("opus: build failed"));
        assert!(text.contains("make -j4"));
        assert!(text.contains("undefined reference"));
        assert_eq!(err.stage(), Some(Stage::Build));
        assert_eq!(err.project(), Some("opus"));
    }

    #[test]
    fn cycle_error_lists_path() {
        let err = Error::Cycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
        assert!(err.project().is_none());
    }
}
