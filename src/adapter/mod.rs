//! Build adapters: one strategy per native build system.
//!
//! An adapter turns a prepared source tree into installed files under the
//! toolchain's prefix. Adapters never decide *whether* to build; the
//! orchestrator has already checked sentinels by the time one runs.

mod autotools;
mod boost;
mod cmake;
mod ffmpeg;
mod jack;
mod meson;
mod openssl;
mod zlib;

pub use autotools::Autotools;
pub use boost::Boost;
pub use cmake::CMake;
pub use ffmpeg::Ffmpeg;
pub use jack::Jack;
pub use meson::Meson;
pub use openssl::OpenSsl;
pub use zlib::Zlib;

use crate::descriptor::{BuildKind, ProjectDescriptor};
use crate::error::{Error, Result, Stage};
use crate::fsutil::remove_path;
use crate::process::{CancelToken, Cmd};
use crate::toolchain::Toolchain;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything an adapter needs for one project.
pub struct BuildContext<'a> {
    pub descriptor: &'a ProjectDescriptor,
    pub source_tree: &'a Path,
    /// `<work>/build/<name>`, used by out-of-tree adapters.
    pub build_dir: PathBuf,
    pub toolchain: &'a Toolchain,
    /// Parallel jobs for `make` and friends.
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub cancel: &'a CancelToken,
}

impl BuildContext<'_> {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn prefix(&self) -> &Path {
        self.toolchain.install_prefix()
    }

    /// Configure arguments with the target platform's extras appended.
    pub fn args(&self) -> Vec<String> {
        self.descriptor.args_for(self.toolchain.platform)
    }

    /// Preprocessor flags including the descriptor's own.
    pub fn cppflags(&self) -> String {
        self.toolchain
            .effective_cppflags(self.descriptor.cppflags.as_deref())
    }

    pub fn jobs_arg(&self) -> String {
        format!("-j{}", self.jobs.max(1))
    }

    /// Wipe and recreate the out-of-tree build directory.
    pub fn fresh_build_dir(&self) -> Result<()> {
        remove_path(&self.build_dir)
            .and_then(|_| fs::create_dir_all(&self.build_dir))
            .map_err(|e| {
                Error::build(
                    self.name(),
                    format!("preparing '{}': {}", self.build_dir.display(), e),
                )
            })
    }

    /// Command with the toolchain environment, timeout and cancel token
    /// attached.
    pub fn tool(&self, program: impl AsRef<OsStr>) -> Cmd {
        Cmd::new(program)
            .envs(self.toolchain.env())
            .env("CPPFLAGS", self.cppflags())
            .timeout(self.timeout)
            .cancel(self.cancel)
    }

    /// Run `cmd`; a non-zero exit becomes a build error carrying its output.
    pub fn run(&self, cmd: Cmd) -> Result<()> {
        tracing::debug!(project = %self.name(), "{}", cmd.display());
        match cmd.run() {
            Ok(_) => Ok(()),
            Err(e) if e.is_cancelled() => Err(Error::Cancelled {
                project: self.name().to_string(),
                stage: Stage::Build,
            }),
            Err(e) => Err(Error::Build {
                project: self.name().to_string(),
                message: e.summary(),
                output: e.output(),
            }),
        }
    }

    pub(crate) fn io_error(&self, what: &str, path: &Path, e: std::io::Error) -> Error {
        Error::build(self.name(), format!("{} '{}': {}", what, path.display(), e))
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                project: self.name().to_string(),
                stage: Stage::Build,
            });
        }
        Ok(())
    }
}

/// Strategy for one [`BuildKind`].
pub trait Adapter: Sync {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()>;
}

/// The adapter for `kind`.
pub fn adapter_for(kind: BuildKind) -> &'static dyn Adapter {
    match kind {
        BuildKind::Autotools => &Autotools,
        BuildKind::CMake => &CMake,
        BuildKind::Meson => &Meson,
        BuildKind::CustomZlib => &Zlib,
        BuildKind::CustomFfmpeg => &Ffmpeg,
        BuildKind::CustomOpenSsl => &OpenSsl,
        BuildKind::CustomBoost => &Boost,
        BuildKind::CustomJack => &Jack,
    }
}

/// Out-of-tree build directory for `name` under `build_root`.
pub fn build_dir_for(build_root: &Path, name: &str) -> PathBuf {
    build_root.join(name)
}
