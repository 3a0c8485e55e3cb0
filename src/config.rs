//! Run configuration: directories, parallelism, timeouts and toolchain.
//!
//! Layered lowest to highest: built-in defaults, `deps-builder.toml` (or
//! `--config`), `DEPS_BUILDER_*` environment variables, CLI flags. The CLI
//! layer is applied by the binary on top of [`BuildConfig::resolve`].

use crate::error::{Error, Result};
use crate::toolchain::{Platform, Toolchain};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "deps-builder.toml";
pub const DEFAULT_FETCH_RETRIES: u32 = 3;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 3600;

const ENV_CACHE_DIR: &str = "DEPS_BUILDER_CACHE_DIR";
const ENV_JOBS: &str = "DEPS_BUILDER_JOBS";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub cache_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub install_prefix: Option<PathBuf>,
    pub jobs: Option<usize>,
    /// Parallel jobs handed to `make`/`cmake --build` inside one project.
    pub make_jobs: Option<usize>,
    pub fetch_retries: Option<u32>,
    pub fetch_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub manifest: Option<PathBuf>,
    pub platform: Option<String>,
    #[serde(default)]
    pub toolchain: ToolchainToml,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainToml {
    pub host_triplet: Option<String>,
    pub cc: Option<String>,
    pub cxx: Option<String>,
    pub ar: Option<String>,
    pub ranlib: Option<String>,
    pub strip: Option<String>,
    pub nm: Option<String>,
    pub windres: Option<String>,
    pub cflags: Option<String>,
    pub cxxflags: Option<String>,
    pub cppflags: Option<String>,
    pub ldflags: Option<String>,
    pub libs: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("reading config '{}': {}", path.display(), e))
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| Error::Config(format!("parsing config '{}': {}", origin, e)))
    }

    /// `path` if given, else `deps-builder.toml` in the current directory if
    /// it exists, else all defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub cache_dir: PathBuf,
    pub work_dir: PathBuf,
    pub install_prefix: PathBuf,
    /// Projects built concurrently.
    pub jobs: usize,
    pub make_jobs: usize,
    pub fetch_retries: u32,
    /// `None` when the configured value is 0.
    pub fetch_timeout: Option<Duration>,
    /// `None` when the configured value is 0.
    pub tool_timeout: Option<Duration>,
    pub manifest: Option<PathBuf>,
    pub toolchain: Toolchain,
}

/// Values that override the file and environment, usually from the CLI.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub platform: Option<Platform>,
    pub host_triplet: Option<String>,
    pub jobs: Option<usize>,
    pub manifest: Option<PathBuf>,
}

impl BuildConfig {
    /// Resolve with the process environment.
    pub fn resolve(file: ConfigFile, overrides: Overrides) -> Result<Self> {
        Self::resolve_with_env(file, overrides, |k| std::env::var(k).ok())
    }

    pub fn resolve_with_env(
        file: ConfigFile,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let host_triplet = overrides
            .host_triplet
            .clone()
            .or_else(|| file.toolchain.host_triplet.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let file_platform = file
            .platform
            .as_deref()
            .map(str::parse::<Platform>)
            .transpose()
            .map_err(Error::Config)?;
        let explicit = overrides.platform.or(file_platform);
        let triplet_platform = host_triplet.as_deref().map(Platform::from_triplet);
        if let (Some(explicit), Some(from_triplet)) = (explicit, triplet_platform) {
            if explicit != from_triplet {
                return Err(Error::Config(format!(
                    "platform '{}' does not match host triplet '{}' ({})",
                    explicit,
                    host_triplet.as_deref().unwrap_or_default(),
                    from_triplet
                )));
            }
        }
        let platform = explicit
            .or(triplet_platform)
            .unwrap_or_else(Platform::host);

        let output_root = PathBuf::from("output").join(platform.as_str());
        let install_prefix = absolute(
            file.install_prefix
                .unwrap_or_else(|| output_root.join("root")),
        )?;
        let work_dir = absolute(file.work_dir.unwrap_or_else(|| output_root.join("work")))?;

        let cache_dir = match env(ENV_CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => file.cache_dir.unwrap_or_else(default_cache_dir),
        };
        let cache_dir = absolute(cache_dir)?;

        let env_jobs = match env(ENV_JOBS) {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("{} must be a positive integer, got '{}'", ENV_JOBS, raw))
            })?),
            None => None,
        };
        let jobs = overrides
            .jobs
            .or(env_jobs)
            .or(file.jobs)
            .unwrap_or_else(available_parallelism);
        if jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }
        let make_jobs = file.make_jobs.unwrap_or_else(available_parallelism).max(1);

        let mut toolchain = match &host_triplet {
            Some(triplet) => Toolchain::cross(triplet, &install_prefix),
            None => {
                let mut tc = Toolchain::native(&install_prefix);
                tc.platform = platform;
                tc
            }
        };
        apply_toolchain_overrides(&mut toolchain, &file.toolchain);

        let tool_timeout = seconds(file.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS));
        let fetch_timeout =
            seconds(file.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS));

        Ok(Self {
            cache_dir,
            work_dir,
            install_prefix,
            jobs,
            make_jobs,
            fetch_retries: file.fetch_retries.unwrap_or(DEFAULT_FETCH_RETRIES),
            fetch_timeout,
            tool_timeout,
            manifest: overrides.manifest.or(file.manifest),
            toolchain,
        })
    }

    pub fn platform(&self) -> Platform {
        self.toolchain.platform
    }

    /// Unpacked source trees.
    pub fn src_dir(&self) -> PathBuf {
        self.work_dir.join("src")
    }

    /// Out-of-tree build directories.
    pub fn build_dir(&self) -> PathBuf {
        self.work_dir.join("build")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.install_prefix.join(".locks")
    }

    pub fn report_path(&self) -> PathBuf {
        self.work_dir.join("run-report.json")
    }
}

fn apply_toolchain_overrides(tc: &mut Toolchain, t: &ToolchainToml) {
    let fields: [(&mut String, &Option<String>); 12] = [
        (&mut tc.cc, &t.cc),
        (&mut tc.cxx, &t.cxx),
        (&mut tc.ar, &t.ar),
        (&mut tc.ranlib, &t.ranlib),
        (&mut tc.strip, &t.strip),
        (&mut tc.nm, &t.nm),
        (&mut tc.windres, &t.windres),
        (&mut tc.cflags, &t.cflags),
        (&mut tc.cxxflags, &t.cxxflags),
        (&mut tc.cppflags, &t.cppflags),
        (&mut tc.ldflags, &t.ldflags),
        (&mut tc.libs, &t.libs),
    ];
    for (slot, value) in fields {
        if let Some(v) = value {
            *slot = v.clone();
        }
    }
}

/// Zero disables the limit.
fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("deps-builder")
        .join("downloads")
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Native tools run in other directories, so every path handed to them is
/// made absolute up front.
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| Error::Config(format!("cannot determine current directory: {}", e)))?;
    Ok(cwd.join(path))
}
