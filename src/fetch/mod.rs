//! Checksum-verified source archive cache.
//!
//! Archives land in `<cache>/<name>-<digest16>-<file>`. A file at that path
//! has always passed verification: downloads go to `<cache>/.tmp` first and
//! are renamed into place only after their digest matched.

pub mod http;

pub use http::HttpTransport;

use crate::descriptor::ProjectDescriptor;
use crate::error::{Error, Result, Stage};
use crate::fsutil::{atomic_rename, tmp_name};
use crate::process::CancelToken;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TMP_DIR: &str = ".tmp";

/// Why a single transfer attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Worth retrying: connection reset, 5xx, timeout.
    Transient(String),
    /// Retrying cannot help: 404, malformed URL, missing local file.
    Permanent(String),
    Cancelled,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Transient(msg) | TransportError::Permanent(msg) => f.write_str(msg),
            TransportError::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Moves the bytes behind a URL into a local file.
pub trait Transport: Send + Sync {
    /// Write the resource at `url` to `dest`, which does not exist yet.
    fn download(&self, url: &str, dest: &Path, cancel: &CancelToken)
        -> Result<(), TransportError>;
}

pub struct Fetcher {
    cache_dir: PathBuf,
    transport: Arc<dyn Transport>,
    retries: u32,
    backoff: Duration,
}

impl Fetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            transport,
            retries: crate::config::DEFAULT_FETCH_RETRIES,
            backoff: Duration::from_secs(2),
        }
    }

    /// Extra attempts after the first failed transfer.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Delay before retry `n` is `n * backoff`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_path(&self, d: &ProjectDescriptor) -> PathBuf {
        self.cache_dir.join(format!(
            "{}-{}-{}",
            d.name,
            d.checksum.short(),
            d.archive_file_name()
        ))
    }

    /// Path to a verified local copy of `d`'s archive, downloading it if the
    /// cache has none.
    pub fn fetch(&self, d: &ProjectDescriptor, cancel: &CancelToken) -> Result<PathBuf> {
        let target = self.cache_path(d);

        if target.is_file() {
            let actual = d.checksum.digest_file(&target).map_err(|e| {
                fetch_error(d, format!("reading cached '{}': {}", target.display(), e))
            })?;
            if actual == d.checksum.hex() {
                tracing::debug!(project = %d.name, path = %target.display(), "cache hit");
                return Ok(target);
            }
            tracing::warn!(
                project = %d.name,
                path = %target.display(),
                "cached archive does not match its checksum; downloading again"
            );
            fs::remove_file(&target).map_err(|e| {
                fetch_error(d, format!("removing stale '{}': {}", target.display(), e))
            })?;
        }

        if d.checksum.is_legacy() {
            tracing::warn!(
                project = %d.name,
                "archive is verified with {} only; prefer a sha256 digest",
                d.checksum.algorithm().name()
            );
        }

        let tmp_dir = self.cache_dir.join(TMP_DIR);
        fs::create_dir_all(&tmp_dir).map_err(|e| {
            fetch_error(d, format!("creating '{}': {}", tmp_dir.display(), e))
        })?;

        let mut attempt = 0u32;
        let part = loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(cancelled(d));
            }

            let part = tmp_dir.join(tmp_name(&format!("{}.part", d.archive_file_name())));
            tracing::info!(project = %d.name, url = %d.source_url, attempt, "downloading");
            match self.transport.download(&d.source_url, &part, cancel) {
                Ok(()) => break part,
                Err(err) => {
                    let _ = fs::remove_file(&part);
                    match err {
                        TransportError::Cancelled => return Err(cancelled(d)),
                        TransportError::Permanent(msg) => return Err(fetch_error(d, msg)),
                        TransportError::Transient(msg) if attempt > self.retries => {
                            return Err(fetch_error(
                                d,
                                format!("{} (gave up after {} attempts)", msg, attempt),
                            ));
                        }
                        TransportError::Transient(msg) => {
                            tracing::warn!(project = %d.name, attempt, "download failed, retrying: {}", msg);
                            if !sleep_unless_cancelled(self.backoff * attempt, cancel) {
                                return Err(cancelled(d));
                            }
                        }
                    }
                }
            }
        };

        let actual = match d.checksum.digest_file(&part) {
            Ok(actual) => actual,
            Err(e) => {
                let _ = fs::remove_file(&part);
                return Err(fetch_error(d, format!("reading download: {}", e)));
            }
        };
        if actual != d.checksum.hex() {
            let _ = fs::remove_file(&part);
            return Err(Error::Integrity {
                project: d.name.clone(),
                url: d.source_url.clone(),
                expected: d.checksum.hex().to_string(),
                actual,
            });
        }

        atomic_rename(&part, &target).map_err(|e| {
            let _ = fs::remove_file(&part);
            fetch_error(d, format!("moving download into '{}': {}", target.display(), e))
        })?;
        tracing::info!(project = %d.name, path = %target.display(), "archive verified");
        Ok(target)
    }
}

fn fetch_error(d: &ProjectDescriptor, message: String) -> Error {
    Error::Fetch {
        project: d.name.clone(),
        url: d.source_url.clone(),
        message,
    }
}

fn cancelled(d: &ProjectDescriptor) -> Error {
    Error::Cancelled {
        project: d.name.clone(),
        stage: Stage::Fetch,
    }
}

/// Wait out `delay` in short slices. Returns `false` as soon as `cancel`
/// trips.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancelToken) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(SLICE));
    }
}
