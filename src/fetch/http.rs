//! Network and local transports.
//!
//! `http`/`https` go through a `ureq` agent, `file://` is a local copy, and
//! anything else (`ftp://` mirrors) is handed to the host's `curl`.

use super::{Transport, TransportError};
use crate::process::{CancelToken, Cmd, CmdError};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

const CHUNK: usize = 64 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    agent: ureq::Agent,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// `timeout` bounds each read and the whole `curl` fallback; `None`
    /// waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .user_agent(concat!("deps-builder/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout_read(timeout);
        }
        Self {
            agent: builder.build(),
            timeout,
        }
    }

    fn http(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransportError> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) if code == 429 || code >= 500 => {
                return Err(TransportError::Transient(format!("HTTP {} from {}", code, url)));
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(TransportError::Permanent(format!("HTTP {} from {}", code, url)));
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(TransportError::Transient(t.to_string()));
            }
        };
        let mut out = File::create(dest)
            .map_err(|e| TransportError::Permanent(format!("creating '{}': {}", dest.display(), e)))?;
        copy_cancellable(&mut response.into_reader(), &mut out, cancel)
    }

    fn file(&self, path: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransportError> {
        let mut src = File::open(path)
            .map_err(|e| TransportError::Permanent(format!("opening '{}': {}", path, e)))?;
        let mut out = File::create(dest)
            .map_err(|e| TransportError::Permanent(format!("creating '{}': {}", dest.display(), e)))?;
        copy_cancellable(&mut src, &mut out, cancel)
    }

    fn curl(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransportError> {
        let curl = which::which("curl").map_err(|_| {
            TransportError::Permanent(format!(
                "no built-in transport for '{}' and curl is not installed",
                url
            ))
        })?;
        let result = Cmd::new(curl)
            .args(["--fail", "--location", "--silent", "--show-error"])
            .arg("--output")
            .arg(dest)
            .arg(url)
            .timeout(self.timeout)
            .cancel(cancel)
            .run();
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_cancelled() => Err(TransportError::Cancelled),
            Err(CmdError::Spawn { message, .. }) => Err(TransportError::Permanent(message)),
            Err(e) => {
                let detail = e
                    .output()
                    .map(|o| o.stderr.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| e.summary());
                Err(TransportError::Transient(detail))
            }
        }
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransportError> {
        let scheme = url
            .split_once("://")
            .map(|(s, _)| s.to_ascii_lowercase())
            .ok_or_else(|| TransportError::Permanent(format!("malformed URL '{}'", url)))?;
        match scheme.as_str() {
            "http" | "https" => self.http(url, dest, cancel),
            "file" => self.file(&url["file://".len()..], dest, cancel),
            _ => self.curl(url, dest, cancel),
        }
    }
}

/// Copy in chunks, checking `cancel` between them.
fn copy_cancellable(
    src: &mut dyn Read,
    dst: &mut File,
    cancel: &CancelToken,
) -> Result<(), TransportError> {
    let mut buf = vec![0u8; CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Transient(format!("read failed: {}", e))),
        };
        dst.write_all(&buf[..n])
            .map_err(|e| TransportError::Permanent(format!("write failed: {}", e)))?;
    }
    dst.sync_all()
        .map_err(|e| TransportError::Permanent(format!("sync failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn file_urls_are_copied() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("zlib-1.2.13.tar.gz");
        fs::write(&src, b"tarball").unwrap();
        let dest = tmp.path().join("out.part");

        let t = HttpTransport::new(Some(Duration::from_secs(5)));
        let url = format!("file://{}", src.display());
        t.download(&url, &dest, &CancelToken::new()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"tarball");
    }

    #[test]
    fn missing_local_file_is_permanent() {
        let tmp = tempfile::tempdir().unwrap();
        let t = HttpTransport::new(Some(Duration::from_secs(5)));
        let url = format!("file://{}", tmp.path().join("nope.tar.gz").display());
        let err = t
            .download(&url, &tmp.path().join("out"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TransportError::Permanent(_)));
    }

    #[test]
    fn malformed_url_is_permanent() {
        let tmp = tempfile::tempdir().unwrap();
        let t = HttpTransport::new(Some(Duration::from_secs(5)));
        let err = t
            .download("zlib.tar.gz", &tmp.path().join("out"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TransportError::Permanent(_)));
    }

    #[test]
    fn cancelled_copy_stops() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("big");
        fs::write(&src, vec![0u8; CHUNK * 2]).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let t = HttpTransport::new(Some(Duration::from_secs(5)));
        let err = t
            .download(
                &format!("file://{}", src.display()),
                &tmp.path().join("out"),
                &token,
            )
            .unwrap_err();
        assert_eq!(err, TransportError::Cancelled);
    }
}
