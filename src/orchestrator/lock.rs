use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on one project's install, held for the whole
/// fetch/prepare/build sequence. Released when dropped.
///
/// The lock file itself is left in place: unlinking it while another process
/// waits on it would let a third process lock a fresh inode at the same path.
#[derive(Debug)]
pub struct ProjectLock {
    _file: File,
    path: PathBuf,
}

impl ProjectLock {
    pub fn path_for(locks_dir: &Path, project: &str) -> PathBuf {
        locks_dir.join(format!("{}.lock", project))
    }

    /// Take the lock without waiting; a lock held elsewhere is [`Error::Lock`].
    pub fn acquire(locks_dir: &Path, project: &str) -> Result<Self> {
        let path = Self::path_for(locks_dir, project);
        let io_err = |e: std::io::Error| Error::LockFile {
            project: project.to_string(),
            path: path.clone(),
            message: e.to_string(),
        };

        fs::create_dir_all(locks_dir).map_err(io_err)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::Lock {
                project: project.to_string(),
                path,
            });
        }
        tracing::debug!(project, path = %path.display(), "lock acquired");
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_project_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let locks = tmp.path().join(".locks");

        let held = ProjectLock::acquire(&locks, "opus").unwrap();
        assert!(held.path().is_file());

        match ProjectLock::acquire(&locks, "opus").unwrap_err() {
            Error::Lock { project, path } => {
                assert_eq!(project, "opus");
                assert_eq!(path, locks.join("opus.lock"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let _other = ProjectLock::acquire(&locks, "flac").unwrap();
        drop(held);
        let _again = ProjectLock::acquire(&locks, "opus").unwrap();
    }

    #[test]
    fn unopenable_lock_file_fails_in_lock_stage() {
        let tmp = tempfile::tempdir().unwrap();
        // a regular file where the locks directory should be
        let locks = tmp.path().join(".locks");
        fs::write(&locks, b"").unwrap();

        let err = ProjectLock::acquire(&locks, "opus").unwrap_err();
        assert!(matches!(err, Error::LockFile { .. }), "{err}");
        assert_eq!(err.stage(), Some(crate::error::Stage::Lock));
        assert_eq!(err.project(), Some("opus"));
    }
}
