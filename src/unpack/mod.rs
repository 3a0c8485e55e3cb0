//! Source tree preparation: extract, edit, patch, bootstrap.
//!
//! Every call starts from a fresh extraction, so edits and patches always see
//! pristine upstream files and never apply twice to the same tree.

pub mod archive;

use crate::descriptor::{Bootstrap, ProjectDescriptor};
use crate::error::{Error, Result, Stage};
use crate::fsutil::{remove_path, tmp_name};
use crate::process::{CancelToken, Cmd, CmdError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Written into a tree once every preparation step succeeded.
pub const PREPARED_MARKER: &str = ".deps-builder-prepared";

pub struct Unpacker {
    src_root: PathBuf,
    tool_timeout: Option<Duration>,
}

impl Unpacker {
    pub fn new(src_root: impl Into<PathBuf>) -> Self {
        Self {
            src_root: src_root.into(),
            tool_timeout: None,
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Where `d`'s source tree lives once prepared.
    pub fn tree_path(&self, d: &ProjectDescriptor) -> PathBuf {
        self.src_root.join(&d.name)
    }

    /// Extract `archive` into a clean tree and run every preparation step.
    pub fn prepare(
        &self,
        d: &ProjectDescriptor,
        archive: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.src_root).map_err(|e| Error::Extraction {
            project: d.name.clone(),
            archive: archive.to_path_buf(),
            message: format!("creating '{}': {}", self.src_root.display(), e),
        })?;

        let staging = self.src_root.join(tmp_name(&format!(".{}.tmp", d.name)));
        let tree = self.tree_path(d);
        let moved = self.unpack_into(d, archive, &staging, &tree, cancel);
        let _ = remove_path(&staging);
        moved?;

        tracing::info!(project = %d.name, tree = %tree.display(), "source unpacked");
        apply_edits(d, &tree)?;
        self.apply_patch_series(d, &tree, cancel)?;
        if let Some(bootstrap) = d.bootstrap {
            self.run_bootstrap(d, bootstrap, &tree, cancel)?;
        }

        fs::write(tree.join(PREPARED_MARKER), format!("{}\n", d.checksum)).map_err(|e| {
            Error::Extraction {
                project: d.name.clone(),
                archive: archive.to_path_buf(),
                message: format!("writing marker: {}", e),
            }
        })?;
        Ok(tree)
    }

    fn unpack_into(
        &self,
        d: &ProjectDescriptor,
        archive_path: &Path,
        staging: &Path,
        tree: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let fail = |message: String| Error::Extraction {
            project: d.name.clone(),
            archive: archive_path.to_path_buf(),
            message,
        };

        fs::create_dir_all(staging)
            .map_err(|e| fail(format!("creating '{}': {}", staging.display(), e)))?;
        let top_level = archive::extract(&d.name, archive_path, staging, cancel)?;

        let base = locate_base_dir(d, staging, &top_level).ok_or_else(|| {
            fail(format!(
                "expected top-level directory '{}' (found: {})",
                d.base_dir_name(),
                top_level.iter().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        remove_path(tree).map_err(|e| fail(format!("removing old '{}': {}", tree.display(), e)))?;
        fs::rename(&base, tree).map_err(|e| {
            fail(format!(
                "moving '{}' to '{}': {}",
                base.display(),
                tree.display(),
                e
            ))
        })
    }

    fn apply_patch_series(
        &self,
        d: &ProjectDescriptor,
        tree: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let Some(dir) = &d.patch_dir else {
            return Ok(());
        };
        let series = dir.join("series");
        let listing = fs::read_to_string(&series).map_err(|e| Error::Patch {
            project: d.name.clone(),
            file: series.clone(),
            message: format!("reading patch series: {}", e),
            output: None,
        })?;

        for patch in parse_series(&listing) {
            let patch_file = dir.join(patch);
            tracing::debug!(project = %d.name, patch = %patch_file.display(), "applying patch");
            let cmd = Cmd::new("patch")
                .args(["-p1", "--forward", "-i"])
                .arg(&patch_file)
                .current_dir(tree)
                .timeout(self.tool_timeout)
                .cancel(cancel);
            cmd.run().map_err(|e| match e {
                e if e.is_cancelled() => Error::Cancelled {
                    project: d.name.clone(),
                    stage: Stage::Prepare,
                },
                e => Error::Patch {
                    project: d.name.clone(),
                    file: patch_file.clone(),
                    message: e.summary(),
                    output: e.output(),
                },
            })?;
        }
        Ok(())
    }

    fn run_bootstrap(
        &self,
        d: &ProjectDescriptor,
        bootstrap: Bootstrap,
        tree: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        tracing::info!(project = %d.name, ?bootstrap, "bootstrapping");
        for cmd in bootstrap_commands(bootstrap) {
            cmd.current_dir(tree)
                .timeout(self.tool_timeout)
                .cancel(cancel)
                .run()
                .map_err(|e| bootstrap_error(d, e))?;
        }
        Ok(())
    }
}

fn bootstrap_error(d: &ProjectDescriptor, e: CmdError) -> Error {
    if e.is_cancelled() {
        return Error::Cancelled {
            project: d.name.clone(),
            stage: Stage::Bootstrap,
        };
    }
    Error::Bootstrap {
        project: d.name.clone(),
        message: e.summary(),
        output: e.output(),
    }
}

/// Commands regenerating the autotools scripts, in order.
pub(crate) fn bootstrap_commands(bootstrap: Bootstrap) -> Vec<Cmd> {
    match bootstrap {
        Bootstrap::Autogen => {
            let libtoolize = if cfg!(target_os = "macos") {
                "glibtoolize"
            } else {
                "libtoolize"
            };
            vec![
                Cmd::new(libtoolize).arg("--force"),
                Cmd::new("aclocal"),
                Cmd::new("automake").args(["--add-missing", "--force-missing", "--foreign"]),
                Cmd::new("autoconf"),
            ]
        }
        Bootstrap::Autoreconf => vec![Cmd::new("autoreconf").arg("-vif")],
    }
}

/// Override, then the name derived from the archive, then the only
/// top-level directory.
fn locate_base_dir(
    d: &ProjectDescriptor,
    staging: &Path,
    top_level: &std::collections::BTreeSet<String>,
) -> Option<PathBuf> {
    let named = staging.join(d.base_dir_name());
    if named.is_dir() {
        return Some(named);
    }
    if d.archive_base_dir_override.is_some() {
        return None;
    }
    match top_level.iter().collect::<Vec<_>>().as_slice() {
        [only] => {
            let candidate = staging.join(only);
            candidate.is_dir().then_some(candidate)
        }
        _ => None,
    }
}

fn apply_edits(d: &ProjectDescriptor, tree: &Path) -> Result<()> {
    for (file, edits) in &d.source_edits {
        let path = tree.join(file);
        let patch_error = |message: String| Error::Patch {
            project: d.name.clone(),
            file: file.clone(),
            message,
            output: None,
        };

        let mut text = fs::read_to_string(&path)
            .map_err(|e| patch_error(format!("reading '{}': {}", path.display(), e)))?;
        for edit in edits {
            text = edit.apply(&text).map_err(patch_error)?;
        }
        fs::write(&path, text)
            .map_err(|e| patch_error(format!("writing '{}': {}", path.display(), e)))?;
        tracing::debug!(project = %d.name, file = %file.display(), edits = edits.len(), "edited");
    }
    Ok(())
}

/// Patch names from a quilt `series` file, ignoring comments and options.
fn parse_series(listing: &str) -> Vec<&str> {
    listing
        .lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .filter_map(|l| l.split_whitespace().next())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::archive::tests::write_tar_gz;
    use super::*;
    use crate::descriptor::{BuildKind, TextEdit};

    const SHA: &str = "c4d91be36fc8e54deae7575241e03f4211eb102afb3fc0775fbbc1b740016705";

    fn id3tag(url_file: &str) -> crate::descriptor::ProjectBuilder {
        ProjectDescriptor::builder(
            "libid3tag",
            &format!("ftp://example.invalid/{}", url_file),
            SHA,
            "lib/libid3tag.a",
            BuildKind::Autotools,
        )
    }

    fn id3tag_archive(dir: &Path) -> PathBuf {
        let archive = dir.join("libid3tag-0.15.1b.tar.gz");
        write_tar_gz(
            &archive,
            &[
                (
                    "libid3tag-0.15.1b/configure.ac",
                    "case \"$1\" in\n  -O*) optimize=\"$1\" ;;\nesac\n",
                    0o644,
                ),
                ("libid3tag-0.15.1b/id3tag.h", "/* id3 */\n", 0o644),
            ],
        );
        archive
    }

    #[test]
    fn prepare_twice_applies_edits_once() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = id3tag_archive(tmp.path());
        let d = id3tag("libid3tag-0.15.1b.tar.gz")
            .edit(
                "configure.ac",
                TextEdit::once(r#"optimize="\$1""#, r#"optimize="$$optimize $$1""#),
            )
            .build()
            .unwrap();
        let unpacker = Unpacker::new(tmp.path().join("src"));

        for _ in 0..2 {
            let tree = unpacker.prepare(&d, &archive, &CancelToken::new()).unwrap();
            let text = fs::read_to_string(tree.join("configure.ac")).unwrap();
            assert_eq!(text.matches("$optimize").count(), 1);
            assert!(text.contains(r#"optimize="$optimize $1""#));
            assert!(tree.join(PREPARED_MARKER).is_file());
        }

        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("src"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["libid3tag"]);
    }

    #[test]
    fn stale_files_do_not_survive_reextraction() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = id3tag_archive(tmp.path());
        let d = id3tag("libid3tag-0.15.1b.tar.gz").build().unwrap();
        let unpacker = Unpacker::new(tmp.path().join("src"));

        let tree = unpacker.prepare(&d, &archive, &CancelToken::new()).unwrap();
        fs::write(tree.join("config.status"), b"stale").unwrap();
        let tree = unpacker.prepare(&d, &archive, &CancelToken::new()).unwrap();
        assert!(!tree.join("config.status").exists());
    }

    #[test]
    fn single_top_level_directory_is_used_when_name_differs() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("v1.9.17.tar.gz");
        write_tar_gz(&archive, &[("jack2-1.9.17/wscript", "# waf\n", 0o644)]);
        let d = ProjectDescriptor::builder(
            "jack",
            "https://example.invalid/archive/v1.9.17.tar.gz",
            SHA,
            "lib/pkgconfig/jack.pc",
            BuildKind::CustomJack,
        )
        .build()
        .unwrap();
        let unpacker = Unpacker::new(tmp.path().join("src"));
        let tree = unpacker.prepare(&d, &archive, &CancelToken::new()).unwrap();
        assert!(tree.join("wscript").is_file());
    }

    #[test]
    fn wrong_base_override_is_an_extraction_error() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = id3tag_archive(tmp.path());
        let d = id3tag("libid3tag-0.15.1b.tar.gz")
            .base("libid3tag-9.9")
            .build()
            .unwrap();
        let unpacker = Unpacker::new(tmp.path().join("src"));
        let err = unpacker
            .prepare(&d, &archive, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(err.to_string().contains("libid3tag-9.9"));
    }

    #[test]
    fn edit_on_missing_file_or_unmatched_pattern_is_patch_error() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = id3tag_archive(tmp.path());
        let unpacker = Unpacker::new(tmp.path().join("src"));

        let missing = id3tag("libid3tag-0.15.1b.tar.gz")
            .edit("Makefile.am", TextEdit::new("x", "y"))
            .build()
            .unwrap();
        let err = unpacker
            .prepare(&missing, &archive, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Patch { .. }));
        assert_eq!(err.stage(), Some(Stage::Prepare));

        let unmatched = id3tag("libid3tag-0.15.1b.tar.gz")
            .edit("configure.ac", TextEdit::new("no such text", "y"))
            .build()
            .unwrap();
        let err = unpacker
            .prepare(&unmatched, &archive, &CancelToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("did not match"));
    }

    #[test]
    fn patch_series_is_applied_in_order() {
        if which::which("patch").is_err() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let archive = id3tag_archive(tmp.path());
        let patches = tmp.path().join("patches");
        fs::create_dir_all(&patches).unwrap();
        fs::write(
            patches.join("0001-header.patch"),
            "--- a/id3tag.h\n+++ b/id3tag.h\n@@ -1 +1 @@\n-/* id3 */\n+/* id3 patched */\n",
        )
        .unwrap();
        fs::write(patches.join("series"), "# fixes\n0001-header.patch -p1\n\n").unwrap();

        let d = id3tag("libid3tag-0.15.1b.tar.gz")
            .patch_dir(&patches)
            .build()
            .unwrap();
        let unpacker = Unpacker::new(tmp.path().join("src"));
        let tree = unpacker.prepare(&d, &archive, &CancelToken::new()).unwrap();
        assert_eq!(
            fs::read_to_string(tree.join("id3tag.h")).unwrap(),
            "/* id3 patched */\n"
        );
    }

    #[test]
    fn series_parsing_skips_comments_and_options() {
        let listing = "# header\n0001-a.patch\n  0002-b.patch -p1 # trailing\n\n";
        assert_eq!(parse_series(listing), vec!["0001-a.patch", "0002-b.patch"]);
    }

    #[test]
    fn bootstrap_flavours() {
        let autoreconf = bootstrap_commands(Bootstrap::Autoreconf);
        assert_eq!(autoreconf.len(), 1);
        assert_eq!(autoreconf[0].display(), "autoreconf -vif");

        let autogen: Vec<String> = bootstrap_commands(Bootstrap::Autogen)
            .iter()
            .map(|c| c.display())
            .collect();
        assert_eq!(autogen.len(), 4);
        assert!(autogen[0].ends_with("libtoolize --force"));
        assert_eq!(autogen[1], "aclocal");
        assert_eq!(autogen[2], "automake --add-missing --force-missing --foreign");
        assert_eq!(autogen[3], "autoconf");
    }
}
