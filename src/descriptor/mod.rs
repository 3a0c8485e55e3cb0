//! Declarative library descriptors.
//!
//! A [`ProjectDescriptor`] says WHAT to build: where the source archive
//! lives, what it must hash to, which files prove it is installed, and which
//! build system drives it. It holds no behavior; the fetcher, unpacker and
//! build adapters interpret it.
//!
//! # Example
//!
//! ```rust
//! use deps_builder::descriptor::{BuildKind, ProjectDescriptor};
//!
//! let zlib = ProjectDescriptor::builder(
//!     "zlib",
//!     "http://zlib.net/zlib-1.2.13.tar.xz",
//!     "d14c38e313afc35a9a8760dadf26042f51ea0f5d154b0630a31da0540107fb98",
//!     "lib/libz.a",
//!     BuildKind::CustomZlib,
//! )
//! .build()
//! .unwrap();
//!
//! assert_eq!(zlib.base_dir_name(), "zlib-1.2.13");
//! assert_eq!(zlib.version(), "1.2.13");
//! ```

pub mod edit;
pub mod manifest;
pub mod table;

pub use edit::TextEdit;
pub use manifest::{load_manifest, parse_manifest};
pub use table::DescriptorTable;

use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::toolchain::Platform;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Archive suffixes stripped when deriving the top-level directory name.
const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.xz", ".tar.gz", ".tar.bz2", ".tgz", ".tbz2", ".txz", ".tar",
];

/// Native build system driving a project.
///
/// Closed set: every variant has exactly one adapter, selected by
/// [`crate::adapter::adapter_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildKind {
    Autotools,
    CMake,
    Meson,
    CustomZlib,
    CustomFfmpeg,
    CustomOpenSsl,
    CustomBoost,
    CustomJack,
}

impl BuildKind {
    pub const ALL: [BuildKind; 8] = [
        BuildKind::Autotools,
        BuildKind::CMake,
        BuildKind::Meson,
        BuildKind::CustomZlib,
        BuildKind::CustomFfmpeg,
        BuildKind::CustomOpenSsl,
        BuildKind::CustomBoost,
        BuildKind::CustomJack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildKind::Autotools => "autotools",
            BuildKind::CMake => "cmake",
            BuildKind::Meson => "meson",
            BuildKind::CustomZlib => "custom_zlib",
            BuildKind::CustomFfmpeg => "custom_ffmpeg",
            BuildKind::CustomOpenSsl => "custom_openssl",
            BuildKind::CustomBoost => "custom_boost",
            BuildKind::CustomJack => "custom_jack",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BuildKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        BuildKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unsupported build kind '{}'; expected one of: {}",
                    s.trim(),
                    BuildKind::ALL.map(BuildKind::as_str).join(", ")
                )
            })
    }
}

/// Step regenerating autotools scripts before `configure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    /// `libtoolize`, `aclocal`, `automake`, `autoconf`.
    Autogen,
    /// `autoreconf -vif`.
    Autoreconf,
}

impl FromStr for Bootstrap {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autogen" => Ok(Bootstrap::Autogen),
            "autoreconf" => Ok(Bootstrap::Autoreconf),
            other => Err(format!(
                "unsupported bootstrap '{}'; expected 'autogen' or 'autoreconf'",
                other
            )),
        }
    }
}

/// Immutable description of one third-party library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub name: String,
    pub source_url: String,
    pub checksum: Checksum,
    /// Paths relative to the install prefix; all present means "built".
    pub sentinel_paths: Vec<PathBuf>,
    pub build_kind: BuildKind,
    /// Opaque build-system flags, passed verbatim.
    pub configure_args: Vec<String>,
    /// Extra flags appended after `configure_args` for one platform.
    pub platform_overrides: BTreeMap<Platform, Vec<String>>,
    /// Edits keyed by path relative to the source tree, applied in order.
    pub source_edits: BTreeMap<PathBuf, Vec<TextEdit>>,
    pub archive_base_dir_override: Option<String>,
    pub bootstrap: Option<Bootstrap>,
    /// Projects whose install output this one builds against.
    pub dependencies: Vec<String>,
    pub cppflags: Option<String>,
    /// Autotools only: build and install just these subdirectories.
    pub make_subdirs: Vec<PathBuf>,
    /// Directory with a quilt-style `series` file.
    pub patch_dir: Option<PathBuf>,
    pub version_override: Option<String>,
}

impl ProjectDescriptor {
    /// Start describing a project with its required fields.
    pub fn builder(
        name: &str,
        source_url: &str,
        checksum: &str,
        sentinel: &str,
        build_kind: BuildKind,
    ) -> ProjectBuilder {
        ProjectBuilder {
            name: name.to_string(),
            source_url: source_url.to_string(),
            checksum: checksum.to_string(),
            sentinel_paths: vec![PathBuf::from(sentinel)],
            build_kind,
            configure_args: Vec::new(),
            platform_overrides: BTreeMap::new(),
            source_edits: BTreeMap::new(),
            archive_base_dir_override: None,
            bootstrap: None,
            dependencies: Vec::new(),
            cppflags: None,
            make_subdirs: Vec::new(),
            patch_dir: None,
            version_override: None,
        }
    }

    pub fn requires_bootstrap(&self) -> bool {
        self.bootstrap.is_some()
    }

    /// Last path segment of the source URL.
    pub fn archive_file_name(&self) -> &str {
        let without_query = self
            .source_url
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.source_url);
        without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(without_query)
    }

    /// Expected top-level directory inside the archive.
    pub fn base_dir_name(&self) -> String {
        if let Some(base) = &self.archive_base_dir_override {
            return base.clone();
        }
        strip_archive_suffix(self.archive_file_name()).to_string()
    }

    /// Upstream version, explicit or derived from the base directory name
    /// (`libogg-1.3.5` → `1.3.5`).
    pub fn version(&self) -> String {
        if let Some(v) = &self.version_override {
            return v.clone();
        }
        let base = self.base_dir_name();
        version_regex()
            .and_then(|re| re.captures(&base))
            .and_then(|c| c.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "0".to_string())
    }

    /// `configure_args` followed by the platform's extra flags.
    pub fn args_for(&self, platform: Platform) -> Vec<String> {
        let mut args = self.configure_args.clone();
        if let Some(extra) = self.platform_overrides.get(&platform) {
            args.extend(extra.iter().cloned());
        }
        args
    }

    /// Every sentinel exists under `prefix`.
    pub fn is_satisfied(&self, prefix: &Path) -> bool {
        self.sentinel_paths.iter().all(|p| prefix.join(p).exists())
    }

    /// At least one sentinel exists under `prefix`.
    pub fn has_any_sentinel(&self, prefix: &Path) -> bool {
        self.sentinel_paths.iter().any(|p| prefix.join(p).exists())
    }
}

fn version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([-\w]+?)-(\d[\d.]*[a-z]?[\d.]*(?:-(?:alpha|beta)\d+)?)(\+.*)?$").ok()
    })
    .as_ref()
}

/// Remove a known archive suffix from a file name.
pub fn strip_archive_suffix(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for suffix in ARCHIVE_SUFFIXES {
        if lower.ends_with(suffix) {
            return &file_name[..file_name.len() - suffix.len()];
        }
    }
    file_name
}

/// Builder for [`ProjectDescriptor`]; validation happens in [`ProjectBuilder::build`].
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    name: String,
    source_url: String,
    checksum: String,
    sentinel_paths: Vec<PathBuf>,
    build_kind: BuildKind,
    configure_args: Vec<String>,
    platform_overrides: BTreeMap<Platform, Vec<String>>,
    source_edits: BTreeMap<PathBuf, Vec<TextEdit>>,
    archive_base_dir_override: Option<String>,
    bootstrap: Option<Bootstrap>,
    dependencies: Vec<String>,
    cppflags: Option<String>,
    make_subdirs: Vec<PathBuf>,
    patch_dir: Option<PathBuf>,
    version_override: Option<String>,
}

impl ProjectBuilder {
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.configure_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn platform_args<I, S>(mut self, platform: Platform, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platform_overrides
            .entry(platform)
            .or_default()
            .extend(args.into_iter().map(Into::into));
        self
    }

    pub fn sentinel(mut self, path: &str) -> Self {
        self.sentinel_paths.push(PathBuf::from(path));
        self
    }

    pub fn edit(mut self, file: &str, edit: TextEdit) -> Self {
        self.source_edits
            .entry(PathBuf::from(file))
            .or_default()
            .push(edit);
        self
    }

    pub fn base(mut self, base: &str) -> Self {
        self.archive_base_dir_override = Some(base.to_string());
        self
    }

    pub fn bootstrap(mut self, bootstrap: Bootstrap) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn cppflags(mut self, flags: &str) -> Self {
        self.cppflags = Some(flags.to_string());
        self
    }

    pub fn make_subdirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathBuf>,
    {
        self.make_subdirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn patch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.patch_dir = Some(dir.into());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version_override = Some(version.to_string());
        self
    }

    /// Validate and freeze the descriptor.
    pub fn build(self) -> Result<ProjectDescriptor> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Config("project name must not be empty".to_string()));
        }
        if name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::Config(format!(
                "project name '{}' must be a safe filename segment",
                name
            )));
        }
        if self.source_url.trim().is_empty() {
            return Err(Error::Config(format!("{}: source URL must not be empty", name)));
        }
        let checksum: Checksum = self
            .checksum
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", name, e)))?;
        if self.sentinel_paths.is_empty() {
            return Err(Error::Config(format!(
                "{}: at least one sentinel path is required",
                name
            )));
        }
        for sentinel in &self.sentinel_paths {
            let escapes = sentinel.components().any(|c| {
                matches!(
                    c,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            });
            if sentinel.as_os_str().is_empty() || sentinel.is_absolute() || escapes {
                return Err(Error::Config(format!(
                    "{}: sentinel '{}' must be a non-empty path relative to the install prefix",
                    name,
                    sentinel.display()
                )));
            }
        }
        for (file, edits) in &self.source_edits {
            for edit in edits {
                edit.validate()
                    .map_err(|e| Error::Config(format!("{}: {}: {}", name, file.display(), e)))?;
            }
        }
        if self.dependencies.iter().any(|d| d == &name) {
            return Err(Error::Config(format!("{}: project depends on itself", name)));
        }

        Ok(ProjectDescriptor {
            name,
            source_url: self.source_url.trim().to_string(),
            checksum,
            sentinel_paths: self.sentinel_paths,
            build_kind: self.build_kind,
            configure_args: self.configure_args,
            platform_overrides: self.platform_overrides,
            source_edits: self.source_edits,
            archive_base_dir_override: self.archive_base_dir_override,
            bootstrap: self.bootstrap,
            dependencies: self.dependencies,
            cppflags: self.cppflags,
            make_subdirs: self.make_subdirs,
            patch_dir: self.patch_dir,
            version_override: self.version_override,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "c4d91be36fc8e54deae7575241e03f4211eb102afb3fc0775fbbc1b740016705";

    fn libogg() -> ProjectBuilder {
        ProjectDescriptor::builder(
            "libogg",
            "http://downloads.xiph.org/releases/ogg/libogg-1.3.5.tar.xz",
            SHA,
            "lib/libogg.a",
            BuildKind::CMake,
        )
    }

    #[test]
    fn derives_base_and_version_from_url() {
        let d = libogg().build().unwrap();
        assert_eq!(d.archive_file_name(), "libogg-1.3.5.tar.xz");
        assert_eq!(d.base_dir_name(), "libogg-1.3.5");
        assert_eq!(d.version(), "1.3.5");
    }

    #[test]
    fn base_override_wins() {
        let d = ProjectDescriptor::builder(
            "libopenmpt",
            "https://lib.openmpt.org/files/libopenmpt/src/libopenmpt-0.6.6+release.autotools.tar.gz",
            SHA,
            "lib/libopenmpt.a",
            BuildKind::Autotools,
        )
        .base("libopenmpt-0.6.6+release.autotools")
        .build()
        .unwrap();
        assert_eq!(d.base_dir_name(), "libopenmpt-0.6.6+release.autotools");
        assert_eq!(d.version(), "0.6.6");
    }

    #[test]
    fn url_without_extension_keeps_last_segment() {
        let d = ProjectDescriptor::builder(
            "wildmidi",
            "https://codeload.github.com/Mindwerks/wildmidi/tar.gz/wildmidi-0.4.4",
            SHA,
            "lib/libWildMidi.a",
            BuildKind::CMake,
        )
        .build()
        .unwrap();
        assert_eq!(d.archive_file_name(), "wildmidi-0.4.4");
        assert_eq!(d.version(), "0.4.4");
    }

    #[test]
    fn platform_args_are_appended() {
        let d = libogg()
            .args(["-DBUILD_SHARED_LIBS=OFF"])
            .platform_args(Platform::Windows, ["-DCURL_USE_SCHANNEL=ON"])
            .build()
            .unwrap();
        assert_eq!(d.args_for(Platform::Linux), vec!["-DBUILD_SHARED_LIBS=OFF"]);
        assert_eq!(
            d.args_for(Platform::Windows),
            vec!["-DBUILD_SHARED_LIBS=OFF", "-DCURL_USE_SCHANNEL=ON"]
        );
    }

    #[test]
    fn sentinel_checks() {
        let tmp = tempfile::tempdir().unwrap();
        let d = libogg().sentinel("lib/pkgconfig/ogg.pc").build().unwrap();
        assert!(!d.is_satisfied(tmp.path()));
        assert!(!d.has_any_sentinel(tmp.path()));

        std::fs::create_dir_all(tmp.path().join("lib")).unwrap();
        std::fs::write(tmp.path().join("lib/libogg.a"), b"").unwrap();
        assert!(!d.is_satisfied(tmp.path()));
        assert!(d.has_any_sentinel(tmp.path()));

        std::fs::create_dir_all(tmp.path().join("lib/pkgconfig")).unwrap();
        std::fs::write(tmp.path().join("lib/pkgconfig/ogg.pc"), b"").unwrap();
        assert!(d.is_satisfied(tmp.path()));
    }

    #[test]
    fn rejects_invalid_descriptors() {
        let empty_checksum =
            ProjectDescriptor::builder("x", "http://e/x.tar.gz", "", "lib/x.a", BuildKind::Meson)
                .build();
        assert!(matches!(empty_checksum, Err(Error::Config(_))));

        let absolute_sentinel =
            ProjectDescriptor::builder("x", "http://e/x.tar.gz", SHA, "/lib/x.a", BuildKind::Meson)
                .build();
        assert!(absolute_sentinel.is_err());

        let escaping_sentinel = libogg().sentinel("lib/../../etc/passwd").build();
        assert!(matches!(escaping_sentinel, Err(Error::Config(ref m)) if m.contains("sentinel")));

        let zero_count = TextEdit {
            count: Some(0),
            ..TextEdit::new("a", "b")
        };
        let zero_count_edit = libogg().edit("CMakeLists.txt", zero_count).build();
        assert!(zero_count_edit.is_err());

        let self_dep = libogg().depends_on(["libogg"]).build();
        assert!(self_dep.is_err());

        let bad_edit = libogg().edit("CMakeLists.txt", TextEdit::new("(", "")).build();
        assert!(bad_edit.is_err());
    }

    #[test]
    fn build_kind_round_trips_through_strings() {
        for kind in BuildKind::ALL {
            assert_eq!(kind.as_str().parse::<BuildKind>().unwrap(), kind);
        }
        assert_eq!("Custom-OpenSSL".parse::<BuildKind>().unwrap(), BuildKind::CustomOpenSsl);
        assert!("scons".parse::<BuildKind>().is_err());
    }
}
