//! TOML descriptor manifests.
//!
//! ```toml
//! [[project]]
//! name = "zlib"
//! url = "http://zlib.net/zlib-1.2.13.tar.xz"
//! checksum = "sha256:d14c38e313afc35a9a8760dadf26042f51ea0f5d154b0630a31da0540107fb98"
//! sentinels = ["lib/libz.a"]
//! kind = "custom_zlib"
//! ```

use super::{Bootstrap, BuildKind, DescriptorTable, ProjectDescriptor, TextEdit};
use crate::error::{Error, Result};
use crate::toolchain::Platform;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestToml {
    #[serde(default)]
    project: Vec<ProjectToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectToml {
    name: String,
    url: String,
    checksum: String,
    sentinels: Vec<String>,
    kind: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    depends: Vec<String>,
    base: Option<String>,
    bootstrap: Option<String>,
    cppflags: Option<String>,
    #[serde(default)]
    make_subdirs: Vec<String>,
    patch_dir: Option<String>,
    version: Option<String>,
    #[serde(default)]
    platform_args: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    edits: BTreeMap<String, Vec<EditToml>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EditToml {
    pattern: String,
    replacement: String,
    count: Option<usize>,
}

/// Load a manifest file. Relative `patch_dir` values resolve against the
/// manifest's directory.
pub fn load_manifest(path: &Path) -> Result<DescriptorTable> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("reading manifest '{}': {}", path.display(), e))
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_manifest(&text, base_dir, &path.display().to_string())
}

/// Parse manifest text; `origin` names the source in error messages.
pub fn parse_manifest(text: &str, base_dir: &Path, origin: &str) -> Result<DescriptorTable> {
    let parsed: ManifestToml = toml::from_str(text)
        .map_err(|e| Error::Config(format!("parsing manifest '{}': {}", origin, e)))?;

    if parsed.project.is_empty() {
        return Err(Error::Config(format!(
            "invalid manifest '{}': no [[project]] entries",
            origin
        )));
    }

    let projects = parsed
        .project
        .into_iter()
        .map(|p| project_from_toml(p, base_dir, origin))
        .collect::<Result<Vec<_>>>()?;

    DescriptorTable::new(projects)
        .map_err(|e| Error::Config(format!("invalid manifest '{}': {}", origin, strip_prefix(&e))))
}

fn strip_prefix(err: &Error) -> String {
    match err {
        Error::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn project_from_toml(p: ProjectToml, base_dir: &Path, origin: &str) -> Result<ProjectDescriptor> {
    let invalid = |msg: String| Error::Config(format!("invalid manifest '{}': {}", origin, msg));

    let kind: BuildKind = p
        .kind
        .parse()
        .map_err(|e| invalid(format!("{}: {}", p.name, e)))?;

    let mut sentinels = p.sentinels.iter();
    let first = sentinels
        .next()
        .ok_or_else(|| invalid(format!("{}: sentinels must not be empty", p.name)))?;

    let mut builder = ProjectDescriptor::builder(&p.name, &p.url, &p.checksum, first, kind)
        .args(p.args)
        .depends_on(p.depends);
    for sentinel in sentinels {
        builder = builder.sentinel(sentinel);
    }

    if let Some(base) = &p.base {
        builder = builder.base(base);
    }
    if let Some(raw) = &p.bootstrap {
        let bootstrap: Bootstrap = raw
            .parse()
            .map_err(|e| invalid(format!("{}: {}", p.name, e)))?;
        builder = builder.bootstrap(bootstrap);
    }
    if let Some(flags) = &p.cppflags {
        builder = builder.cppflags(flags);
    }
    if let Some(version) = &p.version {
        builder = builder.version(version);
    }

    let subdirs = p
        .make_subdirs
        .iter()
        .map(|d| relative_path(d, "make_subdirs").map_err(|e| invalid(format!("{}: {}", p.name, e))))
        .collect::<Result<Vec<_>>>()?;
    builder = builder.make_subdirs(subdirs);

    if let Some(dir) = &p.patch_dir {
        let dir = Path::new(dir);
        let resolved = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            base_dir.join(dir)
        };
        builder = builder.patch_dir(resolved);
    }

    for (platform, args) in p.platform_args {
        let platform: Platform = platform
            .parse()
            .map_err(|e| invalid(format!("{}: platform_args: {}", p.name, e)))?;
        builder = builder.platform_args(platform, args);
    }

    for (file, edits) in p.edits {
        let file_path = relative_path(&file, "edits").map_err(|e| invalid(format!("{}: {}", p.name, e)))?;
        let file_key = file_path.to_string_lossy().into_owned();
        for e in edits {
            builder = builder.edit(
                &file_key,
                TextEdit {
                    pattern: e.pattern,
                    replacement: e.replacement,
                    count: e.count,
                },
            );
        }
    }

    builder.build().map_err(|e| invalid(strip_prefix(&e)))
}

/// Source-tree paths must stay inside the tree.
fn relative_path(raw: &str, field: &str) -> std::result::Result<PathBuf, String> {
    let candidate = Path::new(raw);
    if raw.trim().is_empty() || candidate.is_absolute() {
        return Err(format!("{field} must be a non-empty relative path, got '{}'", raw));
    }
    for component in candidate.components() {
        if matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        ) {
            return Err(format!(
                "{field} contains invalid traversal/root component in '{}'",
                raw
            ));
        }
    }
    Ok(candidate.to_path_buf())
}
