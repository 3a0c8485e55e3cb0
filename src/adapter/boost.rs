use super::{Adapter, BuildContext};
use crate::error::{Error, Result};
use crate::fsutil::{remove_path, tmp_name};
use crate::process::Cmd;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

const HEADER_EXTENSIONS: &[&str] = &["hpp", "h", "ipp"];

/// Boost is consumed header-only: the headers are copied into the prefix.
/// When configure arguments are present, `b2` also builds the libraries
/// they select.
pub struct Boost;

impl Boost {
    pub(crate) fn b2_commands(ctx: &BuildContext<'_>) -> Vec<Cmd> {
        let in_tree = |program: &str| {
            ctx.tool(ctx.source_tree.join(program))
                .current_dir(ctx.source_tree)
        };
        vec![
            in_tree("bootstrap.sh").arg(format!("--prefix={}", ctx.prefix().display())),
            in_tree("b2")
                .arg(ctx.jobs_arg())
                .arg("install")
                .arg("link=static")
                .args(ctx.args()),
        ]
    }
}

/// Copy every header under `<src>/boost` to `<prefix>/include/boost`.
///
/// Headers are staged next to the destination and swapped in at the end, so
/// `version.hpp` only appears once the copy is complete.
fn install_headers(ctx: &BuildContext<'_>) -> Result<usize> {
    let src = ctx.source_tree.join("boost");
    if !src.is_dir() {
        return Err(Error::build(
            ctx.name(),
            format!("'{}' is not a directory", src.display()),
        ));
    }

    let include = ctx.prefix().join("include");
    let staging = include.join(tmp_name(".boost.tmp"));
    let dest = include.join("boost");
    fs::create_dir_all(&staging).map_err(|e| ctx.io_error("creating", &staging, e))?;

    let copied = copy_headers(ctx, &src, &staging);
    let copied = match copied {
        Ok(n) => n,
        Err(e) => {
            let _ = remove_path(&staging);
            return Err(e);
        }
    };

    remove_path(&dest).map_err(|e| ctx.io_error("removing", &dest, e))?;
    fs::rename(&staging, &dest).map_err(|e| ctx.io_error("installing", &dest, e))?;
    Ok(copied)
}

fn copy_headers(ctx: &BuildContext<'_>, src: &Path, staging: &Path) -> Result<usize> {
    let mut copied = 0usize;
    for entry in WalkDir::new(src) {
        ctx.check_cancelled()?;
        let entry = entry.map_err(|e| Error::build(ctx.name(), format!("walking headers: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_header = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| HEADER_EXTENSIONS.contains(&e));
        if !is_header {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::build(ctx.name(), e.to_string()))?;
        let target = staging.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ctx.io_error("creating", parent, e))?;
        }
        fs::copy(entry.path(), &target).map_err(|e| ctx.io_error("copying", entry.path(), e))?;
        copied += 1;
    }
    Ok(copied)
}

impl Adapter for Boost {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let copied = install_headers(ctx)?;
        tracing::info!(project = %ctx.name(), headers = copied, "installed headers");

        if !ctx.descriptor.configure_args.is_empty() {
            for cmd in Self::b2_commands(ctx) {
                ctx.run(cmd)?;
            }
        }
        Ok(())
    }
}
