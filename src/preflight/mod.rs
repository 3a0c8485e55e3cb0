//! Host tool checks run before anything is fetched.
//!
//! A missing `meson` or `perl` otherwise surfaces halfway through a long run
//! as a spawn failure inside one project.

use crate::descriptor::{Bootstrap, BuildKind, ProjectDescriptor};
use crate::error::{Error, Result};
use crate::toolchain::Toolchain;
use std::collections::BTreeMap;

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// `(command, package)` pairs a build kind needs beyond the compiler.
pub fn tools_for_kind(kind: BuildKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        BuildKind::Autotools => &[("sh", "sh"), ("make", "make")],
        BuildKind::CMake => &[("cmake", "cmake"), ("make", "make")],
        BuildKind::Meson => &[("meson", "meson"), ("ninja", "ninja-build")],
        BuildKind::CustomZlib => &[("sh", "sh"), ("make", "make")],
        BuildKind::CustomFfmpeg => &[("sh", "sh"), ("make", "make")],
        BuildKind::CustomOpenSsl => &[("perl", "perl"), ("make", "make")],
        BuildKind::CustomBoost | BuildKind::CustomJack => &[],
    }
}

const LIBTOOLIZE: &str = if cfg!(target_os = "macos") {
    "glibtoolize"
} else {
    "libtoolize"
};

fn tools_for_bootstrap(bootstrap: Bootstrap) -> &'static [(&'static str, &'static str)] {
    match bootstrap {
        Bootstrap::Autogen => &[
            (LIBTOOLIZE, "libtool"),
            ("aclocal", "automake"),
            ("automake", "automake"),
            ("autoconf", "autoconf"),
        ],
        Bootstrap::Autoreconf => &[("autoreconf", "autoconf")],
    }
}

/// Every host tool the given projects will spawn, keyed by command.
pub fn required_tools<'a>(
    projects: impl IntoIterator<Item = &'a ProjectDescriptor>,
    toolchain: &Toolchain,
) -> BTreeMap<String, String> {
    let mut tools = BTreeMap::new();
    // `CC="ccache gcc"` needs `ccache`
    let mut add = |cmd: &str, package: &str| {
        let program = cmd.split_whitespace().next().unwrap_or(cmd);
        tools
            .entry(program.to_string())
            .or_insert_with(|| package.to_string());
    };

    let mut compiles = false;
    for d in projects {
        for (cmd, package) in tools_for_kind(d.build_kind) {
            add(cmd, package);
        }
        if let Some(b) = d.bootstrap {
            for (cmd, package) in tools_for_bootstrap(b) {
                add(cmd, package);
            }
        }
        if d.patch_dir.is_some() {
            add("patch", "patch");
        }
        if d.build_kind == BuildKind::CustomBoost && !d.configure_args.is_empty() {
            add("sh", "sh");
            add(&toolchain.cxx, "C++ compiler");
        }
        let scheme = d.source_url.split("://").next().unwrap_or_default();
        if !matches!(scheme, "http" | "https" | "file") {
            add("curl", "curl");
        }
        compiles |= !matches!(d.build_kind, BuildKind::CustomBoost | BuildKind::CustomJack);
    }

    if compiles {
        add(&toolchain.cc, "C compiler");
        add(&toolchain.cxx, "C++ compiler");
        add(&toolchain.ar, "binutils");
    }
    tools
}

/// Check that specific tools are available.
pub fn check_required_tools<'a>(
    tools: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
    let missing: Vec<String> = tools
        .into_iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(t, p)| format!("  {} (install: {})", t, p))
        .collect();

    if !missing.is_empty() {
        return Err(Error::Preflight(missing.join("\n")));
    }
    Ok(())
}

/// Check the tools needed to build `projects` with `toolchain`.
pub fn check_projects<'a>(
    projects: impl IntoIterator<Item = &'a ProjectDescriptor>,
    toolchain: &Toolchain,
) -> Result<()> {
    let tools = required_tools(projects, toolchain);
    tracing::debug!(tools = ?tools.keys().collect::<Vec<_>>(), "preflight");
    check_required_tools(tools.iter().map(|(t, p)| (t.as_str(), p.as_str())))
}
