use super::{Adapter, BuildContext};
use crate::error::Result;
use crate::process::Cmd;
use crate::toolchain::{Platform, Toolchain};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

pub struct Meson;

impl Meson {
    /// `<build>/../<name>-cross.ini`
    pub(crate) fn cross_file_path(ctx: &BuildContext<'_>) -> PathBuf {
        let file = format!("{}-cross.ini", ctx.name());
        match ctx.build_dir.parent() {
            Some(parent) => parent.join(file),
            None => ctx.build_dir.join(file),
        }
    }

    pub(crate) fn setup(ctx: &BuildContext<'_>, cross_file: Option<&PathBuf>) -> Cmd {
        let mut cmd = ctx
            .tool("meson")
            .arg("setup")
            .arg(&ctx.build_dir)
            .arg(ctx.source_tree)
            .args([
                format!("--prefix={}", ctx.prefix().display()),
                "--libdir=lib".to_string(),
                "--buildtype=release".to_string(),
                "-Ddefault_library=static".to_string(),
            ]);
        if let Some(file) = cross_file {
            cmd = cmd.arg("--cross-file").arg(file);
        }
        cmd.args(ctx.args())
    }

    pub(crate) fn compile_and_install(ctx: &BuildContext<'_>) -> [Cmd; 2] {
        [
            ctx.tool("meson")
                .arg("compile")
                .arg("-C")
                .arg(&ctx.build_dir)
                .arg(ctx.jobs_arg()),
            ctx.tool("meson").arg("install").arg("-C").arg(&ctx.build_dir),
        ]
    }
}

/// Meson cross file describing the toolchain's host machine.
pub(crate) fn cross_file_contents(tc: &Toolchain, cppflags: &str) -> String {
    let mut out = String::new();
    let quote = |s: &str| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"));
    let list = |flags: &[&str]| {
        let items: Vec<String> = flags
            .iter()
            .flat_map(|f| f.split_whitespace())
            .map(quote)
            .collect();
        format!("[{}]", items.join(", "))
    };

    let _ = writeln!(out, "[binaries]");
    let _ = writeln!(out, "c = {}", quote(&tc.cc));
    let _ = writeln!(out, "cpp = {}", quote(&tc.cxx));
    let _ = writeln!(out, "ar = {}", quote(&tc.ar));
    let _ = writeln!(out, "strip = {}", quote(&tc.strip));
    let _ = writeln!(out, "pkg-config = 'pkg-config'");
    if tc.is_windows() {
        let _ = writeln!(out, "windres = {}", quote(&tc.windres));
    }

    let ldflags = tc.effective_ldflags();
    let _ = writeln!(out, "\n[built-in options]");
    let _ = writeln!(out, "c_args = {}", list(&[tc.cflags.as_str(), cppflags]));
    let _ = writeln!(out, "cpp_args = {}", list(&[tc.cxxflags.as_str(), cppflags]));
    let _ = writeln!(out, "c_link_args = {}", list(&[ldflags.as_str(), tc.libs.as_str()]));
    let _ = writeln!(out, "cpp_link_args = {}", list(&[ldflags.as_str(), tc.libs.as_str()]));

    let _ = writeln!(out, "\n[host_machine]");
    let _ = writeln!(out, "system = {}", quote(meson_system(tc.platform)));
    let _ = writeln!(out, "cpu_family = {}", quote(cpu_family(tc.cpu())));
    let _ = writeln!(out, "cpu = {}", quote(tc.cpu()));
    let _ = writeln!(out, "endian = 'little'");
    out
}

fn meson_system(platform: Platform) -> &'static str {
    match platform {
        Platform::Linux => "linux",
        Platform::Windows => "windows",
        Platform::Android => "android",
        Platform::Darwin => "darwin",
    }
}

fn cpu_family(cpu: &str) -> &str {
    match cpu {
        "i386" | "i486" | "i586" | "i686" => "x86",
        "arm64" => "aarch64",
        c if c.starts_with("armv") || c == "arm" => "arm",
        other => other,
    }
}

impl Adapter for Meson {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        ctx.fresh_build_dir()?;
        let cross_file = if ctx.toolchain.is_cross() {
            let path = Self::cross_file_path(ctx);
            fs::write(&path, cross_file_contents(ctx.toolchain, &ctx.cppflags()))
                .map_err(|e| ctx.io_error("writing", &path, e))?;
            Some(path)
        } else {
            None
        };

        ctx.run(Self::setup(ctx, cross_file.as_ref()))?;
        for cmd in Self::compile_and_install(ctx) {
            ctx.run(cmd)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::descriptor::BuildKind;
    use crate::process::CancelToken;

    #[test]
    fn cross_file_describes_host_machine() {
        let tc = Toolchain::cross("aarch64-linux-android", "/opt/android");
        let text = cross_file_contents(&tc, "-I/opt/android/include -DFOO");
        assert!(text.contains("c = 'aarch64-linux-android-clang'"));
        assert!(text.contains("system = 'android'"));
        assert!(text.contains("cpu_family = 'aarch64'"));
        assert!(text.contains("'-I/opt/android/include', '-DFOO'"));
        assert!(!text.contains("windres"));

        let win = Toolchain::cross("i686-w64-mingw32", "/opt/win32");
        let text = cross_file_contents(&win, "");
        assert!(text.contains("cpu_family = 'x86'"));
        assert!(text.contains("windres = 'i686-w64-mingw32-windres'"));
    }

    #[test]
    fn setup_uses_static_release_and_cross_file() {
        let d = descriptor("libmpdclient", BuildKind::Meson)
            .args(["-Ddocumentation=false"])
            .build()
            .unwrap();
        let tc = Toolchain::cross("x86_64-w64-mingw32", "/opt/win64");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);

        let cross = Meson::cross_file_path(&ctx);
        assert_eq!(cross, PathBuf::from("/work/build/libmpdclient-cross.ini"));

        let cmd = Meson::setup(&ctx, Some(&cross));
        assert_eq!(
            cmd.display(),
            "meson setup /work/build/proj /work/src/proj --prefix=/opt/win64 --libdir=lib \
             --buildtype=release -Ddefault_library=static \
             --cross-file /work/build/libmpdclient-cross.ini -Ddocumentation=false"
        );
    }
}
