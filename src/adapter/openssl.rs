use super::{Adapter, BuildContext};
use crate::error::{Error, Result};
use crate::process::Cmd;
use crate::toolchain::Platform;

/// OpenSSL's perl `Configure`, in tree, installing only the libraries and
/// headers.
pub struct OpenSsl;

/// `Configure` target for a platform and triplet CPU.
pub(crate) fn openssl_target(platform: Platform, cpu: &str) -> Option<&'static str> {
    let target = match (platform, cpu) {
        (Platform::Windows, "x86_64") => "mingw64",
        (Platform::Windows, "i386" | "i486" | "i586" | "i686") => "mingw",
        (Platform::Android, "aarch64") => "android-arm64",
        (Platform::Android, c) if c.starts_with("arm") => "android-arm",
        (Platform::Android, "x86_64") => "android-x86_64",
        (Platform::Android, "i686") => "android-x86",
        (Platform::Darwin, "aarch64" | "arm64") => "darwin64-arm64-cc",
        (Platform::Darwin, "x86_64") => "darwin64-x86_64-cc",
        (Platform::Linux, "x86_64") => "linux-x86_64",
        (Platform::Linux, "aarch64") => "linux-aarch64",
        (Platform::Linux, c) if c.starts_with("arm") => "linux-armv4",
        (Platform::Linux, "i386" | "i486" | "i586" | "i686") => "linux-x86",
        (Platform::Linux, "powerpc64le") => "linux-ppc64le",
        (Platform::Linux, "riscv64") => "linux64-riscv64",
        _ => return None,
    };
    Some(target)
}

impl OpenSsl {
    pub(crate) fn commands(ctx: &BuildContext<'_>) -> Result<Vec<Cmd>> {
        let tc = ctx.toolchain;
        let target = openssl_target(tc.platform, tc.cpu()).ok_or_else(|| {
            Error::build(
                ctx.name(),
                format!(
                    "no OpenSSL target for {} on {}",
                    tc.cpu(),
                    tc.platform
                ),
            )
        })?;

        let in_tree = |cmd: Cmd| cmd.current_dir(ctx.source_tree);
        Ok(vec![
            in_tree(ctx.tool(ctx.source_tree.join("Configure")))
                .args([
                    "no-shared",
                    "no-module",
                    "no-engine",
                    "no-async",
                    "no-tests",
                    "no-makedepend",
                    "--libdir=lib",
                ])
                .arg(format!("--prefix={}", ctx.prefix().display()))
                .arg(target)
                .args(ctx.args()),
            in_tree(ctx.tool("make"))
                .arg(ctx.jobs_arg())
                .arg("build_libs"),
            in_tree(ctx.tool("make")).arg("install_dev"),
        ])
    }
}

impl Adapter for OpenSsl {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        for cmd in Self::commands(ctx)? {
            ctx.run(cmd)?;
        }
        Ok(())
    }
}
