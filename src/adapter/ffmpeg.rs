use super::{Adapter, BuildContext};
use crate::error::Result;
use crate::process::Cmd;
use crate::toolchain::{join_flags, Platform};

/// FFmpeg's `configure` ignores the usual `CC=` conventions and wants every
/// tool and flag as an explicit option.
pub struct Ffmpeg;

pub(crate) fn target_os(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "mingw32",
        Platform::Android => "android",
        Platform::Darwin => "darwin",
        Platform::Linux => "linux",
    }
}

/// FFmpeg's name for the CPU of a triplet.
pub(crate) fn arch(cpu: &str) -> &str {
    match cpu {
        "i386" | "i486" | "i586" | "i686" => "x86",
        "arm64" => "aarch64",
        other => other,
    }
}

impl Ffmpeg {
    pub(crate) fn configure(ctx: &BuildContext<'_>) -> Cmd {
        let tc = ctx.toolchain;
        let cppflags = ctx.cppflags();

        let mut cmd = ctx
            .tool(ctx.source_tree.join("configure"))
            .current_dir(&ctx.build_dir)
            .args([
                format!("--cc={}", tc.cc),
                format!("--cxx={}", tc.cxx),
                format!("--nm={}", tc.nm),
                format!("--ar={}", tc.ar),
                format!("--ranlib={}", tc.ranlib),
                format!("--strip={}", tc.strip),
                format!("--extra-cflags={}", join_flags(&[tc.cflags.as_str(), cppflags.as_str()])),
                format!("--extra-cxxflags={}", join_flags(&[tc.cxxflags.as_str(), cppflags.as_str()])),
                format!("--extra-ldflags={}", tc.effective_ldflags()),
            ]);
        if !tc.libs.trim().is_empty() {
            cmd = cmd.arg(format!("--extra-libs={}", tc.libs));
        }
        cmd = cmd.args([
            format!("--prefix={}", ctx.prefix().display()),
            format!("--arch={}", arch(tc.cpu())),
            format!("--target-os={}", target_os(tc.platform)),
        ]);
        if let Some(triplet) = &tc.host_triplet {
            cmd = cmd.args([
                "--enable-cross-compile".to_string(),
                format!("--cross-prefix={}-", triplet),
            ]);
        }
        cmd.args(ctx.args())
    }
}

impl Adapter for Ffmpeg {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        ctx.fresh_build_dir()?;
        ctx.run(Self::configure(ctx))?;
        let make = || ctx.tool("make").current_dir(&ctx.build_dir);
        ctx.run(make().arg(ctx.jobs_arg()))?;
        ctx.run(make().arg("install"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::descriptor::BuildKind;
    use crate::process::CancelToken;
    use crate::toolchain::Toolchain;

    #[test]
    fn target_os_follows_platform() {
        assert_eq!(target_os(Platform::Windows), "mingw32");
        assert_eq!(target_os(Platform::Android), "android");
        assert_eq!(target_os(Platform::Linux), "linux");
        assert_eq!(target_os(Platform::Darwin), "darwin");
        assert_eq!(arch("i686"), "x86");
        assert_eq!(arch("aarch64"), "aarch64");
    }

    #[test]
    fn cross_configure_names_every_tool() {
        let d = descriptor("ffmpeg", BuildKind::CustomFfmpeg)
            .args(["--disable-shared", "--enable-static"])
            .build()
            .unwrap();
        let tc = Toolchain::cross("i686-w64-mingw32", "/opt/win32");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);

        let cmd = Ffmpeg::configure(&ctx);
        let args = cmd.arguments();
        assert!(has(&args, "--cc=i686-w64-mingw32-gcc"));
        assert!(has(&args, "--nm=i686-w64-mingw32-nm"));
        assert!(has(&args, "--arch=x86"));
        assert!(has(&args, "--target-os=mingw32"));
        assert!(has(&args, "--enable-cross-compile"));
        assert!(has(&args, "--cross-prefix=i686-w64-mingw32-"));
        assert!(has(&args, "--prefix=/opt/win32"));
        assert!(!args.iter().any(|a| a.starts_with("--extra-libs")));
        assert_eq!(args.last().map(String::as_str), Some("--enable-static"));
        assert_eq!(cmd.working_dir(), Some(std::path::Path::new("/work/build/proj")));
    }

    #[test]
    fn native_configure_is_not_cross() {
        let d = descriptor("ffmpeg", BuildKind::CustomFfmpeg).build().unwrap();
        let tc = Toolchain::native("/opt/native");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);
        let args = Ffmpeg::configure(&ctx).arguments();
        assert!(!has(&args, "--enable-cross-compile"));
    }
}
