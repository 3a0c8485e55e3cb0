use super::{Adapter, BuildContext};
use crate::error::Result;
use crate::process::Cmd;

/// `configure && make && make install`, out of tree.
pub struct Autotools;

impl Autotools {
    pub(crate) fn configure(ctx: &BuildContext<'_>) -> Cmd {
        let tc = ctx.toolchain;
        let mut cmd = ctx
            .tool(ctx.source_tree.join("configure"))
            .current_dir(&ctx.build_dir)
            .args([
                format!("CC={}", tc.cc),
                format!("CXX={}", tc.cxx),
                format!("CFLAGS={}", tc.cflags),
                format!("CXXFLAGS={}", tc.cxxflags),
                format!("CPPFLAGS={}", ctx.cppflags()),
                format!("LDFLAGS={}", tc.effective_ldflags()),
                format!("LIBS={}", tc.libs),
                format!("AR={}", tc.ar),
                format!("RANLIB={}", tc.ranlib),
                format!("STRIP={}", tc.strip),
            ])
            .arg(format!("--prefix={}", ctx.prefix().display()));
        if let Some(host) = &tc.host_triplet {
            cmd = cmd.arg(format!("--host={}", host));
        }
        cmd.arg("--disable-silent-rules").args(ctx.args())
    }

    /// `make` invocations after configure: the whole tree, or only the
    /// descriptor's subdirectories.
    pub(crate) fn make(ctx: &BuildContext<'_>) -> Vec<Cmd> {
        let make = || ctx.tool("make").current_dir(&ctx.build_dir);
        if ctx.descriptor.make_subdirs.is_empty() {
            return vec![make().arg(ctx.jobs_arg()), make().arg("install")];
        }
        ctx.descriptor
            .make_subdirs
            .iter()
            .map(|dir| {
                make()
                    .arg("-C")
                    .arg(dir)
                    .arg(ctx.jobs_arg())
                    .arg("install")
            })
            .collect()
    }
}

impl Adapter for Autotools {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        ctx.fresh_build_dir()?;
        ctx.run(Self::configure(ctx))?;
        for cmd in Self::make(ctx) {
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
    use crate::toolchain::Toolchain;

    #[test]
    fn configure_passes_toolchain_prefix_and_host() {
        let d = descriptor("opus", BuildKind::Autotools)
            .args(["--disable-shared", "--enable-static"])
            .cppflags("-DOPUS_EXPORT=")
            .build()
            .unwrap();
        let tc = Toolchain::cross("x86_64-w64-mingw32", "/opt/win64");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);

        let cmd = Autotools::configure(&ctx);
        assert_eq!(
            cmd.program().to_string_lossy(),
            "/work/src/proj/configure"
        );
        assert_eq!(cmd.working_dir(), Some(std::path::Path::new("/work/build/proj")));
        let args = cmd.arguments();
        assert!(has(&args, "CC=x86_64-w64-mingw32-gcc"));
        assert!(has(&args, "--prefix=/opt/win64"));
        assert!(has(&args, "--host=x86_64-w64-mingw32"));
        assert!(has(&args, "--disable-silent-rules"));
        assert!(args
            .iter()
            .any(|a| a.starts_with("CPPFLAGS=") && a.ends_with("-DOPUS_EXPORT=")));
        assert_eq!(args.last().map(String::as_str), Some("--enable-static"));
    }

    #[test]
    fn native_configure_has_no_host() {
        let d = descriptor("liblame", BuildKind::Autotools).build().unwrap();
        let tc = Toolchain::native("/opt/native");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);
        let args = Autotools::configure(&ctx).arguments();
        assert!(!args.iter().any(|a| a.starts_with("--host=")));
    }

    #[test]
    fn subdirs_limit_make_targets() {
        let d = descriptor("flac", BuildKind::Autotools)
            .make_subdirs(["include", "src/libFLAC"])
            .build()
            .unwrap();
        let tc = Toolchain::native("/opt/native");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);

        let cmds: Vec<String> = Autotools::make(&ctx).iter().map(|c| c.display()).collect();
        assert_eq!(
            cmds,
            vec![
                "make -C include -j4 install".to_string(),
                "make -C src/libFLAC -j4 install".to_string(),
            ]
        );

        let whole = descriptor("liblame", BuildKind::Autotools).build().unwrap();
        let ctx = context(&whole, &tc, &cancel);
        let cmds: Vec<String> = Autotools::make(&ctx).iter().map(|c| c.display()).collect();
        assert_eq!(cmds, vec!["make -j4".to_string(), "make install".to_string()]);
    }
}
