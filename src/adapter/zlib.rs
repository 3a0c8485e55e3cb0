use super::{Adapter, BuildContext};
use crate::error::Result;
use crate::process::Cmd;

/// zlib's hand-written build: `win32/Makefile.gcc` for Windows targets, its
/// own `configure` everywhere else. Both build in the source tree.
pub struct Zlib;

impl Zlib {
    pub(crate) fn commands(ctx: &BuildContext<'_>) -> Vec<Cmd> {
        let tc = ctx.toolchain;
        let prefix = ctx.prefix();
        let make = || ctx.tool("make").current_dir(ctx.source_tree);

        if tc.is_windows() {
            let tool_prefix = tc
                .host_triplet
                .as_deref()
                .map(|t| format!("{}-", t))
                .unwrap_or_default();
            return vec![make()
                .args(["-f", "win32/Makefile.gcc"])
                .arg(format!("PREFIX={}", tool_prefix))
                .arg(format!("CFLAGS={}", tc.cflags))
                .arg(format!("INCLUDE_PATH={}", prefix.join("include").display()))
                .arg(format!("LIBRARY_PATH={}", prefix.join("lib").display()))
                .arg(format!("BINARY_PATH={}", prefix.join("bin").display()))
                .arg(ctx.jobs_arg())
                .arg("install")];
        }

        vec![
            ctx.tool(ctx.source_tree.join("configure"))
                .current_dir(ctx.source_tree)
                .arg(format!("--prefix={}", prefix.display()))
                .arg("--static")
                .args(ctx.args()),
            make().arg(ctx.jobs_arg()),
            make().arg("install"),
        ]
    }
}

impl Adapter for Zlib {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        for cmd in Self::commands(ctx) {
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
    fn windows_uses_makefile_gcc_with_tool_prefix() {
        let d = descriptor("zlib", BuildKind::CustomZlib).build().unwrap();
        let tc = Toolchain::cross("x86_64-w64-mingw32", "/opt/win64");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);

        let cmds = Zlib::commands(&ctx);
        assert_eq!(cmds.len(), 1);
        let args = cmds[0].arguments();
        assert_eq!(&args[..2], ["-f", "win32/Makefile.gcc"]);
        assert!(has(&args, "PREFIX=x86_64-w64-mingw32-"));
        assert!(has(&args, "INCLUDE_PATH=/opt/win64/include"));
        assert!(has(&args, "LIBRARY_PATH=/opt/win64/lib"));
        assert!(has(&args, "BINARY_PATH=/opt/win64/bin"));
        assert_eq!(args.last().map(String::as_str), Some("install"));
        assert_eq!(
            cmds[0].working_dir(),
            Some(std::path::Path::new("/work/src/proj"))
        );
    }

    #[test]
    fn unix_uses_static_configure() {
        let d = descriptor("zlib", BuildKind::CustomZlib).build().unwrap();
        let tc = Toolchain::cross("aarch64-linux-android", "/opt/android");
        let cancel = CancelToken::new();
        let ctx = context(&d, &tc, &cancel);

        let shown: Vec<String> = Zlib::commands(&ctx).iter().map(|c| c.display()).collect();
        assert_eq!(
            shown,
            vec![
                "/work/src/proj/configure --prefix=/opt/android --static".to_string(),
                "make -j4".to_string(),
                "make install".to_string(),
            ]
        );
    }
}
