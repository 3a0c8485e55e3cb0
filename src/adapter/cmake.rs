use super::{Adapter, BuildContext};
use crate::error::Result;
use crate::process::Cmd;
use crate::toolchain::{join_flags, Platform};

pub struct CMake;

impl CMake {
    pub(crate) fn configure(ctx: &BuildContext<'_>) -> Cmd {
        let tc = ctx.toolchain;
        let prefix = ctx.prefix().display().to_string();
        let cppflags = ctx.cppflags();

        let mut cmd = ctx
            .tool("cmake")
            .arg("-S")
            .arg(ctx.source_tree)
            .arg("-B")
            .arg(&ctx.build_dir)
            .args([
                format!("-DCMAKE_INSTALL_PREFIX={}", prefix),
                "-DCMAKE_BUILD_TYPE=Release".to_string(),
                "-DCMAKE_INSTALL_LIBDIR=lib".to_string(),
                format!("-DCMAKE_C_COMPILER={}", tc.cc),
                format!("-DCMAKE_CXX_COMPILER={}", tc.cxx),
                format!("-DCMAKE_AR={}", tc.ar),
                format!("-DCMAKE_RANLIB={}", tc.ranlib),
                format!("-DCMAKE_C_FLAGS={}", join_flags(&[tc.cflags.as_str(), cppflags.as_str()])),
                format!("-DCMAKE_CXX_FLAGS={}", join_flags(&[tc.cxxflags.as_str(), cppflags.as_str()])),
                format!("-DCMAKE_EXE_LINKER_FLAGS={}", tc.effective_ldflags()),
                format!("-DCMAKE_PREFIX_PATH={}", prefix),
            ]);

        if tc.is_cross() {
            cmd = cmd.args([
                format!("-DCMAKE_SYSTEM_NAME={}", system_name(tc.platform)),
                format!("-DCMAKE_SYSTEM_PROCESSOR={}", tc.cpu()),
                format!("-DCMAKE_FIND_ROOT_PATH={}", prefix),
                "-DCMAKE_FIND_ROOT_PATH_MODE_PROGRAM=NEVER".to_string(),
                "-DCMAKE_FIND_ROOT_PATH_MODE_LIBRARY=ONLY".to_string(),
                "-DCMAKE_FIND_ROOT_PATH_MODE_INCLUDE=ONLY".to_string(),
            ]);
            if tc.is_windows() {
                cmd = cmd.arg(format!("-DCMAKE_RC_COMPILER={}", tc.windres));
            }
        }

        cmd.args(ctx.args())
    }

    pub(crate) fn build_and_install(ctx: &BuildContext<'_>) -> [Cmd; 2] {
        [
            ctx.tool("cmake")
                .arg("--build")
                .arg(&ctx.build_dir)
                .arg("--parallel")
                .arg(ctx.jobs.max(1).to_string()),
            ctx.tool("cmake").arg("--install").arg(&ctx.build_dir),
        ]
    }
}

fn system_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Linux => "Linux",
        Platform::Windows => "Windows",
        Platform::Android => "Android",
        Platform::Darwin => "Darwin",
    }
}

impl Adapter for CMake {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        ctx.fresh_build_dir()?;
        ctx.run(Self::configure(ctx))?;
        for cmd in Self::build_and_install(ctx) {
            ctx.run(cmd)?;
        }
        Ok(())
    }
}
