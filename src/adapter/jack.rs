use super::{Adapter, BuildContext};
use crate::error::{Error, Result};
use crate::fsutil::write_atomic;
use std::fs;

/// Headers the server compiles against. The library itself is loaded from
/// the user's JACK installation at run time.
const HEADERS: &[&str] = &[
    "jack.h",
    "ringbuffer.h",
    "systemdeps.h",
    "transport.h",
    "types.h",
    "weakmacros.h",
];

/// JACK2 is not compiled: its public headers and a pkg-config file are
/// installed so that consumers can find them.
pub struct Jack;

pub(crate) fn pkg_config(ctx: &BuildContext<'_>) -> String {
    let tc = ctx.toolchain;
    let lib = if tc.is_windows() && tc.cpu() == "x86_64" {
        "jack64"
    } else {
        "jack"
    };
    format!(
        "prefix={prefix}\n\
         libdir=${{prefix}}/lib\n\
         includedir=${{prefix}}/include\n\
         \n\
         Name: jack\n\
         Description: JACK Audio Connection Kit\n\
         Version: {version}\n\
         Libs: -L${{libdir}} -l{lib}\n\
         Cflags: -I${{includedir}}\n",
        prefix = ctx.prefix().display(),
        version = ctx.descriptor.version(),
        lib = lib,
    )
}

impl Adapter for Jack {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let src = ctx.source_tree.join("common").join("jack");
        let dest = ctx.prefix().join("include").join("jack");
        fs::create_dir_all(&dest).map_err(|e| ctx.io_error("creating", &dest, e))?;

        for header in HEADERS {
            ctx.check_cancelled()?;
            let from = src.join(header);
            if !from.is_file() {
                return Err(Error::build(
                    ctx.name(),
                    format!("missing header '{}'", from.display()),
                ));
            }
            let to = dest.join(header);
            fs::copy(&from, &to).map_err(|e| ctx.io_error("copying", &from, e))?;
        }

        let pc = ctx.prefix().join("lib").join("pkgconfig").join("jack.pc");
        write_atomic(&pc, pkg_config(ctx).as_bytes())
            .map_err(|e| ctx.io_error("writing", &pc, e))?;
        tracing::info!(project = %ctx.name(), "installed headers and {}", pc.display());
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
    use std::path::PathBuf;

    fn jack() -> crate::descriptor::ProjectDescriptor {
        descriptor("jack", BuildKind::CustomJack)
            .base("jack2-1.9.17")
            .version("1.9.17")
            .build()
            .unwrap()
    }

    #[test]
    fn pkg_config_picks_library_name_per_target() {
        let d = jack();
        let cancel = CancelToken::new();

        let win64 = Toolchain::cross("x86_64-w64-mingw32", "/opt/win64");
        let text = pkg_config(&context(&d, &win64, &cancel));
        assert!(text.starts_with("prefix=/opt/win64\n"));
        assert!(text.contains("Version: 1.9.17\n"));
        assert!(text.contains("Libs: -L${libdir} -ljack64\n"));

        let win32 = Toolchain::cross("i686-w64-mingw32", "/opt/win32");
        let text = pkg_config(&context(&d, &win32, &cancel));
        assert!(text.contains("Libs: -L${libdir} -ljack\n"));
    }

    #[test]
    fn installs_headers_and_pc_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("jack2-1.9.17");
        fs::create_dir_all(src.join("common/jack")).unwrap();
        for h in HEADERS {
            fs::write(src.join("common/jack").join(h), "/* header */\n").unwrap();
        }

        let d = jack();
        let prefix = tmp.path().join("root");
        let tc = Toolchain::native(&prefix);
        let cancel = CancelToken::new();
        let ctx = BuildContext {
            descriptor: &d,
            source_tree: &src,
            build_dir: PathBuf::from("/unused"),
            toolchain: &tc,
            jobs: 1,
            timeout: None,
            cancel: &cancel,
        };

        Jack.build(&ctx).unwrap();
        for h in HEADERS {
            assert!(prefix.join("include/jack").join(h).is_file());
        }
        let pc = fs::read_to_string(prefix.join("lib/pkgconfig/jack.pc")).unwrap();
        assert!(pc.contains("Name: jack"));
    }

    #[test]
    fn missing_header_fails_the_build() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("jack2-1.9.17");
        fs::create_dir_all(src.join("common/jack")).unwrap();
        fs::write(src.join("common/jack/jack.h"), "").unwrap();

        let d = jack();
        let tc = Toolchain::native(tmp.path().join("root"));
        let cancel = CancelToken::new();
        let ctx = BuildContext {
            descriptor: &d,
            source_tree: &src,
            build_dir: PathBuf::from("/unused"),
            toolchain: &tc,
            jobs: 1,
            timeout: None,
            cancel: &cancel,
        };
        let err = Jack.build(&ctx).unwrap_err();
        assert!(err.to_string().contains("ringbuffer.h"));
    }
}
