//! Target platform and cross toolchain description.
//!
//! Every native tool invocation gets its compiler, archiver and flags from a
//! [`Toolchain`], and its `pkg-config` search path pinned to the install
//! prefix so host libraries never leak into a cross build.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Operating system the libraries are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    Windows,
    Android,
    Darwin,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Linux,
        Platform::Windows,
        Platform::Android,
        Platform::Darwin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Android => "android",
            Platform::Darwin => "darwin",
        }
    }

    /// Platform implied by a GNU host triplet.
    ///
    /// e.g. `x86_64-w64-mingw32` → Windows, `aarch64-linux-android` → Android
    pub fn from_triplet(triplet: &str) -> Self {
        let t = triplet.to_ascii_lowercase();
        if t.contains("mingw") || t.contains("windows") {
            Platform::Windows
        } else if t.contains("android") {
            Platform::Android
        } else if t.contains("apple") || t.contains("darwin") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }

    /// Platform of the machine running this process.
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "windows" | "win32" | "win64" | "mingw" => Ok(Platform::Windows),
            "android" => Ok(Platform::Android),
            "darwin" | "macos" | "osx" => Ok(Platform::Darwin),
            other => Err(format!(
                "unsupported platform '{}'; expected one of: linux, windows, android, darwin",
                other
            )),
        }
    }
}

/// Compilers, tools and flags for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub platform: Platform,
    /// GNU host triplet; `None` for native builds.
    pub host_triplet: Option<String>,
    pub cc: String,
    pub cxx: String,
    pub ar: String,
    pub ranlib: String,
    pub strip: String,
    pub nm: String,
    pub windres: String,
    pub cflags: String,
    pub cxxflags: String,
    pub cppflags: String,
    pub ldflags: String,
    pub libs: String,
    pub install_prefix: PathBuf,
}

impl Toolchain {
    /// Toolchain for building on and for the current host.
    pub fn native(install_prefix: impl Into<PathBuf>) -> Self {
        let platform = Platform::host();
        Self {
            platform,
            host_triplet: None,
            cc: "cc".to_string(),
            cxx: "c++".to_string(),
            ar: "ar".to_string(),
            ranlib: "ranlib".to_string(),
            strip: "strip".to_string(),
            nm: "nm".to_string(),
            windres: "windres".to_string(),
            cflags: default_cflags(platform),
            cxxflags: default_cflags(platform),
            cppflags: String::new(),
            ldflags: String::new(),
            libs: String::new(),
            install_prefix: install_prefix.into(),
        }
    }

    /// Cross toolchain whose tools are named `<triplet>-gcc`, `<triplet>-ar`, ...
    pub fn cross(triplet: &str, install_prefix: impl Into<PathBuf>) -> Self {
        let platform = Platform::from_triplet(triplet);
        let (cc, cxx) = match platform {
            Platform::Android | Platform::Darwin => {
                (format!("{}-clang", triplet), format!("{}-clang++", triplet))
            }
            Platform::Linux | Platform::Windows => {
                (format!("{}-gcc", triplet), format!("{}-g++", triplet))
            }
        };
        Self {
            platform,
            host_triplet: Some(triplet.to_string()),
            cc,
            cxx,
            ar: format!("{}-ar", triplet),
            ranlib: format!("{}-ranlib", triplet),
            strip: format!("{}-strip", triplet),
            nm: format!("{}-nm", triplet),
            windres: format!("{}-windres", triplet),
            cflags: default_cflags(platform),
            cxxflags: default_cflags(platform),
            cppflags: String::new(),
            ldflags: String::new(),
            libs: String::new(),
            install_prefix: install_prefix.into(),
        }
    }

    pub fn is_cross(&self) -> bool {
        self.host_triplet.is_some()
    }

    pub fn is_windows(&self) -> bool {
        self.platform == Platform::Windows
    }

    /// CPU component of the host triplet, or the build machine's architecture.
    pub fn cpu(&self) -> &str {
        match &self.host_triplet {
            Some(t) => t.split('-').next().unwrap_or(t),
            None => std::env::consts::ARCH,
        }
    }

    pub fn install_prefix(&self) -> &Path {
        &self.install_prefix
    }

    /// Preprocessor flags including the install prefix's include directory.
    pub fn effective_cppflags(&self, extra: Option<&str>) -> String {
        let include = format!("-I{}", self.install_prefix.join("include").display());
        join_flags(&[include.as_str(), self.cppflags.as_str(), extra.unwrap_or("")])
    }

    /// Linker flags including the install prefix's library directory.
    pub fn effective_ldflags(&self) -> String {
        let lib = format!("-L{}", self.install_prefix.join("lib").display());
        join_flags(&[lib.as_str(), self.ldflags.as_str()])
    }

    /// Environment for every native tool invocation.
    pub fn env(&self) -> Vec<(String, String)> {
        let pkgconfig = self.install_prefix.join("lib/pkgconfig");
        vec![
            ("CC".to_string(), self.cc.clone()),
            ("CXX".to_string(), self.cxx.clone()),
            ("AR".to_string(), self.ar.clone()),
            ("RANLIB".to_string(), self.ranlib.clone()),
            ("STRIP".to_string(), self.strip.clone()),
            ("NM".to_string(), self.nm.clone()),
            ("CFLAGS".to_string(), self.cflags.clone()),
            ("CXXFLAGS".to_string(), self.cxxflags.clone()),
            ("CPPFLAGS".to_string(), self.effective_cppflags(None)),
            ("LDFLAGS".to_string(), self.effective_ldflags()),
            ("LIBS".to_string(), self.libs.clone()),
            ("PKG_CONFIG_LIBDIR".to_string(), pkgconfig.display().to_string()),
            ("PKG_CONFIG_PATH".to_string(), String::new()),
        ]
    }
}

fn default_cflags(platform: Platform) -> String {
    match platform {
        Platform::Windows => "-O2 -ffunction-sections -fdata-sections".to_string(),
        Platform::Linux | Platform::Android | Platform::Darwin => {
            "-O2 -fPIC -ffunction-sections -fdata-sections".to_string()
        }
    }
}

/// Join non-empty flag fragments with single spaces.
pub fn join_flags(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_from_triplet() {
        assert_eq!(Platform::from_triplet("x86_64-w64-mingw32"), Platform::Windows);
        assert_eq!(
            Platform::from_triplet("aarch64-linux-android"),
            Platform::Android
        );
        assert_eq!(Platform::from_triplet("arm64-apple-darwin"), Platform::Darwin);
        assert_eq!(Platform::from_triplet("x86_64-linux-gnu"), Platform::Linux);
    }

    #[test]
    fn platform_parses_aliases() {
        assert_eq!("Windows".parse::<Platform>().unwrap(), Platform::Windows);
        assert_eq!("macos".parse::<Platform>().unwrap(), Platform::Darwin);
        assert!("beos".parse::<Platform>().is_err());
    }

    #[test]
    fn cross_toolchain_names_tools_after_triplet() {
        let tc = Toolchain::cross("i686-w64-mingw32", "/opt/prefix");
        assert_eq!(tc.cc, "i686-w64-mingw32-gcc");
        assert_eq!(tc.ar, "i686-w64-mingw32-ar");
        assert_eq!(tc.cpu(), "i686");
        assert!(tc.is_cross());
        assert!(tc.is_windows());
    }

    #[test]
    fn env_pins_pkg_config_to_prefix() {
        let tc = Toolchain::native("/opt/prefix");
        let env = tc.env();
        let get = |k: &str| {
            env.iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("PKG_CONFIG_LIBDIR"), "/opt/prefix/lib/pkgconfig");
        assert_eq!(get("PKG_CONFIG_PATH"), "");
        assert!(get("CPPFLAGS").starts_with("-I/opt/prefix/include"));
        assert!(get("LDFLAGS").starts_with("-L/opt/prefix/lib"));
    }

    #[test]
    fn join_flags_skips_empty_parts() {
        assert_eq!(join_flags(&["-O2", "", "  ", "-g"]), "-O2 -g");
    }
}
