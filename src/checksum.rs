//! Algorithm-tagged archive checksums.
//!
//! Manifest entries mix SHA-256 digests with a few legacy MD5 ones, so the
//! algorithm is decided per entry: an explicit `sha256:`/`md5:` tag wins,
//! otherwise the digest length picks it (64 hex = SHA-256, 32 hex = MD5).

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// Legacy and collision-prone; accepted only because some upstreams
    /// never published anything stronger.
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha256 => 64,
        }
    }
}

/// Expected digest of a source archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Checksum {
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Lowercase hex digest.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// First 16 hex characters, used in cache file names.
    pub fn short(&self) -> &str {
        &self.hex[..16]
    }

    pub fn is_legacy(&self) -> bool {
        self.algorithm == DigestAlgorithm::Md5
    }

    /// Compute the digest of a file with this checksum's algorithm.
    pub fn digest_file(&self, path: &Path) -> io::Result<String> {
        digest_file(path, self.algorithm)
    }

    pub fn matches_file(&self, path: &Path) -> io::Result<bool> {
        Ok(self.digest_file(path)? == self.hex)
    }
}

impl FromStr for Checksum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("checksum must not be empty".to_string());
        }

        let (algorithm, hex) = match s.split_once(':') {
            Some((tag, hex)) => {
                let algorithm = match tag.trim().to_ascii_lowercase().as_str() {
                    "sha256" => DigestAlgorithm::Sha256,
                    "md5" => DigestAlgorithm::Md5,
                    other => return Err(format!("unsupported checksum algorithm '{}'", other)),
                };
                (algorithm, hex.trim())
            }
            None => match s.len() {
                64 => (DigestAlgorithm::Sha256, s),
                32 => (DigestAlgorithm::Md5, s),
                n => {
                    return Err(format!(
                        "cannot infer checksum algorithm from a {}-character digest",
                        n
                    ))
                }
            },
        };

        if hex.len() != algorithm.hex_len() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "invalid {} digest '{}' (expected {} hex characters)",
                algorithm.name(),
                hex,
                algorithm.hex_len()
            ));
        }

        Ok(Checksum {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hex)
    }
}

/// Stream a file through the given digest algorithm.
pub fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> io::Result<String> {
    let f = File::open(path)?;
    let mut r = BufReader::new(f);
    let mut buf = vec![0u8; 1024 * 1024];

    match algorithm {
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = r.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
        DigestAlgorithm::Md5 => {
            let mut ctx = md5::Context::new();
            loop {
                let n = r.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                ctx.consume(&buf[..n]);
            }
            Ok(format!("{:x}", ctx.compute()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ZLIB_SHA256: &str = "d14c38e313afc35a9a8760dadf26042f51ea0f5d154b0630a31da0540107fb98";

    #[test]
    fn infers_algorithm_from_length() {
        let sha: Checksum = ZLIB_SHA256.parse().unwrap();
        assert_eq!(sha.algorithm(), DigestAlgorithm::Sha256);
        assert!(!sha.is_legacy());

        let md5: Checksum = "e5808ad997ba32c498803822078748c3".parse().unwrap();
        assert_eq!(md5.algorithm(), DigestAlgorithm::Md5);
        assert!(md5.is_legacy());
    }

    #[test]
    fn explicit_tag_must_agree_with_length() {
        let tagged: Checksum = format!("sha256:{}", ZLIB_SHA256).parse().unwrap();
        assert_eq!(tagged.hex(), ZLIB_SHA256);
        assert_eq!(tagged.to_string(), format!("sha256:{}", ZLIB_SHA256));

        assert!("md5:d14c38e313afc35a9a8760dadf26042f51ea0f5d154b0630a31da0540107fb98"
            .parse::<Checksum>()
            .is_err());
        assert!("crc32:deadbeef".parse::<Checksum>().is_err());
    }

    #[test]
    fn rejects_empty_and_non_hex() {
        assert!("".parse::<Checksum>().is_err());
        assert!("   ".parse::<Checksum>().is_err());
        assert!("zz808ad997ba32c498803822078748c3".parse::<Checksum>().is_err());
        assert!("abc".parse::<Checksum>().is_err());
    }

    #[test]
    fn uppercase_digests_are_normalized() {
        let c: Checksum = "E5808AD997BA32C498803822078748C3".parse().unwrap();
        assert_eq!(c.hex(), "e5808ad997ba32c498803822078748c3");
        assert_eq!(c.short(), "e5808ad997ba32c4");
    }

    #[test]
    fn digests_files_with_both_algorithms() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        assert_eq!(
            digest_file(&path, DigestAlgorithm::Sha256).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            digest_file(&path, DigestAlgorithm::Md5).unwrap(),
            "5d41402abc4b2a76b9719d0911017c92"
        );

        let c: Checksum = "5d41402abc4b2a76b9719d0911017c92".parse().unwrap();
        assert!(c.matches_file(&path).unwrap());
    }
}
