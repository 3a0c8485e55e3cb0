//! Tarball extraction with format detection by magic bytes.

use crate::error::{Error, Result, Stage};
use crate::process::CancelToken;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path};
use tar::{Archive, EntryType};
use xz2::read::XzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";
const XZ_MAGIC: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: [u8; 5] = *b"ustar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed tar
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    /// Identify the container from the first bytes of the file; `None` when
    /// the data is not a (compressed) tarball.
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(&GZIP_MAGIC) {
            Some(Compression::Gzip)
        } else if header.starts_with(&BZIP2_MAGIC) {
            Some(Compression::Bzip2)
        } else if header.starts_with(&XZ_MAGIC) {
            Some(Compression::Xz)
        } else if header.len() >= USTAR_OFFSET + USTAR_MAGIC.len()
            && header[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] == USTAR_MAGIC
        {
            Some(Compression::None)
        } else {
            None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "tar"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
            Compression::Xz => write!(f, "xz"),
        }
    }
}

/// Unpack `archive` into `dest` and return the distinct top-level entry
/// names. Entries that would land outside `dest` fail the whole extraction.
pub fn extract(
    project: &str,
    archive: &Path,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<BTreeSet<String>> {
    let fail = |message: String| Error::Extraction {
        project: project.to_string(),
        archive: archive.to_path_buf(),
        message,
    };

    let mut file = File::open(archive).map_err(|e| fail(format!("open failed: {}", e)))?;
    let mut header = [0u8; 512];
    let n = read_up_to(&mut file, &mut header).map_err(|e| fail(format!("read failed: {}", e)))?;
    let compression = Compression::detect(&header[..n])
        .ok_or_else(|| fail("unsupported archive format".to_string()))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| fail(format!("seek failed: {}", e)))?;
    tracing::debug!(project, format = %compression, "extracting {}", archive.display());

    let reader = BufReader::new(file);
    let decoded: Box<dyn Read> = match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(GzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
    };

    let mut tar = Archive::new(decoded);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let mut top_level = BTreeSet::new();
    let entries = tar.entries().map_err(|e| fail(format!("reading entries: {}", e)))?;
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                project: project.to_string(),
                stage: Stage::Prepare,
            });
        }
        let mut entry = entry.map_err(|e| fail(format!("reading entry: {}", e)))?;
        if matches!(
            entry.header().entry_type(),
            EntryType::XGlobalHeader | EntryType::XHeader
        ) {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| fail(format!("invalid entry path: {}", e)))?
            .into_owned();
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(fail(format!(
                "entry '{}' escapes the extraction directory",
                path.display()
            )));
        }
        if let Some(Component::Normal(first)) = path
            .components()
            .find(|c| !matches!(c, Component::CurDir))
        {
            top_level.insert(first.to_string_lossy().into_owned());
        }

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| fail(format!("unpacking '{}': {}", path.display(), e)))?;
        if !unpacked {
            return Err(fail(format!(
                "entry '{}' escapes the extraction directory",
                path.display()
            )));
        }
    }

    Ok(top_level)
}

fn read_up_to(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::fs;
    use std::io::Write;

    /// Build a gzip tarball from `(path, contents, mode)` triples.
    pub(crate) fn write_tar_gz(dest: &Path, files: &[(&str, &str, u32)]) {
        let file = File::create(dest).unwrap();
        let enc = GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(enc);
        for (path, contents, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
    }

    #[test]
    fn detects_formats_by_magic() {
        assert_eq!(Compression::detect(&[0x1f, 0x8b, 8, 0]), Some(Compression::Gzip));
        assert_eq!(Compression::detect(b"BZh91AY"), Some(Compression::Bzip2));
        assert_eq!(
            Compression::detect(&[0xfd, b'7', b'z', b'X', b'Z', 0, 0]),
            Some(Compression::Xz)
        );
        let mut plain = vec![0u8; 512];
        plain[257..262].copy_from_slice(b"ustar");
        assert_eq!(Compression::detect(&plain), Some(Compression::None));
        assert_eq!(Compression::detect(b"PK\x03\x04"), None);
    }

    #[test]
    fn extracts_gzip_tarball_and_reports_top_level() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("zlib-1.2.13.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("zlib-1.2.13/configure", "#!/bin/sh\n", 0o755),
                ("zlib-1.2.13/zlib.h", "/* zlib */\n", 0o644),
            ],
        );
        let dest = tmp.path().join("out");
        fs::create_dir_all(&dest).unwrap();

        let top = extract("zlib", &archive, &dest, &CancelToken::new()).unwrap();
        assert_eq!(top.into_iter().collect::<Vec<_>>(), vec!["zlib-1.2.13"]);
        assert_eq!(
            fs::read(dest.join("zlib-1.2.13/zlib.h")).unwrap(),
            b"/* zlib */\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.join("zlib-1.2.13/configure"))
                .unwrap()
                .permissions()
                .mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[test]
    fn rejects_unknown_data() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bogus.tar.gz");
        fs::write(&archive, b"definitely not an archive").unwrap();
        let err = extract("bogus", &archive, tmp.path(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(err.to_string().contains("unsupported archive format"));
    }

    #[test]
    fn cancellation_stops_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("x-1.0.tar.gz");
        write_tar_gz(&archive, &[("x-1.0/a", "a", 0o644)]);
        let token = CancelToken::new();
        token.cancel();
        let err = extract("x", &archive, tmp.path(), &token).unwrap_err();
        assert!(matches!(err, Error::Cancelled { stage: Stage::Prepare, .. }));
    }
}
