//! Local helpers for file transfer: compression staging and checksums.
//!
//! Uploads may stage the source file into a gzipped tar archive first;
//! downloads may unpack one afterwards. MD5 digests are computed around
//! transfers so both ends can be compared in the logs.

use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use tracing::debug;

/// Hex MD5 digest of a file's contents.
pub fn md5_hex(path: &Path) -> io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(format!("{:x}", md5::compute(content)))
}

/// Stage `source` into a `<name>.tar.gz` archive inside a fresh temp dir.
///
/// Returns the temp dir guard together with the archive path; the archive
/// lives only as long as the guard.
pub fn compress_file(source: &Path) -> io::Result<(TempDir, PathBuf)> {
    let name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;

    let staging = TempDir::new()?;
    let archive_path = staging
        .path()
        .join(format!("{}.tar.gz", name.to_string_lossy()));

    let archive = std::fs::File::create(&archive_path)?;
    let encoder = GzEncoder::new(archive, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_path_with_name(source, name)?;
    builder.into_inner()?.finish()?;

    debug!(
        source = %source.display(),
        archive = %archive_path.display(),
        "Compressed file for upload"
    );
    Ok((staging, archive_path))
}

/// Unpack a `.tar.gz` archive into `dest_dir`.
pub fn decompress_archive(archive: &Path, dest_dir: &Path) -> io::Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut unpacker = tar::Archive::new(GzDecoder::new(file));
    unpacker.unpack(dest_dir)?;
    debug!(archive = %archive.display(), dest = %dest_dir.display(), "Decompressed archive");
    Ok(())
}
