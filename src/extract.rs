//! Extract.
//!
//! This module contains the code to unpack a gzip-compressed tar stream into an existing directory.

use crate::context::Context;
use flate2::read::GzDecoder;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Read};
#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, instrument, trace, warn};

/// Mode for every directory created while unpacking (independent of the mode stored in the archive).
#[cfg_attr(not(unix), allow(dead_code))]
const DIR_MODE: u32 = 0o755;

/// Mask for the permission bits of regular files.
const FILE_MODE_MASK: u32 = 0o7777;

/// The error type for unpacking an archive.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ExtractError {
    /// The destination directory does not exist.
    #[error("destination '{}' does not exist", .0.display())]
    DestinationMissing(PathBuf),
    /// The stream is not a valid gzip-compressed tar archive.
    #[error("corrupt archive")]
    CorruptArchive(#[source] io::Error),
    /// An entry would end up outside of the destination directory.
    #[error("unsafe entry path '{}'", .path.display())]
    UnsafePath { path: PathBuf },
    /// Writing an entry to disc failed.
    #[error("failed to extract '{}'", .path.display())]
    ExtractionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The context was cancelled or its deadline passed.
    #[error("extraction cancelled")]
    Cancelled,
}

/// Counters for what has been unpacked.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ExtractSummary {
    /// The number of directory entries.
    pub(crate) directories: usize,
    /// The number of regular files.
    pub(crate) files: usize,
    /// The number of entries of other types (links, devices, etc.).
    pub(crate) skipped: usize,
}

/// Unpacks the gzip-compressed tar `stream` into `dst`, checking the context between entries.
///
/// `dst` has to exist already. The stream is consumed and dropped on every path. A failing read is reported as
/// [ExtractError::Cancelled] once the context is done, and as [ExtractError::CorruptArchive] otherwise.
#[instrument(level = "trace", skip(ctx, stream), fields(dst = %dst.display()))]
pub(crate) fn extract_with_context<R: Read>(ctx: &Context, dst: &Path, stream: R) -> Result<ExtractSummary, ExtractError> {
    match dst.try_exists() {
        Ok(true) => {}
        Ok(false) => return Err(ExtractError::DestinationMissing(dst.to_path_buf())),
        Err(source) => {
            return Err(ExtractError::ExtractionFailed {
                path: dst.to_path_buf(),
                source,
            });
        }
    }

    let read_failed = |err: io::Error| {
        if ctx.is_done() { ExtractError::Cancelled } else { ExtractError::CorruptArchive(err) }
    };

    let mut archive = Archive::new(GzDecoder::new(stream));
    let mut summary = ExtractSummary::default();
    for entry in archive.entries().map_err(read_failed)? {
        let mut entry = entry.map_err(read_failed)?;

        if ctx.is_done() {
            return Err(ExtractError::Cancelled);
        }

        let name = entry.path().map_err(ExtractError::CorruptArchive)?.into_owned();
        let target = dst.join(relative_path(&name)?);
        let entry_type = entry.header().entry_type();
        trace!(?entry_type, target = %target.display(), "unpacking");

        match entry_type {
            EntryType::Directory => {
                create_dir_all(&target)?;
                summary.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                let mode = entry.header().mode().map_err(ExtractError::CorruptArchive)?;
                let bytes_written = unpack_file(&mut entry, &target, mode & FILE_MODE_MASK).map_err(|err| match err {
                    ExtractError::CorruptArchive(err) => read_failed(err),
                    err => err,
                })?;
                trace!(bytes_written);
                summary.files += 1;
            }
            _ => {
                debug!(?entry_type, name = %name.display(), "skipping unsupported entry");
                summary.skipped += 1;
            }
        }
    }

    debug!(?summary);
    Ok(summary)
}

// Turns the name of an entry into a path relative to the destination, rejecting anything that could escape it.
fn relative_path(name: &Path) -> Result<PathBuf, ExtractError> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!(name = %name.display(), "rejecting dangerous name");
                return Err(ExtractError::UnsafePath { path: name.to_path_buf() });
            }
        }
    }

    Ok(relative)
}

// Creates the directory (and all missing parents).
fn create_dir_all(path: &Path) -> Result<(), ExtractError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);

    builder.create(path).map_err(|source| ExtractError::ExtractionFailed {
        path: path.to_path_buf(),
        source,
    })
}

// Reader that remembers whether reading failed, to tell a broken archive from a failing disc while copying.
struct TrackedReader<R> {
    inner: R,
    failed: bool,
}

impl<R: Read> Read for TrackedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| self.failed = true)
    }
}

// Writes the content of a single file and applies the given mode.
//
// An existing file is replaced rather than overwritten in place, so read-only files and running executables from a
// previous installation do not get in the way. A failure to read the content is reported as a corrupt archive.
fn unpack_file(content: &mut impl Read, path: &Path, mode: u32) -> Result<u64, ExtractError> {
    let failed = |source: io::Error| ExtractError::ExtractionFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(failed(err)),
        _ => {}
    }

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    // the handle is released as soon as the content is written
    let bytes_written = {
        let mut file = options.open(path).map_err(failed)?;
        let mut content = TrackedReader { inner: content, failed: false };
        match io::copy(&mut content, &mut file) {
            Ok(bytes_written) => bytes_written,
            Err(err) if content.failed => return Err(ExtractError::CorruptArchive(err)),
            Err(err) => return Err(failed(err)),
        }
    };

    // the mode given to `open` is subject to the umask
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(failed)?;
    #[cfg(not(unix))]
    let _ = mode;

    Ok(bytes_written)
}
