//! Link.
//!
//! This module contains the code to (re)place the symbolic link to the installed executable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{instrument, trace, warn};

/// The error type for replacing the link.
#[derive(Debug, thiserror::Error)]
pub(crate) enum LinkError {
    /// The directory for the link could not be created.
    #[error("failed to create directory '{}'", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A previous link (or file) could not be removed.
    #[error("failed to remove '{}'", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The link itself could not be created.
    #[error("failed to link '{}' to '{}'", .link.display(), .original.display())]
    Create {
        link: PathBuf,
        original: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Replaces whatever is at `link` with a symbolic link pointing to `original`.
#[instrument(err, level = "trace")]
pub(crate) fn replace_link(original: &Path, link: &Path) -> Result<(), LinkError> {
    if !original.exists() {
        warn!(original = %original.display(), "link will be dangling");
    }

    if let Some(parent) = link.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LinkError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    match fs::remove_file(link) {
        Ok(()) => trace!(link = %link.display(), "removed previous link"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(LinkError::Remove {
                path: link.to_path_buf(),
                source,
            });
        }
    }

    symlink(original, link).map_err(|source| LinkError::Create {
        link: link.to_path_buf(),
        original: original.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
#[doc(hidden)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
#[doc(hidden)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(all(test, unix))]
mod tests {

    use super::*;
    use tempfile::tempdir;
    use test_log::test;

    #[test]
    fn create_new_link() {
        let tempdir = tempdir().unwrap();
        let original = tempdir.path().join("nvim-macos/bin/nvim");
        fs::create_dir_all(original.parent().unwrap()).unwrap();
        fs::write(&original, "nvim").unwrap();
        let link = tempdir.path().join("prefix/bin/nvim");

        replace_link(&original, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), original);
        assert_eq!(fs::read_to_string(&link).unwrap(), "nvim");
    }

    #[test]
    fn replace_existing_link() {
        let tempdir = tempdir().unwrap();
        let old = tempdir.path().join("old");
        let new = tempdir.path().join("new");
        fs::write(&old, "old").unwrap();
        fs::write(&new, "new").unwrap();
        let link = tempdir.path().join("nvim");
        std::os::unix::fs::symlink(&old, &link).unwrap();

        replace_link(&new, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), new);
    }

    #[test]
    fn replace_dangling_link() {
        let tempdir = tempdir().unwrap();
        let original = tempdir.path().join("nvim-real");
        fs::write(&original, "nvim").unwrap();
        let link = tempdir.path().join("nvim");
        std::os::unix::fs::symlink(tempdir.path().join("gone"), &link).unwrap();

        replace_link(&original, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), original);
    }

    #[test]
    fn directory_in_the_way() {
        let tempdir = tempdir().unwrap();
        let original = tempdir.path().join("nvim-real");
        let link = tempdir.path().join("nvim");
        fs::create_dir(&link).unwrap();

        let result = replace_link(&original, &link);
        assert!(matches!(result, Err(LinkError::Remove { .. })));
        assert!(link.is_dir());
    }
}
