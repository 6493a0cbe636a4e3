//! Filesystem port
//!
//! Theme upload, upgrade, copy and export go through [`Filesystem`] so the
//! multi-step operations can be exercised against a real temp directory
//! and their error paths stay uniform.

use std::fs;
use std::io::Write;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directory mode for installed theme and plugin trees
pub const DIR_MODE: u32 = 0o755;
/// File mode for installed theme and plugin trees
pub const FILE_MODE: u32 = 0o644;

pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all missing parents
    fn mkdir(&self, path: &Path) -> Result<()>;

    /// Recursively copy `from` into `to`, overwriting files that already exist
    fn mirror(&self, from: &Path, to: &Path) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Recursively delete a file or directory. Missing paths are not an error.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Atomically replace the contents of a file
    fn dump_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Apply `dir_mode` to every directory and `file_mode` to every file under `path`
    fn set_permissions(&self, path: &Path, dir_mode: u32, file_mode: u32) -> Result<()>;
}

/// [`Filesystem`] backed by the local disk
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn mkdir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| Error::filesystem("mkdir", path, e))
    }

    fn mirror(&self, from: &Path, to: &Path) -> Result<()> {
        let meta = fs::metadata(from).map_err(|e| Error::filesystem("mirror", from, e))?;
        if meta.is_file() {
            if let Some(parent) = to.parent() {
                self.mkdir(parent)?;
            }
            fs::copy(from, to).map_err(|e| Error::filesystem("mirror", to, e))?;
            return Ok(());
        }

        for entry in WalkDir::new(from).follow_links(false) {
            let entry = entry.map_err(|e| {
                Error::filesystem("mirror", from, std::io::Error::other(e.to_string()))
            })?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(|e| Error::Other(e.to_string()))?;
            let target = to.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                self.mkdir(&target)?;
            } else if file_type.is_file() {
                if let Some(parent) = target.parent() {
                    self.mkdir(parent)?;
                }
                fs::copy(entry.path(), &target)
                    .map_err(|e| Error::filesystem("mirror", &target, e))?;
            } else {
                tracing::debug!(path = %entry.path().display(), "Skipping non-regular file while mirroring");
            }
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            self.mkdir(parent)?;
        }
        fs::rename(from, to).map_err(|e| Error::filesystem("rename", from, e))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::filesystem("remove", path, e)),
        };

        if !meta.is_dir() {
            return fs::remove_file(path).map_err(|e| Error::filesystem("remove", path, e));
        }

        // contents_first yields children before their parent directory
        for entry in WalkDir::new(path).follow_links(false).contents_first(true) {
            let entry = entry.map_err(|e| {
                Error::filesystem("remove", path, std::io::Error::other(e.to_string()))
            })?;
            let result = if entry.file_type().is_dir() {
                fs::remove_dir(entry.path())
            } else {
                fs::remove_file(entry.path())
            };
            result.map_err(|e| Error::filesystem("remove", entry.path(), e))?;
        }
        Ok(())
    }

    fn dump_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidInput(format!("{} has no parent", path.display())))?;
        self.mkdir(parent)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&staging)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&staging, path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&staging);
            return Err(Error::filesystem("dump_file", path, e));
        }
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| Error::filesystem("read", path, e))
    }

    #[cfg(unix)]
    fn set_permissions(&self, path: &Path, dir_mode: u32, file_mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(|e| {
                Error::filesystem("chmod", path, std::io::Error::other(e.to_string()))
            })?;
            let mode = if entry.file_type().is_dir() {
                dir_mode
            } else if entry.file_type().is_file() {
                file_mode
            } else {
                continue;
            };
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode))
                .map_err(|e| Error::filesystem("chmod", entry.path(), e))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn set_permissions(&self, _path: &Path, _dir_mode: u32, _file_mode: u32) -> Result<()> {
        Ok(())
    }
}
