//! JSON Lines file access shared by the disk-backed adapters

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use hostpanel_core::fs::{Filesystem, LocalFilesystem};
use hostpanel_core::{Error, Result};

/// A file holding one `T` per line
///
/// Writes replace the whole file atomically.
#[derive(Debug, Clone)]
pub struct JsonlFile<T> {
    path: PathBuf,
    fs: LocalFilesystem,
    _record: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonlFile<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fs: LocalFilesystem::new(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing file is empty.
    pub fn read_all(&self) -> Result<Vec<T>> {
        if !self.fs.exists(&self.path) {
            return Ok(Vec::new());
        }

        let contents = self.fs.read_to_string(&self.path)?;
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    Error::StorageError(format!(
                        "{} line {}: {}",
                        self.path.display(),
                        index + 1,
                        e
                    ))
                })
            })
            .collect()
    }

    pub fn write_all(&self, records: &[T]) -> Result<()> {
        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        self.fs.dump_file(&self.path, out.as_bytes())
    }
}
