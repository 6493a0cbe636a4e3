//! Uploaded archive checks and guarded extraction
//!
//! Every entry is inspected through the central directory before a single
//! byte is written: declared uncompressed size, path shape, and the Unix
//! symlink bit in the external attributes.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use hostpanel_core::config::ThemesConfig;
use zip::ZipArchive;

use crate::{ThemeError, ThemeResult};

pub const ZIP_MIME: &str = "application/zip";

/// Local file header, empty archive, spanned archive
const ZIP_SIGNATURES: [[u8; 4]; 3] = [*b"PK\x03\x04", *b"PK\x05\x06", *b"PK\x07\x08"];
const SNIFF_LEN: u64 = 512;

const MEGABYTE: u64 = 1024 * 1024;
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Size ceilings for one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Archive file size
    pub max_upload_bytes: u64,
    /// Sum of uncompressed entry sizes
    pub max_extracted_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * MEGABYTE,
            max_extracted_bytes: 100 * MEGABYTE,
        }
    }
}

impl From<&ThemesConfig> for UploadLimits {
    fn from(config: &ThemesConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes(),
            max_extracted_bytes: config.max_extracted_bytes(),
        }
    }
}

/// Content type of a file from its leading bytes
pub fn sniff_mime(path: &Path) -> io::Result<&'static str> {
    let mut head = Vec::new();
    File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;

    if ZIP_SIGNATURES.iter().any(|sig| head.starts_with(sig)) {
        return Ok(ZIP_MIME);
    }
    let is_text = !head.is_empty()
        && !head.contains(&0)
        && match std::str::from_utf8(&head) {
            Ok(_) => true,
            // A multi-byte character cut off by the sniff window
            Err(e) => e.error_len().is_none(),
        };
    Ok(if is_text { "text/plain" } else { "application/octet-stream" })
}

/// Check content type, size and extension of an uploaded file, then that it opens as a ZIP
pub fn validate_upload(path: &Path, limits: &UploadLimits) -> ThemeResult<()> {
    let mime = sniff_mime(path)?;
    if mime != ZIP_MIME {
        return Err(ThemeError::InvalidFileType(mime.to_string()));
    }

    let size = fs::metadata(path)?.len();
    if size > limits.max_upload_bytes {
        return Err(ThemeError::FileTooLarge {
            size,
            max: limits.max_upload_bytes,
        });
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension != "zip" {
        return Err(ThemeError::InvalidExtension(extension));
    }

    ThemeArchive::open(path).map(|_| ())
}

/// Traversal, NUL bytes, absolute paths and drive letters
pub fn is_dangerous_path(name: &str) -> bool {
    let bytes = name.as_bytes();
    name.contains("../")
        || name.contains("..\\")
        || name.contains('\0')
        || name.starts_with('/')
        || name.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

fn is_symlink(unix_mode: Option<u32>) -> bool {
    unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK)
}

/// What a passed inspection saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub total_size: u64,
}

pub struct ThemeArchive {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl ThemeArchive {
    pub fn open(path: &Path) -> ThemeResult<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(|e| ThemeError::InvalidZip(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Pre-extraction scan of every entry
    ///
    /// Sizes are summed across the whole archive before any path is checked.
    pub fn inspect(&mut self, max_extracted_bytes: u64) -> ThemeResult<ArchiveSummary> {
        let mut total: u64 = 0;
        for index in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(index)?;
            total = total.saturating_add(entry.size());
            if total > max_extracted_bytes {
                return Err(ThemeError::ZipBomb {
                    total,
                    max: max_extracted_bytes,
                });
            }
        }

        for index in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(index)?;
            let name = entry.name();
            if is_dangerous_path(name) {
                return Err(ThemeError::MaliciousPath(name.to_string()));
            }
            if is_symlink(entry.unix_mode()) {
                return Err(ThemeError::Symlink(name.to_string()));
            }
        }

        Ok(ArchiveSummary {
            entries: self.archive.len(),
            total_size: total,
        })
    }

    /// Extract into `dest`, refusing to write more than `max_bytes` in total
    ///
    /// The budget applies to the decompressed stream, not the declared sizes.
    pub fn extract_to(&mut self, dest: &Path, max_bytes: u64) -> ThemeResult<u64> {
        let mut written: u64 = 0;
        for index in 0..self.archive.len() {
            let mut entry = self.archive.by_index(index)?;
            let relative = entry
                .enclosed_name()
                .map(Path::to_path_buf)
                .ok_or_else(|| ThemeError::MaliciousPath(entry.name().to_string()))?;
            let target = dest.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let remaining = max_bytes.saturating_sub(written);
            let mut out = File::create(&target)?;
            let copied = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)?;
            written = written.saturating_add(copied);
            if written > max_bytes {
                return Err(ThemeError::ZipBomb {
                    total: written,
                    max: max_bytes,
                });
            }
        }

        tracing::debug!(archive = %self.path.display(), bytes = written, "Extracted theme archive");
        Ok(written)
    }
}
