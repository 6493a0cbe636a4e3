//! Package an installed theme as an uploadable ZIP

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostpanel_core::fs::Filesystem;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::structure::ASSETS_PREFIX;
use crate::{ThemeDirs, ThemeError, ThemeResult};

pub struct ThemeExportService {
    dirs: ThemeDirs,
    fs: Arc<dyn Filesystem>,
}

impl ThemeExportService {
    pub fn new(dirs: ThemeDirs, fs: Arc<dyn Filesystem>) -> Self {
        Self { dirs, fs }
    }

    /// Write `var/tmp/{name}_{YYYYmmdd_HHMMSS}.zip` and return its path
    ///
    /// The archive uses the upload layout, so it can be uploaded again as is.
    pub fn export_theme(&self, name: &str) -> ThemeResult<PathBuf> {
        let theme_path = self.dirs.theme_path(name);
        if !self.fs.exists(&theme_path) {
            return Err(ThemeError::NotFound(name.to_string()));
        }
        self.fs.mkdir(&self.dirs.temp_dir)?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let zip_path = self.dirs.temp_dir.join(format!("{}_{}.zip", name, stamp));

        match self.write_archive(name, &zip_path) {
            Ok(entries) => {
                tracing::info!(theme = %name, entries, archive = %zip_path.display(), "Theme exported");
                Ok(zip_path)
            }
            Err(e) => {
                if let Err(cleanup) = self.fs.remove(&zip_path) {
                    tracing::warn!(path = %zip_path.display(), error = %cleanup, "Failed to remove partial export");
                }
                Err(e)
            }
        }
    }

    fn write_archive(&self, name: &str, zip_path: &Path) -> ThemeResult<usize> {
        let mut writer = ZipWriter::new(File::create(zip_path)?);
        let mut entries = add_tree(&mut writer, &self.dirs.theme_path(name), &format!("themes/{}", name))?;

        let assets = self.dirs.assets_path(name);
        if self.fs.exists(&assets) {
            entries += add_tree(&mut writer, &assets, &format!("{}/{}", ASSETS_PREFIX, name))?;
        }
        writer.finish()?;
        Ok(entries)
    }
}

/// Add every directory and file under `source` beneath `prefix`. Symlinks are skipped.
fn add_tree(writer: &mut ZipWriter<File>, source: &Path, prefix: &str) -> ThemeResult<usize> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut count = 0;

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| ThemeError::Io(io::Error::other(e.to_string())))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let name = format!("{}/{}", prefix, relative);

        if entry.file_type().is_dir() {
            writer.add_directory(name, options.unix_permissions(0o755))?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            io::copy(&mut File::open(entry.path())?, writer)?;
        } else {
            continue;
        }
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ThemeArchive;
    use crate::test_support::{host_version, local_fs, snapshot, write_theme};
    use crate::upload::ThemeUploadService;
    use crate::validator::TemplateManifestValidator;
    use tempfile::TempDir;

    #[test]
    fn exports_theme_and_assets() {
        let tmp = TempDir::new().unwrap();
        let dirs = ThemeDirs::under(tmp.path());
        write_theme(&dirs, "aurora");

        let zip_path = ThemeExportService::new(dirs.clone(), local_fs())
            .export_theme("aurora")
            .unwrap();
        let file_name = zip_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("aurora_") && file_name.ends_with(".zip"), "{file_name}");
        assert_eq!(zip_path.parent(), Some(dirs.temp_dir.as_path()));

        let mut archive = ThemeArchive::open(&zip_path).unwrap();
        archive.inspect(1024 * 1024).unwrap();
        let out = tmp.path().join("unpacked");
        archive.extract_to(&out, 1024 * 1024).unwrap();
        assert_eq!(snapshot(&out.join("themes/aurora")), snapshot(&dirs.theme_path("aurora")));
        assert_eq!(
            snapshot(&out.join("public/assets/theme/aurora")),
            snapshot(&dirs.assets_path("aurora"))
        );
    }

    #[test]
    fn exported_archive_uploads_elsewhere() {
        let source = TempDir::new().unwrap();
        let source_dirs = ThemeDirs::under(source.path());
        write_theme(&source_dirs, "aurora");
        let zip_path = ThemeExportService::new(source_dirs, local_fs())
            .export_theme("aurora")
            .unwrap();

        let target = TempDir::new().unwrap();
        let target_dirs = ThemeDirs::under(target.path());
        let result = ThemeUploadService::new(
            target_dirs.clone(),
            TemplateManifestValidator::new(host_version()),
            local_fs(),
        )
        .upload(&zip_path, false)
        .unwrap();
        assert!(result.success, "{:?}", result.warnings);
        assert!(target_dirs.theme_path("aurora").join("template.json").is_file());
    }

    #[test]
    fn missing_theme_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let service = ThemeExportService::new(ThemeDirs::under(tmp.path()), local_fs());
        assert!(matches!(service.export_theme("ghost"), Err(ThemeError::NotFound(_))));
    }
}
