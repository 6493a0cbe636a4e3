//! Fixtures shared by unit tests

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use hostpanel_core::fs::LocalFilesystem;
use semver::Version;
use serde_json::json;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::ThemeDirs;

pub const HOST_VERSION: &str = "0.6.2";

pub fn host_version() -> Version {
    Version::parse(HOST_VERSION).unwrap()
}

pub fn local_fs() -> Arc<LocalFilesystem> {
    Arc::new(LocalFilesystem::new())
}

pub enum ZipEntry {
    File(String, Vec<u8>),
    Dir(String),
    Symlink(String, String),
}

impl ZipEntry {
    pub fn file(name: &str, contents: &[u8]) -> Self {
        Self::File(name.to_string(), contents.to_vec())
    }

    pub fn dir(name: &str) -> Self {
        Self::Dir(name.to_string())
    }

    pub fn symlink(name: &str, target: &str) -> Self {
        Self::Symlink(name.to_string(), target.to_string())
    }
}

pub fn build_zip(path: &Path, entries: &[ZipEntry]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in entries {
        match entry {
            ZipEntry::File(name, contents) => {
                writer.start_file(name.as_str(), options).unwrap();
                writer.write_all(contents).unwrap();
            }
            ZipEntry::Dir(name) => writer.add_directory(name.as_str(), options).unwrap(),
            ZipEntry::Symlink(name, target) => {
                writer.add_symlink(name.as_str(), target.as_str(), options).unwrap()
            }
        }
    }
    writer.finish().unwrap();
}

/// A complete, valid `template.json` document
pub fn template_document(name: &str) -> serde_json::Value {
    json!({
        "template": {
            "name": name,
            "description": "A clean theme for game server panels",
            "author": "Hostpanel Team",
            "version": "1.0.0",
            "license": "MIT",
            "hostVersion": HOST_VERSION,
            "contexts": ["panel", "landing", "email"],
            "translations": [],
            "options": {"supportDarkMode": true}
        }
    })
}

/// Entries of an uploadable archive for a clean theme called `name`
pub fn theme_entries(name: &str) -> Vec<ZipEntry> {
    let document = serde_json::to_vec_pretty(&template_document(name)).unwrap();
    vec![
        ZipEntry::file(&format!("themes/{name}/template.json"), &document),
        ZipEntry::file(&format!("themes/{name}/panel/base.html.twig"), b"{% block body %}{% endblock %}"),
        ZipEntry::file(&format!("themes/{name}/landing/index.html.twig"), b"<h1>{{ title }}</h1>"),
        ZipEntry::file(&format!("themes/{name}/email/base.html.twig"), b"{{ content }}"),
        ZipEntry::file(&format!("public/assets/theme/{name}/css/app.css"), b"body { margin: 0 }"),
    ]
}

pub fn write(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Installed theme with the context layout
pub fn write_theme(dirs: &ThemeDirs, name: &str) {
    let root = dirs.theme_path(name);
    let document = serde_json::to_vec_pretty(&template_document(name)).unwrap();
    write(&root, "template.json", &document);
    write(&root, "panel/base.html.twig", b"{% block body %}{% endblock %}");
    write(&root, "landing/index.html.twig", b"<h1>landing</h1>");
    write(&root, "email/base.html.twig", b"{{ content }}");
    write(&dirs.assets_path(name), "css/app.css", b"body {}");
}

/// Installed theme with the pre-context layout and no assets
pub fn write_legacy_theme(dirs: &ThemeDirs, name: &str) {
    let root = dirs.theme_path(name);
    let mut document = template_document(name);
    if let Some(template) = document["template"].as_object_mut() {
        template.remove("contexts");
        template.remove("translations");
        template.insert("hostVersion".to_string(), json!("0.5.0"));
    }
    write(&root, "template.json", &serde_json::to_vec_pretty(&document).unwrap());
    write(&root, "base.html.twig", b"<html>{% block body %}{% endblock %}</html>");
    write(&root, "_partials/nav.html.twig", b"<nav></nav>");
    write(&root, "bundles/server/list.html.twig", b"<ul></ul>");
    write(&root, "components/alert.html.twig", b"<div class=\"alert\"></div>");
    write(&root, "sso/login.html.twig", b"<form></form>");
    write(&root, "email/base.html.twig", b"{{ content }}");
}

/// Every file under `root` with its bytes, keyed by relative path
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().display().to_string();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}
