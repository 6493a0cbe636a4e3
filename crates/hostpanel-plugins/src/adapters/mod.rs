//! Implementations of the plugin ports
//!
//! - [`InMemoryPluginRepository`] / [`InMemorySettingsStore`]: process-local, used by tests
//! - [`JsonlPluginRepository`] / [`JsonlSettingsStore`] / [`MigrationLedger`]: one
//!   JSON record per line under the data directory, sorted for stable diffs
//! - [`FsAssetPublisher`]: mirrors `assets/` into the public directory
//! - [`ManifestRuntimeLoader`]: checks declared capabilities and tracks loaded plugins

mod assets;
mod jsonl;
mod memory;
mod migrations;
mod runtime;
mod settings;
mod store;

pub use assets::FsAssetPublisher;
pub use jsonl::JsonlFile;
pub use memory::{InMemoryPluginRepository, InMemorySettingsStore};
pub use migrations::MigrationLedger;
pub use runtime::ManifestRuntimeLoader;
pub use settings::{JsonlSettingsStore, SettingRecord};
pub use store::JsonlPluginRepository;
