//! Hostpanel Core Library
//!
//! Shared foundations for the plugin and theme subsystems:
//! - Error taxonomy with stable codes and operator suggestions
//! - Configuration (TOML, project paths, host version, theme settings)
//! - Domain events and publishers
//! - Filesystem port with a local implementation
//! - Manifest rules and version-constraint matching

pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod manifest;
pub mod version;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::events::{DomainEvent, EventPublisher};
    pub use crate::fs::{Filesystem, LocalFilesystem};
}
