//! Theme upload and copy events
//!
//! Themes have no stored identity, so every event of one upload or copy
//! shares the operation's id as its aggregate id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hostpanel_core::events::DomainEvent;

use crate::manifest::TemplateManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeEventType {
    UploadRequested,
    Uploaded,
    UploadFailed,
    CopyRequested,
    Copied,
    CopyFailed,
}

impl ThemeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadRequested => "theme.upload_requested",
            Self::Uploaded => "theme.uploaded",
            Self::UploadFailed => "theme.upload_failed",
            Self::CopyRequested => "theme.copy_requested",
            Self::Copied => "theme.copied",
            Self::CopyFailed => "theme.copy_failed",
        }
    }
}

impl std::fmt::Display for ThemeEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeEvent {
    pub id: Uuid,
    pub operation_id: Uuid,
    /// Theme name, or the archive file name before the manifest is read
    pub subject: String,
    pub event_type: ThemeEventType,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ThemeEvent {
    fn new(operation_id: Uuid, subject: &str, event_type: ThemeEventType, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_id,
            subject: subject.to_string(),
            event_type,
            data: Some(data),
            created_at: Utc::now(),
        }
    }

    pub fn upload_requested(operation_id: Uuid, file: &str, ignore_warnings: bool) -> Self {
        let data = serde_json::json!({ "file": file, "ignore_warnings": ignore_warnings });
        Self::new(operation_id, file, ThemeEventType::UploadRequested, data)
    }

    pub fn uploaded(operation_id: Uuid, manifest: &TemplateManifest, warnings: usize) -> Self {
        let data = serde_json::json!({
            "name": manifest.name(),
            "version": manifest.version(),
            "warnings": warnings,
        });
        Self::new(operation_id, manifest.name(), ThemeEventType::Uploaded, data)
    }

    pub fn upload_failed(operation_id: Uuid, file: &str, code: &str, reason: &str) -> Self {
        let data = serde_json::json!({ "file": file, "code": code, "reason": reason });
        Self::new(operation_id, file, ThemeEventType::UploadFailed, data)
    }

    pub fn copy_requested(operation_id: Uuid, source: &str, target: &str) -> Self {
        let data = serde_json::json!({ "source": source, "target": target });
        Self::new(operation_id, target, ThemeEventType::CopyRequested, data)
    }

    pub fn copied(operation_id: Uuid, source: &str, target: &str) -> Self {
        let data = serde_json::json!({ "source": source, "target": target });
        Self::new(operation_id, target, ThemeEventType::Copied, data)
    }

    pub fn copy_failed(operation_id: Uuid, source: &str, target: &str, reason: &str) -> Self {
        let data = serde_json::json!({ "source": source, "target": target, "reason": reason });
        Self::new(operation_id, target, ThemeEventType::CopyFailed, data)
    }
}

impl DomainEvent for ThemeEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    fn aggregate_id(&self) -> Uuid {
        self.operation_id
    }

    fn aggregate_name(&self) -> &str {
        &self.subject
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_events_name_both_themes() {
        let op = Uuid::new_v4();
        let event = ThemeEvent::copy_failed(op, "aurora", "admin", "reserved");

        assert_eq!(event.event_type(), "theme.copy_failed");
        assert_eq!(event.aggregate_id(), op);
        assert_eq!(event.aggregate_name(), "admin");
        let data = event.data().unwrap();
        assert_eq!(data["source"], "aurora");
        assert_eq!(data["reason"], "reserved");
    }
}
