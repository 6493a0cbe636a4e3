//! Domain event infrastructure
//!
//! Lifecycle operations emit events as an audit trail. Publishing is
//! synchronous; a publisher failure never undoes the operation that
//! produced the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::error::Result;

/// Base trait for all domain events
pub trait DomainEvent: Send + Sync {
    /// Dotted event type, e.g. `plugin.enabled`
    fn event_type(&self) -> &str;

    /// Identity of the aggregate this event belongs to
    fn aggregate_id(&self) -> Uuid;

    /// Human-readable aggregate name (plugin or theme name)
    fn aggregate_name(&self) -> &str;

    fn timestamp(&self) -> DateTime<Utc>;

    /// Event payload as JSON
    fn data(&self) -> Option<&serde_json::Value>;
}

/// Sink for domain events
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &dyn DomainEvent) -> Result<()>;

    /// Publish multiple events in order
    fn publish_all(&self, events: &[&dyn DomainEvent]) -> Result<()> {
        for event in events {
            self.publish(*event)?;
        }
        Ok(())
    }
}

/// A recorded event, detached from its concrete type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_name: String,
    pub event_type: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl RecordedEvent {
    pub fn from_event(event: &dyn DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: event.aggregate_id(),
            aggregate_name: event.aggregate_name().to_string(),
            event_type: event.event_type().to_string(),
            data: event.data().cloned(),
            created_at: event.timestamp(),
        }
    }
}

/// In-memory event store, used by tests and by the CLI to report what happened
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<RecordedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events for one aggregate, oldest first
    pub fn events_for(&self, aggregate_name: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.aggregate_name == aggregate_name)
            .cloned()
            .collect()
    }

    pub fn all_events(&self) -> Vec<RecordedEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_by_type(&self, event_type: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventPublisher for InMemoryEventStore {
    fn publish(&self, event: &dyn DomainEvent) -> Result<()> {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent::from_event(event));
        Ok(())
    }
}

/// Mirrors every event into the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: &dyn DomainEvent) -> Result<()> {
        let data = event
            .data()
            .map(|d| d.to_string())
            .unwrap_or_default();
        tracing::info!(
            event = event.event_type(),
            aggregate = event.aggregate_name(),
            aggregate_id = %event.aggregate_id(),
            data = %data,
            "Domain event"
        );
        Ok(())
    }
}

/// Fans an event out to several publishers, stopping at the first failure
pub struct CompositePublisher {
    publishers: Vec<std::sync::Arc<dyn EventPublisher>>,
}

impl CompositePublisher {
    pub fn new(publishers: Vec<std::sync::Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

impl EventPublisher for CompositePublisher {
    fn publish(&self, event: &dyn DomainEvent) -> Result<()> {
        for publisher in &self.publishers {
            publisher.publish(event)?;
        }
        Ok(())
    }
}
