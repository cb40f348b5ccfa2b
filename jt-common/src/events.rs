//! Event types for the JobTrack event system
//!
//! Provides the shared event definitions and the EventBus that notifies
//! interested parties (SSE clients, other services) when reference data changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// JobTrack event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JtEvent {
    /// Reference-data import run started
    ImportStarted {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Organization stage finished
    OrganizationsImported {
        run_id: Uuid,
        /// Rows actually inserted
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// New postings became visible
    ///
    /// Only emitted when at least one posting was inserted.
    PostingsChanged {
        run_id: Uuid,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Import run finished successfully
    ImportCompleted {
        run_id: Uuid,
        organizations_imported: usize,
        jobs_imported: usize,
        timestamp: DateTime<Utc>,
    },

    /// Import run aborted
    ImportFailed {
        run_id: Uuid,
        /// True when a source file was missing
        not_found: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl JtEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            JtEvent::ImportStarted { .. } => "ImportStarted",
            JtEvent::OrganizationsImported { .. } => "OrganizationsImported",
            JtEvent::PostingsChanged { .. } => "PostingsChanged",
            JtEvent::ImportCompleted { .. } => "ImportCompleted",
            JtEvent::ImportFailed { .. } => "ImportFailed",
        }
    }
}

/// Broadcast channel for JtEvent
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JtEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<JtEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: JtEvent) {
        let _ = self.tx.send(event);
    }
}
