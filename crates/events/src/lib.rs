#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in the app framework pipeline
//!
//! This crate provides the event types and channel aliases used for
//! communication between crates. All pipeline output goes through events -
//! no direct logging or printing happens inside the pipeline. The
//! reconciler owns the receiver and decides what to log or publish as
//! Kubernetes events.

use appfw_types::{BundlePushStage, Phase, PhaseStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type alias for event sender
pub type EventSender = tokio::sync::mpsc::UnboundedSender<Event>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<Event>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Core event enum for all async communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Pipeline lifecycle
    PipelineStarted {
        cr_name: String,
        app_count: usize,
    },
    PipelineTerminated {
        cr_name: String,
    },
    PipelineCompleted {
        cr_name: String,
        installed: usize,
        failed: usize,
    },

    // Download phase
    AppDownloadStarted {
        app_name: String,
        app_src: String,
        size: u64,
    },
    AppDownloadSkipped {
        app_name: String,
        app_src: String,
    },
    AppDownloadCompleted {
        app_name: String,
        app_src: String,
        size: u64,
    },
    AppDownloadFailed {
        app_name: String,
        app_src: String,
        error: String,
        retry_count: u32,
    },

    // Pod copy phase
    PodCopyStarted {
        app_name: String,
        pod: String,
    },
    PodCopyCompleted {
        app_name: String,
        pod: String,
    },
    PodCopyFailed {
        app_name: String,
        pod: String,
        error: String,
        retry_count: u32,
    },

    // Install phase
    InstallStarted {
        app_name: String,
        pod: String,
    },
    InstallCompleted {
        app_name: String,
        pod: String,
    },
    InstallFailed {
        app_name: String,
        pod: String,
        error: String,
        retry_count: u32,
    },

    // Cluster bundle push
    BundlePushStarted {
        cr_name: String,
        pod: String,
    },
    BundlePushStageChanged {
        cr_name: String,
        stage: BundlePushStage,
    },
    BundlePushCompleted {
        cr_name: String,
    },
    BundlePushFailed {
        cr_name: String,
        error: String,
    },

    // Worker lifecycle
    WorkerTransitioned {
        app_name: String,
        pod: String,
        from: Phase,
        to: Phase,
    },
    WorkerEvicted {
        app_name: String,
        pod: String,
        status: PhaseStatus,
        retry_count: u32,
    },

    // Staging store
    AppPkgDeleted {
        app_name: String,
        path: String,
    },
    DiskSpaceExhausted {
        app_name: String,
        required: u64,
        available: u64,
    },

    // Errors and warnings
    Warning {
        message: String,
        context: Option<String>,
    },
    Error {
        message: String,
        details: Option<String>,
    },

    // Debug logging (when --debug enabled on the operator)
    DebugLog {
        message: String,
        context: HashMap<String, String>,
    },
}

impl Event {
    /// Create a warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: None,
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            details: None,
        }
    }

    /// Create a debug log event
    pub fn debug(message: impl Into<String>) -> Self {
        Self::DebugLog {
            message: message.into(),
            context: HashMap::new(),
        }
    }
}

/// Helper to send events with error handling
pub trait EventSenderExt {
    /// Send an event, ignoring send errors (receiver dropped)
    fn emit(&self, event: Event);
}

impl EventSenderExt for EventSender {
    fn emit(&self, event: Event) {
        // If the receiver is gone the pipeline keeps running; events are
        // advisory.
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_channel() {
        let (tx, mut rx) = channel();

        tx.emit(Event::warning("test warning"));

        let event = rx.recv().await.unwrap();
        match event {
            Event::Warning { message, .. } => {
                assert_eq!(message, "test warning");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::WorkerTransitioned {
            app_name: "app1.tgz".to_string(),
            pod: "splunk-s1-standalone-0".to_string(),
            from: Phase::Download,
            to: Phase::PodCopy,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"worker_transitioned\""));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        match deserialized {
            Event::WorkerTransitioned { from, to, .. } => {
                assert_eq!(from, Phase::Download);
                assert_eq!(to, Phase::PodCopy);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn emit_survives_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);
        tx.emit(Event::debug("receiver is gone"));
    }
}
