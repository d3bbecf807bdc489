use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{CourseDetails, CourseType, StatusRecord};

const EVENT_CAPACITY: usize = 256;

/// Everything the engine announces to a presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum EngineEvent {
    #[serde(rename = "lifecycle.started")]
    Started {
        at: DateTime<Utc>,
    },
    #[serde(rename = "lifecycle.stopped")]
    Stopped {
        at: DateTime<Utc>,
    },
    #[serde(rename = "course.succeeded", rename_all = "camelCase")]
    CourseSucceeded {
        id: String,
        course_type: CourseType,
        timestamp: String,
    },
    #[serde(rename = "data.loaded", rename_all = "camelCase")]
    DataLoaded {
        courses: Vec<String>,
        course_details: HashMap<String, CourseDetails>,
        status_map: HashMap<String, StatusRecord>,
    },
    #[serde(rename = "course.nameUpdated")]
    NameUpdated {
        id: String,
        name: String,
    },
    #[serde(rename = "course.added", rename_all = "camelCase")]
    CourseAdded {
        id: String,
        course_type: CourseType,
    },
    #[serde(rename = "course.removed")]
    CourseRemoved {
        id: String,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Started { .. } => "lifecycle.started",
            EngineEvent::Stopped { .. } => "lifecycle.stopped",
            EngineEvent::CourseSucceeded { .. } => "course.succeeded",
            EngineEvent::DataLoaded { .. } => "data.loaded",
            EngineEvent::NameUpdated { .. } => "course.nameUpdated",
            EngineEvent::CourseAdded { .. } => "course.added",
            EngineEvent::CourseRemoved { .. } => "course.removed",
        }
    }
}

/// Fan-out of engine events. Emitting with no subscriber is fine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            debug!("event {} dropped: no subscribers", name);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
