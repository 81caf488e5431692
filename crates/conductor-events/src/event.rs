use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Closed set of system event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// The system started.
    #[serde(rename = "system.started")]
    SystemStarted,
    /// The system stopped.
    #[serde(rename = "system.stopped")]
    SystemStopped,
    /// A task was created.
    #[serde(rename = "task.created")]
    TaskCreated,
    /// A task started executing.
    #[serde(rename = "task.started")]
    TaskStarted,
    /// A task completed successfully.
    #[serde(rename = "task.completed")]
    TaskCompleted,
    /// A task failed.
    #[serde(rename = "task.failed")]
    TaskFailed,
    /// A tool finished executing.
    #[serde(rename = "tool.executed")]
    ToolExecuted,
    /// User input was received.
    #[serde(rename = "user.input_received")]
    UserInputReceived,
    /// A model response was generated.
    #[serde(rename = "response.generated")]
    ResponseGenerated,
    /// The router selected a provider.
    #[serde(rename = "provider.selected")]
    ProviderSelected,
    /// A provider call failed.
    #[serde(rename = "provider.failed")]
    ProviderFailed,
    /// An error occurred.
    #[serde(rename = "error.occurred")]
    ErrorOccurred,
}

/// Event priority, higher is drained first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    /// Background priority.
    Low,
    /// Default priority.
    Normal,
    /// Elevated priority.
    High,
    /// Drained before everything else.
    Critical,
}

impl EventPriority {
    /// All priorities in drain order (highest first).
    pub const DESCENDING: [Self; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    /// Queue index for this priority.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

/// An immutable system event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type of the event.
    pub event_type: EventType,
    /// When the event was created.
    pub timestamp: SystemTime,
    /// Component that published the event.
    pub source: String,
    /// Arbitrary key/value payload.
    pub data: Map<String, Value>,
    /// Scheduling priority.
    pub priority: EventPriority,
    /// Identifier shared by all events of one logical flow.
    pub correlation_id: Option<Uuid>,
    /// Identifier of the event that caused this one.
    pub causation_id: Option<Uuid>,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
}

impl Event {
    /// Creates a new event with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: SystemTime::now(),
            source: source.into(),
            data: Map::new(),
            priority: EventPriority::Normal,
            correlation_id: None,
            causation_id: None,
            metadata: Map::new(),
        }
    }

    /// Adds a payload entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Marks this event as caused by another.
    #[must_use]
    pub fn caused_by(mut self, other: &Self) -> Self {
        self.causation_id = Some(other.event_id);
        self.correlation_id = other.correlation_id.or(Some(other.event_id));
        self
    }
}

/// An event that could not be delivered, retained for inspection or replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// The undelivered event.
    pub event: Event,
    /// Why the event was dead-lettered.
    pub reason: String,
    /// When the event was dead-lettered.
    pub dead_lettered_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_drain_order() {
        assert_eq!(EventPriority::DESCENDING[0], EventPriority::Critical);
        assert_eq!(EventPriority::DESCENDING[3], EventPriority::Low);
        assert!(EventPriority::Critical > EventPriority::Low);
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new(EventType::TaskStarted, "orchestrator")
            .with_priority(EventPriority::High)
            .with_data("task", serde_json::json!("t-1"));

        assert_eq!(event.event_type, EventType::TaskStarted);
        assert_eq!(event.source, "orchestrator");
        assert_eq!(event.priority, EventPriority::High);
        assert_eq!(event.data["task"], "t-1");
        assert!(event.correlation_id.is_none());
    }

    #[test]
    fn test_causation_propagates_correlation() {
        let root = Event::new(EventType::UserInputReceived, "agent");
        let child = Event::new(EventType::TaskStarted, "agent").caused_by(&root);

        assert_eq!(child.causation_id, Some(root.event_id));
        assert_eq!(child.correlation_id, Some(root.event_id));

        let grandchild = Event::new(EventType::TaskCompleted, "agent").caused_by(&child);
        assert_eq!(grandchild.correlation_id, Some(root.event_id));
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = Event::new(EventType::ToolExecuted, "tools")
            .with_data("tool", serde_json::json!("read_file"));

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(error) => panic!("serialize failed: {error}"),
        };
        assert!(json.contains("tool.executed"));

        let parsed: Event = match serde_json::from_str(&json) {
            Ok(parsed) => parsed,
            Err(error) => panic!("deserialize failed: {error}"),
        };
        assert_eq!(parsed.event_id, event.event_id);
        assert_eq!(parsed.event_type, EventType::ToolExecuted);
    }
}
