use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PulseError, Result};

/// The four repository activity kinds tracked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Commit,
    PullRequest,
    Issue,
    Release,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Commit,
        EventType::PullRequest,
        EventType::Issue,
        EventType::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Commit => "commit",
            EventType::PullRequest => "pull_request",
            EventType::Issue => "issue",
            EventType::Release => "release",
        }
    }

    pub fn parse(value: &str) -> Option<EventType> {
        match value {
            "commit" => Some(EventType::Commit),
            "pull_request" => Some(EventType::PullRequest),
            "issue" => Some(EventType::Issue),
            "release" => Some(EventType::Release),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated repository event. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub repo_full_name: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub author: String,
    pub url: String,
}

/// The untrusted intake shape. Timestamps and event types arrive as
/// strings from connectors and the HTTP surface; validation turns a
/// `RawEvent` into an [`Event`] or a per-event error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub repo_full_name: String,
    pub event_type: String,
    pub timestamp: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
}

impl RawEvent {
    pub fn validate(self) -> Result<Event> {
        if self.id.is_empty() {
            return Err(PulseError::InvalidEvent("missing event id".to_string()));
        }
        if !self.repo_full_name.contains('/') {
            return Err(PulseError::InvalidEvent(format!(
                "repository '{}' is not in owner/name form",
                self.repo_full_name
            )));
        }
        let event_type = EventType::parse(&self.event_type).ok_or_else(|| {
            PulseError::InvalidEvent(format!("unknown event type '{}'", self.event_type))
        })?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|err| {
                PulseError::InvalidEvent(format!(
                    "malformed timestamp '{}': {err}",
                    self.timestamp
                ))
            })?
            .with_timezone(&Utc);

        Ok(Event {
            id: self.id,
            repo_full_name: self.repo_full_name,
            event_type,
            timestamp,
            title: self.title,
            author: self.author,
            url: self.url,
        })
    }
}

/// One rejected event from an ingestion batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub event_id: Option<String>,
    pub reason: String,
}

/// Outcome of one ingestion batch. Rejected events never fail the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub errors: Vec<EventError>,
}
