//! Events delivered by the data service.
//!
//! An event carries zero or more messages. Message payloads stay as raw JSON
//! (`securityData`) so a structurally broken row can be skipped on its own
//! instead of failing the whole frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message type announcing a successfully opened service.
pub const SERVICE_OPENED: &str = "ServiceOpened";
/// Message type announcing a refused service.
pub const SERVICE_OPEN_FAILURE: &str = "ServiceOpenFailure";
/// Session status message types that mean the session is gone.
pub const SESSION_TERMINATED: &str = "SessionTerminated";
pub const CONNECTION_DOWN: &str = "SessionConnectionDown";

/// Kind of event, as named by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    SessionStatus,
    ServiceStatus,
    PartialResponse,
    /// Final event of a request. Nothing else for that request follows it.
    Response,
    /// No event arrived within the poll timeout.
    Timeout,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::SessionStatus => "SESSION_STATUS",
            EventType::ServiceStatus => "SERVICE_STATUS",
            EventType::PartialResponse => "PARTIAL_RESPONSE",
            EventType::Response => "RESPONSE",
            EventType::Timeout => "TIMEOUT",
            EventType::Other(name) => name,
        }
    }

    /// Partial and final responses both carry data.
    pub fn carries_data(&self) -> bool {
        matches!(self, EventType::PartialResponse | EventType::Response)
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SESSION_STATUS" => EventType::SessionStatus,
            "SERVICE_STATUS" => EventType::ServiceStatus,
            "PARTIAL_RESPONSE" => EventType::PartialResponse,
            "RESPONSE" => EventType::Response,
            "TIMEOUT" => EventType::Timeout,
            _ => EventType::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(kind: EventType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message inside an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_data: Option<Value>,
    /// Human-readable reason on status messages (service refusal, session loss).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Message {
    pub fn status(message_type: &str, reason: Option<&str>) -> Self {
        Self {
            message_type: message_type.to_string(),
            reason: reason.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn security_data(correlation_id: Option<u64>, payload: Value) -> Self {
        Self {
            message_type: "HistoricalDataResponse".to_string(),
            correlation_id,
            security_data: Some(payload),
            reason: None,
        }
    }
}

/// One delivered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: EventType,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Messages that arrived in this event but could not be read, with the reason.
    #[serde(skip)]
    pub unreadable: Vec<String>,
}

impl Event {
    pub fn new(event_type: EventType, messages: Vec<Message>) -> Self {
        Self {
            event_type,
            messages,
            unreadable: Vec::new(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(EventType::Timeout, Vec::new())
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type == EventType::Response
    }

    /// False only when every message is tagged for some other request.
    pub fn answers(&self, correlation_id: u64) -> bool {
        self.messages.is_empty()
            || self
                .messages
                .iter()
                .any(|m| m.correlation_id.map_or(true, |id| id == correlation_id))
    }

    /// Reason text if this is a session-status event reporting a lost session.
    pub fn session_loss(&self) -> Option<String> {
        if self.event_type != EventType::SessionStatus {
            return None;
        }
        self.messages
            .iter()
            .find(|m| m.message_type == SESSION_TERMINATED || m.message_type == CONNECTION_DOWN)
            .map(|m| m.reason.clone().unwrap_or_else(|| m.message_type.clone()))
    }
}
