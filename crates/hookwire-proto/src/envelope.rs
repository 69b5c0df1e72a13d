//! Envelope and command message types

use crate::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status marker an agent sends when its connection to the host goes away
pub const DISCONNECTED: &str = "disconnected";

/// A decoded inbound message
///
/// Whether an envelope is a correlated response or an unsolicited event is
/// decided only by the presence of `trace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event code; absent on status-only messages
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    /// Connection the envelope arrived on, taken from the `Client-Id` header
    #[serde(skip)]
    pub client_id: u64,
    /// Correlation id of the request this answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    /// Payload
    #[serde(default)]
    pub data: Value,
    /// Any other top-level fields, such as the `event` status marker
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Create an unsolicited event envelope
    pub fn event(kind: EventKind, client_id: u64, data: Value) -> Self {
        Self {
            kind: Some(kind),
            client_id,
            trace: None,
            data,
            extra: Map::new(),
        }
    }

    /// Create a response envelope answering `trace`
    pub fn response(trace: impl Into<String>, client_id: u64, data: Value) -> Self {
        Self {
            kind: None,
            client_id,
            trace: Some(trace.into()),
            data,
            extra: Map::new(),
        }
    }

    /// Create the status envelope an agent sends when it disconnects
    pub fn disconnected(client_id: u64) -> Self {
        let mut extra = Map::new();
        extra.insert("event".to_string(), Value::String(DISCONNECTED.to_string()));
        Self {
            kind: None,
            client_id,
            trace: None,
            data: Value::Null,
            extra,
        }
    }

    /// True when this envelope answers an outstanding request
    pub fn is_response(&self) -> bool {
        self.trace.is_some()
    }

    /// Value of the top-level `event` status marker
    pub fn status(&self) -> Option<&str> {
        self.extra.get("event").and_then(Value::as_str)
    }

    /// True for an untyped envelope carrying the disconnect marker
    pub fn is_disconnect(&self) -> bool {
        self.kind.is_none() && self.status() == Some(DISCONNECTED)
    }

    /// Host process id reported by a connect event
    pub fn pid(&self) -> Option<u32> {
        self.data
            .get("pid")
            .and_then(Value::as_u64)
            .and_then(|pid| u32::try_from(pid).ok())
    }
}

/// An outbound command for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command code understood by the agent
    #[serde(rename = "type")]
    pub code: i64,
    /// Correlation id; filled in by correlated sends when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    /// Command arguments
    #[serde(default)]
    pub data: Value,
}

impl Command {
    /// Create a command without a trace id
    pub fn new(code: i64, data: Value) -> Self {
        Self {
            code,
            trace: None,
            data,
        }
    }

    /// Attach an explicit trace id
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}
