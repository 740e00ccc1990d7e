//! Wire frames exchanged with the backend.
//!
//! Outbound: `{"taskId": "<correlation id>", "task": "<prompt>"}`.
//!
//! Inbound, every field optional:
//! `{"taskId": "...", "response": "...", "status": "error", "error": "..."}`.
//! A missing `response` means the whole raw frame is the payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::correlation::Resolution;
use crate::errors::RelayError;

/// Request sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub task: String,
}

impl OutboundFrame {
    pub fn new(task_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task: task.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Encode(e.to_string()))
    }
}

/// Why an inbound frame could not be read as a structured response.
#[derive(Debug, Error)]
pub enum FrameParseError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("frame is JSON but not an object")]
    NotAnObject,

    #[error("frame fields have unexpected types: {0}")]
    BadFields(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    #[serde(rename = "taskId", default)]
    task_id: Option<Value>,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// A response received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Correlation id, if the backend tagged the response.
    pub task_id: Option<String>,
    pub payload: String,
    /// Set when the backend flagged the response as an error.
    pub error: Option<String>,
}

impl InboundFrame {
    /// Parse a raw frame.
    ///
    /// `taskId` may be a string or a number; an empty string counts as absent.
    /// A string `response` is taken verbatim, any other JSON value is rendered
    /// back to JSON text.
    pub fn parse(raw: &str) -> Result<Self, FrameParseError> {
        let value: Value = serde_json::from_str(raw).map_err(FrameParseError::NotJson)?;
        if !value.is_object() {
            return Err(FrameParseError::NotAnObject);
        }
        let fields: RawInbound =
            serde_json::from_value(value).map_err(FrameParseError::BadFields)?;

        let task_id = match fields.task_id {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let payload = match fields.response {
            Some(Value::String(text)) => text,
            None | Some(Value::Null) => raw.to_string(),
            Some(other) => other.to_string(),
        };

        let is_error = fields
            .status
            .as_ref()
            .and_then(Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case("error"));
        let error = is_error.then(|| match fields.error {
            Some(Value::String(message)) => message,
            Some(Value::Null) | None => payload.clone(),
            Some(other) => other.to_string(),
        });

        Ok(Self {
            task_id,
            payload,
            error,
        })
    }

    /// A frame that could not be parsed: the raw text is the payload.
    pub fn untagged(raw: &str) -> Self {
        Self {
            task_id: None,
            payload: raw.to_string(),
            error: None,
        }
    }

    pub fn into_resolution(self) -> Resolution {
        match self.error {
            Some(message) => Err(RelayError::Backend(message)),
            None => Ok(self.payload),
        }
    }
}
