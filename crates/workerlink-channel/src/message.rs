//! Wire messages exchanged with the worker and classification of incoming payloads.
//!
//! Every payload the worker sends is one of:
//! - a JSON object starting with `{`: a response (positive `id`) or a
//!   notification (`targetId` + `event`);
//! - a diagnostic line: one tag byte (`D`ebug, `W`arn, `E`rror, `X` dump)
//!   followed by raw text from the worker's own logging.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ChannelError, Result, WorkerError, WorkerErrorKind};

/// Key naming the worker-side entity a request addresses.
///
/// Serialized as the request's `internal` object, e.g.
/// `{"routerId": "r1", "transportId": "t1"}`. The channel never looks inside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSelector(Map<String, Value>);

impl TargetSelector {
    /// Selector addressing the worker itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one key to the selector.
    pub fn with(mut self, key: impl Into<String>, id: impl Into<String>) -> Self {
        self.0.insert(key.into(), Value::String(id.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outgoing request as it appears on the wire.
#[derive(Debug, Serialize)]
pub(crate) struct RequestMessage<'a> {
    pub id: u32,
    pub method: &'a str,
    pub internal: &'a TargetSelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Successful result of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    data: Option<Value>,
}

impl Response {
    pub fn new(data: Option<Value>) -> Self {
        Self { data }
    }

    /// Data the worker attached to its acceptance, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Value> {
        self.data
    }

    /// Deserialize the response data; a missing body parses as `null`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.data.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

/// Unsolicited event emitted by a worker-side entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub target_id: String,
    pub event: String,
    pub data: Option<Value>,
}

impl Notification {
    /// Deserialize the notification data; a missing body parses as `null`.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.data.clone().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(ChannelError::from)
    }
}

/// Result of a response frame, before it is matched to its request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResponseOutcome {
    Accepted(Option<Value>),
    Rejected(WorkerError),
    /// Neither `accepted` nor `error` was present.
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResponseMessage {
    pub id: u32,
    pub outcome: ResponseOutcome,
}

/// Severity tag of a worker diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiagnosticLevel {
    Debug,
    Warn,
    Error,
    Dump,
    Unrecognized(u8),
}

impl DiagnosticLevel {
    fn from_tag(tag: u8) -> Self {
        match tag {
            b'D' => DiagnosticLevel::Debug,
            b'W' => DiagnosticLevel::Warn,
            b'E' => DiagnosticLevel::Error,
            b'X' => DiagnosticLevel::Dump,
            other => DiagnosticLevel::Unrecognized(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DiagnosticLine {
    pub level: DiagnosticLevel,
    pub text: String,
}

/// A classified incoming payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Incoming {
    Response(ResponseMessage),
    Notification(Notification),
    Diagnostic(DiagnosticLine),
}

/// Why an incoming payload could not be classified.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ProtocolViolation {
    #[error("empty payload")]
    Empty,
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message carries both id {0} and a targetId")]
    Ambiguous(u64),
    #[error("response id {0} is out of range")]
    InvalidId(u64),
    #[error("notification targetId must be a string or a number, got {0}")]
    InvalidTargetId(Value),
    #[error("message is neither a response nor a notification")]
    Unclassified,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    accepted: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default, rename = "targetId")]
    target_id: Option<Value>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Classify one payload by its leading byte.
pub(crate) fn classify(payload: &[u8]) -> std::result::Result<Incoming, ProtocolViolation> {
    let (&tag, rest) = payload.split_first().ok_or(ProtocolViolation::Empty)?;
    if tag == b'{' {
        return classify_json(payload);
    }
    Ok(Incoming::Diagnostic(DiagnosticLine {
        level: DiagnosticLevel::from_tag(tag),
        text: String::from_utf8_lossy(rest).into_owned(),
    }))
}

fn classify_json(payload: &[u8]) -> std::result::Result<Incoming, ProtocolViolation> {
    let raw: RawMessage = serde_json::from_slice(payload)?;

    // Id 0 never names a request, so it does not make the message a response.
    match (raw.id.filter(|id| *id > 0), raw.target_id) {
        (Some(id), Some(_)) => Err(ProtocolViolation::Ambiguous(id)),
        (Some(id), None) => {
            let id = u32::try_from(id).map_err(|_| ProtocolViolation::InvalidId(id))?;
            let outcome = if raw.accepted {
                ResponseOutcome::Accepted(raw.data)
            } else if let Some(error) = raw.error {
                ResponseOutcome::Rejected(WorkerError::new(
                    WorkerErrorKind::from_wire(&error),
                    raw.reason.unwrap_or_default(),
                ))
            } else {
                ResponseOutcome::Unrecognized
            };
            Ok(Incoming::Response(ResponseMessage { id, outcome }))
        }
        (None, Some(target_id)) => {
            let event = raw
                .event
                .filter(|event| !event.is_empty())
                .ok_or(ProtocolViolation::Unclassified)?;
            Ok(Incoming::Notification(Notification {
                target_id: render_target_id(target_id)?,
                event,
                data: raw.data,
            }))
        }
        (None, None) => Err(ProtocolViolation::Unclassified),
    }
}

fn render_target_id(value: Value) -> std::result::Result<String, ProtocolViolation> {
    match value {
        Value::String(id) => Ok(id),
        Value::Number(number) => {
            if let Some(n) = number.as_u64() {
                Ok(n.to_string())
            } else if let Some(n) = number.as_i64() {
                Ok(n.to_string())
            } else {
                Ok(format!("{:.0}", number.as_f64().unwrap_or_default()))
            }
        }
        other => Err(ProtocolViolation::InvalidTargetId(other)),
    }
}
