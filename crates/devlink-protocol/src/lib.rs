//! Devlink wire protocol: envelope schema and JSON codec.
//!
//! Every frame exchanged between a device agent and the coordinator is one
//! flat JSON object — an [`Envelope`].  The schema is stable: optional
//! fields serialize as empty strings (or an empty object for `payload`),
//! never get omitted, and unrecognized `type` values decode to
//! [`EnvelopeKind::Unknown`] instead of failing, so older agents survive
//! newer coordinators.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of an envelope, carried in the wire field `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Device → Coordinator: identity and capability announcement.
    Register,
    /// Periodic liveness signal.
    Heartbeat,
    /// Reply to a heartbeat.  Informational only.
    HeartbeatAck,
    /// Request for the receiver to perform an action.
    Command,
    /// Correlated reply to a command.
    Response,
    /// Correlated acknowledgement without a payload of interest.
    Ack,
    /// Correlated or standalone failure report.
    Error,
    /// Any `type` string this build does not know.  Dropped after logging.
    #[serde(other)]
    Unknown,
}

/// The unit of wire communication.
///
/// `correlation_id` is empty unless this envelope answers a prior request,
/// in which case it equals that request's `message_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub action: String,
    pub device_id: String,
    pub message_id: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Envelope {
    /// New envelope with a fresh `message_id` and current timestamp.
    pub fn new(kind: EnvelopeKind, device_id: impl Into<String>) -> Self {
        Self {
            kind,
            action: String::new(),
            device_id: device_id.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: String::new(),
            timestamp: Utc::now().timestamp_millis(),
            payload: empty_object(),
        }
    }

    /// Registration announcement carrying the device's identity payload.
    pub fn register(device_id: &str, payload: Value) -> Self {
        let mut e = Self::new(EnvelopeKind::Register, device_id);
        e.payload = payload;
        e
    }

    /// Liveness signal.
    pub fn heartbeat(device_id: &str) -> Self {
        Self::new(EnvelopeKind::Heartbeat, device_id)
    }

    /// Reply to an inbound heartbeat.
    pub fn heartbeat_ack(device_id: &str, heartbeat: &Envelope) -> Self {
        let mut e = Self::new(EnvelopeKind::HeartbeatAck, device_id);
        e.correlation_id = heartbeat.message_id.clone();
        e
    }

    /// Outbound command requesting `action` on the receiver.
    pub fn command(device_id: &str, action: impl Into<String>, payload: Value) -> Self {
        let mut e = Self::new(EnvelopeKind::Command, device_id);
        e.action = action.into();
        e.payload = payload;
        e
    }

    /// Successful reply to `request`, correlated by its `message_id`.
    pub fn response_to(request: &Envelope, device_id: &str, payload: Value) -> Self {
        let mut e = Self::new(EnvelopeKind::Response, device_id);
        e.action = request.action.clone();
        e.correlation_id = request.message_id.clone();
        e.payload = payload;
        e
    }

    /// Failure reply to `request`, correlated by its `message_id`.
    pub fn error_to(request: &Envelope, device_id: &str, reason: impl Into<String>) -> Self {
        let mut e = Self::new(EnvelopeKind::Error, device_id);
        e.action = request.action.clone();
        e.correlation_id = request.message_id.clone();
        e.payload = serde_json::json!({ "error": reason.into() });
        e
    }

    /// The `error` string carried by an error-kind payload, if any.
    pub fn error_reason(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }
}

/// Decode-side failures.  A malformed envelope is dropped by the caller;
/// it never tears down the connection.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
}

/// Encode-side failures.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    /// Nothing legitimate ever sends an `Unknown` envelope.
    #[error("refusing to encode unknown-kind envelope")]
    UnknownKind,
    #[error("serialize failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Canonical serialization of `envelope`.  All fields are always present.
pub fn encode(envelope: &Envelope) -> Result<String, EncodeError> {
    if envelope.kind == EnvelopeKind::Unknown {
        return Err(EncodeError::UnknownKind);
    }
    Ok(serde_json::to_string(envelope)?)
}

/// Parse one wire frame.  Fails only when required fields (`type`,
/// `device_id`, `message_id`) are missing or mistyped.
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    Ok(serde_json::from_str(text)?)
}
