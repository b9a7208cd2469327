//! Core types: connection state, device identity, and error enums.

use serde_json::Value;

/// Lifecycle of one [`DeviceClient`](crate::DeviceClient).
///
/// Mutated only by the connection task; callers observe via
/// [`DeviceClient::state`](crate::DeviceClient::state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted.  Terminal until an explicit
    /// [`connect`](crate::DeviceClient::connect).
    Failed,
}

/// Identity and capability metadata announced in the `register` envelope.
///
/// Produced by an external identity provider; the connection layer treats
/// it as opaque data.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Stable unique identifier, also used in the connection URL path.
    pub device_id: String,
    /// Human-readable display name.
    pub name: String,
    /// Device kind (e.g. `"android"`, `"ios"`, `"kiosk"`).
    pub kind: String,
    /// Agent version string.
    pub version: String,
    /// Opaque capability/metadata payload.
    pub capabilities: Value,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: "unnamed-device".into(),
            kind: "generic".into(),
            version: "0.1.0".into(),
            capabilities: serde_json::json!({}),
        }
    }

    /// Payload of the `register` envelope.
    pub fn register_payload(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "kind": self.kind,
            "version": self.version,
            "capabilities": self.capabilities,
        })
    }
}

/// Top-level client errors.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("config: {0}")]
    Config(String),
    #[error("not connected")]
    NotConnected,
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
}

/// Outcome of a failed [`request`](crate::DeviceClient::request).
///
/// Exactly one of these (or a matched response) resolves every request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("not connected")]
    NotConnected,
    #[error("request timed out")]
    Timeout,
    #[error("disconnected: {0}")]
    Disconnected(String),
    /// The peer answered with an error-kind envelope.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Errors a command handler can return.  The dispatch table converts these
/// into error-kind reply envelopes; they never reach the connection task.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HandlerError {
    #[error("invalid_args: {0}")]
    InvalidArgs(String),
    #[error("not_allowed: {0}")]
    NotAllowed(String),
    #[error("failed: {0}")]
    Failed(String),
}

/// Result type for command handlers.
pub type HandlerResult = Result<Value, HandlerError>;
