//! Builder pattern for constructing a [`DeviceClient`].

use std::time::Duration;

use crate::client::{Config, DeviceClient};
use crate::reconnect::ReconnectPolicy;
use crate::types::{ClientError, DeviceIdentity};

/// Fluent builder for [`DeviceClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use devlink_client::DeviceClientBuilder;
/// let client = DeviceClientBuilder::new()
///     .server_url("wss://coordinator.example.com")
///     .device_id("tablet-7")
///     .name("Lobby tablet")
///     .heartbeat_interval(std::time::Duration::from_secs(30))
///     .build()
///     .unwrap();
/// ```
pub struct DeviceClientBuilder {
    server_url: String,
    identity: DeviceIdentity,
    heartbeat_interval: Duration,
    reconnect: ReconnectPolicy,
}

impl DeviceClientBuilder {
    pub fn new() -> Self {
        Self {
            server_url: "ws://localhost:8080".into(),
            identity: DeviceIdentity::new("unnamed-device"),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Coordinator base URL (`ws://` or `wss://`).  The client appends
    /// `/ws/device/{device_id}` at connect time.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    // ── Identity / metadata ──────────────────────────────────────────

    /// Set all identity fields at once, typically from an external
    /// identity provider.
    pub fn identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Stable unique device identifier.
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.identity.device_id = id.into();
        self
    }

    /// Human-readable display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.identity.name = name.into();
        self
    }

    /// Device kind reported in the register envelope.
    pub fn device_kind(mut self, kind: impl Into<String>) -> Self {
        self.identity.kind = kind.into();
        self
    }

    /// Agent version string.
    pub fn version(mut self, v: impl Into<String>) -> Self {
        self.identity.version = v.into();
        self
    }

    /// Opaque capability/metadata payload for the register envelope.
    pub fn capabilities(mut self, capabilities: serde_json::Value) -> Self {
        self.identity.capabilities = capabilities;
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the heartbeat interval (default 30s).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// Override the reconnect policy.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Build the [`DeviceClient`].
    pub fn build(self) -> Result<DeviceClient, ClientError> {
        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            return Err(ClientError::Config(format!(
                "server_url must be ws:// or wss://, got {:?}",
                self.server_url
            )));
        }
        if self.identity.device_id.is_empty() {
            return Err(ClientError::Config("device_id is required".into()));
        }

        Ok(DeviceClient::from_config(Config {
            server_url: self.server_url,
            identity: self.identity,
            heartbeat_interval: self.heartbeat_interval,
            reconnect: self.reconnect,
        }))
    }
}

impl Default for DeviceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
