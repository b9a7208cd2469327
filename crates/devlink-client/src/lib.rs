//! `devlink-client` — connection layer for devlink device agents.
//!
//! A device agent is any process that connects to the devlink coordinator
//! over a long-lived WebSocket, announces its identity, and exchanges typed
//! envelopes.  This crate provides the hard part so agent authors don't
//! re-implement it: transport lifecycle, request/response correlation,
//! command dispatch, heartbeat, and reconnection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Your agent (CLI / mobile shell / kiosk)                 │
//! │                                                          │
//! │   let client = DeviceClientBuilder::new()                │
//! │       .server_url("wss://coordinator.example.com")       │
//! │       .device_id("tablet-7")                             │
//! │       .build()?;                                         │
//! │   client.register_handler("device.ping", Ping);          │
//! │   client.connect();                                      │
//! │                                                          │
//! │   let reply = client                                     │
//! │       .request("status.report", payload, timeout)        │
//! │       .await?;                                           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow (hard-coded by the client)
//!
//! 1. Open `{ws|wss}://<host>/ws/device/{device_id}`
//! 2. Send a `register` envelope with the identity payload
//! 3. Install a fresh correlation table, start the heartbeat
//! 4. Main loop:
//!    - `response`/`ack`/correlated `error` → resolve the pending request
//!    - `command` → dispatch to the registered handler, always reply
//!    - `heartbeat` → reply `heartbeat_ack`
//! 5. On transport loss: fail all pending requests, then reconnect with
//!    linear backoff until the attempt budget runs out
//!
//! Malformed frames are dropped before dispatch; a handler never sees a
//! partial envelope.  Handler failures (including panics) become error
//! replies and never tear down the connection.

pub mod builder;
pub mod client;
pub mod correlation;
pub mod dispatch;
pub mod events;
mod heartbeat;
pub mod reconnect;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::DeviceClientBuilder;
pub use client::DeviceClient;
pub use correlation::CorrelationTable;
pub use dispatch::{CommandContext, CommandHandler, DispatchTable};
pub use events::ClientEvent;
pub use reconnect::ReconnectPolicy;
pub use types::{
    ClientError, ConnectionState, DeviceIdentity, HandlerError, HandlerResult, RequestError,
};

// Re-export protocol types so agents never need devlink-protocol directly.
pub use devlink_protocol::{Envelope, EnvelopeKind};
