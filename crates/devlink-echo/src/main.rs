//! Reference echo device for devlink.
//!
//! Connects to the coordinator, registers two handlers, and runs until
//! Ctrl-C:
//!
//! - `device.ping` — reply with a pong and the current timestamp
//! - `device.echo` — reply with the command payload unchanged
//!
//! Usage:
//!   devlink-echo ws://localhost:8080
//!
//! Env vars:
//!   DEVLINK_DEVICE_ID — device ID (default: "echo-device")

use devlink_client::{
    ClientEvent, CommandContext, CommandHandler, DeviceClientBuilder, HandlerResult,
};
use tracing_subscriber::EnvFilter;

struct PingHandler;

#[async_trait::async_trait]
impl CommandHandler for PingHandler {
    async fn handle(&self, _ctx: CommandContext, _payload: serde_json::Value) -> HandlerResult {
        Ok(serde_json::json!({
            "pong": true,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }))
    }
}

struct EchoHandler;

#[async_trait::async_trait]
impl CommandHandler for EchoHandler {
    async fn handle(&self, _ctx: CommandContext, payload: serde_json::Value) -> HandlerResult {
        Ok(payload)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:8080".into());
    let device_id =
        std::env::var("DEVLINK_DEVICE_ID").unwrap_or_else(|_| "echo-device".into());

    let client = DeviceClientBuilder::new()
        .server_url(server_url)
        .device_id(device_id)
        .name("Echo device")
        .device_kind("reference")
        .version(env!("CARGO_PKG_VERSION"))
        .capabilities(serde_json::json!({
            "actions": ["device.ping", "device.echo"],
        }))
        .build()?;

    client.register_handler("device.ping", PingHandler);
    client.register_handler("device.echo", EchoHandler);

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::Connected => tracing::info!("connected"),
                ClientEvent::Disconnected { reason } => {
                    tracing::warn!(reason = %reason, "disconnected")
                }
                ClientEvent::Command { action, message_id } => {
                    tracing::info!(action = %action, message_id = %message_id, "command")
                }
                ClientEvent::Error(reason) => tracing::error!(reason = %reason, "error"),
                ClientEvent::Message(_) => {}
            }
        }
    });

    client.connect();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    client.disconnect().await;
    Ok(())
}
