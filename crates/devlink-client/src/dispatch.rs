//! Command dispatch table — routes inbound command envelopes to handlers.
//!
//! Dispatch always produces a reply envelope: unknown actions, handler
//! errors, and handler panics all become error-kind replies.  A failing
//! handler can never take down the connection.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use devlink_protocol::Envelope;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::types::HandlerResult;

/// Context handed to every handler invocation.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// The inbound command's `message_id`; the reply correlates to it.
    pub message_id: String,
    /// Action name this handler was registered under.
    pub action: String,
    /// Cancelled when the connection drops or the client shuts down.
    pub cancel: CancellationToken,
}

/// Implement this to handle command envelopes from the coordinator.
///
/// Handlers run on the Tokio runtime and may perform async I/O.
///
/// # Example
///
/// ```rust,no_run
/// use devlink_client::{CommandContext, CommandHandler, HandlerResult};
///
/// struct Ping;
///
/// #[async_trait::async_trait]
/// impl CommandHandler for Ping {
///     async fn handle(&self, _ctx: CommandContext, _payload: serde_json::Value) -> HandlerResult {
///         Ok(serde_json::json!({ "pong": true }))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: CommandContext, payload: Value) -> HandlerResult;
}

/// Action name → handler.  At most one handler per action; last
/// registration wins.  Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: Arc<Mutex<HashMap<String, Arc<dyn CommandHandler>>>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `action`, replacing any existing one.
    pub fn register<H: CommandHandler>(&self, action: impl Into<String>, handler: H) {
        self.register_arc(action, Arc::new(handler));
    }

    /// Register a pre-wrapped handler.
    pub fn register_arc(&self, action: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let action = action.into();
        tracing::debug!(action = %action, "handler registered");
        self.handlers.lock().insert(action, handler);
    }

    /// Look up the handler for `action`.
    pub fn get(&self, action: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.lock().get(action).cloned()
    }

    /// Registered action names (sorted).
    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the handler for an inbound command and build the reply envelope.
    ///
    /// `device_id` is the local device's id, stamped on the reply.
    pub async fn dispatch(
        &self,
        device_id: &str,
        command: &Envelope,
        cancel: CancellationToken,
    ) -> Envelope {
        let handler = match self.get(&command.action) {
            Some(h) => h,
            None => {
                tracing::warn!(action = %command.action, "no handler registered for action");
                return Envelope::error_to(
                    command,
                    device_id,
                    format!("unknown_action: {}", command.action),
                );
            }
        };

        let ctx = CommandContext {
            message_id: command.message_id.clone(),
            action: command.action.clone(),
            cancel,
        };

        // catch_unwind: a panicking handler still produces a reply.
        let outcome = AssertUnwindSafe(handler.handle(ctx, command.payload.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => Envelope::response_to(command, device_id, result),
            Ok(Err(e)) => Envelope::error_to(command, device_id, e.to_string()),
            Err(_panic) => {
                tracing::error!(
                    action = %command.action,
                    message_id = %command.message_id,
                    "command handler panicked"
                );
                Envelope::error_to(command, device_id, "command handler panicked")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HandlerError;
    use devlink_protocol::EnvelopeKind;

    struct Echo;
    #[async_trait::async_trait]
    impl CommandHandler for Echo {
        async fn handle(&self, _ctx: CommandContext, payload: Value) -> HandlerResult {
            Ok(payload)
        }
    }

    struct Fail;
    #[async_trait::async_trait]
    impl CommandHandler for Fail {
        async fn handle(&self, _ctx: CommandContext, _payload: Value) -> HandlerResult {
            Err(HandlerError::Failed("intentional".into()))
        }
    }

    struct Panic;
    #[async_trait::async_trait]
    impl CommandHandler for Panic {
        async fn handle(&self, _ctx: CommandContext, _payload: Value) -> HandlerResult {
            panic!("intentional panic");
        }
    }

    struct Tagged(&'static str);
    #[async_trait::async_trait]
    impl CommandHandler for Tagged {
        async fn handle(&self, _ctx: CommandContext, _payload: Value) -> HandlerResult {
            Ok(serde_json::json!({ "tag": self.0 }))
        }
    }

    fn command(action: &str, payload: Value) -> Envelope {
        Envelope::command("coord", action, payload)
    }

    #[tokio::test]
    async fn dispatch_wraps_result_in_correlated_response() {
        let table = DispatchTable::new();
        table.register("device.echo", Echo);

        let cmd = command("device.echo", serde_json::json!({ "x": 1 }));
        let reply = table
            .dispatch("dev-1", &cmd, CancellationToken::new())
            .await;

        assert_eq!(reply.kind, EnvelopeKind::Response);
        assert_eq!(reply.correlation_id, cmd.message_id);
        assert_eq!(reply.device_id, "dev-1");
        assert_eq!(reply.payload, serde_json::json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn unknown_action_answers_with_error() {
        let table = DispatchTable::new();
        let cmd = command("nope", serde_json::json!({}));
        let reply = table
            .dispatch("dev-1", &cmd, CancellationToken::new())
            .await;

        assert_eq!(reply.kind, EnvelopeKind::Error);
        assert_eq!(reply.correlation_id, cmd.message_id);
        assert!(reply.error_reason().unwrap().contains("unknown_action"));
    }

    #[tokio::test]
    async fn handler_error_becomes_error_reply() {
        let table = DispatchTable::new();
        table.register("device.fail", Fail);

        let cmd = command("device.fail", serde_json::json!({}));
        let reply = table
            .dispatch("dev-1", &cmd, CancellationToken::new())
            .await;

        assert_eq!(reply.kind, EnvelopeKind::Error);
        assert!(reply.error_reason().unwrap().contains("intentional"));
    }

    #[tokio::test]
    async fn handler_panic_becomes_error_reply() {
        let table = DispatchTable::new();
        table.register("device.panic", Panic);

        let cmd = command("device.panic", serde_json::json!({}));
        let reply = table
            .dispatch("dev-1", &cmd, CancellationToken::new())
            .await;

        assert_eq!(reply.kind, EnvelopeKind::Error);
        assert!(reply.error_reason().unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn re_registration_replaces_prior_handler() {
        let table = DispatchTable::new();
        table.register("device.tagged", Tagged("first"));
        table.register("device.tagged", Tagged("second"));

        let cmd = command("device.tagged", serde_json::json!({}));
        let reply = table
            .dispatch("dev-1", &cmd, CancellationToken::new())
            .await;

        // Only the latest registration runs.
        assert_eq!(reply.payload, serde_json::json!({ "tag": "second" }));
    }

    #[test]
    fn actions_sorted() {
        let table = DispatchTable::new();
        table.register("z.action", Echo);
        table.register("a.action", Echo);
        assert_eq!(table.actions(), vec!["a.action", "z.action"]);
    }
}
