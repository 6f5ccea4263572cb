//! Hook handlers for the echo plugin.

use modhost_plugin::prelude::*;
use serde_json::json;

/// Name of the liveness probe hook.
pub const PING: &str = "Ping";

/// `Ping()` → `"pong"`.
pub fn ping() -> HookValue {
    json!("pong")
}

/// `OnNewMessage(client, bytes)`: writes the payload back to the sender.
///
/// Returns no value so the echo never takes part in conflict detection.
pub async fn echo(plugin: &str, args: &HookArgs) -> Result<Option<HookValue>, PluginError> {
    let client = args
        .client(0)
        .ok_or_else(|| PluginError::invocation(plugin, ON_NEW_MESSAGE, "missing client argument"))?;
    let data = args
        .bytes(1)
        .ok_or_else(|| PluginError::invocation(plugin, ON_NEW_MESSAGE, "missing payload argument"))?;

    client
        .send(data)
        .await
        .map_err(|e| PluginError::invocation(plugin, ON_NEW_MESSAGE, format!("send failed: {e}")))?;

    tracing::debug!(client_id = %client.id(), bytes = data.len(), "Echoed message");
    Ok(None)
}
