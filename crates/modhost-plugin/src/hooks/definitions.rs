//! Hook arguments, per-plugin results and dispatch outcomes.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::client::HookClient;

/// Value returned by a plugin from a hook.
///
/// Compared structurally, so two plugins answering with equal but distinct
/// values agree. Absence is always carried as `Option::None`, never as
/// `Value::Null`.
pub type HookValue = serde_json::Value;

/// Hook fired for every accepted connection, with the client as argument 0.
pub const ON_NEW_CLIENT: &str = "OnNewClient";
/// Hook fired for every received chunk, with the client and the bytes.
pub const ON_NEW_MESSAGE: &str = "OnNewMessage";
/// Hook fired once the host has loaded its plugins and bound the server.
pub const ON_SERVER_START: &str = "OnServerStart";
/// Hook fired before the host shuts down.
pub const ON_SERVER_SHUTDOWN: &str = "OnServerShutdown";

/// A single positional hook argument.
#[derive(Debug, Clone)]
pub enum HookArg {
    /// Plain data.
    Value(HookValue),
    /// A network client.
    Client(Arc<dyn HookClient>),
    /// A raw byte payload.
    Bytes(Bytes),
}

impl HookArg {
    /// Wraps any serializable value, falling back to `null` if it cannot be encoded.
    pub fn json(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Value(value),
            Err(e) => {
                tracing::warn!(error = %e, "Hook argument could not be encoded, passing null");
                Self::Value(HookValue::Null)
            }
        }
    }

    /// Wraps a client handle.
    pub fn client(client: Arc<dyn HookClient>) -> Self {
        Self::Client(client)
    }
}

impl From<HookValue> for HookArg {
    fn from(value: HookValue) -> Self {
        Self::Value(value)
    }
}

impl From<Bytes> for HookArg {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Arc<dyn HookClient>> for HookArg {
    fn from(client: Arc<dyn HookClient>) -> Self {
        Self::Client(client)
    }
}

impl From<&str> for HookArg {
    fn from(s: &str) -> Self {
        Self::Value(HookValue::String(s.to_string()))
    }
}

impl From<String> for HookArg {
    fn from(s: String) -> Self {
        Self::Value(HookValue::String(s))
    }
}

impl From<i64> for HookArg {
    fn from(n: i64) -> Self {
        Self::Value(HookValue::from(n))
    }
}

impl From<bool> for HookArg {
    fn from(b: bool) -> Self {
        Self::Value(HookValue::Bool(b))
    }
}

/// Ordered positional arguments of one hook call.
#[derive(Debug, Clone, Default)]
pub struct HookArgs {
    args: Vec<HookArg>,
}

impl HookArgs {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument.
    pub fn with(mut self, arg: impl Into<HookArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends an argument in place.
    pub fn push(&mut self, arg: impl Into<HookArg>) {
        self.args.push(arg.into());
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument at `index`.
    pub fn get(&self, index: usize) -> Option<&HookArg> {
        self.args.get(index)
    }

    /// Data argument at `index`, if that argument is a value.
    pub fn value(&self, index: usize) -> Option<&HookValue> {
        match self.args.get(index) {
            Some(HookArg::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Client argument at `index`.
    pub fn client(&self, index: usize) -> Option<&Arc<dyn HookClient>> {
        match self.args.get(index) {
            Some(HookArg::Client(c)) => Some(c),
            _ => None,
        }
    }

    /// Byte payload at `index`.
    pub fn bytes(&self, index: usize) -> Option<&Bytes> {
        match self.args.get(index) {
            Some(HookArg::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    /// Iterates over all arguments.
    pub fn iter(&self) -> impl Iterator<Item = &HookArg> {
        self.args.iter()
    }
}

/// One plugin's answer within a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct HookResult {
    /// Name of the answering plugin.
    pub plugin: String,
    /// The value, or `None` if the plugin had nothing to say, was disabled,
    /// or failed.
    pub value: Option<HookValue>,
}

/// Two enabled plugins answering the same dispatch with unequal values.
#[derive(Debug, Clone, PartialEq)]
pub struct HookConflict {
    /// Plugin earlier in registry order.
    pub plugin_a: String,
    /// Plugin later in registry order.
    pub plugin_b: String,
    /// Value returned by `plugin_a`.
    pub result_a: HookValue,
    /// Value returned by `plugin_b`.
    pub result_b: HookValue,
}

impl std::fmt::Display for HookConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) vs {} ({})",
            self.plugin_a, self.result_a, self.plugin_b, self.result_b
        )
    }
}

/// Full outcome of dispatching a hook to every plugin.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Hook name.
    pub hook: String,
    /// Aggregated value: the last present answer in registry order.
    pub value: Option<HookValue>,
    /// One entry per plugin in the registry snapshot.
    pub results: Vec<HookResult>,
    /// Every unequal pair of present answers.
    pub conflicts: Vec<HookConflict>,
}

impl DispatchResult {
    /// Creates an outcome with no plugin answers.
    pub fn empty(hook: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            value: None,
            results: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// Whether any two plugins disagreed.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Number of plugins that produced a value.
    pub fn answered(&self) -> usize {
        self.results.iter().filter(|r| r.value.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_accessors() {
        let args = HookArgs::new()
            .with("hello")
            .with(Bytes::from_static(b"\x01\x02"))
            .with(42i64);

        assert_eq!(args.len(), 3);
        assert_eq!(args.value(0), Some(&json!("hello")));
        assert_eq!(args.bytes(1).map(|b| b.as_ref()), Some(&b"\x01\x02"[..]));
        assert_eq!(args.value(2), Some(&json!(42)));
        assert!(args.value(1).is_none());
        assert!(args.client(0).is_none());
        assert!(args.get(3).is_none());
    }

    #[test]
    fn test_conflict_display() {
        let conflict = HookConflict {
            plugin_a: "A".to_string(),
            plugin_b: "B".to_string(),
            result_a: json!(1),
            result_b: json!(2),
        };
        assert_eq!(conflict.to_string(), "A (1) vs B (2)");
    }

    #[test]
    fn test_json_arg_unencodable_becomes_null() {
        let encoded = HookArg::json(json!({"port": 7777}));
        assert!(matches!(encoded, HookArg::Value(ref v) if v == &json!({"port": 7777})));

        let tuple_keys = std::collections::BTreeMap::from([((1, 2), 3)]);
        assert!(matches!(HookArg::json(tuple_keys), HookArg::Value(HookValue::Null)));
    }
}
