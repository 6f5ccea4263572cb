//! Hook dispatcher — broadcasts a hook to every enabled plugin and collapses
//! the answers into one.
//!
//! - Plugins are invoked one after another in registry snapshot order.
//! - Each invocation is isolated: an error, a panic or a timeout only
//!   discards that plugin's answer.
//! - Every pair of present, unequal answers is reported as a conflict. The
//!   aggregate (the last present answer) is returned either way.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use super::definitions::{DispatchResult, HookArgs, HookConflict, HookResult, HookValue};
use super::metrics::DispatchMetrics;
use crate::error::PluginError;
use crate::loader::panic_message;
use crate::registry::{LoadedPlugin, PluginRegistry};

/// Default upper bound for a single plugin invocation.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches hooks to all loaded plugins.
#[derive(Debug)]
pub struct HookDispatcher {
    /// Plugin registry.
    registry: Arc<PluginRegistry>,
    /// Per-plugin invocation bound.
    hook_timeout: Duration,
    /// Counters.
    metrics: Arc<DispatchMetrics>,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(registry: Arc<PluginRegistry>, hook_timeout: Duration) -> Self {
        Self {
            registry,
            hook_timeout,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Dispatches `name` to every plugin and returns the full outcome.
    pub async fn dispatch(&self, name: &str, args: &HookArgs) -> DispatchResult {
        let snapshot = self.registry.snapshot().await;
        self.metrics.dispatched();

        if snapshot.is_empty() {
            return DispatchResult::empty(name);
        }

        debug!(hook = %name, plugin_count = snapshot.len(), "Dispatching hook");

        let mut results = Vec::with_capacity(snapshot.len());
        let mut value = None;

        for plugin in snapshot.iter() {
            let answer = if plugin.is_enabled() {
                self.invoke(plugin, name, args).await
            } else {
                None
            };

            if answer.is_some() {
                value = answer.clone();
            }

            results.push(HookResult {
                plugin: plugin.name().to_string(),
                value: answer,
            });
        }

        let conflicts = find_conflicts(&results);
        if !conflicts.is_empty() {
            self.metrics.conflicted(conflicts.len() as u64);
            let pairs = conflicts
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                hook = %name,
                conflicts = conflicts.len(),
                "Calling hook '{}' resulted in a conflict between the following plugins: {}",
                name,
                pairs
            );
        }

        DispatchResult {
            hook: name.to_string(),
            value,
            results,
            conflicts,
        }
    }

    /// Invokes one plugin, turning every failure mode into an absent answer.
    async fn invoke(
        &self,
        plugin: &LoadedPlugin,
        name: &str,
        args: &HookArgs,
    ) -> Option<HookValue> {
        let call = AssertUnwindSafe(plugin.instance().call(name, args)).catch_unwind();

        let outcome = match tokio::time::timeout(self.hook_timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(PluginError::invocation(
                plugin.name(),
                name,
                format!("panicked: {}", panic_message(payload.as_ref())),
            )),
            Err(_) => {
                self.metrics.timed_out();
                Err(PluginError::invocation(
                    plugin.name(),
                    name,
                    format!("timed out after {} ms", self.hook_timeout.as_millis()),
                ))
            }
        };

        match outcome {
            Ok(answer) => answer,
            Err(e) => {
                self.metrics.invocation_failed();
                error!(
                    hook = %name,
                    plugin = %plugin.name(),
                    error = %e,
                    "Plugin hook invocation failed"
                );
                None
            }
        }
    }

    /// Dispatches `name` and returns the aggregated answer.
    pub async fn call(&self, name: &str, args: &HookArgs) -> Option<HookValue> {
        self.dispatch(name, args).await.value
    }

    /// Dispatches `name` and converts the aggregate to `T`.
    ///
    /// `Ok(None)` means no plugin answered.
    pub async fn try_call_as<T>(&self, name: &str, args: &HookArgs) -> Result<Option<T>, PluginError>
    where
        T: DeserializeOwned,
    {
        let Some(value) = self.call(name, args).await else {
            return Ok(None);
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| PluginError::TypeMismatch {
                hook: name.to_string(),
                expected: std::any::type_name::<T>(),
                reason: e.to_string(),
            })
    }

    /// Dispatches `name` and converts the aggregate to `T`, yielding
    /// `T::default()` when no plugin answered or the conversion failed.
    pub async fn call_as<T>(&self, name: &str, args: &HookArgs) -> T
    where
        T: DeserializeOwned + Default,
    {
        match self.try_call_as(name, args).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                self.metrics.type_mismatched();
                warn!(hook = %name, error = %e, "Hook result type mismatch, using default");
                T::default()
            }
        }
    }

    /// Fires a hook, discarding the result.
    pub async fn call_hook(&self, name: &str, args: &HookArgs) {
        let _ = self.dispatch(name, args).await;
    }

    /// Returns a reference to the plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Returns the dispatch counters.
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Per-plugin invocation bound.
    pub fn hook_timeout(&self) -> Duration {
        self.hook_timeout
    }
}

/// Returns one conflict per unordered pair of present, unequal answers,
/// in registry order.
pub fn find_conflicts(results: &[HookResult]) -> Vec<HookConflict> {
    let mut conflicts = Vec::new();

    for (i, first) in results.iter().enumerate() {
        let Some(a) = &first.value else { continue };

        for second in &results[i + 1..] {
            let Some(b) = &second.value else { continue };
            if a != b {
                conflicts.push(HookConflict {
                    plugin_a: first.plugin.clone(),
                    plugin_b: second.plugin.clone(),
                    result_a: a.clone(),
                    result_b: b.clone(),
                });
            }
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::registry::{Plugin, PluginInfo};

    /// Plugin whose behaviour is fixed at construction.
    #[derive(Debug)]
    enum Behaviour {
        Answer(HookValue),
        Silent,
        Fails,
        Panics,
        Hangs,
    }

    #[derive(Debug)]
    struct Scripted {
        name: String,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Plugin for Scripted {
        fn info(&self) -> PluginInfo {
            PluginInfo {
                name: self.name.clone(),
                title: self.name.clone(),
                author: "tests".to_string(),
                version: "1.0.0".to_string(),
                description: String::new(),
            }
        }

        async fn call(&self, hook: &str, _args: &HookArgs) -> Result<Option<HookValue>, PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Answer(v) => Ok(Some(v.clone())),
                Behaviour::Silent => Ok(None),
                Behaviour::Fails => Err(PluginError::invocation(&self.name, hook, "bad state")),
                Behaviour::Panics => panic!("plugin exploded"),
                Behaviour::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Some(json!("late")))
                }
            }
        }
    }

    async fn dispatcher_with(plugins: Vec<Arc<Scripted>>) -> HookDispatcher {
        let registry = Arc::new(PluginRegistry::new());
        for plugin in plugins {
            let path = PathBuf::from(format!("{}.plugin", plugin.name));
            registry
                .insert(Arc::new(LoadedPlugin::new(plugin, path)))
                .await
                .unwrap();
        }
        HookDispatcher::new(registry, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_no_plugins_returns_absent() {
        let dispatcher = dispatcher_with(vec![]).await;
        let result = dispatcher.dispatch("Anything", &HookArgs::new()).await;
        assert!(result.value.is_none());
        assert!(!result.has_conflicts());
    }

    #[tokio::test]
    async fn test_only_disabled_plugins_returns_absent() {
        let a = Scripted::new("A", Behaviour::Answer(json!(1)));
        let dispatcher = dispatcher_with(vec![a.clone()]).await;
        dispatcher.registry().disable("A").await;

        let result = dispatcher.dispatch("GetCount", &HookArgs::new()).await;
        assert!(result.value.is_none());
        assert!(result.conflicts.is_empty());
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.results.len(), 1);
    }

    #[tokio::test]
    async fn test_single_answer_is_aggregate() {
        let dispatcher = dispatcher_with(vec![
            Scripted::new("A", Behaviour::Silent),
            Scripted::new("B", Behaviour::Answer(json!({"motd": "hi"}))),
        ])
        .await;

        let result = dispatcher.dispatch("GetMotd", &HookArgs::new()).await;
        assert_eq!(result.value, Some(json!({"motd": "hi"})));
        assert!(result.conflicts.is_empty());
        assert_eq!(result.answered(), 1);
    }

    #[tokio::test]
    async fn test_equal_answers_do_not_conflict() {
        let dispatcher = dispatcher_with(vec![
            Scripted::new("PluginA", Behaviour::Answer(json!("ok"))),
            Scripted::new("PluginB", Behaviour::Answer(json!("ok"))),
        ])
        .await;

        let result = dispatcher.dispatch("Ping", &HookArgs::new()).await;
        assert_eq!(result.value, Some(json!("ok")));
        assert!(result.conflicts.is_empty());
        assert_eq!(dispatcher.metrics().snapshot().conflicts, 0);
    }

    #[tokio::test]
    async fn test_structurally_equal_objects_do_not_conflict() {
        let dispatcher = dispatcher_with(vec![
            Scripted::new("A", Behaviour::Answer(json!({"x": 1, "y": [1, 2]}))),
            Scripted::new("B", Behaviour::Answer(json!({"y": [1, 2], "x": 1}))),
        ])
        .await;

        let result = dispatcher.dispatch("Pos", &HookArgs::new()).await;
        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_two_unequal_answers_conflict_once() {
        let dispatcher = dispatcher_with(vec![
            Scripted::new("PluginA", Behaviour::Answer(json!(1))),
            Scripted::new("PluginB", Behaviour::Answer(json!(2))),
        ])
        .await;

        let first = dispatcher.dispatch("GetCount", &HookArgs::new()).await;
        assert_eq!(
            first.conflicts,
            vec![HookConflict {
                plugin_a: "PluginA".to_string(),
                plugin_b: "PluginB".to_string(),
                result_a: json!(1),
                result_b: json!(2),
            }]
        );
        assert_eq!(first.value, Some(json!(2)));

        for _ in 0..5 {
            assert_eq!(dispatcher.call("GetCount", &HookArgs::new()).await, Some(json!(2)));
        }
    }

    #[tokio::test]
    async fn test_every_unequal_pair_reported_once() {
        let dispatcher = dispatcher_with(vec![
            Scripted::new("A", Behaviour::Answer(json!(1))),
            Scripted::new("B", Behaviour::Answer(json!(2))),
            Scripted::new("C", Behaviour::Silent),
            Scripted::new("D", Behaviour::Answer(json!(3))),
            Scripted::new("E", Behaviour::Answer(json!(1))),
        ])
        .await;

        let result = dispatcher.dispatch("Vote", &HookArgs::new()).await;
        let pairs: Vec<_> = result
            .conflicts
            .iter()
            .map(|c| (c.plugin_a.as_str(), c.plugin_b.as_str()))
            .collect();

        assert_eq!(
            pairs,
            vec![("A", "B"), ("A", "D"), ("B", "D"), ("B", "E"), ("D", "E")]
        );
        assert_eq!(result.value, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_null_is_a_present_answer() {
        let dispatcher = dispatcher_with(vec![
            Scripted::new("A", Behaviour::Answer(HookValue::Null)),
            Scripted::new("B", Behaviour::Silent),
        ])
        .await;

        let result = dispatcher.dispatch("Lookup", &HookArgs::new()).await;
        assert_eq!(result.value, Some(HookValue::Null));
    }

    #[tokio::test]
    async fn test_failing_plugin_is_isolated() {
        let after = Scripted::new("After", Behaviour::Answer(json!("ok")));
        let dispatcher = dispatcher_with(vec![
            Scripted::new("Broken", Behaviour::Fails),
            Scripted::new("Exploding", Behaviour::Panics),
            after.clone(),
        ])
        .await;

        let result = dispatcher.dispatch("Ping", &HookArgs::new()).await;
        assert_eq!(result.value, Some(json!("ok")));
        assert!(result.conflicts.is_empty());
        assert_eq!(after.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.metrics().snapshot().invocation_failures, 2);
    }

    #[tokio::test]
    async fn test_hung_plugin_is_bounded() {
        let dispatcher = dispatcher_with(vec![
            Scripted::new("Slow", Behaviour::Hangs),
            Scripted::new("Fast", Behaviour::Answer(json!(7))),
        ])
        .await;

        let result = dispatcher.dispatch("GetCount", &HookArgs::new()).await;
        assert_eq!(result.value, Some(json!(7)));
        assert_eq!(dispatcher.metrics().snapshot().timeouts, 1);
    }

    #[tokio::test]
    async fn test_call_as_converts() {
        let dispatcher =
            dispatcher_with(vec![Scripted::new("A", Behaviour::Answer(json!(12)))]).await;
        let count: u32 = dispatcher.call_as("GetCount", &HookArgs::new()).await;
        assert_eq!(count, 12);
    }

    #[tokio::test]
    async fn test_call_as_mismatch_yields_default() {
        let dispatcher =
            dispatcher_with(vec![Scripted::new("A", Behaviour::Answer(json!("twelve")))]).await;

        let count: u32 = dispatcher.call_as("GetCount", &HookArgs::new()).await;
        assert_eq!(count, 0);
        assert_eq!(dispatcher.metrics().snapshot().type_mismatches, 1);

        let err = dispatcher
            .try_call_as::<u32>("GetCount", &HookArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_call_as_absent_yields_default() {
        let dispatcher = dispatcher_with(vec![Scripted::new("A", Behaviour::Silent)]).await;
        let name: String = dispatcher.call_as("GetName", &HookArgs::new()).await;
        assert_eq!(name, "");
        assert_eq!(dispatcher.metrics().snapshot().type_mismatches, 0);
    }

    #[tokio::test]
    async fn test_call_hook_invokes_every_enabled_plugin() {
        let a = Scripted::new("A", Behaviour::Silent);
        let b = Scripted::new("B", Behaviour::Silent);
        let dispatcher = dispatcher_with(vec![a.clone(), b.clone()]).await;

        dispatcher.call_hook("OnTick", &HookArgs::new()).await;
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }
}
