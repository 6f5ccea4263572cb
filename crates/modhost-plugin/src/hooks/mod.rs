//! Hook system — argument/result definitions, dispatcher and counters.

pub mod definitions;
pub mod dispatcher;
pub mod metrics;

pub use definitions::{DispatchResult, HookArg, HookArgs, HookConflict, HookResult, HookValue};
pub use dispatcher::HookDispatcher;
pub use metrics::{DispatchMetrics, DispatchMetricsSnapshot};
