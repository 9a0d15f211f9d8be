//! Engine-wide tunables, mirroring the teacher's `RuntimeConfig`.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How long a single request's evaluation may run before its
    /// cancellation token is expected to have fired.
    pub evaluation_timeout: Duration,
    /// Upper bound on items materialized by a single `ITERATE`. Guards
    /// against an author-supplied collection blowing up the runtime registry.
    pub max_iteration_items: usize,
    /// Whether to record per-node timing in evaluation metadata.
    pub collect_timings: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout: Duration::from_secs(10),
            max_iteration_items: 10_000,
            collect_timings: false,
        }
    }
}
