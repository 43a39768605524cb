//! Scheduler configuration: the per-run `SchedulerOptions` record plus the
//! derived concurrency heuristics.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

/// Called just before a flow node starts.
pub type BeforeExecutionHook = Arc<dyn Fn(Uuid) + Send + Sync>;
/// Called after a flow node finishes successfully, with its result.
pub type AfterExecutionHook = Arc<dyn Fn(Uuid, &Value) + Send + Sync>;
/// Called on a flow node's failure; returning `true` forces a retry even if
/// `retryCount` is exhausted.
pub type OnErrorHook = Arc<dyn Fn(Uuid, &str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct SchedulerOptions {
    pub max_concurrent: usize,
    pub execution_timeout_ms: Option<u64>,
    pub total_timeout_ms: Option<u64>,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
    pub fail_fast: bool,
    pub min_execution_delay_ms: u64,
    pub checkpoint_interval_ms: Option<u64>,
    pub memory_throttling: bool,
    pub memory_limit_mb: u64,
    pub before_execution: Option<BeforeExecutionHook>,
    pub after_execution: Option<AfterExecutionHook>,
    pub on_error: Option<OnErrorHook>,
    pub input_data: Value,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { max_concurrent: default_max_concurrent(),
               execution_timeout_ms: None,
               total_timeout_ms: None,
               retry_count: 0,
               retry_delay_ms: 0,
               max_delay_ms: 30_000,
               fail_fast: false,
               min_execution_delay_ms: 0,
               checkpoint_interval_ms: None,
               memory_throttling: false,
               memory_limit_mb: 0,
               before_execution: None,
               after_execution: None,
               on_error: None,
               input_data: Value::Null }
    }
}

impl SchedulerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_retry(mut self, count: u32, delay_ms: u64) -> Self {
        self.retry_count = count;
        self.retry_delay_ms = delay_ms;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_input_data(mut self, input_data: Value) -> Self {
        self.input_data = input_data;
        self
    }
}

/// Supplies the heap-utilization fraction the backpressure formula reduces
/// `maxConcurrent` against. The core has no way to read real process memory
/// on its own; a caller with instrumentation (e.g. `sysinfo`) wires it in,
/// `NoOpProbe` (always 0.0) is the default, which makes `memoryThrottling`
/// an inert flag until a real probe is supplied.
pub trait MemoryUtilizationProbe: Send + Sync {
    fn utilization(&self) -> f64;
}

#[derive(Default)]
pub struct NoOpProbe;

impl MemoryUtilizationProbe for NoOpProbe {
    fn utilization(&self) -> f64 {
        0.0
    }
}

/// "derived from available cores / 2", per spec.md's default; `num_cpus` is
/// the idiomatic crate for the underlying heuristic.
pub fn default_max_concurrent() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// `adjusted = floor(maxConcurrent * (1 - (util - 0.8) * 5))`, floor 1, per
/// spec.md §5's backpressure formula. `utilization` is heap use as a fraction
/// of `memory_limit_mb` (0.0-1.0+).
pub fn effective_max_concurrent(options: &SchedulerOptions, utilization: f64) -> usize {
    if !options.memory_throttling || utilization < 0.8 {
        return options.max_concurrent;
    }
    let factor = 1.0 - (utilization - 0.8) * 5.0;
    let adjusted = (options.max_concurrent as f64 * factor).floor();
    if adjusted < 1.0 {
        1
    } else {
        adjusted as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_disabled_is_a_no_op() {
        let opts = SchedulerOptions { max_concurrent: 8, memory_throttling: false, ..Default::default() };
        assert_eq!(effective_max_concurrent(&opts, 0.95), 8);
    }

    #[test]
    fn throttling_reduces_concurrency_above_80_percent_and_floors_at_one() {
        let opts = SchedulerOptions { max_concurrent: 8, memory_throttling: true, ..Default::default() };
        assert_eq!(effective_max_concurrent(&opts, 0.8), 8);
        assert_eq!(effective_max_concurrent(&opts, 0.9), 4);
        assert_eq!(effective_max_concurrent(&opts, 1.0), 1);
    }
}
