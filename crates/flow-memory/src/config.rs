//! Environment-driven configuration, following the same `dotenvy` +
//! `once_cell::sync::Lazy` one-time-load pattern as
//! `chem-persistence::config::DbConfig`, generalized from database pool
//! sizing to the memory connector's cache/debounce/snapshot knobs.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

/// Forces early `.env` load; most callers never need this, `MemoryConfig::from_env`
/// already forces it.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// In-memory `getLatestFlowState` cache hit window.
    pub in_memory_cache_ttl: Duration,
    /// Per-flow FIFO cap on retained `STATE` snapshots.
    pub max_state_snapshots_per_flow: usize,
    /// If set, `persistFlowState` writes are coalesced to one write per
    /// quiet period of this length.
    pub persist_state_on_every_change: bool,
    pub state_persistence_debounce: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { in_memory_cache_ttl: Duration::from_millis(2_000),
               max_state_snapshots_per_flow: 20,
               persist_state_on_every_change: false,
               state_persistence_debounce: Duration::from_millis(250) }
    }
}

impl MemoryConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let default = Self::default();
        Self { in_memory_cache_ttl: env_duration_ms("FLOW_MEMORY_CACHE_TTL_MS", default.in_memory_cache_ttl),
               max_state_snapshots_per_flow: env::var("FLOW_MEMORY_MAX_STATE_SNAPSHOTS").ok()
                                                                                         .and_then(|v| {
                                                                                             v.parse().ok()
                                                                                         })
                                                                                         .unwrap_or(
                    default.max_state_snapshots_per_flow,
                ),
               persist_state_on_every_change: env::var("FLOW_MEMORY_PERSIST_ON_EVERY_CHANGE").ok()
                                                                                               .map(|v| {
                                                                                                   v == "1"
                                                                                                   || v == "true"
                                                                                               })
                                                                                               .unwrap_or(
                    default.persist_state_on_every_change,
                ),
               state_persistence_debounce: env_duration_ms("FLOW_MEMORY_DEBOUNCE_MS",
                                                             default.state_persistence_debounce) }
    }
}

fn env_duration_ms(key: &str, fallback: Duration) -> Duration {
    env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(fallback)
}
