//! `reset-memories` support.
//!
//! spec.md §6 names memory back-ends (`--long`, `--short`, `--entities`,
//! `--knowledge`, `--kickoff-outputs`) that belong to the CLI's external
//! knowledge/training collaborators (§1: out of scope for the core). The
//! core's own persistence boundary is `flow_memory::MemoryConnector`,
//! scoped per flow id rather than per named back-end, so each selector here
//! maps to a fixed, well-known flow id standing in for that back-end's
//! namespace — the same trick `connect_to_flow` uses for the scheduler's
//! own checkpoint writes (`scheduler_flow_id`).

use std::collections::HashMap;

use flow_memory::MemoryConnector;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryBackendSelector {
    Long,
    Short,
    Entities,
    Knowledge,
    KickoffOutputs,
}

impl MemoryBackendSelector {
    pub fn name(&self) -> &'static str {
        match self {
            MemoryBackendSelector::Long => "long",
            MemoryBackendSelector::Short => "short",
            MemoryBackendSelector::Entities => "entities",
            MemoryBackendSelector::Knowledge => "knowledge",
            MemoryBackendSelector::KickoffOutputs => "kickoff-outputs",
        }
    }

    /// A stable namespace id derived from the backend's name, so repeated
    /// CLI invocations address the same logical store.
    pub fn namespace_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.name().as_bytes())
    }

    pub const ALL: [MemoryBackendSelector; 5] = [
        MemoryBackendSelector::Long,
        MemoryBackendSelector::Short,
        MemoryBackendSelector::Entities,
        MemoryBackendSelector::Knowledge,
        MemoryBackendSelector::KickoffOutputs,
    ];
}

/// Clears every selected back-end's namespace via `connector`, returning the
/// per-backend removed-item counts.
pub async fn reset(connector: &MemoryConnector, selectors: &[MemoryBackendSelector])
                    -> HashMap<&'static str, usize> {
    let mut removed = HashMap::new();
    for selector in selectors {
        let count = connector.clear_flow_data(selector.namespace_id(), None, None).await.unwrap_or(0);
        removed.insert(selector.name(), count);
    }
    removed
}
