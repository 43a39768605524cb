//! The flow state container.
//!
//! The engine treats the user's state payload as an opaque, serializable
//! blob — it never inspects its fields. `FlowState<S>` just wraps that
//! payload with the identity and version bookkeeping the runtime needs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything a flow can carry as its state: serializable, ownable across an
/// await point, and valid for the life of the process.
pub trait FlowStateData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> FlowStateData for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A user state payload plus the identity/versioning the runtime owns.
///
/// Each flow exclusively owns its `FlowState` for the duration of an
/// execution (no other flow mutates it); within that execution, only the
/// method currently dispatching may write it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowState<S> {
    pub id: Uuid,
    pub version: u64,
    pub data: S,
}

impl<S: FlowStateData> FlowState<S> {
    pub fn new(data: S) -> Self {
        Self { id: Uuid::new_v4(), version: 0, data }
    }

    pub fn with_id(id: Uuid, data: S) -> Self {
        Self { id, version: 0, data }
    }

    /// Replaces the payload and bumps the version. Called by the runtime on
    /// the executing method's behalf; never called concurrently with
    /// another write for the same flow.
    pub fn set(&mut self, data: S) {
        self.data = data;
        self.version += 1;
    }
}
