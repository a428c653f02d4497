use ahash::AHashMap;
use futures_util::future::LocalBoxFuture;

use crate::{EntityId, EntityType, Result, Value};

/// Raw attribute data as delivered by a transport or persistence layer.
pub type Record = AHashMap<String, Value>;

/// Resolves relationship faults that are not in the identity cache.
///
/// `schema` is the namespace-qualified target schema name.
pub trait Resolver {
    fn resolve(&self, schema: &str, id: &Value) -> LocalBoxFuture<'static, Result<Option<Record>>>;
}

/// Owns the truth about which entities have unsaved changes.
pub trait DirtyTracker {
    fn entity_dirty(&self, entity_id: EntityId) -> bool;
    fn schema_dirty(&self, entity_type: EntityType) -> bool;
    fn namespace_dirty(&self, namespace: &str) -> bool;
}

/// Outcome of remove/restore. Asynchronous hooks leave the operation pending
/// until their future completes.
pub enum Completion {
    Done,
    Pending(LocalBoxFuture<'static, Result<()>>),
}

impl Completion {
    pub fn is_done(&self) -> bool {
        matches!(self, Completion::Done)
    }

    pub async fn wait(self) -> Result<()> {
        match self {
            Completion::Done => Ok(()),
            Completion::Pending(future) => future.await,
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Done => write!(f, "Completion::Done"),
            Completion::Pending(_) => write!(f, "Completion::Pending"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapOptions {
    /// Update this entity instead of creating or looking one up
    pub override_target: Option<EntityId>,
}

impl MapOptions {
    pub fn override_target(entity_id: EntityId) -> Self {
        MapOptions {
            override_target: Some(entity_id),
        }
    }
}
