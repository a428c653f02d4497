use rustc_hash::FxHashMap;
use sorted_vec::SortedVec;

use crate::{EntityId, EntityType, Value};

/// Lookup key for [`IdentityCache::get`]. At least one identifier should be set.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub entity_type: EntityType,
    pub local_id: Option<EntityId>,
    pub remote_id: Option<Value>,
}

impl CacheKey {
    pub fn local(entity_id: EntityId) -> Self {
        CacheKey {
            entity_type: entity_id.extract_type(),
            local_id: Some(entity_id),
            remote_id: None,
        }
    }

    pub fn remote(entity_type: EntityType, remote_id: impl Into<Value>) -> Self {
        CacheKey {
            entity_type,
            local_id: None,
            remote_id: Some(remote_id.into()),
        }
    }
}

#[derive(Debug)]
struct Partition {
    // Ids of one schema sort in creation order
    local: SortedVec<EntityId>,
    remote: FxHashMap<Value, EntityId>,
}

impl Partition {
    fn new() -> Self {
        Partition {
            local: SortedVec::new(),
            remote: FxHashMap::default(),
        }
    }
}

/// Live entities keyed by local and remote identifier, partitioned per schema.
///
/// Only live entities are cached: removal evicts, restoration re-inserts.
#[derive(Debug, Default)]
pub struct IdentityCache {
    partitions: FxHashMap<EntityType, Partition>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition_mut(&mut self, entity_type: EntityType) -> &mut Partition {
        self.partitions
            .entry(entity_type)
            .or_insert_with(Partition::new)
    }

    pub fn insert(&mut self, entity_id: EntityId, remote_id: Option<&Value>) {
        let partition = self.partition_mut(entity_id.extract_type());
        if partition.local.binary_search(&entity_id).is_err() {
            partition.local.insert(entity_id);
        }
        if let Some(remote_id) = remote_id {
            partition.remote.insert(remote_id.clone(), entity_id);
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<EntityId> {
        let partition = self.partitions.get(&key.entity_type)?;

        if let Some(local_id) = key.local_id {
            return partition
                .local
                .binary_search(&local_id)
                .ok()
                .map(|_| local_id);
        }

        key.remote_id
            .as_ref()
            .and_then(|remote_id| partition.remote.get(remote_id).copied())
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.get(&CacheKey::local(entity_id)).is_some()
    }

    /// Re-keys the remote index of `entity_id`. After this returns the old identifier
    /// no longer resolves and the new one resolves to `entity_id`.
    pub fn remote_insert(
        &mut self,
        entity_id: EntityId,
        new_remote_id: Option<&Value>,
        old_remote_id: Option<&Value>,
    ) {
        let partition = self.partition_mut(entity_id.extract_type());

        if let Some(old) = old_remote_id {
            if partition.remote.get(old) == Some(&entity_id) {
                partition.remote.remove(old);
            }
        }

        if let Some(new) = new_remote_id {
            partition.remote.insert(new.clone(), entity_id);
        }

        log::trace!(
            "Re-keyed {} from {:?} to {:?}",
            entity_id,
            old_remote_id,
            new_remote_id
        );
    }

    pub fn remove(&mut self, entity_id: EntityId, remote_id: Option<&Value>) {
        if let Some(partition) = self.partitions.get_mut(&entity_id.extract_type()) {
            partition.local.remove_item(&entity_id);
            if let Some(remote_id) = remote_id {
                if partition.remote.get(remote_id) == Some(&entity_id) {
                    partition.remote.remove(remote_id);
                }
            }
        }
    }

    /// Live entities of exactly `entity_type`, in creation order.
    pub fn entities(&self, entity_type: EntityType) -> impl Iterator<Item = EntityId> + '_ {
        self.partitions
            .get(&entity_type)
            .into_iter()
            .flat_map(|partition| partition.local.iter().copied())
    }

    pub fn len(&self, entity_type: EntityType) -> usize {
        self.partitions
            .get(&entity_type)
            .map(|partition| partition.local.len())
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.partitions.clear();
    }
}
