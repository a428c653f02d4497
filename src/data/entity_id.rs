use serde::{Deserialize, Serialize};

/// Identifies one installed schema within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub struct EntityType(pub u32);

/// Local identifier of an entity.
///
/// The schema id lives in the high 32 bits and a per-store sequence in the low 32 bits,
/// so ids of one schema sort in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(entity_type: EntityType, sequence: u32) -> Self {
        EntityId(((entity_type.0 as u64) << 32) | (sequence as u64))
    }

    pub fn extract_sequence(&self) -> u32 {
        (self.0 & 0xFFFFFFFF) as u32
    }

    pub fn extract_type(&self) -> EntityType {
        EntityType((self.0 >> 32) as u32)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.extract_type().0, self.extract_sequence())
    }
}
