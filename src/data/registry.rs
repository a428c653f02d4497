use rustc_hash::FxHashSet;

use crate::{
    data::notifications::{ChangeEvent, ChangeKind},
    EntityId, Error, Result,
};

/// Collects change events produced while the store is being mutated.
///
/// Events are validated on entry and held until the store publishes them, so that
/// subscribers only ever observe a store whose mutation has fully applied.
#[derive(Debug, Default)]
pub struct ChangeRegistry {
    pending: Vec<ChangeEvent>,
    /// List-valued attributes with a structural observer installed
    observed: FxHashSet<(EntityId, String)>,
}

impl ChangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_change(&mut self, event: ChangeEvent) -> Result<()> {
        Self::validate(&event)?;
        log::trace!(
            "Queued {:?} on {} field {:?}",
            event.kind,
            event.entity_id,
            event.field
        );
        self.pending.push(event);
        Ok(())
    }

    pub fn validate(event: &ChangeEvent) -> Result<()> {
        if event.entity_id.extract_type() != event.entity_type {
            return Err(Error::InvalidChange(format!(
                "entity {} does not belong to type {}",
                event.entity_id, event.entity_type
            )));
        }

        match event.kind {
            ChangeKind::Set if event.field.is_none() => Err(Error::InvalidChange(
                "set change without a field".to_string(),
            )),
            ChangeKind::Splice if event.field.is_none() || event.splice.is_none() => Err(
                Error::InvalidChange("splice change without a field or splice data".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Marks a list attribute as structurally observed. Returns true the first time.
    pub fn observe(&mut self, entity_id: EntityId, field: &str) -> bool {
        if self.is_observed(entity_id, field) {
            return false;
        }
        self.observed.insert((entity_id, field.to_string()))
    }

    pub fn is_observed(&self, entity_id: EntityId, field: &str) -> bool {
        self.observed.contains(&(entity_id, field.to_string()))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.observed.clear();
    }
}
