use crate::{
    data::{
        collaborator::MapOptions,
        entity::{Link, Relation},
        field_schema::{Cardinality, RelationSlot},
        notifications::ChangeEvent,
    },
    EntityId, Error, Result, Store, Value,
};

fn link_value(link: Option<&Link>) -> Value {
    link.map(Link::to_value)
        .unwrap_or(Value::EntityReference(None))
}

/// Relationship proxy operations.
///
/// Every edge is held on both sides: the owner's slot and the mirror slot on the
/// target. All mutations clear stale edges on the old and new side before the new
/// edge is installed.
impl Store {
    fn relation_slot_of(&self, owner: EntityId, rel: &str) -> Result<(usize, RelationSlot)> {
        self.entity(owner)?;
        let schema = self.schema_of(owner)?;
        let index = schema
            .relation_slot(rel)
            .ok_or_else(|| Error::RelationshipNotInstalled(owner, rel.to_string()))?;
        Ok((index, schema.relations[index].clone()))
    }

    fn relation_at(&self, owner: EntityId, index: usize) -> Result<&Relation> {
        Ok(&self.entity(owner)?.relations[index])
    }

    fn relation_mut(&mut self, owner: EntityId, index: usize) -> Result<&mut Relation> {
        self.entities
            .get_mut(&owner)
            .map(|entity| &mut entity.relations[index])
            .ok_or(Error::EntityNotFound(owner))
    }

    fn validate_target(&self, slot: &RelationSlot, target: EntityId) -> Result<()> {
        self.live_entity(target)?;
        if !self.is_a(target.extract_type(), slot.target) {
            return Err(Error::InvalidChange(format!(
                "{} cannot be related through {}",
                target, slot.name
            )));
        }
        Ok(())
    }

    /// Adds `target` to the owner's slot, emitting one event for the owner. A fault
    /// standing for the target is resolved in place.
    fn raw_link(&mut self, owner: EntityId, rel: &str, target: EntityId) -> Result<()> {
        let (index, _) = self.relation_slot_of(owner, rel)?;
        if self.relation_at(owner, index)?.contains(target) {
            return Ok(());
        }
        let target_fault = self.remote_id(target).map(Link::Fault);

        let event = match self.relation_mut(owner, index)? {
            Relation::One(current) => {
                let old = link_value(current.as_ref());
                *current = Some(Link::Resolved(target));
                ChangeEvent::set(owner, rel, old, Value::from(target))
            }
            Relation::Many(links) => {
                let fault = target_fault
                    .as_ref()
                    .and_then(|fault| links.iter().position(|l| l == fault));
                match fault {
                    Some(position) => {
                        let old = std::mem::replace(&mut links[position], Link::Resolved(target));
                        ChangeEvent::splice(
                            owner,
                            rel,
                            position,
                            vec![old.to_value()],
                            vec![Value::from(target)],
                        )
                    }
                    None => {
                        links.push(Link::Resolved(target));
                        ChangeEvent::splice(owner, rel, links.len() - 1, vec![], vec![Value::from(target)])
                    }
                }
            }
        };
        self.emit(event)
    }

    /// Drops `target` from the owner's slot. Returns false when it was not there.
    fn raw_unlink(&mut self, owner: EntityId, rel: &str, target: EntityId) -> Result<bool> {
        let (index, _) = self.relation_slot_of(owner, rel)?;

        let event = match self.relation_mut(owner, index)? {
            Relation::One(current) => {
                if current.as_ref().and_then(Link::resolved) != Some(target) {
                    return Ok(false);
                }
                *current = None;
                ChangeEvent::set(owner, rel, Value::from(target), Value::EntityReference(None))
            }
            Relation::Many(links) => {
                let Some(position) = links.iter().position(|l| l.resolved() == Some(target)) else {
                    return Ok(false);
                };
                links.remove(position);
                ChangeEvent::splice(owner, rel, position, vec![Value::from(target)], vec![])
            }
        };
        self.emit(event)?;
        Ok(true)
    }

    /// Removes the edge between `a` and `b` on both sides.
    fn sever(&mut self, a: EntityId, rel: &str, b: EntityId) -> Result<()> {
        let (_, slot) = self.relation_slot_of(a, rel)?;
        self.raw_unlink(a, rel, b)?;
        self.raw_unlink(b, &slot.mirror, a)?;
        Ok(())
    }

    /// Frees a to-one mirror slot on `target` held by anyone other than `owner`.
    fn claim(&mut self, target: EntityId, mirror: &str, owner: EntityId) -> Result<()> {
        let (index, slot) = self.relation_slot_of(target, mirror)?;
        if slot.cardinality != Cardinality::One {
            return Ok(());
        }
        let occupant = self
            .relation_at(target, index)?
            .resolved()
            .find(|p| *p != owner);
        if let Some(previous) = occupant {
            self.sever(target, mirror, previous)?;
        }
        Ok(())
    }

    /// Replaces faults whose target has since entered the identity cache.
    fn materialize(&mut self, owner: EntityId, rel: &str) -> Result<()> {
        let (index, slot) = self.relation_slot_of(owner, rel)?;
        let faults: Vec<(usize, Value)> = self
            .relation_at(owner, index)?
            .links()
            .iter()
            .enumerate()
            .filter_map(|(i, link)| match link {
                Link::Fault(remote) => Some((i, remote.clone())),
                Link::Resolved(_) => None,
            })
            .collect();

        let mut duplicates = Vec::new();
        for (position, remote) in faults {
            let Some(target) = self.lookup(slot.target, &remote)? else {
                continue;
            };

            if self.relation_at(owner, index)?.contains(target) {
                duplicates.push(position);
                continue;
            }
            match self.relation_mut(owner, index)? {
                Relation::One(current) => *current = Some(Link::Resolved(target)),
                Relation::Many(links) => links[position] = Link::Resolved(target),
            }

            self.claim(target, &slot.mirror, owner)?;
            self.raw_link(target, &slot.mirror, owner)?;
        }

        if let Relation::Many(links) = self.relation_mut(owner, index)? {
            for position in duplicates.into_iter().rev() {
                links.remove(position);
            }
        }
        Ok(())
    }

    /// Resolved targets without materializing faults.
    pub fn linked(&self, owner: EntityId, rel: &str) -> Result<Vec<EntityId>> {
        let (index, _) = self.relation_slot_of(owner, rel)?;
        Ok(self.relation_at(owner, index)?.resolved().collect())
    }

    /// Related entities, resolving faults from the identity cache. Faults that stay
    /// unresolved are omitted.
    pub fn related(&mut self, owner: EntityId, rel: &str) -> Result<Vec<EntityId>> {
        let result = self
            .materialize(owner, rel)
            .and_then(|_| self.linked(owner, rel));
        self.published(result)
    }

    /// [`Store::related`], asking the resolver for every fault the cache cannot satisfy.
    pub async fn fetch_related(&mut self, owner: EntityId, rel: &str) -> Result<Vec<EntityId>> {
        let resolved = self.related(owner, rel)?;
        let (index, slot) = self.relation_slot_of(owner, rel)?;

        let faults: Vec<Value> = self
            .relation_at(owner, index)?
            .links()
            .iter()
            .filter_map(|link| match link {
                Link::Fault(remote) => Some(remote.clone()),
                Link::Resolved(_) => None,
            })
            .collect();
        if faults.is_empty() {
            return Ok(resolved);
        }

        let Some(resolver) = self.resolver.clone() else {
            log::warn!("No resolver installed for {} faults on {}.{}", faults.len(), owner, rel);
            return Ok(resolved);
        };

        let target = self.schema(slot.target)?;
        let name = target.qualified_name();
        let id_field = target.id_field.clone();

        for remote in faults {
            match resolver.resolve(&name, &remote).await? {
                Some(mut record) => {
                    record
                        .entry(id_field.clone())
                        .or_insert_with(|| remote.clone());
                    self.map(slot.target, vec![record], MapOptions::default())?;
                }
                None => log::warn!("Fault {:?} on {}.{} could not be resolved", remote, owner, rel),
            }
        }

        self.related(owner, rel)
    }

    /// True when identifiers are known but at least one target is not resolved.
    pub fn is_fault(&self, owner: EntityId, rel: &str) -> Result<bool> {
        let (index, _) = self.relation_slot_of(owner, rel)?;
        Ok(self.relation_at(owner, index)?.is_fault())
    }

    /// Identifiers of the related entities: the remote id when known, otherwise the
    /// local reference.
    pub fn related_ids(&self, owner: EntityId, rel: &str) -> Result<Vec<Value>> {
        let (index, _) = self.relation_slot_of(owner, rel)?;
        Ok(self
            .relation_at(owner, index)?
            .links()
            .iter()
            .map(|link| match link {
                Link::Resolved(target) => self
                    .remote_id(*target)
                    .unwrap_or_else(|| Value::from(*target)),
                Link::Fault(remote) => remote.clone(),
            })
            .collect())
    }

    /// Sets a to-one side. `None` clears it.
    pub fn set_related(&mut self, owner: EntityId, rel: &str, target: Option<EntityId>) -> Result<()> {
        let result = self.set_related_inner(owner, rel, target);
        self.published(result)
    }

    pub(crate) fn set_related_inner(
        &mut self,
        owner: EntityId,
        rel: &str,
        target: Option<EntityId>,
    ) -> Result<()> {
        let (index, slot) = self.relation_slot_of(owner, rel)?;
        self.live_entity(owner)?;
        if slot.cardinality != Cardinality::One {
            return Err(Error::RelationshipCardinality(owner, rel.to_string()));
        }
        if let Some(target) = target {
            self.validate_target(&slot, target)?;
        }

        self.materialize(owner, rel)?;
        let current = self.relation_at(owner, index)?.links().first().cloned();
        let old_target = current.as_ref().and_then(Link::resolved);
        let was_fault = current.as_ref().map(Link::is_fault).unwrap_or(false);
        if old_target == target && !was_fault {
            return Ok(());
        }

        if let Some(old_target) = old_target {
            self.raw_unlink(old_target, &slot.mirror, owner)?;
        }
        if let Some(target) = target {
            self.claim(target, &slot.mirror, owner)?;
        }

        if let Relation::One(link) = self.relation_mut(owner, index)? {
            *link = target.map(Link::Resolved);
        }
        self.emit(ChangeEvent::set(
            owner,
            rel,
            link_value(current.as_ref()),
            Value::EntityReference(target),
        ))?;

        if let Some(target) = target {
            self.raw_link(target, &slot.mirror, owner)?;
        }
        Ok(())
    }

    /// Structural edit of a to-many side. Targets already related elsewhere in the list
    /// are skipped. Returns the resolved entities that were removed.
    pub fn splice_related(
        &mut self,
        owner: EntityId,
        rel: &str,
        index: usize,
        remove_count: usize,
        add: Vec<EntityId>,
    ) -> Result<Vec<EntityId>> {
        let result = self.splice_related_inner(owner, rel, index, remove_count, add);
        self.published(result)
    }

    pub(crate) fn splice_related_inner(
        &mut self,
        owner: EntityId,
        rel: &str,
        index: usize,
        remove_count: usize,
        add: Vec<EntityId>,
    ) -> Result<Vec<EntityId>> {
        let (slot_index, slot) = self.relation_slot_of(owner, rel)?;
        self.live_entity(owner)?;
        if slot.cardinality != Cardinality::Many {
            return Err(Error::RelationshipCardinality(owner, rel.to_string()));
        }
        for target in &add {
            self.validate_target(&slot, *target)?;
        }

        self.materialize(owner, rel)?;
        let links = self.relation_at(owner, slot_index)?.links().to_vec();
        if index > links.len() {
            return Err(Error::IndexOutOfBounds(index, links.len()));
        }
        let end = index + remove_count.min(links.len() - index);

        let mut added: Vec<EntityId> = Vec::with_capacity(add.len());
        for target in add {
            let kept = links[..index]
                .iter()
                .chain(links[end..].iter())
                .any(|l| l.resolved() == Some(target));
            if kept || added.contains(&target) {
                log::warn!("Skipping duplicate {} in {}.{}", target, owner, rel);
                continue;
            }
            added.push(target);
        }

        if end == index && added.is_empty() {
            return Ok(Vec::new());
        }

        let removed: Vec<Link> = match self.relation_mut(owner, slot_index)? {
            Relation::Many(list) => list
                .splice(index..end, added.iter().map(|t| Link::Resolved(*t)))
                .collect(),
            Relation::One(_) => Vec::new(),
        };
        self.emit(ChangeEvent::splice(
            owner,
            rel,
            index,
            removed.iter().map(Link::to_value).collect(),
            added.iter().map(|t| Value::from(*t)).collect(),
        ))?;

        for previous in removed.iter().filter_map(Link::resolved) {
            if !added.contains(&previous) {
                self.raw_unlink(previous, &slot.mirror, owner)?;
            }
        }
        for target in &added {
            self.claim(*target, &slot.mirror, owner)?;
            self.raw_link(*target, &slot.mirror, owner)?;
        }

        Ok(removed.iter().filter_map(Link::resolved).collect())
    }

    pub fn push_related(&mut self, owner: EntityId, rel: &str, target: EntityId) -> Result<()> {
        let (index, _) = self.relation_slot_of(owner, rel)?;
        let len = self.relation_at(owner, index)?.links().len();
        self.splice_related(owner, rel, len, 0, vec![target])?;
        Ok(())
    }

    /// Returns false when `target` was not related.
    pub fn remove_related(&mut self, owner: EntityId, rel: &str, target: EntityId) -> Result<bool> {
        let (index, _) = self.relation_slot_of(owner, rel)?;
        let position = self
            .relation_at(owner, index)?
            .links()
            .iter()
            .position(|l| l.resolved() == Some(target));
        match position {
            Some(position) => {
                self.splice_related(owner, rel, position, 1, vec![])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Applies relationship identifiers from a raw record. Targets found in the cache
    /// are linked on both sides; the rest are kept as faults.
    pub(crate) fn assign_relation(&mut self, owner: EntityId, rel: &str, value: Value) -> Result<()> {
        let (index, slot) = self.relation_slot_of(owner, rel)?;

        match slot.cardinality {
            Cardinality::One => {
                if value.is_null() {
                    return self.set_related_inner(owner, rel, None);
                }
                if let Some(target) = self.lookup(slot.target, &value)? {
                    return self.set_related_inner(owner, rel, Some(target));
                }

                let current = self.relation_at(owner, index)?.links().first().cloned();
                let fault = Link::Fault(value.clone());
                if current.as_ref() == Some(&fault) {
                    return Ok(());
                }
                if let Some(old_target) = current.as_ref().and_then(Link::resolved) {
                    self.raw_unlink(old_target, &slot.mirror, owner)?;
                }
                if let Relation::One(link) = self.relation_mut(owner, index)? {
                    *link = Some(fault);
                }
                self.emit(ChangeEvent::set(owner, rel, link_value(current.as_ref()), value))
            }
            Cardinality::Many => {
                let items = match value {
                    Value::List(items) => items,
                    Value::EntityList(ids) => ids.into_iter().map(Value::from).collect(),
                    Value::Null => Vec::new(),
                    other => vec![other],
                };

                let mut resolved = Vec::new();
                let mut faults = Vec::new();
                for item in items.into_iter().filter(|v| !v.is_null()) {
                    match self.lookup(slot.target, &item)? {
                        Some(target) => resolved.push(target),
                        None => faults.push(item),
                    }
                }

                self.materialize(owner, rel)?;
                let desired: Vec<Link> = resolved
                    .iter()
                    .map(|t| Link::Resolved(*t))
                    .chain(faults.iter().cloned().map(Link::Fault))
                    .collect();
                let current = self.relation_at(owner, index)?.links().to_vec();
                if current == desired {
                    return Ok(());
                }

                self.splice_related_inner(owner, rel, 0, current.len(), resolved)?;
                if faults.is_empty() {
                    return Ok(());
                }

                let position = match self.relation_mut(owner, index)? {
                    Relation::Many(links) => {
                        let position = links.len();
                        links.extend(faults.iter().cloned().map(Link::Fault));
                        position
                    }
                    Relation::One(_) => return Ok(()),
                };
                self.emit(ChangeEvent::splice(owner, rel, position, vec![], faults))
            }
        }
    }
}
