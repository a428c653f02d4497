use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use rustc_hash::FxHashMap;

use crate::{
    data::{
        cache::{CacheKey, IdentityCache},
        collaborator::{Completion, DirtyTracker, MapOptions, Record, Resolver},
        config::StoreConfig,
        entity::Entity,
        entity_schema::Hook,
        interner::{qualify, split_qualified, Interner},
        notifications::{ChangeEvent, Channel, NotificationBus, NotifyToken},
        registry::ChangeRegistry,
    },
    expr::{OperatorRegistry, Predicate, Query},
    EntityId, EntitySchema, EntityType, Error, Result, Value,
};

/// Raw key that asks `instantiate` to reuse a specific local identifier.
pub const LOCAL_ID_KEY: &str = "_local_id";

type DeferredTask = Box<dyn FnOnce(&mut Store) -> Result<()>>;

/// In-process object graph: installed schemas, live entities, the identity cache and
/// the notification pipeline.
///
/// Every public mutation queues its change events while it runs and publishes them once
/// it has applied all of its writes.
pub struct Store {
    config: StoreConfig,
    pub(crate) interner: Interner,
    pub(crate) schemas: FxHashMap<EntityType, EntitySchema>,
    pub(crate) namespaces: AHashMap<String, Vec<EntityType>>,
    pub(crate) entities: FxHashMap<EntityId, Entity>,
    pub(crate) cache: IdentityCache,
    pub(crate) registry: ChangeRegistry,
    bus: NotificationBus,
    operators: OperatorRegistry,
    pub(crate) resolver: Option<Rc<dyn Resolver>>,
    dirty: Option<Box<dyn DirtyTracker>>,
    sequence: u32,
    deferred: RefCell<Vec<DeferredTask>>,
    publishing: bool,
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Store {
            config,
            interner: Interner::new(),
            schemas: FxHashMap::default(),
            namespaces: AHashMap::new(),
            entities: FxHashMap::default(),
            cache: IdentityCache::new(),
            registry: ChangeRegistry::new(),
            bus: NotificationBus::new(),
            operators: OperatorRegistry::new(),
            resolver: None,
            dirty: None,
            sequence: 0,
            deferred: RefCell::new(Vec::new()),
            publishing: false,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    pub fn register_operator(
        &mut self,
        name: impl Into<String>,
        operator: impl Fn(&Value, &Value) -> bool + 'static,
    ) {
        self.operators.register(name, operator);
    }

    pub fn set_resolver(&mut self, resolver: impl Resolver + 'static) {
        self.resolver = Some(Rc::new(resolver));
    }

    pub fn set_dirty_tracker(&mut self, tracker: impl DirtyTracker + 'static) {
        self.dirty = Some(Box::new(tracker));
    }

    pub fn is_dirty(&self, entity_id: EntityId) -> bool {
        self.dirty
            .as_ref()
            .map(|tracker| tracker.entity_dirty(entity_id))
            .unwrap_or(false)
    }

    pub fn is_schema_dirty(&self, entity_type: EntityType) -> bool {
        self.dirty
            .as_ref()
            .map(|tracker| tracker.schema_dirty(entity_type))
            .unwrap_or(false)
    }

    pub fn is_namespace_dirty(&self, namespace: &str) -> bool {
        self.dirty
            .as_ref()
            .map(|tracker| tracker.namespace_dirty(namespace))
            .unwrap_or(false)
    }

    // ---- schemas ----

    pub fn schema(&self, entity_type: EntityType) -> Result<&EntitySchema> {
        self.schemas
            .get(&entity_type)
            .ok_or_else(|| Error::UnknownSchema(entity_type.to_string()))
    }

    pub fn schema_of(&self, entity_id: EntityId) -> Result<&EntitySchema> {
        self.schema(entity_id.extract_type())
    }

    /// Looks up a schema by `namespace.name`, or by bare name in the default namespace.
    pub fn schema_by_name(&self, name: &str) -> Result<EntityType> {
        let (namespace, schema) = split_qualified(name, &self.config.default_namespace);
        self.interner
            .get(&qualify(namespace, schema))
            .filter(|entity_type| self.schemas.contains_key(entity_type))
            .ok_or_else(|| Error::UnknownSchema(name.to_string()))
    }

    pub fn namespace_schemas(&self, namespace: &str) -> &[EntityType] {
        self.namespaces
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The schema itself followed by every schema that inherits from it.
    pub fn descendants(&self, entity_type: EntityType) -> Vec<EntityType> {
        let mut family = vec![entity_type];
        let mut i = 0;
        while i < family.len() {
            if let Some(schema) = self.schemas.get(&family[i]) {
                family.extend(schema.children.iter().copied());
            }
            i += 1;
        }
        family
    }

    pub fn is_a(&self, entity_type: EntityType, ancestor: EntityType) -> bool {
        let mut current = Some(entity_type);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = self.schemas.get(&t).and_then(|s| s.parent);
        }
        false
    }

    // ---- notifications ----

    pub fn subscribe(
        &mut self,
        channel: Channel,
        callback: impl FnMut(&ChangeEvent, &Store) + 'static,
    ) -> NotifyToken {
        self.bus.subscribe(channel, Box::new(callback))
    }

    pub fn unsubscribe(&mut self, token: &NotifyToken) -> bool {
        self.bus.unsubscribe(token)
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.bus.subscriber_count(channel)
    }

    /// Schedules a mutation to run once the events currently being published have
    /// reached every subscriber. Subscribers use this to react with writes of their own.
    pub fn defer(&self, task: impl FnOnce(&mut Store) -> Result<()> + 'static) {
        self.deferred.borrow_mut().push(Box::new(task));
    }

    pub(crate) fn emit(&mut self, event: ChangeEvent) -> Result<()> {
        self.registry.register_change(event)
    }

    /// Delivers every queued event, then runs deferred tasks, until both are drained.
    pub(crate) fn publish(&mut self) {
        if self.publishing {
            return;
        }
        self.publishing = true;

        loop {
            let events = self.registry.drain();
            if !events.is_empty() {
                let mut bus = std::mem::take(&mut self.bus);
                for event in &events {
                    log::trace!(
                        "Publishing {:?} on {} field {:?}",
                        event.kind,
                        event.entity_id,
                        event.field
                    );
                    bus.dispatch(event, self);
                }
                self.bus = bus;
            }

            let tasks = std::mem::take(self.deferred.get_mut());
            if tasks.is_empty() && !self.registry.has_pending() {
                break;
            }
            for task in tasks {
                if let Err(err) = task(self) {
                    log::warn!("Deferred store task failed: {}", err);
                }
            }
        }

        self.publishing = false;
    }

    pub(crate) fn published<T>(&mut self, result: Result<T>) -> Result<T> {
        self.publish();
        result
    }

    /// Drops all entities, subscriptions and pending events. Installed schemas stay,
    /// and singleton schemas get a fresh instance.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.cache.clear();
        self.registry.clear();
        self.bus = NotificationBus::new();
        self.deferred.get_mut().clear();
        self.sequence = 0;

        let singletons: Vec<EntityType> = self
            .schemas
            .values()
            .filter(|s| s.singleton && s.is_installed())
            .map(|s| s.entity_type)
            .collect();
        for entity_type in singletons {
            if let Err(err) = self.ensure_singleton(entity_type) {
                log::warn!("Failed to recreate singleton {}: {}", entity_type, err);
            }
        }
        self.registry.clear();
        log::debug!("Store reset");
    }

    // ---- entities ----

    pub fn entity(&self, entity_id: EntityId) -> Result<&Entity> {
        self.entities
            .get(&entity_id)
            .ok_or(Error::EntityNotFound(entity_id))
    }

    pub(crate) fn live_entity(&self, entity_id: EntityId) -> Result<&Entity> {
        let entity = self.entity(entity_id)?;
        if entity.removed {
            return Err(Error::EntityRemoved(entity_id));
        }
        Ok(entity)
    }

    /// True for entities that exist and are not removed.
    pub fn exists(&self, entity_id: EntityId) -> bool {
        self.entities
            .get(&entity_id)
            .map(|e| !e.removed)
            .unwrap_or(false)
    }

    pub fn is_removed(&self, entity_id: EntityId) -> bool {
        self.entities
            .get(&entity_id)
            .map(|e| e.removed)
            .unwrap_or(false)
    }

    pub fn remote_id(&self, entity_id: EntityId) -> Option<Value> {
        let schema = self.schemas.get(&entity_id.extract_type())?;
        self.entities.get(&entity_id)?.remote_id(schema).cloned()
    }

    fn next_id(&mut self, entity_type: EntityType, requested: Option<&Value>) -> EntityId {
        let requested = requested.and_then(|value| match value {
            Value::EntityReference(Some(id)) => Some(*id),
            Value::Int(raw) if *raw >= 0 => Some(EntityId(*raw as u64)),
            _ => None,
        });

        if let Some(id) = requested {
            if id.extract_type() == entity_type && !self.entities.contains_key(&id) {
                self.sequence = self.sequence.max(id.extract_sequence());
                return id;
            }
            log::warn!("Ignoring unusable local id {} for {}", id, entity_type);
        }

        loop {
            self.sequence = self.sequence.wrapping_add(1);
            let id = EntityId::new(entity_type, self.sequence);
            if !self.entities.contains_key(&id) {
                return id;
            }
        }
    }

    /// Creates an entity from a raw record: declared defaults, then the supplied values.
    pub fn instantiate(&mut self, entity_type: EntityType, record: Record) -> Result<EntityId> {
        let result = self.instantiate_inner(entity_type, record);
        self.published(result)
    }

    pub(crate) fn instantiate_inner(
        &mut self,
        entity_type: EntityType,
        mut record: Record,
    ) -> Result<EntityId> {
        let schema = self.schema(entity_type)?;
        if !schema.is_installed() {
            return Err(Error::NotInstalled(schema.qualified_name()));
        }
        if schema.singleton && self.cache.len(entity_type) > 0 {
            return Err(Error::DuplicateSingleton(schema.qualified_name()));
        }

        let remote_id = record
            .get(&schema.id_field)
            .filter(|v| !v.is_null())
            .cloned();
        if let Some(remote_id) = &remote_id {
            if self
                .cache
                .get(&CacheKey::remote(entity_type, remote_id.clone()))
                .is_some()
            {
                return Err(Error::DuplicateIdentifier(
                    schema.qualified_name(),
                    remote_id.clone(),
                ));
            }
        }

        let requested = record.remove(LOCAL_ID_KEY);
        let entity_id = self.next_id(entity_type, requested.as_ref());

        let schema = self.schema(entity_type)?;
        let mut entity = Entity::new(entity_id, schema);
        let mut relations = Vec::new();
        for (key, value) in record {
            if let Some(slot) = schema.attribute_slot(&key) {
                entity.values[slot] = value;
            } else if schema.relation_slot(&key).is_some() {
                relations.push((key, value));
            } else if schema.has_computed(&key) || schema.has_method(&key) {
                log::warn!("Ignoring value for computed member {} on {}", key, entity_id);
            } else {
                entity.dynamic.insert(key, value);
            }
        }

        let lists: Vec<String> = schema
            .attributes
            .iter()
            .zip(entity.values.iter())
            .filter(|(_, v)| v.is_list())
            .map(|(a, _)| a.name.clone())
            .chain(
                entity
                    .dynamic
                    .iter()
                    .filter(|(_, v)| v.is_list())
                    .map(|(k, _)| k.clone()),
            )
            .collect();

        self.entities.insert(entity_id, entity);
        self.cache.insert(entity_id, remote_id.as_ref());
        for field in lists {
            self.registry.observe(entity_id, &field);
        }
        self.emit(ChangeEvent::create(entity_id))?;

        for (name, value) in relations {
            self.assign_relation(entity_id, &name, value)?;
        }

        Ok(entity_id)
    }

    /// Creates or updates entities from raw records.
    ///
    /// A record whose identifier matches a cached entity updates it in place. With
    /// `override_target` set, the single record is applied to that entity instead.
    pub fn map(
        &mut self,
        entity_type: EntityType,
        records: Vec<Record>,
        options: MapOptions,
    ) -> Result<Vec<EntityId>> {
        let result = self.map_inner(entity_type, records, options);
        self.published(result)
    }

    pub(crate) fn map_inner(
        &mut self,
        entity_type: EntityType,
        records: Vec<Record>,
        options: MapOptions,
    ) -> Result<Vec<EntityId>> {
        let (id_field, singleton) = {
            let schema = self.schema(entity_type)?;
            (schema.id_field.clone(), schema.singleton)
        };

        if let Some(target) = options.override_target {
            if records.len() != 1 {
                return Err(Error::InvalidChange(format!(
                    "override of {} needs exactly one record, got {}",
                    target,
                    records.len()
                )));
            }
            if !self.is_a(target.extract_type(), entity_type) {
                return Err(Error::InvalidChange(format!(
                    "{} is not an instance of {}",
                    target, entity_type
                )));
            }
            let record = records.into_iter().next().unwrap_or_default();
            self.update_inner(target, record)?;
            return Ok(vec![target]);
        }

        let mut mapped = Vec::with_capacity(records.len());
        for record in records {
            let existing = match record.get(&id_field).filter(|v| !v.is_null()) {
                Some(remote_id) => self.lookup(entity_type, remote_id)?,
                None => None,
            };

            let entity_id = match existing {
                Some(entity_id) => {
                    self.update_inner(entity_id, record)?;
                    entity_id
                }
                // A singleton's records always land on its one instance
                None if singleton => {
                    let entity_id = self.ensure_singleton(entity_type)?;
                    self.update_inner(entity_id, record)?;
                    entity_id
                }
                None => self.instantiate_inner(entity_type, record)?,
            };
            mapped.push(entity_id);
        }
        Ok(mapped)
    }

    /// [`Store::map`] over a JSON object or array of objects.
    pub fn map_json(
        &mut self,
        entity_type: EntityType,
        json: &serde_json::Value,
        options: MapOptions,
    ) -> Result<Vec<EntityId>> {
        let objects = match json {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let records = objects
            .into_iter()
            .map(|object| match object {
                serde_json::Value::Object(fields) => Ok(fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect::<Record>()),
                other => Err(Error::InvalidChange(format!(
                    "expected a JSON object, got {}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        self.map(entity_type, records, options)
    }

    fn update_inner(&mut self, entity_id: EntityId, record: Record) -> Result<()> {
        self.live_entity(entity_id)?;
        for (key, value) in record {
            if key == LOCAL_ID_KEY {
                continue;
            }
            if self.schema_of(entity_id)?.relation_slot(&key).is_some() {
                self.assign_relation(entity_id, &key, value)?;
            } else {
                self.write_inner(entity_id, &key, value)?;
            }
        }
        Ok(())
    }

    /// Reads an attribute, relationship or computed property. Unset and undeclared
    /// attributes read as [`Value::Null`].
    pub fn read(&self, entity_id: EntityId, field: &str) -> Result<Value> {
        let entity = self.entity(entity_id)?;
        let schema = self.schema_of(entity_id)?;

        if let Some(slot) = schema.attribute_slot(field) {
            return Ok(entity.values[slot].clone());
        }
        if let Some(slot) = schema.relation_slot(field) {
            return Ok(entity.relations[slot].to_value());
        }
        if let Some(computed) = schema.computed.get(field) {
            return Ok(computed(self, entity_id));
        }
        Ok(entity.dynamic.get(field).cloned().unwrap_or_default())
    }

    pub fn write(&mut self, entity_id: EntityId, field: &str, value: impl Into<Value>) -> Result<()> {
        let result = self.write_inner(entity_id, field, value.into());
        self.published(result)
    }

    /// Applies several writes and publishes their events together.
    pub fn write_batch(&mut self, writes: Vec<(EntityId, String, Value)>) -> Result<()> {
        let result = writes
            .into_iter()
            .try_for_each(|(entity_id, field, value)| self.write_inner(entity_id, &field, value));
        self.published(result)
    }

    pub(crate) fn write_inner(&mut self, entity_id: EntityId, field: &str, value: Value) -> Result<()> {
        let entity = self.live_entity(entity_id)?;
        let schema = self.schema_of(entity_id)?;

        if schema.relation_slot(field).is_some() {
            return Err(Error::InvalidChange(format!(
                "relationship {} on {} is changed through its proxy",
                field, entity_id
            )));
        }
        if schema.has_computed(field) || schema.has_method(field) {
            return Err(Error::InvalidChange(format!(
                "{} on {} is not writable",
                field, entity_id
            )));
        }

        let slot = schema.attribute_slot(field);
        let old = match slot {
            Some(slot) => entity.values[slot].clone(),
            None => entity.dynamic.get(field).cloned().unwrap_or_default(),
        };
        if old == value {
            return Ok(());
        }

        let rekey = field == schema.id_field;
        if rekey && !value.is_null() {
            let taken = self
                .cache
                .get(&CacheKey::remote(entity_id.extract_type(), value.clone()));
            if taken.is_some() && taken != Some(entity_id) {
                return Err(Error::DuplicateIdentifier(schema.qualified_name(), value));
            }
        }

        self.emit(ChangeEvent::set(entity_id, field, old.clone(), value.clone()))?;

        if rekey {
            let new_remote = Some(&value).filter(|v| !v.is_null());
            let old_remote = Some(&old).filter(|v| !v.is_null());
            self.cache.remote_insert(entity_id, new_remote, old_remote);
        }
        if value.is_list() {
            self.registry.observe(entity_id, field);
        }

        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(Error::EntityNotFound(entity_id))?;
        match slot {
            Some(slot) => entity.values[slot] = value,
            None => {
                entity.dynamic.insert(field.to_string(), value);
            }
        }
        Ok(())
    }

    /// Structural edit of a list attribute. Unset attributes behave as empty lists.
    /// Returns the removed items.
    pub fn splice(
        &mut self,
        entity_id: EntityId,
        field: &str,
        index: usize,
        remove_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let result = self.splice_inner(entity_id, field, index, remove_count, items);
        self.published(result)
    }

    fn splice_inner(
        &mut self,
        entity_id: EntityId,
        field: &str,
        index: usize,
        remove_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let schema = self.schema_of(entity_id)?;
        if schema.relation_slot(field).is_some() {
            return Err(Error::InvalidChange(format!(
                "relationship {} on {} is changed through its proxy",
                field, entity_id
            )));
        }
        let slot = schema.attribute_slot(field);

        let current = self.read(entity_id, field)?;
        self.live_entity(entity_id)?;
        let mut list = match current {
            Value::List(list) => list,
            Value::Null => Vec::new(),
            _ => return Err(Error::NotAList(entity_id, field.to_string())),
        };

        if index > list.len() {
            return Err(Error::IndexOutOfBounds(index, list.len()));
        }
        let end = index + remove_count.min(list.len() - index);
        let removed: Vec<Value> = list.splice(index..end, items.iter().cloned()).collect();

        if removed.is_empty() && items.is_empty() {
            return Ok(removed);
        }

        self.registry.observe(entity_id, field);
        self.emit(ChangeEvent::splice(
            entity_id,
            field,
            index,
            removed.clone(),
            items,
        ))?;

        let entity = self
            .entities
            .get_mut(&entity_id)
            .ok_or(Error::EntityNotFound(entity_id))?;
        match slot {
            Some(slot) => entity.values[slot] = Value::List(list),
            None => {
                entity.dynamic.insert(field.to_string(), Value::List(list));
            }
        }
        Ok(removed)
    }

    /// True once a structural observer tracks `field` on the entity.
    pub fn is_observed(&self, entity_id: EntityId, field: &str) -> bool {
        self.registry.is_observed(entity_id, field)
    }

    pub fn call(&self, entity_id: EntityId, method: &str, args: &[Value]) -> Result<Value> {
        self.entity(entity_id)?;
        let schema = self.schema_of(entity_id)?;
        let method = schema
            .methods
            .get(method)
            .ok_or_else(|| Error::UnknownAttribute(schema.qualified_name(), method.to_string()))?
            .clone();
        method(self, entity_id, args)
    }

    /// Soft-deletes an entity. Relationship edges are kept so that a restore brings
    /// the entity back with its graph intact.
    pub fn remove(&mut self, entity_id: EntityId) -> Result<Completion> {
        let result = self.remove_inner(entity_id);
        self.publish();
        let hook = result?;
        Ok(self.run_hook(hook, entity_id))
    }

    fn remove_inner(&mut self, entity_id: EntityId) -> Result<Option<Hook>> {
        self.live_entity(entity_id)?;
        let schema = self.schema_of(entity_id)?;
        let hook = schema.on_remove.clone();
        let remote_id = self.remote_id(entity_id);

        if let Some(entity) = self.entities.get_mut(&entity_id) {
            entity.removed = true;
        }
        self.cache.remove(entity_id, remote_id.as_ref());
        self.emit(ChangeEvent::remove(entity_id))?;
        Ok(hook)
    }

    pub fn restore(&mut self, entity_id: EntityId) -> Result<Completion> {
        let result = self.restore_inner(entity_id);
        self.publish();
        let hook = result?;
        Ok(self.run_hook(hook, entity_id))
    }

    fn restore_inner(&mut self, entity_id: EntityId) -> Result<Option<Hook>> {
        if !self.entity(entity_id)?.removed {
            return Err(Error::NotRemoved(entity_id));
        }
        let schema = self.schema_of(entity_id)?;
        let hook = schema.on_restore.clone();
        let remote_id = self.remote_id(entity_id);

        if let Some(remote_id) = &remote_id {
            if self
                .cache
                .get(&CacheKey::remote(entity_id.extract_type(), remote_id.clone()))
                .is_some()
            {
                return Err(Error::DuplicateIdentifier(
                    schema.qualified_name(),
                    remote_id.clone(),
                ));
            }
        }
        if schema.singleton && self.cache.len(entity_id.extract_type()) > 0 {
            return Err(Error::DuplicateSingleton(schema.qualified_name()));
        }

        if let Some(entity) = self.entities.get_mut(&entity_id) {
            entity.removed = false;
        }
        self.cache.insert(entity_id, remote_id.as_ref());
        self.emit(ChangeEvent::create(entity_id))?;
        Ok(hook)
    }

    fn run_hook(&self, hook: Option<Hook>, entity_id: EntityId) -> Completion {
        match hook {
            None => Completion::Done,
            Some(Hook::Sync(hook)) => {
                hook(self, entity_id);
                Completion::Done
            }
            Some(Hook::Async(hook)) => Completion::Pending(hook(entity_id)),
        }
    }

    // ---- lookups ----

    /// Every live entity of the schema and its descendants, in creation order.
    pub fn all(&self, entity_type: EntityType) -> Result<Vec<EntityId>> {
        self.schema(entity_type)?;
        let mut ids: Vec<EntityId> = self
            .descendants(entity_type)
            .into_iter()
            .flat_map(|t| self.cache.entities(t).collect::<Vec<_>>())
            .collect();
        ids.sort_by_key(|id| (id.extract_sequence(), id.0));
        Ok(ids)
    }

    /// Resolves a remote identifier (or a local reference) from the identity cache,
    /// falling back to a scan of the identifier attribute.
    pub fn get(&self, entity_type: EntityType, id: &Value) -> Result<Option<EntityId>> {
        if let Some(entity_id) = self.lookup(entity_type, id)? {
            return Ok(Some(entity_id));
        }
        if id.is_null() {
            return Ok(None);
        }

        let mut found = None;
        for entity_id in self.all(entity_type)? {
            let id_field = &self.schema_of(entity_id)?.id_field;
            if !self.read(entity_id, id_field)?.loosely_equals(id) {
                continue;
            }
            if found.is_some() {
                return Err(Error::DuplicateIdentifier(
                    self.schema(entity_type)?.qualified_name(),
                    id.clone(),
                ));
            }
            found = Some(entity_id);
        }
        Ok(found)
    }

    /// Cache-only lookup across the schema family.
    pub(crate) fn lookup(&self, entity_type: EntityType, id: &Value) -> Result<Option<EntityId>> {
        if let Value::EntityReference(Some(local)) = id {
            let found = self.exists(*local) && self.is_a(local.extract_type(), entity_type);
            return Ok(found.then_some(*local));
        }
        if id.is_null() {
            return Ok(None);
        }

        let mut found = None;
        for t in self.descendants(entity_type) {
            if let Some(entity_id) = self.cache.get(&CacheKey::remote(t, id.clone())) {
                if found.is_some() {
                    return Err(Error::DuplicateIdentifier(
                        self.schema(entity_type)?.qualified_name(),
                        id.clone(),
                    ));
                }
                found = Some(entity_id);
            }
        }
        Ok(found)
    }

    /// [`Store::get`], asking the resolver for records the store does not hold.
    pub async fn fetch(&mut self, entity_type: EntityType, id: &Value) -> Result<Option<EntityId>> {
        if let Some(entity_id) = self.get(entity_type, id)? {
            return Ok(Some(entity_id));
        }
        let Some(resolver) = self.resolver.clone() else {
            return Ok(None);
        };

        let schema = self.schema(entity_type)?;
        let name = schema.qualified_name();
        let id_field = schema.id_field.clone();

        match resolver.resolve(&name, id).await? {
            Some(mut record) => {
                record.entry(id_field).or_insert_with(|| id.clone());
                let mapped = self.map(entity_type, vec![record], MapOptions::default())?;
                Ok(mapped.into_iter().next())
            }
            None => Ok(None),
        }
    }

    pub fn query(&self, entity_type: EntityType, predicate: Predicate) -> Query {
        Query::new(entity_type, predicate)
    }

    // ---- singletons ----

    pub(crate) fn ensure_singleton(&mut self, entity_type: EntityType) -> Result<EntityId> {
        let existing: Vec<EntityId> = self.cache.entities(entity_type).collect();
        match existing.as_slice() {
            [] => {
                let entity_id = self.instantiate_inner(entity_type, Record::new())?;
                log::debug!("Created singleton instance {}", entity_id);
                Ok(entity_id)
            }
            [entity_id] => Ok(*entity_id),
            _ => Err(Error::DuplicateSingleton(
                self.schema(entity_type)?.qualified_name(),
            )),
        }
    }

    /// The one live instance of a singleton schema.
    pub fn singleton(&self, entity_type: EntityType) -> Result<EntityId> {
        let schema = self.schema(entity_type)?;
        if !schema.singleton {
            return Err(Error::NotSingleton(schema.qualified_name()));
        }
        let existing: Vec<EntityId> = self.cache.entities(entity_type).collect();
        match existing.as_slice() {
            [entity_id] => Ok(*entity_id),
            [] => Err(Error::InvalidChange(format!(
                "{} has no singleton instance",
                schema.qualified_name()
            ))),
            _ => Err(Error::DuplicateSingleton(schema.qualified_name())),
        }
    }
}
