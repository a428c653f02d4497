use crate::{
    expr::Query,
    live::{LiveQuery, LiveState, SubscriptionId},
    EntityId, Error, Result, Store, Value,
};

/// Live query whose order is a persisted, manually editable index attribute.
///
/// After `init` the query's own sort is dropped; results are ordered by the index
/// attribute only, and new members are appended at the end.
pub struct PositionalQuery {
    live: LiveQuery,
    field: String,
}

impl PositionalQuery {
    pub fn new(query: Query, field: impl Into<String>) -> Self {
        PositionalQuery {
            live: LiveQuery::new(query),
            field: field.into(),
        }
    }

    /// Uses the store's configured position attribute.
    pub fn with_default_field(query: Query, store: &Store) -> Self {
        PositionalQuery::new(query, store.config().position_field.clone())
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn state(&self) -> LiveState {
        self.live.state()
    }

    pub fn results(&self) -> Vec<EntityId> {
        self.live.results()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn on_change(&mut self, callback: impl FnMut(&[EntityId]) + 'static) -> SubscriptionId {
        self.live.on_change(callback)
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        self.live.off(id)
    }

    pub fn dispose(&mut self, store: &mut Store) {
        self.live.dispose(store)
    }

    /// Merges existing index values into a dense `0..len` ordering, stamps it onto the
    /// entities and starts following the store.
    ///
    /// Valid unique indices stay. Entities without an index take the lowest free
    /// positions in query order. Duplicated and out-of-range indices take the
    /// remaining positions, ordered by their stale value.
    pub fn init(&mut self, store: &mut Store) -> Result<Vec<EntityId>> {
        match self.live.state() {
            LiveState::Disposed => return Err(Error::LiveQueryDisposed),
            LiveState::Initialized => return Ok(self.live.results()),
            LiveState::Uninitialized => {}
        }

        let natural = self.live.inner.borrow().query.execute(store)?;
        let merged = self.merge(store, natural);

        {
            let mut inner = self.live.inner.borrow_mut();
            inner.results = merged.clone();
            inner.position_field = Some(self.field.clone());
            inner.query.clear_order();
        }

        let writes = self.live.inner.borrow().stamps(store);
        store.write_batch(writes)?;

        self.live.start(store, merged)
    }

    fn merge(&self, store: &Store, natural: Vec<EntityId>) -> Vec<EntityId> {
        let len = natural.len();
        let mut slots: Vec<Option<EntityId>> = vec![None; len];
        let mut missing = Vec::new();
        let mut displaced: Vec<(i64, EntityId)> = Vec::new();

        for entity_id in natural {
            match store.read(entity_id, &self.field).ok().and_then(|v| v.as_int()) {
                Some(index) if index >= 0 && (index as usize) < len && slots[index as usize].is_none() => {
                    slots[index as usize] = Some(entity_id);
                }
                Some(index) => displaced.push((index, entity_id)),
                None => missing.push(entity_id),
            }
        }

        // Stable: equal stale indices keep query order
        displaced.sort_by_key(|(index, _)| *index);

        let mut fill = missing
            .into_iter()
            .chain(displaced.into_iter().map(|(_, id)| id));
        slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| fill.next()))
            .collect()
    }

    fn ensure_initialized(&self) -> Result<()> {
        match self.live.state() {
            LiveState::Initialized => Ok(()),
            LiveState::Disposed => Err(Error::LiveQueryDisposed),
            LiveState::Uninitialized => Err(Error::InvalidChange(
                "positional query is not initialized".to_string(),
            )),
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.live.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds(index, len));
        }
        Ok(())
    }

    fn reorder(&mut self, store: &mut Store, edit: impl FnOnce(&mut Vec<EntityId>)) -> Result<()> {
        let writes = {
            let mut inner = self.live.inner.borrow_mut();
            edit(&mut inner.results);
            inner.stamps(store)
        };
        store.write_batch(writes)
    }

    /// Moves the entity at `from` to `to`, shifting the ones in between.
    pub fn move_item(&mut self, store: &mut Store, from: usize, to: usize) -> Result<()> {
        self.ensure_initialized()?;
        self.check_index(from)?;
        self.check_index(to)?;
        self.reorder(store, |results| {
            let entity_id = results.remove(from);
            results.insert(to, entity_id);
        })
    }

    pub fn swap_objects_at_indexes(&mut self, store: &mut Store, a: usize, b: usize) -> Result<()> {
        self.ensure_initialized()?;
        self.check_index(a)?;
        self.check_index(b)?;
        self.reorder(store, |results| results.swap(a, b))
    }

    pub fn swap_objects(&mut self, store: &mut Store, a: EntityId, b: EntityId) -> Result<()> {
        self.ensure_initialized()?;
        let results = self.live.results();
        let position = |id: EntityId| {
            results
                .iter()
                .position(|r| *r == id)
                .ok_or(Error::NotInResults(id))
        };
        let (a, b) = (position(a)?, position(b)?);
        self.reorder(store, |results| results.swap(a, b))
    }

    /// Re-stamps every result with its current position.
    pub fn normalize(&mut self, store: &mut Store) -> Result<()> {
        self.ensure_initialized()?;
        self.reorder(store, |_| {})
    }

    pub fn index_of(&self, entity_id: EntityId) -> Option<usize> {
        self.live.results().iter().position(|r| *r == entity_id)
    }

    pub fn index_value(&self, store: &Store, entity_id: EntityId) -> Result<Value> {
        store.read(entity_id, &self.field)
    }
}
