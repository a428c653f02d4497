//! Reactive queries.
//!
//! A [`LiveQuery`] subscribes to the schema channels of its query's schema family and
//! keeps a materialized result list current as change events arrive. Listeners
//! registered with [`LiveQuery::on_change`] receive the full result list after every
//! relevant event.

mod positional;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use itertools::Itertools;

use crate::{
    data::{ChangeEvent, ChangeKind, Channel, NotifyToken},
    expr::Query,
    EntityId, EntityType, Error, Result, Store, Value,
};

pub use positional::PositionalQuery;

/// Identifies a listener registered on a live query.
pub type SubscriptionId = u64;

pub type ChangeCallback = Box<dyn FnMut(&[EntityId])>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Uninitialized,
    Initialized,
    Disposed,
}

pub(crate) struct Inner {
    pub(crate) query: Query,
    pub(crate) results: Vec<EntityId>,
    state: LiveState,
    listeners: Vec<(SubscriptionId, ChangeCallback)>,
    next_id: SubscriptionId,
    family: Vec<EntityType>,
    dependencies: Vec<EntityType>,
    /// Set for positional queries: ordering follows this attribute
    pub(crate) position_field: Option<String>,
}

impl Inner {
    pub(crate) fn sort_by_position(&mut self, store: &Store) {
        let Some(field) = &self.position_field else {
            return;
        };
        let keyed: Vec<(EntityId, i64)> = self
            .results
            .iter()
            .map(|id| {
                let index = store
                    .read(*id, field)
                    .ok()
                    .and_then(|v| v.as_int())
                    .unwrap_or(i64::MAX);
                (*id, index)
            })
            .collect();
        self.results = keyed
            .into_iter()
            .sorted_by_key(|(_, index)| *index)
            .map(|(id, _)| id)
            .collect();
    }

    /// Index writes needed for every result to carry its position.
    pub(crate) fn stamps(&self, store: &Store) -> Vec<(EntityId, String, Value)> {
        let Some(field) = &self.position_field else {
            return Vec::new();
        };
        self.results
            .iter()
            .enumerate()
            .filter(|(_, id)| store.exists(**id))
            .filter(|(position, id)| {
                store.read(**id, field).ok() != Some(Value::from(*position))
            })
            .map(|(position, id)| (*id, field.clone(), Value::from(position)))
            .collect()
    }

    /// Applies one event. Returns true when listeners should hear about it.
    fn apply(&mut self, event: &ChangeEvent, store: &Store) -> bool {
        let entity_id = event.entity_id;
        let in_family = self.family.contains(&event.entity_type);

        if self.dependencies.contains(&event.entity_type) {
            match self.query.execute(store) {
                Ok(results) => {
                    let previous = std::mem::replace(&mut self.results, results);
                    if self.position_field.is_some() {
                        // Keep manual order for entities that stay
                        let added: Vec<EntityId> = self
                            .results
                            .iter()
                            .copied()
                            .filter(|id| !previous.contains(id))
                            .collect();
                        self.results = previous
                            .into_iter()
                            .filter(|id| self.results.contains(id))
                            .chain(added)
                            .collect();
                    }
                }
                Err(err) => log::warn!("Live query recompute failed: {}", err),
            }
            return true;
        }
        if !in_family {
            return false;
        }

        let member = self.results.contains(&entity_id);

        if let Some(field) = &self.position_field {
            if event.touches(field) {
                if member {
                    self.sort_by_position(store);
                }
                return member;
            }
        }

        if event.kind == ChangeKind::Remove {
            self.results.retain(|id| *id != entity_id);
            return member;
        }

        let matches = store.exists(entity_id) && self.query.matches_validated(store, entity_id);
        match (matches, member) {
            (true, false) => {
                self.results.push(entity_id);
                self.query.sort(store, &mut self.results);
                true
            }
            (false, true) => {
                self.results.retain(|id| *id != entity_id);
                true
            }
            (true, true) => {
                let reorder = event.kind == ChangeKind::Create
                    || event
                        .field
                        .as_deref()
                        .map(|f| self.query.order.touches(f))
                        .unwrap_or(false);
                if reorder {
                    self.query.sort(store, &mut self.results);
                }
                true
            }
            (false, false) => false,
        }
    }
}

fn emit(inner: &Rc<RefCell<Inner>>) {
    let (results, mut listeners) = {
        let mut this = inner.borrow_mut();
        (this.results.clone(), std::mem::take(&mut this.listeners))
    };

    for (_, listener) in listeners.iter_mut() {
        listener(&results);
    }

    let mut this = inner.borrow_mut();
    listeners.append(&mut this.listeners);
    this.listeners = listeners;
}

fn handle(inner: &Rc<RefCell<Inner>>, event: &ChangeEvent, store: &Store) {
    let (relevant, positional) = {
        let mut this = inner.borrow_mut();
        if this.state != LiveState::Initialized {
            return;
        }
        let before = this.results.clone();
        let relevant = this.apply(event, store);
        let positional = this.position_field.is_some() && this.results != before;
        (relevant, positional)
    };

    if positional {
        // Membership changed: positions are re-stamped once this event has been delivered
        let weak = Rc::downgrade(inner);
        store.defer(move |store| match weak.upgrade() {
            Some(inner) => {
                let writes = inner.borrow().stamps(store);
                store.write_batch(writes)
            }
            None => Ok(()),
        });
    }

    if relevant {
        emit(inner);
    }
}

/// A query whose result list follows the store.
pub struct LiveQuery {
    pub(crate) inner: Rc<RefCell<Inner>>,
    tokens: Vec<NotifyToken>,
}

impl LiveQuery {
    pub fn new(query: Query) -> Self {
        LiveQuery {
            inner: Rc::new(RefCell::new(Inner {
                query,
                results: Vec::new(),
                state: LiveState::Uninitialized,
                listeners: Vec::new(),
                next_id: 0,
                family: Vec::new(),
                dependencies: Vec::new(),
                position_field: None,
            })),
            tokens: Vec::new(),
        }
    }

    pub fn state(&self) -> LiveState {
        self.inner.borrow().state
    }

    pub fn query(&self) -> Query {
        self.inner.borrow().query.clone()
    }

    pub fn results(&self) -> Vec<EntityId> {
        self.inner.borrow().results.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().results.is_empty()
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.inner.borrow().results.contains(&entity_id)
    }

    /// Evaluates the query, subscribes to change notifications and emits the first
    /// result list. Calling it again while initialized returns the current results.
    pub fn init(&mut self, store: &mut Store) -> Result<Vec<EntityId>> {
        match self.state() {
            LiveState::Disposed => return Err(Error::LiveQueryDisposed),
            LiveState::Initialized => return Ok(self.results()),
            LiveState::Uninitialized => {}
        }

        let results = self.inner.borrow().query.execute(store)?;
        self.start(store, results)
    }

    pub(crate) fn start(&mut self, store: &mut Store, results: Vec<EntityId>) -> Result<Vec<EntityId>> {
        let (family, dependencies) = {
            let this = self.inner.borrow();
            (
                store.descendants(this.query.entity_type),
                this.query.dependencies(store),
            )
        };

        {
            let mut this = self.inner.borrow_mut();
            this.results = results;
            this.family = family.clone();
            this.dependencies = dependencies.clone();
            this.state = LiveState::Initialized;
        }

        for entity_type in family.into_iter().chain(dependencies).unique() {
            let weak: Weak<RefCell<Inner>> = Rc::downgrade(&self.inner);
            let token = store.subscribe(Channel::Schema(entity_type), move |event, store| {
                if let Some(inner) = weak.upgrade() {
                    handle(&inner, event, store);
                }
            });
            self.tokens.push(token);
        }

        log::debug!(
            "Live query on {} initialized with {} results",
            self.inner.borrow().query.entity_type,
            self.len()
        );
        emit(&self.inner);
        Ok(self.results())
    }

    pub fn on_change(&mut self, callback: impl FnMut(&[EntityId]) + 'static) -> SubscriptionId {
        let mut this = self.inner.borrow_mut();
        let id = this.next_id;
        this.next_id += 1;
        this.listeners.push((id, Box::new(callback)));
        id
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let mut this = self.inner.borrow_mut();
        let before = this.listeners.len();
        this.listeners.retain(|(listener, _)| *listener != id);
        this.listeners.len() != before
    }

    /// Unsubscribes from the store. Later events are ignored and `init` fails.
    pub fn dispose(&mut self, store: &mut Store) {
        for token in self.tokens.drain(..) {
            store.unsubscribe(&token);
        }
        let mut this = self.inner.borrow_mut();
        this.state = LiveState::Disposed;
        this.listeners.clear();
        log::debug!("Live query on {} disposed", this.query.entity_type);
    }
}
