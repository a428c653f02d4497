use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EntityId, EntityType, Store, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Set,
    Splice,
    Remove,
}

/// Structural edit of a list attribute or to-many relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpliceChange {
    pub index: usize,
    pub removed: Vec<Value>,
    pub added: Vec<Value>,
}

/// Immutable record of one mutation. Consumed by current subscribers and not retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// None for whole-entity create/remove
    pub field: Option<String>,
    pub kind: ChangeKind,
    pub old_value: Value,
    pub new_value: Value,
    pub splice: Option<SpliceChange>,
}

impl ChangeEvent {
    pub fn create(entity_id: EntityId) -> Self {
        ChangeEvent {
            entity_type: entity_id.extract_type(),
            entity_id,
            field: None,
            kind: ChangeKind::Create,
            old_value: Value::Null,
            new_value: Value::Null,
            splice: None,
        }
    }

    pub fn remove(entity_id: EntityId) -> Self {
        ChangeEvent {
            kind: ChangeKind::Remove,
            ..ChangeEvent::create(entity_id)
        }
    }

    pub fn set(entity_id: EntityId, field: &str, old_value: Value, new_value: Value) -> Self {
        ChangeEvent {
            entity_type: entity_id.extract_type(),
            entity_id,
            field: Some(field.to_string()),
            kind: ChangeKind::Set,
            old_value,
            new_value,
            splice: None,
        }
    }

    pub fn splice(
        entity_id: EntityId,
        field: &str,
        index: usize,
        removed: Vec<Value>,
        added: Vec<Value>,
    ) -> Self {
        ChangeEvent {
            entity_type: entity_id.extract_type(),
            entity_id,
            field: Some(field.to_string()),
            kind: ChangeKind::Splice,
            old_value: Value::Null,
            new_value: Value::Null,
            splice: Some(SpliceChange {
                index,
                removed,
                added,
            }),
        }
    }

    pub fn touches(&self, field: &str) -> bool {
        self.field.as_deref() == Some(field)
    }
}

/// Where a subscriber listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Every event of entities of exactly this schema
    Schema(EntityType),
    /// Every event of one entity
    Entity(EntityId),
    /// Every event in the store, for persistence collaborators
    Global,
}

/// A unique token for a subscription, used to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotifyToken(Uuid);

impl NotifyToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotifyToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotifyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber callback. It sees the store after the producing operation completed but
/// cannot mutate it; follow-up mutations go through [`Store::defer`].
pub type NotifyCallback = Box<dyn FnMut(&ChangeEvent, &Store)>;

struct Subscriber {
    token: NotifyToken,
    callback: NotifyCallback,
}

/// Publish/subscribe fan-out keyed by [`Channel`].
#[derive(Default)]
pub struct NotificationBus {
    channels: FxHashMap<Channel, Vec<Subscriber>>,
    tokens: FxHashMap<NotifyToken, Channel>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, channel: Channel, callback: NotifyCallback) -> NotifyToken {
        let token = NotifyToken::new();
        self.channels.entry(channel).or_default().push(Subscriber {
            token: token.clone(),
            callback,
        });
        self.tokens.insert(token.clone(), channel);
        token
    }

    pub fn unsubscribe(&mut self, token: &NotifyToken) -> bool {
        let Some(channel) = self.tokens.remove(token) else {
            return false;
        };

        if let Some(subscribers) = self.channels.get_mut(&channel) {
            subscribers.retain(|s| &s.token != token);
            if subscribers.is_empty() {
                self.channels.remove(&channel);
            }
        }
        true
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.channels.get(channel).map(Vec::len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Delivers one event to the entity channel, then the schema channel, then the
    /// global channel, each in registration order.
    pub fn dispatch(&mut self, event: &ChangeEvent, store: &Store) {
        for channel in [
            Channel::Entity(event.entity_id),
            Channel::Schema(event.entity_type),
            Channel::Global,
        ] {
            if let Some(subscribers) = self.channels.get_mut(&channel) {
                for subscriber in subscribers.iter_mut() {
                    (subscriber.callback)(event, store);
                }
            }
        }
    }
}
