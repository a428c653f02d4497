use ahash::AHashMap;

use crate::{
    data::field_schema::{Cardinality, RelationSlot},
    EntityId, EntitySchema, Value,
};

/// One end of a relationship edge as seen from the owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Link {
    /// Target instance is materialized in the store
    Resolved(EntityId),
    /// Only the target's remote identifier is known
    Fault(Value),
}

impl Link {
    pub fn resolved(&self) -> Option<EntityId> {
        match self {
            Link::Resolved(id) => Some(*id),
            Link::Fault(_) => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Link::Fault(_))
    }

    /// Value used in change events and attribute-style reads.
    pub fn to_value(&self) -> Value {
        match self {
            Link::Resolved(id) => Value::EntityReference(Some(*id)),
            Link::Fault(id) => id.clone(),
        }
    }
}

/// Relationship proxy state installed on an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    One(Option<Link>),
    Many(Vec<Link>),
}

impl Relation {
    pub fn empty(slot: &RelationSlot) -> Self {
        match slot.cardinality {
            Cardinality::One => Relation::One(None),
            Cardinality::Many => Relation::Many(Vec::new()),
        }
    }

    pub fn links(&self) -> &[Link] {
        match self {
            Relation::One(Some(link)) => std::slice::from_ref(link),
            Relation::One(None) => &[],
            Relation::Many(links) => links,
        }
    }

    pub fn is_fault(&self) -> bool {
        self.links().iter().any(Link::is_fault)
    }

    pub fn resolved(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.links().iter().filter_map(Link::resolved)
    }

    pub fn contains(&self, target: EntityId) -> bool {
        self.links().iter().any(|link| link.resolved() == Some(target))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Relation::One(Some(link)) => link.to_value(),
            Relation::One(None) => Value::EntityReference(None),
            Relation::Many(links) => Value::List(links.iter().map(Link::to_value).collect()),
        }
    }
}

/// Live record storage. Attribute values are laid out by the schema's slot table.
#[derive(Debug, Clone)]
pub struct Entity {
    pub entity_id: EntityId,
    pub values: Vec<Value>,
    /// Attributes written without a declaration, such as positional indexes
    pub dynamic: AHashMap<String, Value>,
    pub relations: Vec<Relation>,
    pub removed: bool,
}

impl Entity {
    pub fn new(entity_id: EntityId, schema: &EntitySchema) -> Self {
        Entity {
            entity_id,
            values: schema
                .attributes
                .iter()
                .map(|a| a.default_value.clone())
                .collect(),
            dynamic: AHashMap::new(),
            relations: schema.relations.iter().map(Relation::empty).collect(),
            removed: false,
        }
    }

    pub fn remote_id(&self, schema: &EntitySchema) -> Option<&Value> {
        schema
            .id_slot()
            .and_then(|slot| self.values.get(slot))
            .filter(|v| !v.is_null())
    }
}
