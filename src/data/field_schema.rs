use serde::{Deserialize, Serialize};

use crate::{EntityType, Value};

/// One declared attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub default_value: Option<Value>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeDef {
            name: name.into(),
            default_value: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default_value: impl Into<Value>) -> Self {
        AttributeDef {
            name: name.into(),
            default_value: Some(default_value.into()),
        }
    }
}

/// Cardinality of a relationship, written forward side first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// How many targets one side of a relationship holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

impl RelationshipKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "one_to_one" | "1:1" => Some(RelationshipKind::OneToOne),
            "one_to_many" | "1:n" => Some(RelationshipKind::OneToMany),
            "many_to_many" | "n:n" => Some(RelationshipKind::ManyToMany),
            _ => None,
        }
    }

    pub fn forward(&self) -> Cardinality {
        match self {
            RelationshipKind::OneToOne | RelationshipKind::OneToMany => Cardinality::One,
            RelationshipKind::ManyToMany => Cardinality::Many,
        }
    }

    pub fn reverse(&self) -> Cardinality {
        match self {
            RelationshipKind::OneToOne => Cardinality::One,
            RelationshipKind::OneToMany | RelationshipKind::ManyToMany => Cardinality::Many,
        }
    }
}

/// A relationship as declared by the schema author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    /// Target schema, optionally written as `namespace.schema`
    pub target: String,
    /// One of `one_to_one`, `one_to_many`, `many_to_many` (or `1:1`, `1:n`, `n:n`)
    pub kind: Option<String>,
    /// Name on the target side; generated from the reverse prefix when absent
    pub reverse: Option<String>,
}

impl RelationshipDef {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        RelationshipDef {
            name: name.into(),
            target: target.into(),
            kind: None,
            reverse: None,
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn reverse(mut self, reverse: impl Into<String>) -> Self {
        self.reverse = Some(reverse.into());
        self
    }
}

/// Compiled attribute storage slot.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSlot {
    pub name: String,
    pub default_value: Value,
}

/// Compiled relationship slot, one per side.
///
/// `mirror` names the slot on the target that holds the other end of every edge.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSlot {
    pub name: String,
    pub owner: EntityType,
    pub target: EntityType,
    pub kind: RelationshipKind,
    pub cardinality: Cardinality,
    pub mirror: String,
    pub is_reverse: bool,
}
