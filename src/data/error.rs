use std::fmt;

use crate::{EntityId, Value};

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller declared something the store cannot install or create
    Configuration,
    /// A predicate could not be evaluated
    Query,
    /// The store detected that its own indexes disagree
    Consistency,
    /// A relationship or positional operation was used incorrectly
    Relationship,
    /// A value had the wrong shape for the operation
    Value,
    /// An external resolver or hook failed
    Collaborator,
}

impl ErrorKind {
    /// Fatal kinds signal a programming error or an internal bug and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::Configuration | ErrorKind::Consistency | ErrorKind::Relationship
        )
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    /// Relationship target could not be resolved: (schema, relationship, target)
    UnknownTargetSchema(String, String, String),
    /// Parent schema could not be resolved: (schema, parent)
    UnknownParentSchema(String, String),
    /// Declared cardinality is not recognised: (schema, relationship, kind)
    UnknownRelationshipKind(String, String, String),
    DuplicateSchema(String),
    /// Installation phase attempted twice: (schema, phase)
    DuplicateInstallation(String, &'static str),
    /// Schema has not reached the Installed state
    NotInstalled(String),
    UnknownSchema(String),
    /// (schema, attribute)
    UnknownAttribute(String, String),
    /// Relationship proxy is not installed on the entity: (entity, relationship)
    RelationshipNotInstalled(EntityId, String),
    /// set() on a to-many side or splice() on a to-one side: (entity, relationship)
    RelationshipCardinality(EntityId, String),
    /// (index, length)
    IndexOutOfBounds(usize, usize),
    NotInResults(EntityId),
    EntityNotFound(EntityId),
    EntityRemoved(EntityId),
    NotRemoved(EntityId),
    InvalidChange(String),
    UnknownOperator(String),
    InvalidPredicate(String),
    /// (entity, attribute)
    NotAList(EntityId, String),
    /// (got, expected)
    BadValueCast(Value, Value),
    /// Two live entities share an identifier: (schema, identifier)
    DuplicateIdentifier(String, Value),
    DuplicateSingleton(String),
    /// Singleton access on a schema not declared as one
    NotSingleton(String),
    LiveQueryDisposed,
    Collaborator(String),
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownTargetSchema(..)
            | Error::UnknownParentSchema(..)
            | Error::UnknownRelationshipKind(..)
            | Error::DuplicateSchema(_)
            | Error::DuplicateInstallation(..)
            | Error::NotSingleton(_)
            | Error::NotInstalled(_)
            | Error::UnknownSchema(_)
            | Error::Config(_) => ErrorKind::Configuration,
            Error::UnknownOperator(_) | Error::InvalidPredicate(_) => ErrorKind::Query,
            Error::DuplicateIdentifier(..) | Error::DuplicateSingleton(_) => ErrorKind::Consistency,
            Error::RelationshipNotInstalled(..)
            | Error::RelationshipCardinality(..)
            | Error::IndexOutOfBounds(..)
            | Error::NotInResults(_)
            | Error::LiveQueryDisposed => ErrorKind::Relationship,
            Error::UnknownAttribute(..)
            | Error::EntityNotFound(_)
            | Error::EntityRemoved(_)
            | Error::NotRemoved(_)
            | Error::InvalidChange(_)
            | Error::NotAList(..)
            | Error::BadValueCast(..) => ErrorKind::Value,
            Error::Collaborator(_) => ErrorKind::Collaborator,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownTargetSchema(schema, rel, target) => write!(
                f,
                "Unknown target schema '{}' for relationship {}.{}",
                target, schema, rel
            ),
            Error::UnknownParentSchema(schema, parent) => {
                write!(f, "Unknown parent schema '{}' for {}", parent, schema)
            }
            Error::UnknownRelationshipKind(schema, rel, kind) => write!(
                f,
                "Unknown relationship kind '{}' for relationship {}.{}",
                kind, schema, rel
            ),
            Error::DuplicateSchema(name) => write!(f, "Schema already declared: {}", name),
            Error::DuplicateInstallation(name, phase) => {
                write!(f, "Schema {} already completed the {} phase", name, phase)
            }
            Error::NotInstalled(name) => write!(f, "Schema {} is not installed", name),
            Error::UnknownSchema(name) => write!(f, "Unknown schema: {}", name),
            Error::UnknownAttribute(schema, attr) => {
                write!(f, "Unknown attribute {} on {}", attr, schema)
            }
            Error::RelationshipNotInstalled(id, rel) => {
                write!(f, "Relationship {} is not installed on {}", rel, id)
            }
            Error::RelationshipCardinality(id, rel) => {
                write!(f, "Operation does not match the cardinality of {}.{}", id, rel)
            }
            Error::IndexOutOfBounds(index, len) => {
                write!(f, "Index out of bounds: {} (length {})", index, len)
            }
            Error::NotInResults(id) => write!(f, "Entity {} is not part of the results", id),
            Error::EntityNotFound(id) => write!(f, "Entity not found: {}", id),
            Error::EntityRemoved(id) => write!(f, "Entity has been removed: {}", id),
            Error::NotRemoved(id) => write!(f, "Entity is not removed: {}", id),
            Error::InvalidChange(msg) => write!(f, "Invalid change: {}", msg),
            Error::UnknownOperator(op) => write!(f, "Unknown operator: {}", op),
            Error::InvalidPredicate(msg) => write!(f, "Invalid predicate: {}", msg),
            Error::NotAList(id, attr) => write!(f, "Attribute {} on {} is not a list", attr, id),
            Error::BadValueCast(got, expected) => {
                write!(f, "Bad value cast: got {:?}, expected {:?}", got, expected)
            }
            Error::DuplicateIdentifier(schema, id) => {
                write!(f, "More than one {} shares identifier {:?}", schema, id)
            }
            Error::DuplicateSingleton(schema) => {
                write!(f, "More than one instance of singleton {}", schema)
            }
            Error::NotSingleton(schema) => write!(f, "Schema {} is not a singleton", schema),
            Error::LiveQueryDisposed => write!(f, "Live query has been disposed"),
            Error::Collaborator(msg) => write!(f, "Collaborator error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Collaborator(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
