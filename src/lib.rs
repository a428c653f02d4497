pub mod data;
pub mod expr;
pub mod live;

#[cfg(test)]
mod test;

pub use data::{
    now, paginate, AttributeDef, CacheKey, Cardinality, ChangeEvent, ChangeKind, Channel,
    Completion, DirtyTracker, Entity, EntityId, EntitySchema, EntityType, Error, ErrorKind, Hook,
    IdentityCache, InstallState, Link, MapOptions, NotifyToken, PageOpts, PageResult, Record,
    Relation, RelationshipDef, RelationshipKind, Resolver, Result, SchemaDef, SpliceChange, Store,
    StoreConfig, Timestamp, Value, LOCAL_ID_KEY,
};
pub use expr::{Condition, OperatorRegistry, OrderBy, Predicate, Query, SortKey};
pub use live::{LiveQuery, LiveState, PositionalQuery, SubscriptionId};

/// Create a Value::Bool
#[macro_export]
macro_rules! sbool {
    ($value:expr) => {
        $crate::Value::Bool($value)
    };
}

/// Create a Value::Int
#[macro_export]
macro_rules! sint {
    ($value:expr) => {
        $crate::Value::Int($value)
    };
}

/// Create a Value::Float
#[macro_export]
macro_rules! sfloat {
    ($value:expr) => {
        $crate::Value::Float($value)
    };
}

/// Create a Value::String
#[macro_export]
macro_rules! sstr {
    ($value:expr) => {
        $crate::Value::from($value.to_string())
    };
}

/// Create a Value::EntityReference
///
/// # Example
///
/// ```ignore
/// let owner = sref!(entity_id);
/// let nobody = sref!();
/// ```
#[macro_export]
macro_rules! sref {
    () => {
        $crate::Value::EntityReference(None)
    };
    ($value:expr) => {
        $crate::Value::EntityReference(Some($value))
    };
}

/// Create a Value::EntityList
#[macro_export]
macro_rules! sreflist {
    [] => {
        $crate::Value::EntityList(Vec::new())
    };
    [$($value:expr),+ $(,)?] => {
        $crate::Value::EntityList(vec![$($value),+])
    };
}

/// Build a [`Record`] for `instantiate` and `map` with minimal syntax
///
/// # Example
///
/// ```ignore
/// let record = record! { "id" => 7, "name" => "Rex", "owner" => "alice" };
/// store.instantiate(dog, record)?;
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        {
            let mut record = $crate::Record::new();
            $(
                record.insert($key.to_string(), $crate::Value::from($value));
            )+
            record
        }
    };
}
