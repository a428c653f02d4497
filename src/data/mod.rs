mod cache;
mod collaborator;
pub mod config;
mod entity;
mod entity_id;
mod entity_schema;
mod error;
mod field_schema;
pub mod interner;
mod namespace;
mod notifications;
mod pagination;
mod registry;
mod relationship;
mod store;
mod value;

pub use cache::{CacheKey, IdentityCache};
pub use collaborator::{Completion, DirtyTracker, MapOptions, Record, Resolver};
pub use config::StoreConfig;
pub use entity::{Entity, Link, Relation};
pub use entity_id::{EntityId, EntityType};
pub use entity_schema::{Computed, EntitySchema, Hook, InstallState, Method, SchemaDef};
pub use error::{Error, ErrorKind, Result};
pub use field_schema::{
    AttributeDef, AttributeSlot, Cardinality, RelationSlot, RelationshipDef, RelationshipKind,
};
pub use interner::Interner;
pub use notifications::{
    ChangeEvent, ChangeKind, Channel, NotificationBus, NotifyCallback, NotifyToken, SpliceChange,
};
pub use pagination::{paginate, PageOpts, PageResult};
pub use registry::ChangeRegistry;
pub use store::{Store, LOCAL_ID_KEY};
pub use value::{ArcString, Value};

pub type Timestamp = time::OffsetDateTime;

pub fn now() -> Timestamp {
    time::OffsetDateTime::now_utc()
}

pub fn epoch() -> Timestamp {
    time::OffsetDateTime::UNIX_EPOCH
}

pub fn millis_to_timestamp(millis: u64) -> Timestamp {
    epoch() + time::Duration::milliseconds(millis as i64)
}
