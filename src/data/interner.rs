use ahash::AHashMap;

use crate::EntityType;

/// Assigns each namespace-qualified schema name a stable [`EntityType`].
#[derive(Debug, Clone, Default)]
pub struct Interner {
    map: AHashMap<String, EntityType>,
    names: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, qualified: &str) -> Option<EntityType> {
        self.map.get(qualified).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = EntityType> + '_ {
        (0..self.names.len()).map(|i| EntityType(i as u32))
    }

    pub fn intern(&mut self, qualified: &str) -> EntityType {
        if let Some(&entity_type) = self.map.get(qualified) {
            return entity_type;
        }

        let entity_type = EntityType(self.names.len() as u32);
        self.map.insert(qualified.to_owned(), entity_type);
        self.names.push(qualified.to_owned());
        entity_type
    }

    pub fn resolve(&self, entity_type: EntityType) -> Option<&str> {
        self.names.get(entity_type.0 as usize).map(String::as_str)
    }
}

/// Joins a namespace and schema name the way qualified targets are written.
pub fn qualify(namespace: &str, name: &str) -> String {
    format!("{}.{}", namespace, name)
}

/// Splits `namespace.schema`, falling back to `default_namespace` for bare names.
pub fn split_qualified<'a>(name: &'a str, default_namespace: &'a str) -> (&'a str, &'a str) {
    match name.rsplit_once('.') {
        Some((namespace, schema)) if !namespace.is_empty() => (namespace, schema),
        _ => (default_namespace, name),
    }
}
