use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use futures_util::future::LocalBoxFuture;

use crate::{
    data::field_schema::{AttributeDef, AttributeSlot, RelationSlot, RelationshipDef},
    EntityId, EntityType, Error, Result, Store, Value,
};

/// Schema method: `(store, entity, args) -> value`.
pub type Method = Rc<dyn Fn(&Store, EntityId, &[Value]) -> Result<Value>>;

/// Computed property, readable like an attribute.
pub type Computed = Rc<dyn Fn(&Store, EntityId) -> Value>;

/// Teardown or initialization hook run on remove/restore.
///
/// `Async` hooks take a completion path: their future is handed back to the caller
/// through [`crate::Completion`].
#[derive(Clone)]
pub enum Hook {
    Sync(Rc<dyn Fn(&Store, EntityId)>),
    Async(Rc<dyn Fn(EntityId) -> LocalBoxFuture<'static, Result<()>>>),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Sync(_) => write!(f, "Hook::Sync"),
            Hook::Async(_) => write!(f, "Hook::Async"),
        }
    }
}

/// Declarative description of one entity kind, as handed over by a schema parser.
#[derive(Clone, Default)]
pub struct SchemaDef {
    pub name: String,
    pub id_field: Option<String>,
    pub attributes: Vec<AttributeDef>,
    pub relationships: Vec<RelationshipDef>,
    pub parent: Option<String>,
    pub singleton: bool,
    pub methods: AHashMap<String, Method>,
    pub computed: AHashMap<String, Computed>,
    pub on_remove: Option<Hook>,
    pub on_restore: Option<Hook>,
}

impl SchemaDef {
    pub fn new(name: impl Into<String>) -> Self {
        SchemaDef {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeDef::new(name));
        self
    }

    pub fn attribute_with_default(
        mut self,
        name: impl Into<String>,
        default_value: impl Into<Value>,
    ) -> Self {
        self.attributes
            .push(AttributeDef::with_default(name, default_value));
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&Store, EntityId, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }

    pub fn computed(
        mut self,
        name: impl Into<String>,
        computed: impl Fn(&Store, EntityId) -> Value + 'static,
    ) -> Self {
        self.computed.insert(name.into(), Rc::new(computed));
        self
    }

    pub fn on_remove(mut self, hook: Hook) -> Self {
        self.on_remove = Some(hook);
        self
    }

    pub fn on_restore(mut self, hook: Hook) -> Self {
        self.on_restore = Some(hook);
        self
    }
}

/// Installation progress of one schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallState {
    Uninstalled,
    ForwardInstalled,
    ReverseInstalled,
    Installed,
}

impl InstallState {
    fn phase(&self) -> &'static str {
        match self {
            InstallState::Uninstalled => "uninstalled",
            InstallState::ForwardInstalled => "forward relationship",
            InstallState::ReverseInstalled => "reverse relationship",
            InstallState::Installed => "installation",
        }
    }
}

/// Installed schema. Immutable once it reaches [`InstallState::Installed`].
pub struct EntitySchema {
    pub entity_type: EntityType,
    pub name: String,
    pub namespace: String,
    pub id_field: String,
    pub parent: Option<EntityType>,
    pub children: Vec<EntityType>,
    pub singleton: bool,

    pub(crate) declared_attributes: Vec<AttributeDef>,
    pub(crate) declared_relationships: Vec<RelationshipDef>,
    /// Forward slots created from this schema's own declarations
    pub(crate) forward: Vec<RelationSlot>,
    /// Reverse slots copied onto this schema from peers' declarations
    pub(crate) reverse: Vec<RelationSlot>,

    pub attributes: Vec<AttributeSlot>,
    pub relations: Vec<RelationSlot>,
    attribute_index: AHashMap<String, usize>,
    relation_index: AHashMap<String, usize>,

    pub(crate) methods: AHashMap<String, Method>,
    pub(crate) computed: AHashMap<String, Computed>,
    pub(crate) on_remove: Option<Hook>,
    pub(crate) on_restore: Option<Hook>,

    state: InstallState,
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("entity_type", &self.entity_type)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("id_field", &self.id_field)
            .field("parent", &self.parent)
            .field("singleton", &self.singleton)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("state", &self.state)
            .finish()
    }
}

impl EntitySchema {
    pub(crate) fn new(entity_type: EntityType, namespace: &str, def: SchemaDef, id_field: String) -> Self {
        EntitySchema {
            entity_type,
            name: def.name,
            namespace: namespace.to_string(),
            id_field,
            parent: None,
            children: Vec::new(),
            singleton: def.singleton,
            declared_attributes: def.attributes,
            declared_relationships: def.relationships,
            forward: Vec::new(),
            reverse: Vec::new(),
            attributes: Vec::new(),
            relations: Vec::new(),
            attribute_index: AHashMap::new(),
            relation_index: AHashMap::new(),
            methods: def.methods,
            computed: def.computed,
            on_remove: def.on_remove,
            on_restore: def.on_restore,
            state: InstallState::Uninstalled,
        }
    }

    pub fn qualified_name(&self) -> String {
        crate::data::interner::qualify(&self.namespace, &self.name)
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    pub fn is_installed(&self) -> bool {
        self.state == InstallState::Installed
    }

    /// Moves `from -> to`. A schema already past `from` has run this phase before.
    pub(crate) fn advance(&mut self, from: InstallState, to: InstallState) -> Result<()> {
        if self.state > from {
            return Err(Error::DuplicateInstallation(self.qualified_name(), to.phase()));
        }
        if self.state < from {
            return Err(Error::NotInstalled(self.qualified_name()));
        }
        self.state = to;
        Ok(())
    }

    /// Builds the slot tables from the parent's compiled tables and this schema's own
    /// declarations. Parents must be compiled first.
    pub(crate) fn compile(&mut self, parent: Option<&EntitySchema>) {
        let mut attributes: Vec<AttributeSlot> = Vec::new();
        let mut relations: Vec<RelationSlot> = Vec::new();

        if let Some(parent) = parent {
            attributes.extend(parent.attributes.iter().cloned());
            relations.extend(parent.relations.iter().map(|slot| RelationSlot {
                owner: self.entity_type,
                ..slot.clone()
            }));

            for (name, method) in &parent.methods {
                self.methods.entry(name.clone()).or_insert_with(|| method.clone());
            }
            for (name, computed) in &parent.computed {
                self.computed.entry(name.clone()).or_insert_with(|| computed.clone());
            }
            if self.on_remove.is_none() {
                self.on_remove = parent.on_remove.clone();
            }
            if self.on_restore.is_none() {
                self.on_restore = parent.on_restore.clone();
            }
        }

        for attribute in &self.declared_attributes {
            let slot = AttributeSlot {
                name: attribute.name.clone(),
                default_value: attribute.default_value.clone().unwrap_or_default(),
            };
            match attributes.iter_mut().find(|a| a.name == attribute.name) {
                Some(existing) => *existing = slot,
                None => attributes.push(slot),
            }
        }

        if !attributes.iter().any(|a| a.name == self.id_field) {
            attributes.push(AttributeSlot {
                name: self.id_field.clone(),
                default_value: Value::Null,
            });
        }

        for slot in self.forward.iter().chain(self.reverse.iter()) {
            match relations.iter_mut().find(|r| r.name == slot.name) {
                Some(existing) => *existing = slot.clone(),
                None => relations.push(slot.clone()),
            }
        }

        self.attribute_index = attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
        self.relation_index = relations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        self.attributes = attributes;
        self.relations = relations;
    }

    pub fn attribute_slot(&self, name: &str) -> Option<usize> {
        self.attribute_index.get(name).copied()
    }

    pub fn relation_slot(&self, name: &str) -> Option<usize> {
        self.relation_index.get(name).copied()
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSlot> {
        self.relation_slot(name).map(|slot| &self.relations[slot])
    }

    pub fn id_slot(&self) -> Option<usize> {
        self.attribute_slot(&self.id_field)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn has_computed(&self, name: &str) -> bool {
        self.computed.contains_key(name)
    }
}
