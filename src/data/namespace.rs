use ahash::{AHashMap, AHashSet};

use crate::{
    data::{
        entity::Relation,
        entity_schema::{InstallState, SchemaDef},
        field_schema::{RelationSlot, RelationshipKind},
        interner::{qualify, split_qualified},
    },
    EntitySchema, EntityType, Error, Result, Store, Value,
};

impl Store {
    fn schema_mut(&mut self, entity_type: EntityType) -> Result<&mut EntitySchema> {
        self.schemas
            .get_mut(&entity_type)
            .ok_or_else(|| Error::UnknownSchema(entity_type.to_string()))
    }

    fn resolve_in(&self, name: &str, namespace: &str) -> Option<EntityType> {
        let (namespace, schema) = split_qualified(name, namespace);
        self.interner
            .get(&qualify(namespace, schema))
            .filter(|entity_type| self.schemas.contains_key(entity_type))
    }

    /// Installs every schema of a namespace.
    ///
    /// All forward relationship phases complete before any reverse phase starts, so
    /// schemas may reference each other in cycles. Nothing stays registered when
    /// installation fails.
    pub fn install_namespace(&mut self, namespace: &str, defs: Vec<SchemaDef>) -> Result<Vec<EntityType>> {
        let registered = self.register_schemas(namespace, defs)?;
        let types: Vec<EntityType> = registered.iter().map(|(t, _)| *t).collect();

        if let Err(err) = self.install_registered(namespace, &registered) {
            self.rollback(&types);
            return Err(err);
        }

        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .extend(types.iter().copied());
        log::debug!("Installed namespace {} with {} schemas", namespace, types.len());

        let singletons: Vec<EntityType> = types
            .iter()
            .copied()
            .filter(|t| self.schemas.get(t).map(|s| s.singleton).unwrap_or(false))
            .collect();
        let result = singletons
            .into_iter()
            .try_for_each(|t| self.ensure_singleton(t).map(|_| ()));
        self.published(result.map(|_| types))
    }

    fn register_schemas(
        &mut self,
        namespace: &str,
        defs: Vec<SchemaDef>,
    ) -> Result<Vec<(EntityType, Option<String>)>> {
        let mut seen = AHashSet::new();
        for def in &defs {
            let qualified = qualify(namespace, &def.name);
            let installed = self
                .interner
                .get(&qualified)
                .map(|t| self.schemas.contains_key(&t))
                .unwrap_or(false);
            if installed || !seen.insert(qualified.clone()) {
                return Err(Error::DuplicateSchema(qualified));
            }
        }

        let mut registered = Vec::with_capacity(defs.len());
        for mut def in defs {
            let entity_type = self.interner.intern(&qualify(namespace, &def.name));
            let id_field = def
                .id_field
                .take()
                .unwrap_or_else(|| self.config().id_field.clone());
            let parent = def.parent.take();
            self.schemas.insert(
                entity_type,
                EntitySchema::new(entity_type, namespace, def, id_field),
            );
            registered.push((entity_type, parent));
        }
        Ok(registered)
    }

    fn install_registered(
        &mut self,
        namespace: &str,
        registered: &[(EntityType, Option<String>)],
    ) -> Result<()> {
        for (entity_type, parent) in registered {
            let Some(parent) = parent else { continue };
            let parent_type = self.resolve_in(parent, namespace).ok_or_else(|| {
                Error::UnknownParentSchema(
                    self.schemas
                        .get(entity_type)
                        .map(|s| s.qualified_name())
                        .unwrap_or_default(),
                    parent.clone(),
                )
            })?;
            self.schema_mut(*entity_type)?.parent = Some(parent_type);
            self.schema_mut(parent_type)?.children.push(*entity_type);
        }

        let types: Vec<EntityType> = registered.iter().map(|(t, _)| *t).collect();
        for entity_type in &types {
            self.check_inheritance(*entity_type)?;
        }

        for entity_type in &types {
            self.install_forward(*entity_type)?;
        }

        let mut touched = AHashSet::new();
        for entity_type in &types {
            touched.extend(self.install_reverse(*entity_type)?);
        }

        // Parents before children
        let mut pending: Vec<EntityType> = types.clone();
        while !pending.is_empty() {
            let ready: Vec<EntityType> = pending
                .iter()
                .copied()
                .filter(|t| {
                    self.schemas
                        .get(t)
                        .and_then(|s| s.parent)
                        .map(|p| !pending.contains(&p))
                        .unwrap_or(true)
                })
                .collect();
            for entity_type in &ready {
                self.compile_schema(*entity_type)?;
            }
            pending.retain(|t| !ready.contains(t));
        }

        for entity_type in &types {
            self.schema_mut(*entity_type)?
                .advance(InstallState::ReverseInstalled, InstallState::Installed)?;
        }

        // Schemas from earlier namespaces that gained reverse relationships
        for entity_type in touched {
            if !types.contains(&entity_type) {
                self.recompile_family(entity_type)?;
            }
        }
        Ok(())
    }

    fn check_inheritance(&self, entity_type: EntityType) -> Result<()> {
        let mut current = self.schemas.get(&entity_type).and_then(|s| s.parent);
        let mut steps = 0;
        while let Some(t) = current {
            steps += 1;
            if t == entity_type || steps > self.schemas.len() {
                return Err(Error::Config(format!(
                    "cyclic inheritance through {}",
                    self.schema(entity_type)?.qualified_name()
                )));
            }
            current = self.schemas.get(&t).and_then(|s| s.parent);
        }
        Ok(())
    }

    /// Resolves the schema's declared relationships into forward slots.
    pub fn install_forward(&mut self, entity_type: EntityType) -> Result<()> {
        let schema = self.schema(entity_type)?;
        let qualified = schema.qualified_name();
        let namespace = schema.namespace.clone();
        let singleton = schema.singleton;

        let mut slots = Vec::with_capacity(schema.declared_relationships.len());
        for def in &schema.declared_relationships {
            let target = self.resolve_in(&def.target, &namespace).ok_or_else(|| {
                Error::UnknownTargetSchema(qualified.clone(), def.name.clone(), def.target.clone())
            })?;

            let kind = match &def.kind {
                Some(kind) => RelationshipKind::parse(kind).ok_or_else(|| {
                    Error::UnknownRelationshipKind(qualified.clone(), def.name.clone(), kind.clone())
                })?,
                None if singleton => RelationshipKind::OneToOne,
                None => RelationshipKind::OneToMany,
            };

            let mirror = def
                .reverse
                .clone()
                .unwrap_or_else(|| format!("{}{}", self.config().reverse_prefix, def.name));

            slots.push(RelationSlot {
                name: def.name.clone(),
                owner: entity_type,
                target,
                kind,
                cardinality: kind.forward(),
                mirror,
                is_reverse: false,
            });
        }

        let schema = self.schema_mut(entity_type)?;
        schema.advance(InstallState::Uninstalled, InstallState::ForwardInstalled)?;
        log::debug!("Installed {} forward relationships on {}", slots.len(), qualified);
        schema.forward = slots;
        Ok(())
    }

    /// Copies each forward slot onto its target as a reverse slot. Returns the targets.
    pub fn install_reverse(&mut self, entity_type: EntityType) -> Result<Vec<EntityType>> {
        let schema = self.schema_mut(entity_type)?;
        schema.advance(InstallState::ForwardInstalled, InstallState::ReverseInstalled)?;
        let qualified = schema.qualified_name();
        let forward = schema.forward.clone();

        let mut targets = Vec::with_capacity(forward.len());
        for slot in forward {
            let reverse = RelationSlot {
                name: slot.mirror.clone(),
                owner: slot.target,
                target: entity_type,
                kind: slot.kind,
                cardinality: slot.kind.reverse(),
                mirror: slot.name.clone(),
                is_reverse: true,
            };
            self.check_reverse_name(&reverse)?;
            let target = self.schema_mut(slot.target)?;
            target.reverse.retain(|r| r.name != reverse.name);
            target.reverse.push(reverse);
            targets.push(slot.target);
        }

        log::debug!("Installed {} reverse relationships from {}", targets.len(), qualified);
        Ok(targets)
    }

    /// A reverse slot may only replace one mirrored from the same schema family.
    fn check_reverse_name(&self, reverse: &RelationSlot) -> Result<()> {
        let owner = self.schema(reverse.owner)?;
        let clash = if owner.declared_attributes.iter().any(|a| a.name == reverse.name)
            || owner.forward.iter().any(|f| f.name == reverse.name)
        {
            true
        } else {
            owner
                .reverse
                .iter()
                .filter(|r| r.name == reverse.name)
                .any(|r| !self.is_a(r.target, reverse.target) && !self.is_a(reverse.target, r.target))
        };

        if clash {
            return Err(Error::Config(format!(
                "reverse relationship {} of {}.{} collides with an existing member of {}",
                reverse.name,
                self.schema(reverse.target)?.qualified_name(),
                reverse.mirror,
                owner.qualified_name()
            )));
        }
        Ok(())
    }

    fn compile_schema(&mut self, entity_type: EntityType) -> Result<()> {
        let mut schema = self
            .schemas
            .remove(&entity_type)
            .ok_or_else(|| Error::UnknownSchema(entity_type.to_string()))?;
        let parent = schema.parent.and_then(|p| self.schemas.get(&p));
        schema.compile(parent);
        self.schemas.insert(entity_type, schema);
        Ok(())
    }

    /// Recompiles an installed schema and its descendants, re-laying out the storage of
    /// their existing entities by slot name.
    fn recompile_family(&mut self, entity_type: EntityType) -> Result<()> {
        for t in self.descendants(entity_type) {
            let (old_attributes, old_relations) = {
                let schema = self.schema(t)?;
                (
                    schema.attributes.iter().map(|a| a.name.clone()).collect::<Vec<_>>(),
                    schema.relations.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
                )
            };

            self.compile_schema(t)?;

            let Some(schema) = self.schemas.get(&t) else { continue };
            for entity in self
                .entities
                .values_mut()
                .filter(|e| e.entity_id.extract_type() == t)
            {
                let mut values: AHashMap<String, Value> = old_attributes
                    .iter()
                    .cloned()
                    .zip(entity.values.drain(..))
                    .collect();
                entity.values = schema
                    .attributes
                    .iter()
                    .map(|a| values.remove(&a.name).unwrap_or_else(|| a.default_value.clone()))
                    .collect();

                let mut relations: AHashMap<String, Relation> = old_relations
                    .iter()
                    .cloned()
                    .zip(entity.relations.drain(..))
                    .collect();
                entity.relations = schema
                    .relations
                    .iter()
                    .map(|slot| relations.remove(&slot.name).unwrap_or_else(|| Relation::empty(slot)))
                    .collect();
            }
            log::debug!("Recompiled {}", schema.qualified_name());
        }
        Ok(())
    }

    fn rollback(&mut self, types: &[EntityType]) {
        for entity_type in types {
            self.schemas.remove(entity_type);
        }
        for schema in self.schemas.values_mut() {
            schema.children.retain(|c| !types.contains(c));
            schema.reverse.retain(|r| !types.contains(&r.target));
        }
        log::debug!("Rolled back installation of {} schemas", types.len());
    }
}
