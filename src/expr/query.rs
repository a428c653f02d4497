use std::cmp::Ordering;

use itertools::Itertools;

use crate::{
    data::{paginate, PageOpts, PageResult},
    expr::{
        operators::OperatorRegistry,
        predicate::{Condition, Predicate},
    },
    EntityId, EntityType, Error, Result, Store, Value,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Multi-field ordering, written as `"-age,name"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderBy(pub Vec<SortKey>);

impl OrderBy {
    pub fn parse(spec: &str) -> Self {
        OrderBy(
            spec.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix('-') {
                    Some(field) => SortKey {
                        field: field.to_string(),
                        descending: true,
                    },
                    None => SortKey {
                        field: s.trim_start_matches('+').to_string(),
                        descending: false,
                    },
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn touches(&self, field: &str) -> bool {
        self.0.iter().any(|key| key.field == field)
    }
}

/// Values reached by walking `path` from `entity_id`. Intermediate hops follow
/// resolved relationship targets that are still live.
fn values_at(store: &Store, entity_id: EntityId, path: &[String]) -> Vec<Value> {
    match path {
        [] => Vec::new(),
        [field] => vec![store.read(entity_id, field).unwrap_or_default()],
        [relationship, rest @ ..] => store
            .linked(entity_id, relationship)
            .unwrap_or_default()
            .into_iter()
            .filter(|target| store.exists(*target))
            .flat_map(|target| values_at(store, target, rest))
            .collect(),
    }
}

fn sort_value(store: &Store, entity_id: EntityId, field: &str) -> Value {
    let path: Vec<String> = field.split('.').map(str::to_string).collect();
    values_at(store, entity_id, &path)
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// A predicate over one schema family plus an optional ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub entity_type: EntityType,
    pub predicate: Predicate,
    pub order: OrderBy,
}

impl Query {
    pub fn new(entity_type: EntityType, predicate: Predicate) -> Self {
        Query {
            entity_type,
            predicate,
            order: OrderBy::default(),
        }
    }

    pub fn order_by(mut self, spec: &str) -> Self {
        self.order = OrderBy::parse(spec);
        self
    }

    pub fn clear_order(&mut self) {
        self.order = OrderBy::default();
    }

    /// Fails on the first operator the registry does not know.
    pub fn validate(&self, operators: &OperatorRegistry) -> Result<()> {
        match self
            .predicate
            .conditions()
            .into_iter()
            .find(|c| !operators.contains(&c.operator))
        {
            Some(condition) => Err(Error::UnknownOperator(condition.operator.clone())),
            None => Ok(()),
        }
    }

    pub fn matches(&self, store: &Store, entity_id: EntityId) -> Result<bool> {
        self.validate(store.operators())?;
        Ok(self.matches_validated(store, entity_id))
    }

    pub(crate) fn matches_validated(&self, store: &Store, entity_id: EntityId) -> bool {
        store.is_a(entity_id.extract_type(), self.entity_type)
            && evaluate(&self.predicate, store, entity_id)
    }

    pub fn execute(&self, store: &Store) -> Result<Vec<EntityId>> {
        self.validate(store.operators())?;
        let mut results: Vec<EntityId> = store
            .all(self.entity_type)?
            .into_iter()
            .filter(|id| evaluate(&self.predicate, store, *id))
            .collect();
        self.sort(store, &mut results);
        Ok(results)
    }

    /// Orders ids by the sort keys, falling back to creation order on ties.
    pub fn sort(&self, store: &Store, ids: &mut Vec<EntityId>) {
        if self.order.is_empty() {
            return;
        }

        let keyed: Vec<(EntityId, Vec<Value>)> = ids
            .iter()
            .map(|id| {
                let keys = self
                    .order
                    .0
                    .iter()
                    .map(|key| sort_value(store, *id, &key.field))
                    .collect();
                (*id, keys)
            })
            .collect();

        *ids = keyed
            .into_iter()
            .sorted_by(|(a_id, a), (b_id, b)| {
                for (key, (a, b)) in self.order.0.iter().zip(a.iter().zip(b.iter())) {
                    let ordering = match a.sort_cmp(b) {
                        Ordering::Equal => continue,
                        ordering if key.descending => ordering.reverse(),
                        ordering => ordering,
                    };
                    return ordering;
                }
                a_id.extract_sequence().cmp(&b_id.extract_sequence()).then(a_id.cmp(b_id))
            })
            .map(|(id, _)| id)
            .collect();
    }

    pub fn count(&self, store: &Store) -> Result<usize> {
        self.validate(store.operators())?;
        Ok(store
            .all(self.entity_type)?
            .into_iter()
            .filter(|id| evaluate(&self.predicate, store, *id))
            .count())
    }

    pub fn first(&self, store: &Store) -> Result<Option<EntityId>> {
        Ok(self.execute(store)?.into_iter().next())
    }

    pub fn execute_paginated(&self, store: &Store, opts: &PageOpts) -> Result<PageResult<EntityId>> {
        paginate(self.execute(store)?, opts)
    }

    /// Schemas reached through dotted predicate paths, with their descendants.
    pub fn dependencies(&self, store: &Store) -> Vec<EntityType> {
        let mut dependencies = Vec::new();
        for condition in self.predicate.conditions() {
            let mut current = vec![self.entity_type];
            for hop in &condition.path[..condition.path.len().saturating_sub(1)] {
                let next: Vec<EntityType> = current
                    .iter()
                    .flat_map(|t| store.descendants(*t))
                    .filter_map(|t| store.schema(t).ok()?.relation(hop).map(|slot| slot.target))
                    .unique()
                    .collect();
                for target in &next {
                    dependencies.extend(store.descendants(*target));
                }
                current = next;
            }
        }
        dependencies.into_iter().unique().collect()
    }

    /// Top-level fields read by the predicate.
    pub fn fields(&self) -> Vec<&str> {
        self.predicate
            .conditions()
            .into_iter()
            .filter_map(|c| c.path.first().map(String::as_str))
            .unique()
            .collect()
    }
}

fn evaluate(predicate: &Predicate, store: &Store, entity_id: EntityId) -> bool {
    match predicate {
        Predicate::All => true,
        Predicate::Leaf(condition) => evaluate_condition(condition, store, entity_id),
        Predicate::And(children) => children.iter().all(|c| evaluate(c, store, entity_id)),
        Predicate::Or(children) => children.iter().any(|c| evaluate(c, store, entity_id)),
    }
}

fn evaluate_condition(condition: &Condition, store: &Store, entity_id: EntityId) -> bool {
    let Some(operator) = store.operators().get(&condition.operator) else {
        return false;
    };
    values_at(store, entity_id, &condition.path)
        .iter()
        .any(|value| operator(value, &condition.value))
}
