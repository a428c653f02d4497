use std::cmp::Ordering;
use std::rc::Rc;

use ahash::AHashMap;

use crate::Value;

/// Comparator applied as `operator(field_value, predicate_value)`.
pub type Operator = Rc<dyn Fn(&Value, &Value) -> bool>;

/// Named comparators available to predicates.
///
/// Built in: `eq`, `lt`, `lte`, `gt`, `gte`. The ordering operators never match a
/// null field value.
#[derive(Clone)]
pub struct OperatorRegistry {
    operators: AHashMap<String, Operator>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorRegistry {
    pub fn new() -> Self {
        let mut registry = OperatorRegistry {
            operators: AHashMap::new(),
        };
        registry.register("eq", |a, b| a.loosely_equals(b));
        registry.register("lt", |a, b| a.compare(b) == Some(Ordering::Less));
        registry.register("lte", |a, b| {
            matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal))
        });
        registry.register("gt", |a, b| a.compare(b) == Some(Ordering::Greater));
        registry.register("gte", |a, b| {
            matches!(a.compare(b), Some(Ordering::Greater | Ordering::Equal))
        });
        registry
    }

    /// Adds or replaces an operator.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        operator: impl Fn(&Value, &Value) -> bool + 'static,
    ) {
        self.operators.insert(name.into(), Rc::new(operator));
    }

    pub fn get(&self, name: &str) -> Option<&Operator> {
        self.operators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.operators.keys()).finish()
    }
}
