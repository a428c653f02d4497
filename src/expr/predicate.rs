use smallvec::SmallVec;

use crate::{Error, Result, Value};

/// Separates a field path from its operator, as in `age__gte`.
pub const OPERATOR_DELIMITER: &str = "__";
/// Separates relationship hops in a field path, as in `owner.name`.
pub const PATH_DELIMITER: char = '.';
pub const DEFAULT_OPERATOR: &str = "eq";

pub type FieldPath = SmallVec<[String; 4]>;

/// One `field[__operator]: value` leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: FieldPath,
    pub operator: String,
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition {
            path: field.split(PATH_DELIMITER).map(str::to_string).collect(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Parses a predicate key such as `owner.age__lt`.
    pub fn parse(key: &str, value: Value) -> Result<Self> {
        let (field, operator) = match key.rsplit_once(OPERATOR_DELIMITER) {
            Some((field, operator)) => (field, operator),
            None => (key, DEFAULT_OPERATOR),
        };

        if field.is_empty() || operator.is_empty() {
            return Err(Error::InvalidPredicate(format!("malformed key '{}'", key)));
        }
        let condition = Condition::new(field, operator, value);
        if condition.path.iter().any(String::is_empty) {
            return Err(Error::InvalidPredicate(format!("empty path segment in '{}'", key)));
        }
        Ok(condition)
    }

    pub fn field(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// True when the path hops through at least one relationship.
    pub fn is_traversal(&self) -> bool {
        self.path.len() > 1
    }
}

/// Predicate tree. Sibling leaves of one JSON object form an implicit conjunction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Predicate {
    /// Matches every entity
    #[default]
    All,
    Leaf(Condition),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn condition(field: &str, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Leaf(Condition::new(field, operator, value))
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::condition(field, "eq", value)
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Predicate::condition(field, "lt", value)
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Predicate::condition(field, "lte", value)
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Predicate::condition(field, "gt", value)
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Predicate::condition(field, "gte", value)
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::And(children)
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Or(children)
    }

    /// Parses the JSON form: `{"age__gte": 21, "$or": [{...}, {...}]}`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(fields) = json else {
            return Err(Error::InvalidPredicate(format!(
                "expected an object, got {}",
                json
            )));
        };

        let mut children = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            match key.as_str() {
                "$and" => children.push(Predicate::And(Self::from_json_list(key, value)?)),
                "$or" => children.push(Predicate::Or(Self::from_json_list(key, value)?)),
                other if other.starts_with('$') => {
                    return Err(Error::InvalidPredicate(format!("unknown combinator '{}'", other)))
                }
                _ => children.push(Predicate::Leaf(Condition::parse(key, Value::from(value))?)),
            }
        }

        Ok(match children.len() {
            0 => Predicate::All,
            1 => children.remove(0),
            _ => Predicate::And(children),
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::InvalidPredicate(e.to_string()))?;
        Self::from_json(&json)
    }

    fn from_json_list(key: &str, json: &serde_json::Value) -> Result<Vec<Predicate>> {
        let serde_json::Value::Array(items) = json else {
            return Err(Error::InvalidPredicate(format!("{} expects an array", key)));
        };
        items.iter().map(Predicate::from_json).collect()
    }

    /// Every leaf of the tree.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Predicate::All => {}
            Predicate::Leaf(condition) => out.push(condition),
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().for_each(|child| child.collect(out))
            }
        }
    }
}
