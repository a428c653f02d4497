mod operators;
mod predicate;
mod query;

pub use operators::{Operator, OperatorRegistry};
pub use predicate::{
    Condition, FieldPath, Predicate, DEFAULT_OPERATOR, OPERATOR_DELIMITER, PATH_DELIMITER,
};
pub use query::{OrderBy, Query, SortKey};
