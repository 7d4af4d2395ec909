//! # Ticket Criteria Query
//!
//! The JSON search endpoint. A request carries a list of criteria, an
//! optional sort field and an optional limit:
//!
//! ```text
//! {"criteria": [{"column": "ip", "operator": "like", "value": "%10%"},
//!               {"column": "event_count", "operator": ">", "value": 7}],
//!  "orderby": "ip", "limit": 5}
//! ```
//!
//! Criteria on stored columns are pushed down to SQLite. Criteria on
//! computed fields (see [`COMPUTED_FIELDS`]) are applied in memory after
//! retrieval, then the survivors are sorted and truncated.

pub mod compare;
pub mod executor;
pub mod parser;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Fields derived at read time. They have no column to filter on.
pub const COMPUTED_FIELDS: &[&str] = &["event_count"];

/// Comparison operator of a criterion.
///
/// The store understands the whole vocabulary. The in-memory filter only
/// interprets `=`, `>` and `<`; every other operator lets records through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    Other(String),
}

impl Operator {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "=" => Self::Eq,
            "!=" | "<>" => Self::Neq,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// SQL spelling, `None` for operators the store cannot run.
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Neq => Some("<>"),
            Self::Gt => Some(">"),
            Self::Gte => Some(">="),
            Self::Lt => Some("<"),
            Self::Lte => Some("<="),
            Self::Like => Some("LIKE"),
            Self::NotLike => Some("NOT LIKE"),
            Self::Other(_) => None,
        }
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::Eq
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => f.write_str("="),
            Self::Neq => f.write_str("!="),
            Self::Gt => f.write_str(">"),
            Self::Gte => f.write_str(">="),
            Self::Lt => f.write_str("<"),
            Self::Lte => f.write_str("<="),
            Self::Like => f.write_str("like"),
            Self::NotLike => f.write_str("not like"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for Operator {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.to_string()
    }
}

/// A validated filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub column: String,
    #[serde(default)]
    pub operator: Operator,
    pub value: Value,
}

impl Criterion {
    pub fn new(column: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }
}

/// A decoded request body. Criteria stay raw until the splitter checks them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub criteria: Vec<Value>,
    pub orderby: Option<String>,
    pub limit: Option<usize>,
}

/// Criteria routed to where they can be evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub pushdown: Vec<Criterion>,
    pub computed: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Faulty JSON request: {0}")]
    MalformedRequest(String),

    #[error("Criteria field is missing: {0}")]
    InvalidCriterion(String),

    #[error("{0}")]
    StoreQueryFailed(String),
}

/// Anything the pipeline can filter and sort: a row addressable by field name.
pub trait Record {
    /// `None` when the record has no such field.
    fn field(&self, name: &str) -> Option<Value>;
}

impl Record for Value {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse_known_and_unknown() {
        assert_eq!(Operator::parse("="), Operator::Eq);
        assert_eq!(Operator::parse("LIKE"), Operator::Like);
        assert_eq!(Operator::parse(" not like "), Operator::NotLike);
        assert_eq!(Operator::parse("<>"), Operator::Neq);
        assert_eq!(Operator::parse("~"), Operator::Other("~".into()));
        assert_eq!(Operator::Other("~".into()).as_sql(), None);
        assert_eq!(Operator::NotLike.as_sql(), Some("NOT LIKE"));
    }

    #[test]
    fn test_criterion_operator_defaults_to_eq() {
        let c: Criterion = serde_json::from_str(r#"{"column":"ip","value":"10.0.0.1"}"#).unwrap();
        assert_eq!(c.operator, Operator::Eq);
        let c: Criterion =
            serde_json::from_str(r#"{"column":"id","operator":">","value":7}"#).unwrap();
        assert_eq!(c.operator, Operator::Gt);
    }
}
