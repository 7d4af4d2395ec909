//! # Query Body Parser
//!
//! Decodes the raw request body into a [`ParsedQuery`]. Only the shape is
//! checked here; criteria are validated by the splitter.

use super::{ParsedQuery, QueryError};
use serde_json::Value;

/// Parse a request body. Every top-level key is optional.
pub fn parse(body: &[u8]) -> Result<ParsedQuery, QueryError> {
    let root: Value = serde_json::from_slice(body)
        .map_err(|e| QueryError::MalformedRequest(e.to_string()))?;

    let Value::Object(mut root) = root else {
        return Err(QueryError::MalformedRequest(
            "request body must be a JSON object".into(),
        ));
    };

    let criteria = match root.remove("criteria") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(QueryError::MalformedRequest(
                "'criteria' must be an array".into(),
            ))
        }
    };

    let orderby = match root.remove("orderby") {
        None | Some(Value::Null) => None,
        Some(Value::String(field)) => Some(field),
        Some(_) => {
            return Err(QueryError::MalformedRequest(
                "'orderby' must be a field name".into(),
            ))
        }
    };

    let limit = match root.remove("limit") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_limit(&v)?),
    };

    Ok(ParsedQuery {
        criteria,
        orderby,
        limit,
    })
}

fn parse_limit(v: &Value) -> Result<usize, QueryError> {
    let parsed = match v {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        QueryError::MalformedRequest(format!("'limit' must be a non-negative integer, got {}", v))
    })
}
