//! # Query Executor
//!
//! Runs a [`ParsedQuery`] against the [`TicketStore`]:
//! split → pushdown → computed filter → sort → limit.

use super::compare::{loose_cmp, loose_eq};
use super::{Criterion, Operator, ParsedQuery, QueryError, Record, Split, COMPUTED_FIELDS};
use crate::store::{Ticket, TicketStore};
use serde_json::Value;
use std::cmp::Ordering;
use std::time::Instant;

/// Validate raw criteria and route each to the store or to the in-memory
/// filter. One bad criterion rejects the whole list.
pub fn split(criteria: &[Value], computed_fields: &[&str]) -> Result<Split, QueryError> {
    let mut out = Split::default();

    for (i, raw) in criteria.iter().enumerate() {
        let criterion = validate(i, raw)?;
        if computed_fields.contains(&criterion.column.as_str()) {
            out.computed.push(criterion);
        } else {
            out.pushdown.push(criterion);
        }
    }

    Ok(out)
}

fn validate(index: usize, raw: &Value) -> Result<Criterion, QueryError> {
    let missing = || QueryError::InvalidCriterion(format!("criterion {index} needs a column and a value"));

    let Value::Object(fields) = raw else {
        return Err(missing());
    };

    let column = match fields.get("column") {
        Some(Value::String(column)) => column.clone(),
        _ => return Err(missing()),
    };

    let value = match fields.get("value") {
        None | Some(Value::Null) => return Err(missing()),
        Some(Value::Array(_)) | Some(Value::Object(_)) => {
            return Err(QueryError::InvalidCriterion(format!(
                "criterion {index} value for '{column}' must be a scalar"
            )))
        }
        Some(v) => v.clone(),
    };

    let operator = match fields.get("operator") {
        None | Some(Value::Null) => Operator::Eq,
        Some(Value::String(op)) => Operator::parse(op),
        Some(_) => {
            return Err(QueryError::InvalidCriterion(format!(
                "criterion {index} operator must be a string"
            )))
        }
    };

    Ok(Criterion {
        column,
        operator,
        value,
    })
}

/// Does `record` pass one computed criterion? Only `>`, `<` and `=` are
/// interpreted; any other operator passes every record.
pub fn matches<R: Record>(record: &R, criterion: &Criterion) -> bool {
    let actual = record.field(&criterion.column).unwrap_or(Value::Null);
    match criterion.operator {
        Operator::Gt => loose_cmp(&actual, &criterion.value) == Ordering::Greater,
        Operator::Lt => loose_cmp(&actual, &criterion.value) == Ordering::Less,
        Operator::Eq => loose_eq(&actual, &criterion.value),
        _ => true,
    }
}

/// Narrow `records` by each computed criterion in turn.
pub fn filter_computed<R: Record>(mut records: Vec<R>, computed: &[Criterion]) -> Vec<R> {
    for criterion in computed {
        if !matches!(criterion.operator, Operator::Gt | Operator::Lt | Operator::Eq) {
            tracing::debug!(
                column = %criterion.column,
                operator = %criterion.operator,
                "operator not evaluated in memory, criterion passes all records"
            );
            continue;
        }
        records.retain(|r| matches(r, criterion));
    }
    records
}

/// Stable ascending sort on `orderby`, then keep the first `limit`.
pub fn order_and_limit<R: Record>(
    mut records: Vec<R>,
    orderby: Option<&str>,
    limit: Option<usize>,
) -> Vec<R> {
    if let Some(field) = orderby {
        let mut keyed: Vec<(Value, R)> = records
            .into_iter()
            .map(|r| (r.field(field).unwrap_or(Value::Null), r))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| loose_cmp(a, b));
        records = keyed.into_iter().map(|(_, r)| r).collect();
    }
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    records
}

/// Execute a parsed query end to end. Nothing is returned on error.
/// `account_id` limits the candidates to one contact account's tickets.
pub async fn execute(
    query: &ParsedQuery,
    store: &TicketStore,
    account_id: Option<i64>,
) -> Result<Vec<Ticket>, QueryError> {
    let start = Instant::now();
    let split = split(&query.criteria, COMPUTED_FIELDS)?;

    let candidates = store
        .select_scoped(&split.pushdown, account_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "ticket query rejected by the store");
            QueryError::StoreQueryFailed(e.to_string())
        })?;
    let fetched = candidates.len();

    let filtered = filter_computed(candidates, &split.computed);
    let result = order_and_limit(filtered, query.orderby.as_deref(), query.limit);

    tracing::debug!(
        pushdown = split.pushdown.len(),
        computed = split.computed.len(),
        fetched,
        returned = result.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "ticket query executed"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::store::TicketForm;
    use serde_json::json;

    fn records(counts: &[i64]) -> Vec<Value> {
        counts
            .iter()
            .enumerate()
            .map(|(i, n)| json!({"id": i + 1, "event_count": n}))
            .collect()
    }

    fn counts(records: &[Value]) -> Vec<i64> {
        records
            .iter()
            .map(|r| r["event_count"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn test_split_routes_and_preserves_order() {
        let criteria = vec![
            json!({"column": "ip", "operator": "like", "value": "%10%"}),
            json!({"column": "event_count", "operator": ">", "value": 3}),
            json!({"column": "id", "operator": ">", "value": 7}),
            json!({"column": "event_count", "value": 9}),
        ];
        let split = split(&criteria, COMPUTED_FIELDS).unwrap();
        assert_eq!(split.pushdown.len() + split.computed.len(), criteria.len());
        assert_eq!(
            split.pushdown.iter().map(|c| c.column.as_str()).collect::<Vec<_>>(),
            vec!["ip", "id"]
        );
        assert_eq!(split.computed[0].value, json!(3));
        assert_eq!(split.computed[1].value, json!(9));
    }

    #[test]
    fn test_missing_operator_defaults_to_equals() {
        let with = split(&[json!({"column": "ip", "operator": "=", "value": "1.2.3.4"})], &[]).unwrap();
        let without = split(&[json!({"column": "ip", "value": "1.2.3.4"})], &[]).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_missing_column_or_value_rejects_everything() {
        let cases = [
            json!({"operator": "=", "value": 1}),
            json!({"column": "id", "operator": "="}),
            json!({"column": "id", "value": null}),
            json!("id = 1"),
        ];
        for bad in cases {
            let criteria = vec![json!({"column": "ip", "value": "x"}), bad];
            assert!(matches!(
                split(&criteria, COMPUTED_FIELDS),
                Err(QueryError::InvalidCriterion(_))
            ));
        }
    }

    #[test]
    fn test_unknown_operator_never_removes_records() {
        let input = records(&[10, 2, 7, 9]);
        for op in [">=", "<=", "!=", "like", "~"] {
            let c = Criterion::new("event_count", Operator::parse(op), json!(100));
            assert_eq!(filter_computed(input.clone(), &[c]), input);
        }
    }

    #[test]
    fn test_filter_sort_limit_order() {
        let input = records(&[10, 2, 7, 9]);
        let filtered = filter_computed(
            input,
            &[Criterion::new("event_count", Operator::Gt, json!(5))],
        );
        assert_eq!(counts(&filtered), vec![10, 7, 9]);
        let result = order_and_limit(filtered, Some("event_count"), Some(2));
        assert_eq!(counts(&result), vec![7, 9]);
    }

    #[test]
    fn test_loose_equality_in_memory() {
        let input = records(&[5, 6]);
        let result = filter_computed(
            input,
            &[Criterion::new("event_count", Operator::Eq, json!("5"))],
        );
        assert_eq!(counts(&result), vec![5]);
    }

    #[test]
    fn test_missing_field_is_null() {
        let input = vec![json!({"id": 1}), json!({"id": 2, "event_count": 3})];
        let gt = filter_computed(
            input.clone(),
            &[Criterion::new("event_count", Operator::Gt, json!(0))],
        );
        assert_eq!(gt.len(), 1);
        let lt = filter_computed(
            input.clone(),
            &[Criterion::new("event_count", Operator::Lt, json!(0))],
        );
        assert_eq!(lt, vec![json!({"id": 1})]);

        let sorted = order_and_limit(input, Some("event_count"), None);
        assert_eq!(sorted[0], json!({"id": 1}));
    }

    #[test]
    fn test_sort_is_stable() {
        let input = vec![
            json!({"id": 1, "ip": "b"}),
            json!({"id": 2, "ip": "a"}),
            json!({"id": 3, "ip": "b"}),
            json!({"id": 4, "ip": "a"}),
        ];
        let ids: Vec<i64> = order_and_limit(input, Some("ip"), None)
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_sort_over_mixed_domains() {
        let input: Vec<Value> = (0..200)
            .map(|i| {
                let domain = match i % 3 {
                    0 => format!("{i}"),
                    1 => format!("{i}a"),
                    _ => format!("{}", i * 7 % 50),
                };
                json!({"id": i, "domain": domain})
            })
            .chain([json!({"id": 200}), json!({"id": 201, "domain": true})])
            .collect();

        let sorted = order_and_limit(input, Some("domain"), None);
        assert_eq!(sorted.len(), 202);
        assert_eq!(sorted[0]["id"], 200);
        assert!(sorted.windows(2).all(|w| {
            loose_cmp(&w[0]["domain"], &w[1]["domain"]) != Ordering::Greater
        }));

        // numeric domains first, in numeric order, then text bytewise
        let domains: Vec<&str> = sorted
            .iter()
            .filter_map(|r| r["domain"].as_str())
            .collect();
        let first_text = domains.iter().position(|d| d.ends_with('a')).unwrap();
        assert!(domains[..first_text].iter().all(|d| d.parse::<i64>().is_ok()));
        assert!(domains[first_text..].iter().all(|d| d.ends_with('a')));
        assert_eq!(domains[first_text], "100a");
    }

    #[test]
    fn test_limit_without_sort_and_zero_limit() {
        assert_eq!(counts(&order_and_limit(records(&[3, 1, 2]), None, Some(2))), vec![3, 1]);
        assert!(order_and_limit(records(&[3, 1, 2]), None, Some(0)).is_empty());
        assert_eq!(counts(&order_and_limit(records(&[3]), None, Some(10))), vec![3]);
    }

    async fn store_with_tickets(count: i64) -> TicketStore {
        let store = TicketStore::open_in_memory().unwrap();
        for id in 1..=count {
            let ip = format!("10.0.0.{}", 100 - id);
            store
                .create_ticket(&TicketForm {
                    ip: Some(ip),
                    class_id: Some("SPAM".into()),
                    type_id: Some("ABUSE".into()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_pushdown_then_sort_and_limit() {
        let store = store_with_tickets(12).await;
        let query = parse(
            br#"{"criteria":[{"column":"id","operator":">","value":7}],"orderby":"ip","limit":2}"#,
        )
        .unwrap();
        let result = execute(&query, &store, None).await.unwrap();
        let ids: Vec<i64> = result.iter().map(|t| t.id).collect();
        // ip falls as id rises, so ascending ip reverses id order
        assert_eq!(ids, vec![12, 11]);
    }

    #[tokio::test]
    async fn test_empty_query_returns_store_order() {
        let store = store_with_tickets(4).await;
        let result = execute(&parse(b"{}").unwrap(), &store, None).await.unwrap();
        assert_eq!(result.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_computed_criterion_on_event_count() {
        let store = store_with_tickets(3).await;
        for (ticket, events) in [(1, 4), (2, 1), (3, 6)] {
            for n in 0..events {
                store.add_event(ticket, "test", n, &json!({})).await.unwrap();
            }
        }
        let query = parse(
            br#"{"criteria":[{"column":"event_count","operator":">","value":"2"}],"orderby":"event_count"}"#,
        )
        .unwrap();
        let result = execute(&query, &store, None).await.unwrap();
        assert_eq!(result.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_store_failure_aborts() {
        let store = store_with_tickets(2).await;
        let query = parse(br#"{"criteria":[{"column":"nope","value":1}]}"#).unwrap();
        let err = execute(&query, &store, None).await.unwrap_err();
        assert_eq!(err, QueryError::StoreQueryFailed("no such column: nope".into()));
    }

    #[tokio::test]
    async fn test_repeated_queries_are_identical() {
        let store = store_with_tickets(6).await;
        let query = parse(br#"{"criteria":[{"column":"id","operator":"<","value":5}],"orderby":"ip"}"#)
            .unwrap();
        let first = execute(&query, &store, None).await.unwrap();
        let second = execute(&query, &store, None).await.unwrap();
        assert_eq!(first, second);
    }
}
