//! Filter predicates over serialized rows
//!
//! Fields are addressed by dot paths (`"galaxy.title"`). When a path crosses
//! an array (an eager-loaded to-many association) the predicate holds if any
//! element satisfies it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Predicate tree evaluated against a serialized row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Matches every row
    True,
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    /// Case-sensitive substring match on string fields
    Contains(String, String),
    /// Field absent or null
    IsNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// The row's sort key for the path equals the value
    ///
    /// Unlike `Eq`, a fan-out path is compared through the single value
    /// [`sort_key`] orders it by, never through any of its elements.
    KeyEq(String, Value),
    KeyGt(String, Value),
    KeyLt(String, Value),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lte(field.into(), value.into())
    }

    pub fn is_in(field: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Filter::In(field.into(), values.into_iter().collect())
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains(field.into(), needle.into())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull(field.into())
    }

    pub fn key_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::KeyEq(field.into(), value.into())
    }

    pub fn key_gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::KeyGt(field.into(), value.into())
    }

    pub fn key_lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::KeyLt(field.into(), value.into())
    }

    /// A predicate no row satisfies
    pub fn never() -> Self {
        Filter::In(String::new(), Vec::new())
    }

    /// Conjunction, flattening nested `And`s and dropping `True`
    pub fn and(self, other: Filter) -> Filter {
        let mut parts = Vec::new();
        for part in [self, other] {
            match part {
                Filter::True => {}
                Filter::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Filter::True,
            1 => parts.remove(0),
            _ => Filter::And(parts),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut inner) => {
                inner.push(other);
                Filter::Or(inner)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    /// Evaluate against a serialized row
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::True => true,
            Filter::Eq(field, value) => any_value(row, field, |v| compare(v, value).is_eq()),
            Filter::Ne(field, value) => !any_value(row, field, |v| compare(v, value).is_eq()),
            Filter::Gt(field, value) => any_value(row, field, |v| compare(v, value).is_gt()),
            Filter::Gte(field, value) => any_value(row, field, |v| compare(v, value).is_ge()),
            Filter::Lt(field, value) => any_value(row, field, |v| compare(v, value).is_lt()),
            Filter::Lte(field, value) => any_value(row, field, |v| compare(v, value).is_le()),
            Filter::In(field, values) => any_value(row, field, |v| {
                values.iter().any(|candidate| compare(v, candidate).is_eq())
            }),
            Filter::Contains(field, needle) => any_value(row, field, |v| {
                v.as_str().is_some_and(|s| s.contains(needle.as_str()))
            }),
            Filter::IsNull(field) => any_value(row, field, Value::is_null),
            Filter::And(parts) => parts.iter().all(|p| p.matches(row)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(row)),
            Filter::Not(inner) => !inner.matches(row),
            Filter::KeyEq(field, value) => compare(&sort_key(row, field), value).is_eq(),
            Filter::KeyGt(field, value) => compare(&sort_key(row, field), value).is_gt(),
            Filter::KeyLt(field, value) => compare(&sort_key(row, field), value).is_lt(),
        }
    }
}

/// Values reachable from `row` through a dot path
///
/// Arrays met along the way fan out. A path that reaches nothing yields no
/// values; callers treat that as null.
pub fn lookup<'a>(row: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![row];
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for value in current {
            collect_segment(value, segment, &mut next);
        }
        current = next;
    }
    current
}

fn collect_segment<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_segment(item, segment, out);
            }
        }
        _ => {}
    }
}

/// The single value used to order a row by `path`
///
/// Missing fields order as null; fan-out paths order by their first value.
pub fn sort_key(row: &Value, path: &str) -> Value {
    lookup(row, path)
        .into_iter()
        .next()
        .cloned()
        .unwrap_or(Value::Null)
}

fn any_value(row: &Value, field: &str, mut predicate: impl FnMut(&Value) -> bool) -> bool {
    let values = lookup(row, field);
    if values.is_empty() {
        return predicate(&Value::Null);
    }
    values.into_iter().any(|v| match v {
        Value::Array(items) if !items.is_empty() => items.iter().any(&mut predicate),
        other => predicate(other),
    })
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x.cmp(&y)
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x.cmp(&y)
            } else {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_comparisons() {
        let row = json!({"id": 3, "title": "Sun", "mass": 1.5});
        assert!(Filter::eq("title", "Sun").matches(&row));
        assert!(Filter::ne("title", "Moon").matches(&row));
        assert!(Filter::gt("id", 2).matches(&row));
        assert!(!Filter::gt("id", 3).matches(&row));
        assert!(Filter::gte("id", 3).matches(&row));
        assert!(Filter::lt("mass", 2).matches(&row));
        assert!(Filter::contains("title", "u").matches(&row));
    }

    #[test]
    fn test_missing_field_is_null() {
        let row = json!({"id": 1});
        assert!(Filter::is_null("galaxy_id").matches(&row));
        assert!(Filter::eq("galaxy_id", Value::Null).matches(&row));
        assert!(!Filter::gt("galaxy_id", 0).matches(&row));
    }

    #[test]
    fn test_nested_association_any_semantics() {
        let row = json!({
            "id": 1,
            "stars": [{"title": "Sun"}, {"title": "Sirius"}]
        });
        assert!(Filter::eq("stars.title", "Sirius").matches(&row));
        assert!(!Filter::eq("stars.title", "Vega").matches(&row));
        assert_eq!(sort_key(&row, "stars.title"), json!("Sun"));
    }

    #[test]
    fn test_key_comparisons_use_first_fanned_value() {
        let row = json!({
            "id": 1,
            "stars": [{"title": "Sun"}, {"title": "Zeta"}]
        });
        // any-element semantics would accept this row after "Sun"
        assert!(Filter::gt("stars.title", "Sun").matches(&row));
        assert!(!Filter::key_gt("stars.title", "Sun").matches(&row));
        assert!(Filter::key_eq("stars.title", "Sun").matches(&row));
        assert!(Filter::key_lt("stars.title", "Tau").matches(&row));
        assert!(Filter::key_eq("stars.mass", Value::Null).matches(&row));
    }

    #[test]
    fn test_never_and_combinators() {
        let row = json!({"id": 1});
        assert!(!Filter::never().matches(&row));
        assert!(Filter::True.and(Filter::eq("id", 1)).matches(&row));
        assert!(Filter::never().or(Filter::eq("id", 1)).matches(&row));
        assert!(Filter::eq("id", 2).negate().matches(&row));
        assert_eq!(Filter::True.and(Filter::True), Filter::True);
    }

    #[test]
    fn test_compare_orders_types() {
        assert_eq!(compare(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(compare(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(compare(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare(&json!(5), &json!("a")), Ordering::Less);
    }
}
