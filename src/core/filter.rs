//! Column/field filters evaluated against tasks when popping or listing.
//!
//! A filter names a task `column` and, for JSON columns, an optional `field`
//! path into it using `__` as separator (`boefje__id`). Filters combine either
//! as a plain list (all must hold) or as a map of `and` / `or` / `not` groups.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SchedulerError;
use super::task::Task;

/// Separator for nested payload paths.
pub const PATH_SEPARATOR: &str = "__";

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equal.
    #[serde(rename = "eq", alias = "==")]
    Eq,
    /// Not equal.
    #[serde(rename = "ne", alias = "!=")]
    Ne,
    /// Greater than.
    #[serde(rename = "gt", alias = ">")]
    Gt,
    /// Greater than or equal.
    #[serde(rename = "gte", alias = ">=")]
    Gte,
    /// Less than.
    #[serde(rename = "lt", alias = "<")]
    Lt,
    /// Less than or equal.
    #[serde(rename = "lte", alias = "<=")]
    Lte,
    /// Left is one of the values in the right-hand array.
    #[serde(rename = "in")]
    In,
    /// Left is none of the values in the right-hand array.
    #[serde(rename = "not_in")]
    NotIn,
    /// Substring or array-element containment.
    #[serde(rename = "contains")]
    Contains,
    /// String prefix.
    #[serde(rename = "starts_with")]
    StartsWith,
    /// Left is null or missing.
    #[serde(rename = "is_null")]
    IsNull,
    /// Left is present and not null.
    #[serde(rename = "is_not_null")]
    IsNotNull,
    /// Left JSON document contains the right one.
    #[serde(rename = "@>")]
    JsonContains,
    /// Left JSON document is contained by the right one.
    #[serde(rename = "<@")]
    JsonContainedBy,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::JsonContains => "@>",
            Self::JsonContainedBy => "<@",
        };
        f.write_str(name)
    }
}

/// A single predicate over one task column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Task column (`priority`, `status`, `hash`, `payload`, ...).
    pub column: String,
    /// Optional `__`-separated path into a JSON column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Comparison operator.
    #[serde(default = "default_operator")]
    pub operator: FilterOperator,
    /// Right-hand operand.
    #[serde(default)]
    pub value: Value,
}

const fn default_operator() -> FilterOperator {
    FilterOperator::Eq
}

/// A combination of filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterRequest {
    /// All filters must match.
    All(Vec<Filter>),
    /// Named groups: `and` (all match), `or` (any matches), `not` (none match).
    Grouped(BTreeMap<String, Vec<Filter>>),
}

impl Filter {
    /// Build a filter.
    pub fn new(
        column: impl Into<String>,
        field: Option<&str>,
        operator: FilterOperator,
        value: Value,
    ) -> Self {
        Self {
            column: column.into(),
            field: field.map(str::to_owned),
            operator,
            value,
        }
    }

    /// Evaluate against an already-serialized task document.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidFilter` for unknown columns, operand
    /// type mismatches, or a non-array operand to `in`/`not_in`.
    pub fn matches_document(&self, document: &Value) -> Result<bool, SchedulerError> {
        let column = document.get(&self.column).ok_or_else(|| {
            SchedulerError::InvalidFilter(format!("unknown column `{}`", self.column))
        })?;
        let left = match self.field.as_deref() {
            Some(path) => resolve_path(column, path).unwrap_or(&Value::Null),
            None => column,
        };
        self.apply(left)
    }

    fn apply(&self, left: &Value) -> Result<bool, SchedulerError> {
        let right = &self.value;
        match self.operator {
            FilterOperator::Eq => Ok(loose_eq(left, right)),
            FilterOperator::Ne => Ok(!loose_eq(left, right)),
            FilterOperator::Gt => self.compare(left, right).map(|o| o.is_some_and(|o| o.is_gt())),
            FilterOperator::Gte => self.compare(left, right).map(|o| o.is_some_and(|o| o.is_ge())),
            FilterOperator::Lt => self.compare(left, right).map(|o| o.is_some_and(|o| o.is_lt())),
            FilterOperator::Lte => self.compare(left, right).map(|o| o.is_some_and(|o| o.is_le())),
            FilterOperator::In | FilterOperator::NotIn => {
                let Value::Array(options) = right else {
                    return Err(self.mismatch("expected an array operand"));
                };
                let found = options.iter().any(|option| loose_eq(left, option));
                Ok(found == (self.operator == FilterOperator::In))
            }
            FilterOperator::Contains => match (left, right) {
                (Value::Null, _) => Ok(false),
                (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
                (Value::Array(items), needle) => Ok(items.iter().any(|item| loose_eq(item, needle))),
                _ => Err(self.mismatch("contains needs a string or array column")),
            },
            FilterOperator::StartsWith => match (left, right) {
                (Value::Null, _) => Ok(false),
                (Value::String(value), Value::String(prefix)) => Ok(value.starts_with(prefix.as_str())),
                _ => Err(self.mismatch("starts_with needs string operands")),
            },
            FilterOperator::IsNull => Ok(left.is_null()),
            FilterOperator::IsNotNull => Ok(!left.is_null()),
            FilterOperator::JsonContains => Ok(json_contains(left, &decode_operand(right))),
            FilterOperator::JsonContainedBy => Ok(json_contains(&decode_operand(right), left)),
        }
    }

    fn compare(&self, left: &Value, right: &Value) -> Result<Option<std::cmp::Ordering>, SchedulerError> {
        match (left, right) {
            (Value::Null, _) => Ok(None),
            (Value::Number(a), Value::Number(b)) => Ok(a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b))),
            (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
            _ => Err(self.mismatch("ordering needs two numbers or two strings")),
        }
    }

    fn mismatch(&self, reason: &str) -> SchedulerError {
        SchedulerError::InvalidFilter(format!(
            "{} {} {}: {reason}",
            self.column_label(),
            self.operator,
            self.value
        ))
    }

    fn column_label(&self) -> String {
        match &self.field {
            Some(field) => format!("{}{PATH_SEPARATOR}{field}", self.column),
            None => self.column.clone(),
        }
    }
}

impl FilterRequest {
    /// Whether the request contains no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::All(filters) => filters.is_empty(),
            Self::Grouped(groups) => groups.values().all(Vec::is_empty),
        }
    }

    /// Evaluate against a task.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidFilter` when a group key is not one of
    /// `and`/`or`/`not` or any predicate fails to evaluate.
    pub fn matches(&self, task: &Task) -> Result<bool, SchedulerError> {
        if self.is_empty() {
            return Ok(true);
        }
        let document = serde_json::to_value(task)
            .map_err(|e| SchedulerError::Backend(format!("task serialization failed: {e}")))?;
        self.matches_document(&document)
    }

    /// Evaluate against an already-serialized task document.
    ///
    /// # Errors
    ///
    /// See [`FilterRequest::matches`].
    pub fn matches_document(&self, document: &Value) -> Result<bool, SchedulerError> {
        match self {
            Self::All(filters) => all_match(filters, document),
            Self::Grouped(groups) => {
                for (combinator, filters) in groups {
                    let holds = match combinator.as_str() {
                        "and" => all_match(filters, document)?,
                        "or" => filters.is_empty() || any_match(filters, document)?,
                        "not" => !any_match(filters, document)?,
                        other => {
                            return Err(SchedulerError::InvalidFilter(format!(
                                "unknown filter combinator `{other}`"
                            )))
                        }
                    };
                    if !holds {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

impl From<Vec<Filter>> for FilterRequest {
    fn from(filters: Vec<Filter>) -> Self {
        Self::All(filters)
    }
}

fn all_match(filters: &[Filter], document: &Value) -> Result<bool, SchedulerError> {
    for filter in filters {
        if !filter.matches_document(document)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_match(filters: &[Filter], document: &Value) -> Result<bool, SchedulerError> {
    for filter in filters {
        if filter.matches_document(document)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Follow a `__`-separated path of object keys (or array indices).
#[must_use]
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Containment operands may arrive JSON-encoded as strings.
fn decode_operand(value: &Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn json_contains(container: &Value, contained: &Value) -> bool {
    match (container, contained) {
        (Value::Object(outer), Value::Object(inner)) => inner
            .iter()
            .all(|(key, value)| outer.get(key).is_some_and(|o| json_contains(o, value))),
        (Value::Array(outer), Value::Array(inner)) => inner
            .iter()
            .all(|value| outer.iter().any(|o| json_contains(o, value))),
        (Value::Array(outer), scalar) => outer.iter().any(|o| loose_eq(o, scalar)),
        _ => loose_eq(container, contained),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskStatus;
    use serde_json::json;

    fn task() -> Task {
        let mut task = Task::new(
            "boefje-acme",
            3,
            json!({
                "boefje": {"id": "dns-records", "version": 2},
                "input_ooi": "Hostname|internet|example.com",
                "network": ["internet"],
            }),
        );
        task.status = TaskStatus::Queued;
        task
    }

    fn parse(value: Value) -> FilterRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_operator_aliases_deserialize() {
        let request = parse(json!([
            {"column": "priority", "operator": "==", "value": 3},
            {"column": "priority", "operator": "<=", "value": 3},
            {"column": "priority", "operator": "!=", "value": 1}
        ]));
        assert!(request.matches(&task()).unwrap());
    }

    #[test]
    fn test_nested_field_path() {
        let request = parse(json!([
            {"column": "payload", "field": "boefje__id", "operator": "eq", "value": "dns-records"},
            {"column": "payload", "field": "boefje__version", "operator": "gt", "value": 1}
        ]));
        assert!(request.matches(&task()).unwrap());

        let missing = parse(json!([
            {"column": "payload", "field": "boefje__missing", "operator": "is_null"}
        ]));
        assert!(missing.matches(&task()).unwrap());
    }

    #[test]
    fn test_grouped_combinators() {
        let request = parse(json!({
            "or": [
                {"column": "priority", "operator": "eq", "value": 1},
                {"column": "payload", "field": "input_ooi", "operator": "starts_with", "value": "Hostname|"}
            ],
            "not": [
                {"column": "status", "operator": "eq", "value": "running"}
            ]
        }));
        assert!(request.matches(&task()).unwrap());

        let negated = parse(json!({"not": [{"column": "queue_id", "operator": "contains", "value": "acme"}]}));
        assert!(!negated.matches(&task()).unwrap());
    }

    #[test]
    fn test_json_containment() {
        let contained_by = parse(json!([
            {"column": "payload", "field": "network", "operator": "<@", "value": "[\"internet\", \"intranet\"]"}
        ]));
        assert!(contained_by.matches(&task()).unwrap());

        let contains = parse(json!([
            {"column": "payload", "operator": "@>", "value": {"boefje": {"id": "dns-records"}}}
        ]));
        assert!(contains.matches(&task()).unwrap());
    }

    #[test]
    fn test_in_requires_array() {
        let request = parse(json!([{"column": "priority", "operator": "in", "value": 3}]));
        let err = request.matches(&task()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidFilter(_)));

        let ok = parse(json!([{"column": "priority", "operator": "not_in", "value": [1, 2]}]));
        assert!(ok.matches(&task()).unwrap());
    }

    #[test]
    fn test_type_mismatch_and_unknown_column() {
        let mismatch = parse(json!([{"column": "priority", "operator": "gt", "value": "high"}]));
        assert!(matches!(mismatch.matches(&task()), Err(SchedulerError::InvalidFilter(_))));

        let unknown = parse(json!([{"column": "colour", "operator": "eq", "value": "red"}]));
        assert!(matches!(unknown.matches(&task()), Err(SchedulerError::InvalidFilter(_))));
    }

    #[test]
    fn test_unknown_operator_rejected_at_parse() {
        let parsed: Result<FilterRequest, _> =
            serde_json::from_value(json!([{"column": "priority", "operator": "~", "value": 1}]));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_resolve_path_indexes_arrays() {
        let value = json!({"a": [{"b": 7}]});
        assert_eq!(resolve_path(&value, "a__0__b"), Some(&json!(7)));
        assert_eq!(resolve_path(&value, "a__5__b"), None);
    }
}
