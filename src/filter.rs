use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{cell, display_string, loose_eq, to_number, Row};

#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    Contains,
    StartsWith,
    EndsWith,
    In,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "=",
            FilterOperator::NotEquals => "!=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::Between => "between",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "starts with",
            FilterOperator::EndsWith => "ends with",
            FilterOperator::In => "in",
            FilterOperator::IsNull => "is null",
            FilterOperator::IsNotNull => "is not null",
        }
    }

    pub fn iterator() -> impl Iterator<Item = FilterOperator> {
        [
            FilterOperator::Equals,
            FilterOperator::NotEquals,
            FilterOperator::GreaterThan,
            FilterOperator::GreaterThanOrEqual,
            FilterOperator::LessThan,
            FilterOperator::LessThanOrEqual,
            FilterOperator::Between,
            FilterOperator::Contains,
            FilterOperator::StartsWith,
            FilterOperator::EndsWith,
            FilterOperator::In,
            FilterOperator::IsNull,
            FilterOperator::IsNotNull,
        ]
        .iter()
        .copied()
    }
}

/// A single filter condition. `value2` is the upper bound of `between`; `values` is the set for `in`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value2: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            values: Vec::new(),
            value2: Value::Null,
        }
    }

    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Equals, value)
    }

    pub fn between(field: impl Into<String>, low: Value, high: Value) -> Self {
        Self {
            value2: high,
            ..Self::new(field, FilterOperator::Between, low)
        }
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            values,
            ..Self::new(field, FilterOperator::In, Value::Null)
        }
    }

    /// The value set for `in`: `values`, or `value` when it holds an array.
    pub fn value_set(&self) -> &[Value] {
        if !self.values.is_empty() {
            return &self.values;
        }
        match &self.value {
            Value::Array(items) => items.as_slice(),
            _ => &[],
        }
    }
}

fn compare_numeric(cell: &Value, operand: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (to_number(cell), to_number(operand)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Evaluate one filter against a row. Unknown fields are null.
pub fn matches(row: &Row, filter: &Filter) -> bool {
    let v = cell(row, &filter.field);
    match filter.operator {
        FilterOperator::Equals => loose_eq(v, &filter.value),
        FilterOperator::NotEquals => !loose_eq(v, &filter.value),
        FilterOperator::GreaterThan => compare_numeric(v, &filter.value, |a, b| a > b),
        FilterOperator::GreaterThanOrEqual => compare_numeric(v, &filter.value, |a, b| a >= b),
        FilterOperator::LessThan => compare_numeric(v, &filter.value, |a, b| a < b),
        FilterOperator::LessThanOrEqual => compare_numeric(v, &filter.value, |a, b| a <= b),
        FilterOperator::Between => {
            match (to_number(v), to_number(&filter.value), to_number(&filter.value2)) {
                (Some(x), Some(lo), Some(hi)) => lo <= x && x <= hi,
                _ => false,
            }
        }
        FilterOperator::Contains => {
            !v.is_null() && display_string(v).contains(&display_string(&filter.value))
        }
        FilterOperator::StartsWith => {
            !v.is_null() && display_string(v).starts_with(&display_string(&filter.value))
        }
        FilterOperator::EndsWith => {
            !v.is_null() && display_string(v).ends_with(&display_string(&filter.value))
        }
        FilterOperator::In => filter.value_set().iter().any(|candidate| loose_eq(v, candidate)),
        FilterOperator::IsNull => v.is_null(),
        FilterOperator::IsNotNull => !v.is_null(),
    }
}

/// Rows for which every filter matches. An empty filter list returns the rows unchanged.
pub fn apply_filters(rows: Vec<Row>, filters: &[Filter]) -> Vec<Row> {
    if filters.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| filters.iter().all(|f| matches(row, f)))
        .collect()
}
