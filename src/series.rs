//! Post-processing shared by every aggregation strategy: sorting and safety caps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::model::{SortDirection, SortKey, SortSpec};
use crate::value::{cell, display_string, Row};

/// Informational note attached to a result. Never blocks rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Input rows exceeded the local processing ceiling and were truncated before grouping.
    Sampled { shown: usize, total: usize },
    /// The aggregated series exceeded the item ceiling and was truncated.
    Truncated { shown: usize, total: usize },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::Sampled { shown, total } => format!(
                "Showing a sample: the first {} of {} rows were used for this view.",
                shown, total
            ),
            Notice::Truncated { shown, total } => {
                format!("Showing the first {} items of {}.", shown, total)
            }
        }
    }
}

/// Compare two non-null cells: numerically when both are numbers, otherwise by string form.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => display_string(a).cmp(&display_string(b)),
    }
}

/// Stable sort by `field`. Null (or missing) cells sort last in both directions.
pub fn sort_rows(rows: &mut [Row], field: &str, direction: SortDirection) {
    rows.sort_by(|ra, rb| {
        let (a, b) = (cell(ra, field), cell(rb, field));
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare_values(a, b);
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    });
}

/// Resolve the column a sort spec refers to.
pub fn sort_column<'a>(
    spec: &SortSpec,
    dimension: &'a str,
    value_column: Option<&'a str>,
) -> Option<&'a str> {
    match spec.key {
        SortKey::Category => Some(dimension),
        SortKey::Value => value_column,
    }
}

/// Apply a sort spec. No-op when the rows are empty or no column resolves.
pub fn apply_sort(
    rows: &mut [Row],
    spec: Option<&SortSpec>,
    dimension: &str,
    value_column: Option<&str>,
) {
    let Some(spec) = spec else {
        return;
    };
    if rows.is_empty() {
        return;
    }
    if let Some(column) = sort_column(spec, dimension, value_column) {
        sort_rows(rows, column, spec.direction);
    }
}

/// Keep the first `ceiling` rows. Returns the original length when truncation happened.
pub fn cap_rows<T>(rows: &mut Vec<T>, ceiling: usize) -> Option<usize> {
    let total = rows.len();
    if total > ceiling {
        rows.truncate(ceiling);
        Some(total)
    } else {
        None
    }
}
