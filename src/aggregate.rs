//! Grouping and reduction of rows into chart series.
//!
//! Three mutually exclusive strategies, chosen per widget in priority order:
//! - dimension + legend: group by (dimension, legend) and pivot legend values into columns
//! - multiple measures: group by dimension, one column per configured measure
//! - single grouping: one measure (plus optional extra value fields), or pass-through when the
//!   aggregation is `none`

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::model::{Aggregation, MeasureConfig, Widget};
use crate::value::{cell, display_string, group_key, number_value, to_number, to_primitive, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DimensionLegend,
    MultiMeasure,
    Single,
}

/// Pick the aggregation strategy for a widget.
pub fn select_strategy(widget: &Widget) -> Strategy {
    let legend = widget
        .legend_field
        .as_deref()
        .is_some_and(|f| !f.is_empty());
    if legend && widget.measures().len() == 1 {
        return Strategy::DimensionLegend;
    }
    if !widget.measure_list().is_empty() {
        return Strategy::MultiMeasure;
    }
    Strategy::Single
}

/// Grouped rows plus the names of the value columns they carry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregated {
    pub rows: Vec<Row>,
    /// Value columns in emission order (the dimension column is not included).
    pub value_columns: Vec<String>,
    /// Column used by value sorting when a single primary field applies.
    pub primary_column: Option<String>,
}

impl Aggregated {
    /// Column to sort by for a value sort: the primary field, else the first emitted column.
    pub fn value_sort_column(&self) -> Option<&str> {
        self.primary_column
            .as_deref()
            .or_else(|| self.value_columns.first().map(String::as_str))
    }
}

/// Groups in first-seen order, keyed by the raw cell value.
fn group_by<'a>(rows: &'a [Row], field: &str) -> Vec<(Value, Vec<&'a Row>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<&'a Row>)> = Vec::new();
    for row in rows {
        let v = cell(row, field);
        let key = group_key(v);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(key, groups.len());
                groups.push((to_primitive(v), vec![row]));
            }
        }
    }
    groups
}

/// Reduce one group. `sum`/`avg`/`min`/`max` ignore cells that fail numeric coercion and yield
/// `0` when nothing is left; `count` counts rows; `count_distinct` counts distinct non-null raw
/// values.
pub fn reduce(group: &[&Row], field: &str, aggregation: Aggregation) -> Value {
    let numbers = || group.iter().filter_map(|r| to_number(cell(r, field)));
    match aggregation {
        Aggregation::Sum => number_value(numbers().sum()),
        Aggregation::Avg => {
            let (sum, n) = numbers().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 {
                number_value(0.0)
            } else {
                number_value(sum / n as f64)
            }
        }
        Aggregation::Min => number_value(numbers().reduce(f64::min).unwrap_or(0.0)),
        Aggregation::Max => number_value(numbers().reduce(f64::max).unwrap_or(0.0)),
        Aggregation::Count => Value::from(group.len() as u64),
        Aggregation::CountDistinct => {
            let distinct: HashSet<String> = group
                .iter()
                .map(|r| cell(r, field))
                .filter(|v| !v.is_null())
                .map(group_key)
                .collect();
            Value::from(distinct.len() as u64)
        }
        Aggregation::None => group
            .iter()
            .map(|r| cell(r, field))
            .find(|v| !v.is_null())
            .map(to_primitive)
            .unwrap_or(Value::Null),
    }
}

/// Name for a new pivot column that clashes with neither the dimension nor an earlier column.
/// Clashing names get a ` (2)`, ` (3)`, ... suffix.
fn unique_column_name(name: String, dimension: &str, columns: &[String]) -> String {
    let taken = |candidate: &str| candidate == dimension || columns.iter().any(|c| c == candidate);
    if !taken(&name) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{name} ({n})");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Group by `(dimension, legend)`, reduce the measure per pair and pivot legend values into
/// columns. Columns are named by legend alias when one exists; grouping uses the raw value, so
/// distinct legend values whose names collide get distinct suffixed columns.
/// Missing combinations are `0`.
pub fn pivot_by_legend(
    rows: &[Row],
    dimension: &str,
    legend: &str,
    measure: &MeasureConfig,
    aliases: &HashMap<String, String>,
) -> Aggregated {
    let mut columns: Vec<String> = Vec::new();
    let mut column_index: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();

    for (dim_value, members) in group_by(rows, dimension) {
        let owned: Vec<Row> = members.into_iter().cloned().collect();
        let mut row = Row::new();
        row.insert(dimension.to_string(), dim_value);
        let mut cells: Vec<(usize, Value)> = Vec::new();
        for (legend_value, pair) in group_by(&owned, legend) {
            let raw = if legend_value.is_null() {
                "null".to_string()
            } else {
                display_string(&legend_value)
            };
            let key = group_key(&legend_value);
            let idx = *column_index.entry(key).or_insert_with(|| {
                let name = aliases.get(&raw).cloned().unwrap_or(raw);
                let name = unique_column_name(name, dimension, &columns);
                columns.push(name);
                columns.len() - 1
            });
            cells.push((idx, reduce(&pair, &measure.field, measure.aggregation)));
        }
        for (idx, v) in cells {
            row.insert(columns[idx].clone(), v);
        }
        out.push(row);
    }

    // Fill combinations never observed for a dimension value.
    for row in &mut out {
        for name in &columns {
            if !row.contains_key(name) {
                row.insert(name.clone(), number_value(0.0));
            }
        }
    }

    Aggregated {
        rows: out,
        value_columns: columns,
        primary_column: None,
    }
}

/// Output column name for each measure: the field, or `AGG(field)` when the field is configured
/// more than once.
pub fn measure_column_names(measures: &[MeasureConfig]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for m in measures {
        *counts.entry(m.field.as_str()).or_default() += 1;
    }
    measures
        .iter()
        .map(|m| {
            if counts[m.field.as_str()] > 1 {
                format!("{}({})", m.aggregation.as_str(), m.field)
            } else {
                m.field.clone()
            }
        })
        .collect()
}

/// Group by the dimension and reduce every measure independently.
pub fn group_multi_measure(rows: &[Row], dimension: &str, measures: &[MeasureConfig]) -> Aggregated {
    let names = measure_column_names(measures);
    let out = group_by(rows, dimension)
        .into_iter()
        .map(|(dim_value, members)| {
            let mut row = Row::new();
            row.insert(dimension.to_string(), dim_value);
            for (m, name) in measures.iter().zip(&names) {
                row.insert(name.clone(), reduce(&members, &m.field, m.aggregation));
            }
            row
        })
        .collect();
    Aggregated {
        rows: out,
        primary_column: names.first().cloned(),
        value_columns: names,
    }
}

/// Single grouping: reduce `value_field` (and each extra field, merged column-wise) per
/// dimension value. With `Aggregation::None` rows pass through with cells coerced to primitives.
pub fn group_single(
    rows: &[Row],
    dimension: &str,
    value_field: &str,
    extra_fields: &[String],
    aggregation: Aggregation,
) -> Aggregated {
    let mut value_columns = vec![value_field.to_string()];
    for extra in extra_fields {
        if !value_columns.contains(extra) && extra != dimension {
            value_columns.push(extra.clone());
        }
    }

    let out = if aggregation == Aggregation::None {
        rows.iter()
            .map(|r| {
                let mut row = Row::new();
                row.insert(dimension.to_string(), to_primitive(cell(r, dimension)));
                for f in &value_columns {
                    row.insert(f.clone(), to_primitive(cell(r, f)));
                }
                row
            })
            .collect()
    } else {
        group_by(rows, dimension)
            .into_iter()
            .map(|(dim_value, members)| {
                let mut row = Row::new();
                row.insert(dimension.to_string(), dim_value);
                for f in &value_columns {
                    row.insert(f.clone(), reduce(&members, f, aggregation));
                }
                row
            })
            .collect()
    };

    Aggregated {
        rows: out,
        primary_column: Some(value_field.to_string()),
        value_columns,
    }
}

/// Run the strategy selected for `widget` over `rows`, grouped by `dimension`.
/// Returns `None` when no measure is configured.
pub fn aggregate(rows: &[Row], dimension: &str, widget: &Widget) -> Option<Aggregated> {
    match select_strategy(widget) {
        Strategy::DimensionLegend => {
            let measures = widget.measures();
            let legend = widget.legend_field.as_deref()?;
            Some(pivot_by_legend(
                rows,
                dimension,
                legend,
                measures.first()?,
                &widget.legend_aliases,
            ))
        }
        Strategy::MultiMeasure => {
            let measures: Vec<MeasureConfig> =
                widget.measure_list().into_iter().cloned().collect();
            Some(group_multi_measure(rows, dimension, &measures))
        }
        Strategy::Single => {
            let value_field = widget.y_axis.as_deref().filter(|f| !f.is_empty())?;
            Some(group_single(
                rows,
                dimension,
                value_field,
                &widget.extra_value_fields,
                widget.aggregation,
            ))
        }
    }
}
