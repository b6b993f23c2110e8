//! Polars-backed dataset accessor.
//!
//! Sources are registered as `LazyFrame`s. The local path collects a frame into rows; the
//! remote path pushes filters and grouping into the lazy plan and only collects the groups.

use async_trait::async_trait;
use polars::prelude::*;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::dataset::{
    remote_column_name, ColumnKind, ColumnSchema, Dataset, DatasetAccessor, RemoteQuery,
    SourceInfo,
};
use crate::error::SourceError;
use crate::filter::{Filter, FilterOperator};
use crate::model::{Aggregation, MeasureConfig};
use crate::value::{display_string, number_value, to_number, Row};

/// Accessor over registered polars frames.
#[derive(Default, Clone)]
pub struct FrameAccessor {
    frames: HashMap<String, LazyFrame>,
    remote_only: HashSet<String>,
}

impl FrameAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source_id: impl Into<String>, lf: LazyFrame) {
        self.frames.insert(source_id.into(), lf);
    }

    pub fn register_frame(&mut self, source_id: impl Into<String>, df: DataFrame) {
        self.register(source_id, df.lazy());
    }

    /// Register a CSV file with a header row.
    pub fn register_csv(
        &mut self,
        source_id: impl Into<String>,
        path: &Path,
    ) -> Result<(), SourceError> {
        if !path.exists() {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }
        let pl_path = PlPath::Local(Arc::from(path));
        let lf = LazyCsvReader::new(pl_path).with_has_header(true).finish()?;
        self.register(source_id, lf);
        Ok(())
    }

    /// Always aggregate this source remotely, whatever its size.
    pub fn mark_remote(&mut self, source_id: impl Into<String>) {
        self.remote_only.insert(source_id.into());
    }

    pub fn source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.frames.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    fn frame(&self, source_id: &str) -> Result<LazyFrame, SourceError> {
        self.frames
            .get(source_id)
            .cloned()
            .ok_or_else(|| SourceError::UnknownSource(source_id.to_string()))
    }
}

/// Run a blocking polars computation off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SourceError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SourceError::Other(format!("polars task failed: {}", e)))?
}

fn column_kind(dtype: &DataType) -> ColumnKind {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => ColumnKind::Number,
        DataType::String => ColumnKind::String,
        DataType::Boolean => ColumnKind::Boolean,
        dt if dt.is_temporal() => ColumnKind::Date,
        _ => ColumnKind::Other,
    }
}

fn schema_of(lf: &mut LazyFrame) -> Result<Vec<ColumnSchema>, SourceError> {
    let schema = lf.collect_schema()?;
    Ok(schema
        .iter()
        .map(|(name, dtype)| ColumnSchema::new(name.to_string(), column_kind(dtype)))
        .collect())
}

fn row_count(lf: &LazyFrame) -> Result<usize, SourceError> {
    let count_df = lf.clone().select([len()]).collect()?;
    let n = match count_df.get_columns().first() {
        Some(c) => c.get(0)?.extract::<usize>().unwrap_or(0),
        None => 0,
    };
    Ok(n)
}

/// Convert one polars cell to a JSON scalar.
pub fn any_value_to_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => Value::from(*v),
        AnyValue::Int16(v) => Value::from(*v),
        AnyValue::Int32(v) => Value::from(*v),
        AnyValue::Int64(v) => Value::from(*v),
        AnyValue::UInt8(v) => Value::from(*v),
        AnyValue::UInt16(v) => Value::from(*v),
        AnyValue::UInt32(v) => Value::from(*v),
        AnyValue::UInt64(v) => Value::from(*v),
        AnyValue::Float32(v) => number_value(f64::from(*v)),
        AnyValue::Float64(v) => number_value(*v),
        other => Value::String(other.str_value().to_string()),
    }
}

/// Materialize a frame as rows, preserving column order.
pub fn frame_to_rows(df: &DataFrame) -> Result<Vec<Row>, SourceError> {
    let columns = df.get_columns();
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Row::new();
        for column in columns {
            row.insert(column.name().to_string(), any_value_to_json(&column.get(i)?));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn text(field: &str) -> Expr {
    col(field).cast(DataType::String)
}

fn numeric(field: &str) -> Expr {
    col(field).cast(DataType::Float64)
}

/// Equality with the row evaluator's coercion: numeric when the operand is numeric (cells
/// that do not parse become null), otherwise on the string form.
fn equals_expr(field: &str, operand: &Value) -> Expr {
    if operand.is_null() {
        return col(field).is_null();
    }
    match to_number(operand) {
        Some(n) => numeric(field).eq(lit(n)),
        None => text(field).eq(lit(display_string(operand))),
    }
}

fn compare_expr(field: &str, operand: &Value, op: fn(Expr, Expr) -> Expr) -> Expr {
    match to_number(operand) {
        Some(n) => op(numeric(field), lit(n)),
        None => lit(false),
    }
}

/// Compile a filter into a polars predicate.
pub fn filter_expr(filter: &Filter) -> Expr {
    let field = filter.field.as_str();
    match filter.operator {
        FilterOperator::Equals => equals_expr(field, &filter.value).fill_null(lit(false)),
        FilterOperator::NotEquals => equals_expr(field, &filter.value)
            .fill_null(lit(false))
            .not(),
        FilterOperator::GreaterThan => compare_expr(field, &filter.value, Expr::gt),
        FilterOperator::GreaterThanOrEqual => compare_expr(field, &filter.value, Expr::gt_eq),
        FilterOperator::LessThan => compare_expr(field, &filter.value, Expr::lt),
        FilterOperator::LessThanOrEqual => compare_expr(field, &filter.value, Expr::lt_eq),
        FilterOperator::Between => match (to_number(&filter.value), to_number(&filter.value2)) {
            (Some(lo), Some(hi)) => numeric(field)
                .gt_eq(lit(lo))
                .and(numeric(field).lt_eq(lit(hi))),
            _ => lit(false),
        },
        FilterOperator::Contains => text(field)
            .str()
            .contains_literal(lit(display_string(&filter.value))),
        FilterOperator::StartsWith => text(field)
            .str()
            .starts_with(lit(display_string(&filter.value))),
        FilterOperator::EndsWith => text(field)
            .str()
            .ends_with(lit(display_string(&filter.value))),
        FilterOperator::In => filter
            .value_set()
            .iter()
            .map(|v| equals_expr(field, v).fill_null(lit(false)))
            .reduce(Expr::or)
            .unwrap_or_else(|| lit(false)),
        FilterOperator::IsNull => col(field).is_null(),
        FilterOperator::IsNotNull => col(field).is_not_null(),
    }
}

/// Conjunction of every filter, or `None` for an empty list.
pub fn filters_expr(filters: &[Filter]) -> Option<Expr> {
    filters.iter().map(filter_expr).reduce(Expr::and)
}

fn measure_expr(measure: &MeasureConfig) -> Expr {
    let field = measure.field.as_str();
    let expr = match measure.aggregation {
        Aggregation::Sum => numeric(field).sum().fill_null(lit(0.0)),
        Aggregation::Avg => numeric(field).mean().fill_null(lit(0.0)),
        Aggregation::Min => numeric(field).min().fill_null(lit(0.0)),
        Aggregation::Max => numeric(field).max().fill_null(lit(0.0)),
        Aggregation::Count => len(),
        Aggregation::CountDistinct => col(field).drop_nulls().n_unique(),
        Aggregation::None => col(field).drop_nulls().first(),
    };
    expr.alias(remote_column_name(measure))
}

/// Build the lazy plan answering a remote query.
pub fn remote_plan(lf: LazyFrame, query: &RemoteQuery) -> Result<LazyFrame, SourceError> {
    if query.dimensions.is_empty() {
        return Err(SourceError::Other("remote query has no dimension".into()));
    }
    let mut lf = lf;
    if let Some(predicate) = filters_expr(&query.filters) {
        lf = lf.filter(predicate);
    }
    let mut seen = HashSet::new();
    let aggs: Vec<Expr> = query
        .measures
        .iter()
        .filter(|m| seen.insert(remote_column_name(m)))
        .map(measure_expr)
        .collect();
    let keys: Vec<Expr> = query.dimensions.iter().map(|d| col(d.as_str())).collect();
    let limit = IdxSize::try_from(query.limit).unwrap_or(IdxSize::MAX);
    Ok(lf.group_by_stable(keys).agg(aggs).limit(limit))
}

#[async_trait]
impl DatasetAccessor for FrameAccessor {
    async fn describe(&self, source_id: &str) -> Result<SourceInfo, SourceError> {
        let mut lf = self.frame(source_id)?;
        let remote_only = self.remote_only.contains(source_id);
        blocking(move || {
            let schema = schema_of(&mut lf)?;
            Ok(SourceInfo {
                total_row_count: row_count(&lf)?,
                schema,
                remote_only,
            })
        })
        .await
    }

    async fn get_dataset(&self, source_id: &str) -> Result<Dataset, SourceError> {
        let mut lf = self.frame(source_id)?;
        let id = source_id.to_string();
        blocking(move || {
            let schema = schema_of(&mut lf)?;
            let df = lf.collect()?;
            let rows = frame_to_rows(&df)?;
            debug!(source = %id, rows = rows.len(), "dataset collected");
            Ok(Dataset::new(rows, schema))
        })
        .await
    }

    async fn get_remote_aggregate(
        &self,
        source_id: &str,
        query: &RemoteQuery,
    ) -> Result<Vec<Row>, SourceError> {
        let plan = remote_plan(self.frame(source_id)?, query)?;
        let id = source_id.to_string();
        blocking(move || {
            let df = plan.collect()?;
            debug!(source = %id, groups = df.height(), "remote aggregate collected");
            frame_to_rows(&df)
        })
        .await
    }
}
