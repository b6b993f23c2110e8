//! Dataset snapshots and the accessor boundary the pipeline consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::aggregate::group_multi_measure;
use crate::error::SourceError;
use crate::filter::{apply_filters, Filter};
use crate::model::MeasureConfig;
use crate::value::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnKind {
    Number,
    String,
    Date,
    Boolean,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Immutable snapshot of a source's rows for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub rows: Vec<Row>,
    pub schema: Vec<ColumnSchema>,
    /// Row count of the whole source; may exceed `rows.len()` when the accessor returned a slice.
    pub total_row_count: usize,
}

impl Dataset {
    pub fn new(rows: Vec<Row>, schema: Vec<ColumnSchema>) -> Self {
        let total_row_count = rows.len();
        Self {
            rows,
            schema,
            total_row_count,
        }
    }

    /// Build a dataset from rows, inferring a schema from the first non-null cell per column.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut schema: Vec<ColumnSchema> = Vec::new();
        for row in &rows {
            for (name, value) in row {
                if schema.iter().any(|c| &c.name == name) || value.is_null() {
                    continue;
                }
                let kind = match value {
                    serde_json::Value::Number(_) => ColumnKind::Number,
                    serde_json::Value::String(_) => ColumnKind::String,
                    serde_json::Value::Bool(_) => ColumnKind::Boolean,
                    _ => ColumnKind::Other,
                };
                schema.push(ColumnSchema::new(name.clone(), kind));
            }
        }
        Self::new(rows, schema)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.schema.iter().find(|c| c.name == name)
    }
}

/// Size and shape of a source without loading its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub total_row_count: usize,
    pub schema: Vec<ColumnSchema>,
    /// The source only supports remote aggregation regardless of size.
    pub remote_only: bool,
}

/// Request for server-side aggregation of a large source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteQuery {
    pub dimensions: Vec<String>,
    pub measures: Vec<MeasureConfig>,
    pub filters: Vec<Filter>,
    pub limit: usize,
}

/// Column name a remote aggregation service uses for a measure: `field_AGGREGATION`.
pub fn remote_column_name(measure: &MeasureConfig) -> String {
    format!("{}_{}", measure.field, measure.aggregation.as_str())
}

/// Supplies datasets by data-source id.
#[async_trait]
pub trait DatasetAccessor: Send + Sync {
    async fn describe(&self, source_id: &str) -> Result<SourceInfo, SourceError>;

    async fn get_dataset(&self, source_id: &str) -> Result<Dataset, SourceError>;

    /// Rows already filtered and aggregated, one column per dimension plus one
    /// `field_AGGREGATION` column per measure.
    async fn get_remote_aggregate(
        &self,
        source_id: &str,
        query: &RemoteQuery,
    ) -> Result<Vec<Row>, SourceError>;
}

/// Accessor over datasets held in memory. Remote queries are answered locally with the same
/// column naming a remote service uses.
#[derive(Debug, Default, Clone)]
pub struct MemoryAccessor {
    datasets: HashMap<String, Dataset>,
    remote_only: Vec<String>,
}

impl MemoryAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_id: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(source_id.into(), dataset);
    }

    pub fn with_dataset(mut self, source_id: impl Into<String>, dataset: Dataset) -> Self {
        self.insert(source_id, dataset);
        self
    }

    /// Mark a source as too large for local processing.
    pub fn mark_remote(&mut self, source_id: impl Into<String>) {
        self.remote_only.push(source_id.into());
    }

    fn lookup(&self, source_id: &str) -> Result<&Dataset, SourceError> {
        self.datasets
            .get(source_id)
            .ok_or_else(|| SourceError::UnknownSource(source_id.to_string()))
    }
}

#[async_trait]
impl DatasetAccessor for MemoryAccessor {
    async fn describe(&self, source_id: &str) -> Result<SourceInfo, SourceError> {
        let ds = self.lookup(source_id)?;
        Ok(SourceInfo {
            total_row_count: ds.total_row_count,
            schema: ds.schema.clone(),
            remote_only: self.remote_only.iter().any(|s| s == source_id),
        })
    }

    async fn get_dataset(&self, source_id: &str) -> Result<Dataset, SourceError> {
        self.lookup(source_id).cloned()
    }

    async fn get_remote_aggregate(
        &self,
        source_id: &str,
        query: &RemoteQuery,
    ) -> Result<Vec<Row>, SourceError> {
        let ds = self.lookup(source_id)?;
        let rows = apply_filters(ds.rows.clone(), &query.filters);
        let Some((first, rest)) = query.dimensions.split_first() else {
            return Err(SourceError::Other("remote query has no dimension".into()));
        };

        // Composite key so several dimensions group together.
        const KEY: &str = "\u{0}group";
        let keyed: Vec<Row> = rows
            .into_iter()
            .map(|mut r| {
                let mut parts = vec![crate::value::group_key(crate::value::cell(&r, first))];
                parts.extend(rest.iter().map(|d| crate::value::group_key(crate::value::cell(&r, d))));
                r.insert(KEY.to_string(), serde_json::Value::String(parts.join("\u{1}")));
                r
            })
            .collect();

        let grouped = group_multi_measure(&keyed, KEY, &query.measures);
        let names = crate::aggregate::measure_column_names(&query.measures);
        let mut out = Vec::with_capacity(grouped.rows.len());
        for row in grouped.rows {
            let key = row.get(KEY).and_then(|v| v.as_str()).unwrap_or_default();
            let Some(sample) = keyed
                .iter()
                .find(|r| r.get(KEY).and_then(|v| v.as_str()) == Some(key))
            else {
                continue;
            };
            let mut remote = Row::new();
            for d in &query.dimensions {
                remote.insert(d.clone(), crate::value::cell(sample, d).clone());
            }
            for (m, name) in query.measures.iter().zip(&names) {
                remote.insert(
                    remote_column_name(m),
                    row.get(name).cloned().unwrap_or_default(),
                );
            }
            out.push(remote);
        }
        out.truncate(query.limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Aggregation;
    use serde_json::json;

    fn rows(v: serde_json::Value) -> Vec<Row> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_from_rows_infers_schema() {
        let ds = Dataset::from_rows(rows(json!([
            {"a": null, "b": "x"}, {"a": 1, "b": "y"}
        ])));
        assert_eq!(ds.column("a").unwrap().kind, ColumnKind::Number);
        assert_eq!(ds.column("b").unwrap().kind, ColumnKind::String);
        assert_eq!(ds.total_row_count, 2);
    }

    #[tokio::test]
    async fn test_memory_remote_aggregate_names_columns() {
        let accessor = MemoryAccessor::new().with_dataset(
            "s",
            Dataset::from_rows(rows(json!([
                {"cat": "A", "val": 1}, {"cat": "A", "val": 2}, {"cat": "B", "val": 5}
            ]))),
        );
        let query = RemoteQuery {
            dimensions: vec!["cat".into()],
            measures: vec![MeasureConfig::new("val", Aggregation::Sum)],
            filters: Vec::new(),
            limit: 10,
        };
        let out = accessor.get_remote_aggregate("s", &query).await.unwrap();
        assert_eq!(
            out,
            rows(json!([{"cat": "A", "val_SUM": 3}, {"cat": "B", "val_SUM": 5}]))
        );
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let accessor = MemoryAccessor::new();
        assert!(matches!(
            accessor.get_dataset("nope").await,
            Err(SourceError::UnknownSource(_))
        ));
    }
}
