//! Widget series computation: filter composition, strategy dispatch, sorting and capping.
//!
//! The local path is a pure function of its inputs. The remote path is split in two halves
//! around the accessor call (`remote_query` before, `finish_remote` after) so the async runner
//! owns the I/O.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::aggregate::{aggregate, measure_column_names, pivot_by_legend, select_strategy, Strategy};
use crate::crossfilter::CrossFilterBus;
use crate::dataset::{Dataset, RemoteQuery};
use crate::drilldown::DrillDownState;
use crate::filter::{apply_filters, Filter};
use crate::legend::{display_labels, parse_suffixed};
use crate::model::{Aggregation, GlobalFilter, MeasureConfig, Widget};
use crate::series::{apply_sort, cap_rows, Notice};
use crate::value::Row;

pub const DEFAULT_LOCAL_ROW_CEILING: usize = 50_000;
pub const DEFAULT_SERIES_ITEM_CEILING: usize = 2_000;
pub const DEFAULT_REMOTE_ROW_THRESHOLD: usize = 1_000_000;

/// Policy ceilings applied by every pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Rows kept for grouping on the local path.
    pub local_row_ceiling: usize,
    /// Items kept in the final series.
    pub series_item_ceiling: usize,
    /// Sources larger than this are aggregated remotely.
    pub remote_row_threshold: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            local_row_ceiling: DEFAULT_LOCAL_ROW_CEILING,
            series_item_ceiling: DEFAULT_SERIES_ITEM_CEILING,
            remote_row_threshold: DEFAULT_REMOTE_ROW_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Ready,
    /// Dimension or measure missing. Rendered inline as "axes not configured".
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    pub status: SeriesStatus,
    pub series: Vec<Row>,
    /// Dimension the series is grouped by after drill-down resolution.
    pub dimension: Option<String>,
    pub value_columns: Vec<String>,
    /// Display label per value column.
    pub labels: BTreeMap<String, String>,
    pub notices: Vec<Notice>,
    pub error: Option<String>,
}

impl SeriesResult {
    pub fn not_configured() -> Self {
        Self {
            status: SeriesStatus::NotConfigured,
            series: Vec::new(),
            dimension: None,
            value_columns: Vec::new(),
            labels: BTreeMap::new(),
            notices: Vec::new(),
            error: None,
        }
    }

    /// A run that failed with a widget-scoped message.
    pub fn failed(dimension: Option<String>, error: impl Into<String>) -> Self {
        Self {
            status: SeriesStatus::Ready,
            dimension,
            error: Some(error.into()),
            ..Self::not_configured()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.status == SeriesStatus::Ready
    }
}

/// Active dimension: the drill level's field when drilling, else the configured dimension.
pub fn resolve_dimension(widget: &Widget, drill: Option<&DrillDownState>) -> Option<String> {
    drill
        .and_then(DrillDownState::active_field)
        .or(widget.x_axis.as_deref())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

/// Every filter feeding a widget's run, in application order: local, cross, global, drill.
pub fn compose_filters(
    widget: &Widget,
    cross_filters: &CrossFilterBus,
    global_filters: &[GlobalFilter],
    drill: Option<&DrillDownState>,
) -> Vec<Filter> {
    let mut filters = widget.filters.clone();
    if widget.enable_cross_filter {
        filters.extend(cross_filters.filters_excluding(&widget.id));
    }
    filters.extend(
        global_filters
            .iter()
            .filter(|g| g.applies_to(&widget.id))
            .map(|g| g.filter.clone()),
    );
    if let Some(state) = drill {
        filters.extend(state.filters());
    }
    filters
}

/// Owned snapshot of everything a run needs, captured before any await point.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInputs {
    pub widget: Widget,
    pub source_id: Option<String>,
    pub dimension: Option<String>,
    pub filters: Vec<Filter>,
}

impl PipelineInputs {
    pub fn capture(
        widget: &Widget,
        source_id: Option<String>,
        cross_filters: &CrossFilterBus,
        global_filters: &[GlobalFilter],
        drill: Option<&DrillDownState>,
    ) -> Self {
        Self {
            widget: widget.clone(),
            source_id,
            dimension: resolve_dimension(widget, drill),
            filters: compose_filters(widget, cross_filters, global_filters, drill),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.dimension.is_some() && !self.widget.measures().is_empty()
    }
}

/// Compute a widget's series locally from a full dataset snapshot.
pub fn compute_series(
    widget: &Widget,
    dataset: &Dataset,
    cross_filters: &CrossFilterBus,
    global_filters: &[GlobalFilter],
    drill: Option<&DrillDownState>,
    limits: &Limits,
) -> SeriesResult {
    let inputs = PipelineInputs::capture(
        widget,
        widget.data_source_id.clone(),
        cross_filters,
        global_filters,
        drill,
    );
    run_local(&inputs, dataset, limits)
}

pub fn run_local(inputs: &PipelineInputs, dataset: &Dataset, limits: &Limits) -> SeriesResult {
    let Some(dimension) = inputs.dimension.as_deref().filter(|_| inputs.is_configured()) else {
        debug!(widget = %inputs.widget.id, "axes not configured");
        return SeriesResult::not_configured();
    };
    let widget = &inputs.widget;

    let mut rows = apply_filters(dataset.rows.clone(), &inputs.filters);
    debug!(
        widget = %widget.id,
        input = dataset.rows.len(),
        kept = rows.len(),
        filters = inputs.filters.len(),
        "filters applied"
    );

    let mut notices = Vec::new();
    if let Some(total) = cap_rows(&mut rows, limits.local_row_ceiling) {
        info!(widget = %widget.id, total, shown = rows.len(), "input sampled before grouping");
        notices.push(Notice::Sampled {
            shown: rows.len(),
            total,
        });
    }

    let Some(aggregated) = aggregate(&rows, dimension, widget) else {
        return SeriesResult::not_configured();
    };
    let strategy = select_strategy(widget);
    let value_sort = aggregated.value_sort_column().map(str::to_string);
    finish(
        widget,
        dimension,
        strategy,
        aggregated.rows,
        aggregated.value_columns,
        value_sort,
        notices,
        limits,
    )
}

#[allow(clippy::too_many_arguments)]
fn finish(
    widget: &Widget,
    dimension: &str,
    strategy: Strategy,
    mut series: Vec<Row>,
    value_columns: Vec<String>,
    value_sort: Option<String>,
    mut notices: Vec<Notice>,
    limits: &Limits,
) -> SeriesResult {
    apply_sort(
        &mut series,
        widget.sort.as_ref(),
        dimension,
        value_sort.as_deref(),
    );
    if let Some(total) = cap_rows(&mut series, limits.series_item_ceiling) {
        info!(widget = %widget.id, total, shown = series.len(), "series truncated");
        notices.push(Notice::Truncated {
            shown: series.len(),
            total,
        });
    }

    // Pivoted legend columns are already named by alias.
    let labels = if strategy == Strategy::DimensionLegend {
        value_columns.iter().map(|c| (c.clone(), c.clone())).collect()
    } else {
        display_labels(&value_columns, &widget.measures())
    };

    SeriesResult {
        status: SeriesStatus::Ready,
        series,
        dimension: Some(dimension.to_string()),
        value_columns,
        labels,
        notices,
        error: None,
    }
}

/// Measures requested from a remote aggregation service.
pub fn remote_measures(widget: &Widget) -> Vec<MeasureConfig> {
    let listed = widget.measure_list();
    if !listed.is_empty() {
        return listed.into_iter().cloned().collect();
    }
    let Some(primary) = widget.y_axis.as_deref().filter(|f| !f.is_empty()) else {
        return Vec::new();
    };
    let mut measures = vec![MeasureConfig::new(primary, widget.aggregation)];
    for extra in &widget.extra_value_fields {
        if measures.iter().all(|m| &m.field != extra) {
            measures.push(MeasureConfig::new(extra.clone(), widget.aggregation));
        }
    }
    measures
}

/// Build the remote request. `None` when the widget is not configured.
pub fn remote_query(inputs: &PipelineInputs, limits: &Limits) -> Option<RemoteQuery> {
    let dimension = inputs.dimension.clone().filter(|_| inputs.is_configured())?;
    let widget = &inputs.widget;
    let mut dimensions = vec![dimension];
    if select_strategy(widget) == Strategy::DimensionLegend {
        if let Some(legend) = widget.legend_field.clone() {
            dimensions.push(legend);
        }
    }
    Some(RemoteQuery {
        dimensions,
        measures: remote_measures(widget),
        filters: inputs.filters.clone(),
        limit: limits.local_row_ceiling,
    })
}

/// Rename `field_AGGREGATION` columns to the names the local path would emit. Columns that do
/// not parse, or that match no measure, keep their name.
pub fn rename_remote_columns(rows: Vec<Row>, measures: &[MeasureConfig]) -> Vec<Row> {
    let names = measure_column_names(measures);
    let target = |column: &str| -> Option<&String> {
        let (agg, field) = parse_suffixed(column)?;
        measures
            .iter()
            .zip(&names)
            .find(|(m, _)| m.field == field && m.aggregation == agg)
            .map(|(_, name)| name)
    };
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, v)| match target(&k) {
                    Some(name) => (name.clone(), v),
                    None => (k, v),
                })
                .collect()
        })
        .collect()
}

/// Turn pre-aggregated remote rows into a series. Grouping is trusted; only the legend pivot,
/// sorting and item capping run locally.
pub fn finish_remote(inputs: &PipelineInputs, rows: Vec<Row>, limits: &Limits) -> SeriesResult {
    let Some(dimension) = inputs.dimension.as_deref().filter(|_| inputs.is_configured()) else {
        return SeriesResult::not_configured();
    };
    let widget = &inputs.widget;
    let measures = remote_measures(widget);
    let rows = rename_remote_columns(rows, &measures);
    let names = measure_column_names(&measures);
    let strategy = select_strategy(widget);
    debug!(widget = %widget.id, rows = rows.len(), "remote rows received");

    let (series, value_columns, value_sort) = match (strategy, widget.legend_field.as_deref()) {
        (Strategy::DimensionLegend, Some(legend)) => {
            // One row per (dimension, legend) pair already; summing a single value keeps it.
            let measure = MeasureConfig::new(
                names.first().cloned().unwrap_or_default(),
                Aggregation::Sum,
            );
            let pivoted =
                pivot_by_legend(&rows, dimension, legend, &measure, &widget.legend_aliases);
            let sort = pivoted.value_sort_column().map(str::to_string);
            (pivoted.rows, pivoted.value_columns, sort)
        }
        _ => {
            let sort = names.first().cloned();
            (rows, names, sort)
        }
    };

    finish(
        widget,
        dimension,
        strategy,
        series,
        value_columns,
        value_sort,
        Vec::new(),
        limits,
    )
}
