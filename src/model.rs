//! Dashboard entity graph: dashboards own pages, pages own widgets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::filter::Filter;
use crate::layout::GridBox;

pub type WidgetId = String;
pub type PageId = String;
pub type DashboardId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Aggregation {
    #[default]
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    None,
}

impl Aggregation {
    pub const ALL: [Self; 7] = [
        Self::Sum,
        Self::Avg,
        Self::Min,
        Self::Max,
        Self::Count,
        Self::CountDistinct,
        Self::None,
    ];

    /// Upper-case token used in `AGG(field)` and `field_AGG` column names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count => "COUNT",
            Self::CountDistinct => "COUNT_DISTINCT",
            Self::None => "NONE",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(token))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AxisSide {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureConfig {
    pub field: String,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub axis_side: AxisSide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl MeasureConfig {
    pub fn new(field: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            field: field.into(),
            aggregation,
            axis_side: AxisSide::Left,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Area,
    Pie,
    Scatter,
    Combo,
    Table,
    Kpi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Category,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: WidgetId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub chart_kind: ChartKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
    /// Primary dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend_field: Option<String>,
    /// Raw legend value to display name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub legend_aliases: HashMap<String, String>,
    /// Primary value field for single grouping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Additional value fields aggregated alongside `y_axis`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_value_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bar_measures: Vec<MeasureConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_measures: Vec<MeasureConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drill_down_hierarchy: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    #[serde(default = "default_true")]
    pub enable_cross_filter: bool,
    #[serde(default)]
    pub grid: GridBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Widget {
    pub fn new(id: impl Into<WidgetId>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            chart_kind: ChartKind::default(),
            data_source_id: None,
            x_axis: None,
            legend_field: None,
            legend_aliases: HashMap::new(),
            y_axis: None,
            aggregation: Aggregation::default(),
            extra_value_fields: Vec::new(),
            bar_measures: Vec::new(),
            line_measures: Vec::new(),
            filters: Vec::new(),
            drill_down_hierarchy: Vec::new(),
            sort: None,
            enable_cross_filter: true,
            grid: GridBox::new(0, 0, 4, 3),
            group_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Measures configured through the bar/line lists, in bar-then-line order.
    pub fn measure_list(&self) -> Vec<&MeasureConfig> {
        self.bar_measures
            .iter()
            .chain(self.line_measures.iter())
            .collect()
    }

    /// Every configured measure: the bar/line lists when present, else `y_axis` with the
    /// widget aggregation.
    pub fn measures(&self) -> Vec<MeasureConfig> {
        let listed = self.measure_list();
        if !listed.is_empty() {
            return listed.into_iter().cloned().collect();
        }
        self.y_axis
            .iter()
            .map(|f| MeasureConfig::new(f.clone(), self.aggregation))
            .collect()
    }

    pub fn has_hierarchy(&self) -> bool {
        !self.drill_down_hierarchy.is_empty()
    }
}

/// Reads a present field as `Some(value)`, so an explicit `null` becomes `Some(None)`. A missing
/// field falls back to the container default of `None`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial widget update. `None` (field absent) leaves a field untouched; the double options
/// clear optional fields with `Some(None)`, written as an explicit `null` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetPatch {
    pub title: Option<String>,
    pub chart_kind: Option<ChartKind>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<Option<String>>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<Option<String>>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub legend_field: Option<Option<String>>,
    pub legend_aliases: Option<HashMap<String, String>>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<Option<String>>,
    pub aggregation: Option<Aggregation>,
    pub extra_value_fields: Option<Vec<String>>,
    pub bar_measures: Option<Vec<MeasureConfig>>,
    pub line_measures: Option<Vec<MeasureConfig>>,
    pub filters: Option<Vec<Filter>>,
    pub drill_down_hierarchy: Option<Vec<String>>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub sort: Option<Option<SortSpec>>,
    pub enable_cross_filter: Option<bool>,
    pub grid: Option<GridBox>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Option<String>>,
}

impl WidgetPatch {
    /// Apply to a widget. Returns true when the drill-down hierarchy changed.
    pub fn apply_to(self, widget: &mut Widget) -> bool {
        let mut hierarchy_changed = false;
        if let Some(v) = self.title {
            widget.title = v;
        }
        if let Some(v) = self.chart_kind {
            widget.chart_kind = v;
        }
        if let Some(v) = self.data_source_id {
            widget.data_source_id = v;
        }
        if let Some(v) = self.x_axis {
            widget.x_axis = v;
        }
        if let Some(v) = self.legend_field {
            widget.legend_field = v;
        }
        if let Some(v) = self.legend_aliases {
            widget.legend_aliases = v;
        }
        if let Some(v) = self.y_axis {
            widget.y_axis = v;
        }
        if let Some(v) = self.aggregation {
            widget.aggregation = v;
        }
        if let Some(v) = self.extra_value_fields {
            widget.extra_value_fields = v;
        }
        if let Some(v) = self.bar_measures {
            widget.bar_measures = v;
        }
        if let Some(v) = self.line_measures {
            widget.line_measures = v;
        }
        if let Some(v) = self.filters {
            widget.filters = v;
        }
        if let Some(v) = self.drill_down_hierarchy {
            hierarchy_changed = v != widget.drill_down_hierarchy;
            widget.drill_down_hierarchy = v;
        }
        if let Some(v) = self.sort {
            widget.sort = v;
        }
        if let Some(v) = self.enable_cross_filter {
            widget.enable_cross_filter = v;
        }
        if let Some(v) = self.grid {
            widget.grid = v;
        }
        if let Some(v) = self.group_id {
            widget.group_id = v;
        }
        hierarchy_changed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: PageId,
    #[serde(default)]
    pub name: String,
    /// Overrides every widget's data source on this page when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(id: impl Into<PageId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_source_id: None,
            widgets: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn boxes_except(&self, widget_id: Option<&str>) -> Vec<GridBox> {
        self.widgets
            .iter()
            .filter(|w| Some(w.id.as_str()) != widget_id)
            .map(|w| w.grid)
            .collect()
    }

    /// Data source for a widget on this page: the page override, else the widget's own.
    pub fn resolve_source<'a>(&'a self, widget: &'a Widget) -> Option<&'a str> {
        self.data_source_id
            .as_deref()
            .or(widget.data_source_id.as_deref())
    }
}

/// Dashboard-wide filter. An empty target list applies to every widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalFilter {
    pub id: String,
    pub filter: Filter,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_widget_ids: Vec<WidgetId>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl GlobalFilter {
    pub fn new(id: impl Into<String>, filter: Filter) -> Self {
        Self {
            id: id.into(),
            filter,
            target_widget_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn targeting(mut self, widget_ids: Vec<WidgetId>) -> Self {
        self.target_widget_ids = widget_ids;
        self
    }

    pub fn applies_to(&self, widget_id: &str) -> bool {
        self.target_widget_ids.is_empty() || self.target_widget_ids.iter().any(|id| id == widget_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub id: DashboardId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub global_filters: Vec<GlobalFilter>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Dashboard {
    pub fn new(id: impl Into<DashboardId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pages: Vec::new(),
            global_filters: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Global filters that apply to the given widget.
    pub fn filters_for(&self, widget_id: &str) -> Vec<Filter> {
        self.global_filters
            .iter()
            .filter(|g| g.applies_to(widget_id))
            .map(|g| g.filter.clone())
            .collect()
    }

    pub fn find_widget(&self, widget_id: &str) -> Option<(&Page, &Widget)> {
        self.pages.iter().find_map(|p| {
            p.widgets
                .iter()
                .find(|w| w.id == widget_id)
                .map(|w| (p, w))
        })
    }
}
