//! Cross-filter bus: the filters each widget currently broadcasts to its siblings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::filter::{matches, Filter, FilterOperator};
use crate::model::WidgetId;
use crate::value::{loose_eq, Row};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossFilterEntry {
    pub source_widget_id: WidgetId,
    pub filters: Vec<Filter>,
}

/// At most one entry per source widget, iterated in source-id order.
#[derive(Debug, Clone, Default)]
pub struct CrossFilterBus {
    entries: BTreeMap<WidgetId, Vec<Filter>>,
}

impl CrossFilterBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the source's entry. Publishing an empty filter set revokes it.
    pub fn publish(&mut self, source: &str, filters: Vec<Filter>) {
        if filters.is_empty() {
            self.entries.remove(source);
        } else {
            self.entries.insert(source.to_string(), filters);
        }
    }

    /// Broadcast a single clicked category. Clicking the currently selected value again
    /// revokes the selection. Returns true when a selection is active afterwards.
    pub fn toggle_selection(&mut self, source: &str, field: &str, value: Value) -> bool {
        let already_selected = self.entries.get(source).is_some_and(|filters| {
            filters.len() == 1
                && filters[0].field == field
                && filters[0].operator == FilterOperator::Equals
                && loose_eq(&filters[0].value, &value)
        });
        if already_selected {
            self.entries.remove(source);
            false
        } else {
            self.publish(source, vec![Filter::equals(field, value)]);
            true
        }
    }

    pub fn revoke(&mut self, source: &str) -> bool {
        self.entries.remove(source).is_some()
    }

    /// Filters broadcast by every widget except `widget_id`.
    pub fn filters_excluding(&self, widget_id: &str) -> Vec<Filter> {
        self.entries
            .iter()
            .filter(|(source, _)| source.as_str() != widget_id)
            .flat_map(|(_, filters)| filters.iter().cloned())
            .collect()
    }

    /// The widget's own broadcast selection.
    pub fn own(&self, widget_id: &str) -> Option<&[Filter]> {
        self.entries.get(widget_id).map(Vec::as_slice)
    }

    /// Render-time highlight: a data point stays highlighted unless the widget has its own
    /// selection that the point does not match.
    pub fn is_highlighted(&self, widget_id: &str, point: &Row) -> bool {
        match self.own(widget_id) {
            Some(filters) => filters.iter().all(|f| matches(point, f)),
            None => true,
        }
    }

    pub fn entries(&self) -> Vec<CrossFilterEntry> {
        self.entries
            .iter()
            .map(|(source, filters)| CrossFilterEntry {
                source_widget_id: source.clone(),
                filters: filters.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rekey(&mut self, old_id: &str, new_id: &str) {
        if let Some(filters) = self.entries.remove(old_id) {
            self.entries.insert(new_id.to_string(), filters);
        }
    }
}
