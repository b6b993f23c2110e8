//! Per-widget drill-down state machine.
//!
//! A widget with a configured hierarchy starts implicitly at level 0. Drilling down records the
//! clicked value as a breadcrumb and moves one level deeper; drilling up pops it. Expanding to
//! the next level without a clicked value records a wildcard breadcrumb, so the number of
//! breadcrumbs always equals the current level.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::filter::Filter;
use crate::model::{Widget, WidgetId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrillError {
    #[error("widget has no drill-down hierarchy")]
    NoHierarchy,
    #[error("cannot descend further: already at the deepest level")]
    CannotDescend,
    #[error("cannot ascend: already at the top level")]
    CannotAscend,
}

/// Value chosen to leave `level`. `None` means every category was expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub level: usize,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillDownState {
    pub hierarchy: Vec<String>,
    pub current_level: usize,
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Start drilling on a widget. Returns `None` when the widget has no hierarchy.
pub fn init_drill_down(widget: &Widget) -> Option<DrillDownState> {
    if !widget.has_hierarchy() {
        return None;
    }
    Some(DrillDownState {
        hierarchy: widget.drill_down_hierarchy.clone(),
        current_level: 0,
        breadcrumbs: Vec::new(),
    })
}

impl DrillDownState {
    pub fn can_descend(&self) -> bool {
        self.current_level + 1 < self.hierarchy.len()
    }

    pub fn can_ascend(&self) -> bool {
        self.current_level > 0
    }

    /// Terminal condition: the deepest level is active.
    pub fn is_at_deepest(&self) -> bool {
        !self.can_descend()
    }

    /// Field grouped by at the current level.
    pub fn active_field(&self) -> Option<&str> {
        self.hierarchy.get(self.current_level).map(String::as_str)
    }

    /// Descend one level, recording the clicked value.
    pub fn drill_down(&self, clicked: Value) -> Result<DrillDownState, DrillError> {
        self.descend(Some(clicked))
    }

    /// Descend one level for every category at once.
    pub fn expand_next_level(&self) -> Result<DrillDownState, DrillError> {
        self.descend(None)
    }

    pub fn go_to_next_level(&self) -> Result<DrillDownState, DrillError> {
        self.expand_next_level()
    }

    fn descend(&self, value: Option<Value>) -> Result<DrillDownState, DrillError> {
        if !self.can_descend() {
            return Err(DrillError::CannotDescend);
        }
        let mut next = self.clone();
        next.breadcrumbs.push(Breadcrumb {
            level: self.current_level,
            value,
        });
        next.current_level += 1;
        Ok(next)
    }

    pub fn drill_up(&self) -> Result<DrillDownState, DrillError> {
        if !self.can_ascend() {
            return Err(DrillError::CannotAscend);
        }
        let mut next = self.clone();
        next.breadcrumbs.pop();
        next.current_level -= 1;
        Ok(next)
    }

    /// Back to level 0 with no breadcrumbs; equivalent to never having drilled.
    pub fn reset(&self) -> DrillDownState {
        DrillDownState {
            hierarchy: self.hierarchy.clone(),
            current_level: 0,
            breadcrumbs: Vec::new(),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.current_level == 0 && self.breadcrumbs.is_empty()
    }

    /// One equality filter per breadcrumb that recorded a value.
    pub fn filters(&self) -> Vec<Filter> {
        self.breadcrumbs
            .iter()
            .filter_map(|b| {
                let field = self.hierarchy.get(b.level)?;
                let value = b.value.clone()?;
                Some(Filter::equals(field.clone(), value))
            })
            .collect()
    }
}

/// Drill-down states keyed by widget id. Ephemeral: never persisted.
#[derive(Debug, Default, Clone)]
pub struct DrillDownRegistry {
    states: HashMap<WidgetId, DrillDownState>,
}

impl DrillDownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, widget_id: &str) -> Option<&DrillDownState> {
        self.states.get(widget_id)
    }

    /// Current state for a widget, created lazily on first interaction.
    fn ensure(&mut self, widget: &Widget) -> Result<&DrillDownState, DrillError> {
        if !self.states.contains_key(&widget.id) {
            let state = init_drill_down(widget).ok_or(DrillError::NoHierarchy)?;
            self.states.insert(widget.id.clone(), state);
        }
        self.states.get(&widget.id).ok_or(DrillError::NoHierarchy)
    }

    fn transition(
        &mut self,
        widget: &Widget,
        step: impl FnOnce(&DrillDownState) -> Result<DrillDownState, DrillError>,
    ) -> Result<&DrillDownState, DrillError> {
        let next = step(self.ensure(widget)?)?;
        self.states.insert(widget.id.clone(), next);
        self.states.get(&widget.id).ok_or(DrillError::NoHierarchy)
    }

    pub fn drill_down(
        &mut self,
        widget: &Widget,
        clicked: Value,
    ) -> Result<&DrillDownState, DrillError> {
        self.transition(widget, |s| s.drill_down(clicked))
    }

    pub fn drill_up(&mut self, widget: &Widget) -> Result<&DrillDownState, DrillError> {
        self.transition(widget, DrillDownState::drill_up)
    }

    pub fn expand_next_level(&mut self, widget: &Widget) -> Result<&DrillDownState, DrillError> {
        self.transition(widget, DrillDownState::expand_next_level)
    }

    /// Reset a widget to level 0. Dropping the entry is equivalent.
    pub fn reset(&mut self, widget_id: &str) -> bool {
        self.states.remove(widget_id).is_some()
    }

    /// Drop state for a widget whose hierarchy configuration changed or that was deleted.
    pub fn clear(&mut self, widget_id: &str) {
        self.states.remove(widget_id);
    }

    pub fn rekey(&mut self, old_id: &str, new_id: &str) {
        if let Some(state) = self.states.remove(old_id) {
            self.states.insert(new_id.to_string(), state);
        }
    }
}
