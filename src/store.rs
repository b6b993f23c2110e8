//! Dashboard store: owns the entity graph and the per-widget interaction state, applies every
//! mutation locally first, and reconciles with the persistence collaborator afterwards.
//!
//! Mutations notify subscribers with a [`StoreEvent`]; [`DashboardStore::widgets_to_refresh`]
//! maps an event to the widgets whose series must be recomputed. The engines (pipeline,
//! layout, drill-down) stay pure; the store only calls them.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::crossfilter::CrossFilterBus;
use crate::dataset::Dataset;
use crate::drilldown::{DrillDownRegistry, DrillDownState};
use crate::error::{PersistenceError, StoreError};
use crate::filter::Filter;
use crate::layout::{align_group, translate_group, Alignment, GridBox, GridLayout};
use crate::model::{Dashboard, GlobalFilter, Page, PageId, Widget, WidgetId, WidgetPatch};
use crate::persistence::{
    DashboardRecord, EntityKey, EntityKind, GlobalFilterRecord, PageRecord, Persistence, Record,
    WidgetRecord,
};
use crate::pipeline::{resolve_dimension, run_local, Limits, PipelineInputs, SeriesResult};
use crate::value::Row;

pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(&StoreEvent) + Send + Sync>;

/// Result of reconciling a local change with the persistence collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The authoritative record was adopted locally.
    Applied,
    /// The local entity changed after the request was sent (or is gone); local state wins.
    Superseded,
    /// The request failed. Local state is kept as is.
    Failed(PersistenceError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    Create(EntityKey),
    Update(EntityKey),
    Delete(EntityKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    DashboardChanged,
    PageAdded(PageId),
    PageChanged(PageId),
    PageRemoved(PageId),
    WidgetAdded(WidgetId),
    WidgetUpdated(WidgetId),
    WidgetRemoved(WidgetId),
    WidgetRekeyed { old: WidgetId, new: WidgetId },
    /// Several boxes on a page moved at once.
    LayoutChanged(PageId),
    GlobalFiltersChanged,
    CrossFilterChanged(WidgetId),
    DrillChanged(WidgetId),
    SeriesUpdated(WidgetId),
    Synced { key: EntityKey, outcome: SyncOutcome },
}

/// What a widget currently displays: the last good series plus the latest error, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetView {
    pub result: Option<SeriesResult>,
    pub error: Option<String>,
}

impl WidgetView {
    pub fn series(&self) -> &[Row] {
        self.result.as_ref().map(|r| r.series.as_slice()).unwrap_or(&[])
    }
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with("tmp-")
}

fn locate(dashboard: &Dashboard, widget_id: &str) -> Result<(usize, usize), StoreError> {
    dashboard
        .pages
        .iter()
        .enumerate()
        .find_map(|(pi, p)| {
            p.widgets
                .iter()
                .position(|w| w.id == widget_id)
                .map(|wi| (pi, wi))
        })
        .ok_or_else(|| StoreError::UnknownWidget(widget_id.to_string()))
}

fn find_widget<'a>(dashboard: &'a Dashboard, widget_id: &str) -> Result<&'a Widget, StoreError> {
    let (pi, wi) = locate(dashboard, widget_id)?;
    Ok(&dashboard.pages[pi].widgets[wi])
}

pub struct DashboardStore {
    dashboard: Dashboard,
    layout: GridLayout,
    drill: DrillDownRegistry,
    cross_filters: CrossFilterBus,
    views: HashMap<WidgetId, WidgetView>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
    next_temp: u64,
}

impl DashboardStore {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_layout(Dashboard::new(id, name), GridLayout::default())
    }

    /// Adopt a loaded dashboard. Boxes are re-validated page by page so a hand-edited file
    /// cannot bring overlapping or out-of-bounds widgets in.
    pub fn with_layout(mut dashboard: Dashboard, layout: GridLayout) -> Self {
        for page in &mut dashboard.pages {
            let mut settled: Vec<GridBox> = Vec::with_capacity(page.widgets.len());
            for widget in &mut page.widgets {
                let g = widget.grid;
                let fixed = layout.settle(&settled, g.x as i64, g.y as i64, g.w as i64, g.h as i64);
                if fixed != g {
                    debug!(widget = %widget.id, ?g, ?fixed, "re-placed widget on load");
                    widget.grid = fixed;
                }
                settled.push(fixed);
            }
        }
        Self {
            dashboard,
            layout,
            drill: DrillDownRegistry::new(),
            cross_filters: CrossFilterBus::new(),
            views: HashMap::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            next_temp: 0,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn page(&self, page_id: &str) -> Result<&Page, StoreError> {
        self.dashboard
            .pages
            .iter()
            .find(|p| p.id == page_id)
            .ok_or_else(|| StoreError::UnknownPage(page_id.to_string()))
    }

    pub fn widget(&self, widget_id: &str) -> Result<&Widget, StoreError> {
        find_widget(&self.dashboard, widget_id)
    }

    pub fn widget_ids(&self) -> Vec<WidgetId> {
        self.dashboard
            .pages
            .iter()
            .flat_map(|p| p.widgets.iter().map(|w| w.id.clone()))
            .collect()
    }

    pub fn view(&self, widget_id: &str) -> Option<&WidgetView> {
        self.views.get(widget_id)
    }

    pub fn cross_filters(&self) -> &CrossFilterBus {
        &self.cross_filters
    }

    pub fn drill_state(&self, widget_id: &str) -> Option<&DrillDownState> {
        self.drill.get(widget_id)
    }

    fn temp_id(&mut self, kind: &str) -> String {
        self.next_temp += 1;
        format!("tmp-{}-{}", kind, self.next_temp)
    }

    fn page_index(&self, page_id: &str) -> Result<usize, StoreError> {
        self.dashboard
            .pages
            .iter()
            .position(|p| p.id == page_id)
            .ok_or_else(|| StoreError::UnknownPage(page_id.to_string()))
    }

    // Observer

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.next_subscription += 1;
        self.listeners
            .push((self.next_subscription, Box::new(listener)));
        self.next_subscription
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn emit(&self, event: StoreEvent) {
        for (_, listener) in &self.listeners {
            listener(&event);
        }
    }

    /// Widgets whose series depend on what `event` changed.
    pub fn widgets_to_refresh(&self, event: &StoreEvent) -> Vec<WidgetId> {
        match event {
            StoreEvent::WidgetAdded(id)
            | StoreEvent::WidgetUpdated(id)
            | StoreEvent::DrillChanged(id) => vec![id.clone()],
            StoreEvent::WidgetRekeyed { new, .. } => vec![new.clone()],
            StoreEvent::CrossFilterChanged(source) => self
                .dashboard
                .pages
                .iter()
                .flat_map(|p| &p.widgets)
                .filter(|w| &w.id != source && w.enable_cross_filter)
                .map(|w| w.id.clone())
                .collect(),
            StoreEvent::GlobalFiltersChanged => self.widget_ids(),
            StoreEvent::PageChanged(page_id) => self
                .page(page_id)
                .map(|p| p.widgets.iter().map(|w| w.id.clone()).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    // Dashboard and pages

    pub fn rename_dashboard(&mut self, name: impl Into<String>) {
        self.dashboard.name = name.into();
        self.dashboard.updated_at = Utc::now();
        self.emit(StoreEvent::DashboardChanged);
    }

    pub fn add_page(&mut self, name: impl Into<String>) -> PageId {
        let id = self.temp_id("page");
        self.dashboard.pages.push(Page::new(id.clone(), name));
        self.emit(StoreEvent::PageAdded(id.clone()));
        id
    }

    pub fn remove_page(&mut self, page_id: &str) -> Result<Page, StoreError> {
        let idx = self.page_index(page_id)?;
        let page = self.dashboard.pages.remove(idx);
        for widget in &page.widgets {
            self.forget_widget(&widget.id);
        }
        self.emit(StoreEvent::PageRemoved(page.id.clone()));
        Ok(page)
    }

    pub fn rename_page(&mut self, page_id: &str, name: impl Into<String>) -> Result<(), StoreError> {
        let idx = self.page_index(page_id)?;
        let page = &mut self.dashboard.pages[idx];
        page.name = name.into();
        page.updated_at = Utc::now();
        self.emit(StoreEvent::PageChanged(page_id.to_string()));
        Ok(())
    }

    /// Set or clear the page-level data source override.
    pub fn set_page_source(
        &mut self,
        page_id: &str,
        source: Option<String>,
    ) -> Result<(), StoreError> {
        let idx = self.page_index(page_id)?;
        let page = &mut self.dashboard.pages[idx];
        page.data_source_id = source;
        page.updated_at = Utc::now();
        self.emit(StoreEvent::PageChanged(page_id.to_string()));
        Ok(())
    }

    // Widgets

    /// Add a widget to a page. The widget's size is clamped; its position is the requested
    /// one when free, else the first free slot. An empty id gets a temporary id.
    pub fn add_widget(
        &mut self,
        page_id: &str,
        mut widget: Widget,
        requested: Option<(i64, i64)>,
    ) -> Result<WidgetId, StoreError> {
        let idx = self.page_index(page_id)?;
        if widget.id.is_empty() {
            widget.id = self.temp_id("widget");
        } else if locate(&self.dashboard, &widget.id).is_ok() {
            return Err(StoreError::DuplicateId(widget.id));
        }
        let page = &mut self.dashboard.pages[idx];
        widget.grid = self.layout.place(
            &page.boxes_except(None),
            widget.grid.w as i64,
            widget.grid.h as i64,
            requested,
        );
        widget.updated_at = Utc::now();
        let id = widget.id.clone();
        debug!(widget = %id, page = %page_id, grid = ?widget.grid, "widget added");
        page.widgets.push(widget);
        self.emit(StoreEvent::WidgetAdded(id.clone()));
        Ok(id)
    }

    /// Apply a partial update. A new grid box is re-validated against the page; a changed
    /// drill-down hierarchy discards the widget's drill state and its broadcast selection.
    pub fn update_widget(&mut self, widget_id: &str, mut patch: WidgetPatch) -> Result<(), StoreError> {
        let (pi, wi) = locate(&self.dashboard, widget_id)?;
        let requested_grid = patch.grid.take();
        let page = &mut self.dashboard.pages[pi];
        let others = page.boxes_except(Some(widget_id));
        let widget = &mut page.widgets[wi];
        let hierarchy_changed = patch.apply_to(widget);
        if let Some(g) = requested_grid {
            widget.grid = self
                .layout
                .settle(&others, g.x as i64, g.y as i64, g.w as i64, g.h as i64);
        }
        widget.updated_at = Utc::now();

        if hierarchy_changed {
            self.reset_interaction(widget_id);
        }
        self.emit(StoreEvent::WidgetUpdated(widget_id.to_string()));
        Ok(())
    }

    fn set_box(&mut self, widget_id: &str, x: i64, y: i64, w: i64, h: i64) -> Result<GridBox, StoreError> {
        let (pi, wi) = locate(&self.dashboard, widget_id)?;
        let page = &mut self.dashboard.pages[pi];
        let others = page.boxes_except(Some(widget_id));
        let settled = self.layout.settle(&others, x, y, w, h);
        let widget = &mut page.widgets[wi];
        widget.grid = settled;
        widget.updated_at = Utc::now();
        self.emit(StoreEvent::WidgetUpdated(widget_id.to_string()));
        Ok(settled)
    }

    /// Move a widget. Returns the box actually committed after clamping and collision checks.
    pub fn move_widget(&mut self, widget_id: &str, x: i64, y: i64) -> Result<GridBox, StoreError> {
        let g = self.widget(widget_id)?.grid;
        self.set_box(widget_id, x, y, g.w as i64, g.h as i64)
    }

    pub fn resize_widget(&mut self, widget_id: &str, w: i64, h: i64) -> Result<GridBox, StoreError> {
        let g = self.widget(widget_id)?.grid;
        self.set_box(widget_id, g.x as i64, g.y as i64, w, h)
    }

    /// A new hierarchy invalidates the drill path and the selection made at the old level.
    fn reset_interaction(&mut self, widget_id: &str) {
        self.drill.clear(widget_id);
        if self.cross_filters.revoke(widget_id) {
            self.emit(StoreEvent::CrossFilterChanged(widget_id.to_string()));
        }
    }

    fn forget_widget(&mut self, widget_id: &str) {
        self.drill.clear(widget_id);
        self.views.remove(widget_id);
        if self.cross_filters.revoke(widget_id) {
            self.emit(StoreEvent::CrossFilterChanged(widget_id.to_string()));
        }
    }

    /// Delete a widget together with its drill state, broadcast selection and view.
    pub fn delete_widget(&mut self, widget_id: &str) -> Result<Widget, StoreError> {
        let (pi, wi) = locate(&self.dashboard, widget_id)?;
        let widget = self.dashboard.pages[pi].widgets.remove(wi);
        self.forget_widget(widget_id);
        self.emit(StoreEvent::WidgetRemoved(widget_id.to_string()));
        Ok(widget)
    }

    /// Copy a widget onto the same page in the next free slot.
    pub fn duplicate_widget(&mut self, widget_id: &str) -> Result<WidgetId, StoreError> {
        let (pi, wi) = locate(&self.dashboard, widget_id)?;
        let mut copy = self.dashboard.pages[pi].widgets[wi].clone();
        copy.id = String::new();
        copy.title = format!("{} (copy)", copy.title);
        copy.group_id = None;
        let page_id = self.dashboard.pages[pi].id.clone();
        self.add_widget(&page_id, copy, None)
    }

    // Global filters

    pub fn add_global_filter(&mut self, filter: Filter, targets: Vec<WidgetId>) -> String {
        let id = self.temp_id("filter");
        self.dashboard
            .global_filters
            .push(GlobalFilter::new(id.clone(), filter).targeting(targets));
        self.emit(StoreEvent::GlobalFiltersChanged);
        id
    }

    pub fn update_global_filter(
        &mut self,
        filter_id: &str,
        filter: Filter,
        targets: Vec<WidgetId>,
    ) -> Result<(), StoreError> {
        let g = self
            .dashboard
            .global_filters
            .iter_mut()
            .find(|g| g.id == filter_id)
            .ok_or_else(|| StoreError::UnknownGlobalFilter(filter_id.to_string()))?;
        g.filter = filter;
        g.target_widget_ids = targets;
        g.updated_at = Utc::now();
        self.emit(StoreEvent::GlobalFiltersChanged);
        Ok(())
    }

    pub fn remove_global_filter(&mut self, filter_id: &str) -> Result<GlobalFilter, StoreError> {
        let idx = self
            .dashboard
            .global_filters
            .iter()
            .position(|g| g.id == filter_id)
            .ok_or_else(|| StoreError::UnknownGlobalFilter(filter_id.to_string()))?;
        let removed = self.dashboard.global_filters.remove(idx);
        self.emit(StoreEvent::GlobalFiltersChanged);
        Ok(removed)
    }

    // Cross-filtering

    /// Toggle a clicked category as the widget's broadcast selection, on the dimension the
    /// widget currently displays. Returns true when a selection is active afterwards.
    pub fn select_category(&mut self, widget_id: &str, value: Value) -> Result<bool, StoreError> {
        let widget = find_widget(&self.dashboard, widget_id)?;
        let Some(field) = resolve_dimension(widget, self.drill.get(widget_id)) else {
            return Ok(false);
        };
        let active = self.cross_filters.toggle_selection(widget_id, &field, value);
        self.emit(StoreEvent::CrossFilterChanged(widget_id.to_string()));
        Ok(active)
    }

    pub fn publish_cross_filter(
        &mut self,
        widget_id: &str,
        filters: Vec<Filter>,
    ) -> Result<(), StoreError> {
        locate(&self.dashboard, widget_id)?;
        self.cross_filters.publish(widget_id, filters);
        self.emit(StoreEvent::CrossFilterChanged(widget_id.to_string()));
        Ok(())
    }

    pub fn revoke_cross_filter(&mut self, widget_id: &str) -> bool {
        let revoked = self.cross_filters.revoke(widget_id);
        if revoked {
            self.emit(StoreEvent::CrossFilterChanged(widget_id.to_string()));
        }
        revoked
    }

    /// Render-time highlight for a data point of `widget_id`.
    pub fn is_highlighted(&self, widget_id: &str, point: &Row) -> bool {
        self.cross_filters.is_highlighted(widget_id, point)
    }

    // Drill-down

    fn after_drill(&mut self, widget_id: &str) {
        // The selection referred to a level that is no longer displayed.
        if self.cross_filters.revoke(widget_id) {
            self.emit(StoreEvent::CrossFilterChanged(widget_id.to_string()));
        }
        self.emit(StoreEvent::DrillChanged(widget_id.to_string()));
    }

    pub fn drill_down(&mut self, widget_id: &str, clicked: Value) -> Result<DrillDownState, StoreError> {
        let widget = find_widget(&self.dashboard, widget_id)?;
        let state = self.drill.drill_down(widget, clicked)?.clone();
        self.after_drill(widget_id);
        Ok(state)
    }

    pub fn drill_up(&mut self, widget_id: &str) -> Result<DrillDownState, StoreError> {
        let widget = find_widget(&self.dashboard, widget_id)?;
        let state = self.drill.drill_up(widget)?.clone();
        self.after_drill(widget_id);
        Ok(state)
    }

    /// Descend one level for every category at once.
    pub fn expand_next_level(&mut self, widget_id: &str) -> Result<DrillDownState, StoreError> {
        let widget = find_widget(&self.dashboard, widget_id)?;
        let state = self.drill.expand_next_level(widget)?.clone();
        self.after_drill(widget_id);
        Ok(state)
    }

    pub fn reset_drill(&mut self, widget_id: &str) -> Result<(), StoreError> {
        locate(&self.dashboard, widget_id)?;
        if self.drill.reset(widget_id) {
            self.after_drill(widget_id);
        }
        Ok(())
    }

    // Groups

    fn move_group_with(
        &mut self,
        group_id: &str,
        arrange: impl Fn(&[GridBox], &[GridBox]) -> Result<Vec<GridBox>, crate::error::LayoutError>,
    ) -> Result<(), StoreError> {
        let mut plan: Vec<(usize, Vec<usize>, Vec<GridBox>)> = Vec::new();
        for (pi, page) in self.dashboard.pages.iter().enumerate() {
            let (members, fixed): (Vec<(usize, &Widget)>, Vec<(usize, &Widget)>) = page
                .widgets
                .iter()
                .enumerate()
                .partition(|(_, w)| w.group_id.as_deref() == Some(group_id));
            if members.is_empty() {
                continue;
            }
            let boxes: Vec<GridBox> = members.iter().map(|(_, w)| w.grid).collect();
            let fixed: Vec<GridBox> = fixed.iter().map(|(_, w)| w.grid).collect();
            let moved = arrange(&boxes, &fixed).map_err(|source| StoreError::GroupBlocked {
                group: group_id.to_string(),
                source,
            })?;
            plan.push((pi, members.iter().map(|(wi, _)| *wi).collect(), moved));
        }
        if plan.is_empty() {
            return Err(StoreError::UnknownGroup(group_id.to_string()));
        }

        let now = Utc::now();
        for (pi, indices, boxes) in plan {
            let page = &mut self.dashboard.pages[pi];
            for (wi, grid) in indices.into_iter().zip(boxes) {
                page.widgets[wi].grid = grid;
                page.widgets[wi].updated_at = now;
            }
            let page_id = page.id.clone();
            self.emit(StoreEvent::LayoutChanged(page_id));
        }
        Ok(())
    }

    /// Shift every widget of a group. Nothing moves unless every member fits.
    pub fn move_group(&mut self, group_id: &str, dx: i64, dy: i64) -> Result<(), StoreError> {
        self.move_group_with(group_id, |boxes, fixed| translate_group(boxes, dx, dy, fixed))
    }

    pub fn align_group(&mut self, group_id: &str, alignment: Alignment) -> Result<(), StoreError> {
        self.move_group_with(group_id, |boxes, fixed| align_group(boxes, alignment, fixed))
    }

    // Series

    /// Owned snapshot of a widget's pipeline inputs at this moment.
    pub fn pipeline_inputs(&self, widget_id: &str) -> Result<PipelineInputs, StoreError> {
        let (pi, wi) = locate(&self.dashboard, widget_id)?;
        let page = &self.dashboard.pages[pi];
        let widget = &page.widgets[wi];
        Ok(PipelineInputs::capture(
            widget,
            page.resolve_source(widget).map(str::to_string),
            &self.cross_filters,
            &self.dashboard.global_filters,
            self.drill.get(widget_id),
        ))
    }

    /// Record a finished run. A failed run keeps the previous series and sets the error.
    pub fn apply_result(&mut self, widget_id: &str, result: SeriesResult) -> Result<(), StoreError> {
        locate(&self.dashboard, widget_id)?;
        let view = self.views.entry(widget_id.to_string()).or_default();
        match result.error.clone() {
            Some(error) => {
                warn!(widget = %widget_id, %error, "keeping previous series after failed run");
                view.error = Some(error);
            }
            None => {
                view.result = Some(result);
                view.error = None;
            }
        }
        self.emit(StoreEvent::SeriesUpdated(widget_id.to_string()));
        Ok(())
    }

    /// Compute a widget's series from an already loaded dataset and record it.
    pub fn refresh_local(
        &mut self,
        widget_id: &str,
        dataset: &Dataset,
        limits: &Limits,
    ) -> Result<(), StoreError> {
        let inputs = self.pipeline_inputs(widget_id)?;
        let result = run_local(&inputs, dataset, limits);
        self.apply_result(widget_id, result)
    }

    // Synchronization

    /// Snapshot of a local entity as sent to persistence.
    pub fn record_for(&self, key: &EntityKey) -> Result<Record, StoreError> {
        let d = &self.dashboard;
        match key.kind {
            EntityKind::Dashboard if key.id == d.id => Ok(Record::Dashboard(DashboardRecord {
                id: d.id.clone(),
                name: d.name.clone(),
                updated_at: d.updated_at,
            })),
            EntityKind::Dashboard => Err(StoreError::UnknownDashboard(key.id.clone())),
            EntityKind::Page => {
                let p = self.page(&key.id)?;
                Ok(Record::Page(PageRecord {
                    id: p.id.clone(),
                    dashboard_id: d.id.clone(),
                    name: p.name.clone(),
                    data_source_id: p.data_source_id.clone(),
                    updated_at: p.updated_at,
                }))
            }
            EntityKind::Widget => {
                let (pi, wi) = locate(d, &key.id)?;
                Ok(Record::Widget(WidgetRecord {
                    page_id: d.pages[pi].id.clone(),
                    widget: d.pages[pi].widgets[wi].clone(),
                }))
            }
            EntityKind::GlobalFilter => d
                .global_filters
                .iter()
                .find(|g| g.id == key.id)
                .map(|g| {
                    Record::GlobalFilter(GlobalFilterRecord {
                        dashboard_id: d.id.clone(),
                        filter: g.clone(),
                    })
                })
                .ok_or_else(|| StoreError::UnknownGlobalFilter(key.id.clone())),
        }
    }

    fn local_updated_at(&self, key: &EntityKey) -> Option<chrono::DateTime<Utc>> {
        self.record_for(key).ok().map(|r| r.updated_at())
    }

    fn rekey(&mut self, key: &EntityKey, new_id: &str) {
        let old = key.id.as_str();
        match key.kind {
            EntityKind::Dashboard => {
                if self.dashboard.id == old {
                    self.dashboard.id = new_id.to_string();
                }
            }
            EntityKind::Page => {
                if let Ok(idx) = self.page_index(old) {
                    self.dashboard.pages[idx].id = new_id.to_string();
                }
            }
            EntityKind::GlobalFilter => {
                if let Some(g) = self.dashboard.global_filters.iter_mut().find(|g| g.id == old) {
                    g.id = new_id.to_string();
                }
            }
            EntityKind::Widget => {
                let Ok((pi, wi)) = locate(&self.dashboard, old) else {
                    return;
                };
                self.dashboard.pages[pi].widgets[wi].id = new_id.to_string();
                self.drill.rekey(old, new_id);
                self.cross_filters.rekey(old, new_id);
                if let Some(view) = self.views.remove(old) {
                    self.views.insert(new_id.to_string(), view);
                }
                for g in &mut self.dashboard.global_filters {
                    for target in &mut g.target_widget_ids {
                        if target == old {
                            *target = new_id.to_string();
                        }
                    }
                }
                self.emit(StoreEvent::WidgetRekeyed {
                    old: old.to_string(),
                    new: new_id.to_string(),
                });
            }
        }
        debug!(kind = ?key.kind, old, new = new_id, "entity re-keyed to server id");
    }

    fn adopt(&mut self, record: Record) {
        match record {
            Record::Dashboard(r) => {
                self.dashboard.name = r.name;
                self.dashboard.updated_at = r.updated_at;
                self.emit(StoreEvent::DashboardChanged);
            }
            Record::Page(r) => {
                if let Ok(idx) = self.page_index(&r.id) {
                    let page = &mut self.dashboard.pages[idx];
                    page.name = r.name;
                    page.data_source_id = r.data_source_id;
                    page.updated_at = r.updated_at;
                    self.emit(StoreEvent::PageChanged(r.id));
                }
            }
            Record::Widget(r) => {
                let mut incoming = r.widget;
                let Ok((pi, wi)) = locate(&self.dashboard, &incoming.id) else {
                    return;
                };
                let page = &mut self.dashboard.pages[pi];
                let others = page.boxes_except(Some(&incoming.id));
                let g = incoming.grid;
                incoming.grid =
                    self.layout
                        .settle(&others, g.x as i64, g.y as i64, g.w as i64, g.h as i64);
                let hierarchy_changed =
                    page.widgets[wi].drill_down_hierarchy != incoming.drill_down_hierarchy;
                let id = incoming.id.clone();
                page.widgets[wi] = incoming;
                if hierarchy_changed {
                    self.reset_interaction(&id);
                }
                self.emit(StoreEvent::WidgetUpdated(id));
            }
            Record::GlobalFilter(r) => {
                if let Some(g) = self
                    .dashboard
                    .global_filters
                    .iter_mut()
                    .find(|g| g.id == r.filter.id)
                {
                    *g = r.filter;
                    self.emit(StoreEvent::GlobalFiltersChanged);
                }
            }
        }
    }

    /// Second phase of a create or update: fold the collaborator's answer into local state.
    ///
    /// A server-assigned id always replaces the temporary one. Content is adopted only when
    /// the local entity was not edited after `sent` was captured (newer `updated_at` wins).
    pub fn reconcile(
        &mut self,
        sent: &EntityKey,
        response: Result<Record, PersistenceError>,
    ) -> SyncOutcome {
        let outcome = match response {
            Err(e) => {
                warn!(entity = %sent, error = %e, "persistence request failed");
                SyncOutcome::Failed(e)
            }
            Ok(record) => {
                let server_key = record.key();
                if server_key.id != sent.id {
                    self.rekey(sent, &server_key.id);
                }
                match self.local_updated_at(&server_key) {
                    None => SyncOutcome::Superseded,
                    Some(local) if local > record.updated_at() => {
                        debug!(entity = %server_key, "local edit is newer than server copy");
                        SyncOutcome::Superseded
                    }
                    Some(_) => {
                        self.adopt(record);
                        SyncOutcome::Applied
                    }
                }
            }
        };
        self.emit(StoreEvent::Synced {
            key: sent.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Fold a delete response in. Local state is left as it is; a failure only logs.
    pub fn reconcile_delete(
        &mut self,
        key: EntityKey,
        response: Result<(), PersistenceError>,
    ) -> SyncOutcome {
        let outcome = match response {
            Ok(()) => SyncOutcome::Applied,
            Err(e) => {
                warn!(entity = %key, error = %e, "delete failed; local state kept");
                SyncOutcome::Failed(e)
            }
        };
        self.emit(StoreEvent::Synced {
            key,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Push one local change to persistence and reconcile the answer.
    pub async fn sync<P>(&mut self, persistence: &P, op: SyncOp) -> SyncOutcome
    where
        P: Persistence + ?Sized,
    {
        match op {
            SyncOp::Create(key) => {
                let Ok(record) = self.record_for(&key) else {
                    debug!(entity = %key, "entity gone before sync");
                    return SyncOutcome::Superseded;
                };
                let response = persistence.create(record).await;
                self.reconcile(&key, response)
            }
            SyncOp::Update(key) => {
                let Ok(record) = self.record_for(&key) else {
                    debug!(entity = %key, "entity gone before sync");
                    return SyncOutcome::Superseded;
                };
                let response = persistence.update(record).await;
                self.reconcile(&key, response)
            }
            SyncOp::Delete(key) => {
                let response = persistence.delete(&key).await;
                self.reconcile_delete(key, response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Aggregation;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn store_with_page() -> (DashboardStore, PageId) {
        let mut store = DashboardStore::new("d1", "Sales");
        let page = store.add_page("Overview");
        (store, page)
    }

    fn chart(id: &str) -> Widget {
        let mut w = Widget::new(id);
        w.x_axis = Some("cat".into());
        w.y_axis = Some("val".into());
        w.aggregation = Aggregation::Sum;
        w.grid = GridBox::new(0, 0, 6, 2);
        w
    }

    #[test]
    fn test_add_widget_auto_places() {
        let (mut store, page) = store_with_page();
        store.add_widget(&page, chart("a"), None).unwrap();
        store.add_widget(&page, chart("b"), None).unwrap();
        store.add_widget(&page, chart("c"), None).unwrap();
        let boxes = store.page(&page).unwrap().boxes_except(None);
        assert_eq!(
            boxes,
            vec![
                GridBox::new(0, 0, 6, 2),
                GridBox::new(6, 0, 6, 2),
                GridBox::new(0, 2, 6, 2)
            ]
        );
        assert!(matches!(
            store.add_widget(&page, chart("a"), None),
            Err(StoreError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_subscribers_see_events() {
        let (mut store, page) = store_with_page();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = store.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        store.add_widget(&page, chart("a"), None).unwrap();
        assert!(store.unsubscribe(sub));
        store.delete_widget("a").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![StoreEvent::WidgetAdded("a".into())]
        );
    }

    #[test]
    fn test_delete_drops_interaction_state() {
        let (mut store, page) = store_with_page();
        let mut w = chart("a");
        w.drill_down_hierarchy = vec!["cat".into(), "sub".into()];
        store.add_widget(&page, w, None).unwrap();
        store.drill_down("a", json!("A")).unwrap();
        store.select_category("a", json!("x")).unwrap();
        store.delete_widget("a").unwrap();
        assert!(store.drill_state("a").is_none());
        assert!(store.cross_filters().own("a").is_none());
        assert!(store.view("a").is_none());
    }

    #[test]
    fn test_drill_revokes_own_selection() {
        let (mut store, page) = store_with_page();
        let mut w = chart("a");
        w.drill_down_hierarchy = vec!["cat".into(), "sub".into()];
        store.add_widget(&page, w, None).unwrap();
        assert!(store.select_category("a", json!("A")).unwrap());
        assert_eq!(store.cross_filters().own("a").unwrap()[0].field, "cat");
        store.drill_down("a", json!("A")).unwrap();
        assert!(store.cross_filters().own("a").is_none());
        // Selections now refer to the drilled dimension.
        store.select_category("a", json!("A1")).unwrap();
        assert_eq!(store.cross_filters().own("a").unwrap()[0].field, "sub");
    }

    #[test]
    fn test_hierarchy_change_clears_drill_state() {
        let (mut store, page) = store_with_page();
        let mut w = chart("a");
        w.drill_down_hierarchy = vec!["cat".into(), "sub".into()];
        store.add_widget(&page, w, None).unwrap();
        store.drill_down("a", json!("A")).unwrap();
        store
            .update_widget(
                "a",
                WidgetPatch {
                    drill_down_hierarchy: Some(vec!["cat".into(), "other".into()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.drill_state("a").is_none());
    }

    #[test]
    fn test_server_hierarchy_change_revokes_own_selection() {
        let (mut store, page) = store_with_page();
        let mut w = chart("a");
        w.drill_down_hierarchy = vec!["cat".into(), "sub".into()];
        store.add_widget(&page, w, None).unwrap();
        store.drill_down("a", json!("A")).unwrap();
        store.select_category("a", json!("A1")).unwrap();

        let mut server = store.widget("a").unwrap().clone();
        server.drill_down_hierarchy = vec!["cat".into(), "other".into()];
        server.updated_at = Utc::now() + chrono::Duration::minutes(1);
        let response = Ok(Record::Widget(WidgetRecord {
            page_id: page.clone(),
            widget: server,
        }));

        assert_eq!(
            store.reconcile(&EntityKey::widget("a"), response),
            SyncOutcome::Applied
        );
        assert!(store.drill_state("a").is_none());
        assert!(store.cross_filters().own("a").is_none());
    }

    #[test]
    fn test_failed_run_keeps_previous_series() {
        let (mut store, page) = store_with_page();
        store.add_widget(&page, chart("a"), None).unwrap();
        let data = Dataset::from_rows(vec![json!({"cat": "A", "val": 1})
            .as_object()
            .cloned()
            .unwrap()]);
        store.refresh_local("a", &data, &Limits::default()).unwrap();
        assert_eq!(store.view("a").unwrap().series().len(), 1);

        store
            .apply_result("a", SeriesResult::failed(Some("cat".into()), "boom"))
            .unwrap();
        let view = store.view("a").unwrap();
        assert_eq!(view.series().len(), 1);
        assert_eq!(view.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_refresh_targets() {
        let (mut store, page) = store_with_page();
        store.add_widget(&page, chart("a"), None).unwrap();
        let mut b = chart("b");
        b.enable_cross_filter = false;
        store.add_widget(&page, b, None).unwrap();
        store.add_widget(&page, chart("c"), None).unwrap();
        assert_eq!(
            store.widgets_to_refresh(&StoreEvent::CrossFilterChanged("a".into())),
            vec!["c".to_string()]
        );
        assert_eq!(
            store.widgets_to_refresh(&StoreEvent::GlobalFiltersChanged).len(),
            3
        );
    }

    #[test]
    fn test_page_source_overrides_widget_source() {
        let (mut store, page) = store_with_page();
        let mut w = chart("a");
        w.data_source_id = Some("widget-src".into());
        store.add_widget(&page, w, None).unwrap();
        assert_eq!(
            store.pipeline_inputs("a").unwrap().source_id.as_deref(),
            Some("widget-src")
        );
        store.set_page_source(&page, Some("page-src".into())).unwrap();
        assert_eq!(
            store.pipeline_inputs("a").unwrap().source_id.as_deref(),
            Some("page-src")
        );
    }
}
