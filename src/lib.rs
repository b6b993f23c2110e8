//! Analytics widget pipeline for dashboard builders.
//!
//! Raw rows from a data source become display-ready series through filtering, grouping,
//! sorting and capping ([`pipeline`]). Around that sit the interactive pieces of a dashboard:
//! hierarchical drill-down ([`drilldown`]), cross-widget filtering ([`crossfilter`]), a
//! collision-free 12-column grid ([`layout`]) and a store that applies edits locally and
//! reconciles them with a persistence collaborator ([`store`], [`autosave`]).

pub mod aggregate;
pub mod autosave;
pub mod cli;
pub mod config;
pub mod crossfilter;
pub mod dataset;
pub mod drilldown;
pub mod error;
pub mod error_display;
pub mod filter;
pub mod layout;
pub mod legend;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod runner;
pub mod scheduler;
pub mod series;
pub mod source;
pub mod store;
pub mod value;

pub use autosave::Autosaver;
pub use config::{AppConfig, ConfigManager};
pub use crossfilter::CrossFilterBus;
pub use dataset::{Dataset, DatasetAccessor, MemoryAccessor};
pub use drilldown::{DrillDownRegistry, DrillDownState};
pub use error::{DrillError, LayoutError, PersistenceError, SourceError, StoreError};
pub use filter::{Filter, FilterOperator};
pub use layout::{GridBox, GridLayout};
pub use model::{Aggregation, Dashboard, GlobalFilter, MeasureConfig, Page, Widget, WidgetPatch};
pub use persistence::{EntityKey, MemoryPersistence, Persistence, Record};
pub use pipeline::{compute_series, Limits, PipelineInputs, SeriesResult, SeriesStatus};
pub use runner::{RunOutcome, SeriesRunner};
pub use source::FrameAccessor;
pub use store::{DashboardStore, StoreEvent, SyncOp, SyncOutcome};
pub use value::Row;

/// Application name used for the config directory
pub const APP_NAME: &str = "dashcore";
