//! Typed errors for the library. Configuration problems with a widget are not errors; they
//! surface as `SeriesStatus::NotConfigured`.

use polars::prelude::PolarsError;
use thiserror::Error;

pub use crate::drilldown::DrillError;

/// Failures of the dataset accessor (local load or remote aggregation).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown data source: {0}")]
    UnknownSource(String),
    #[error("remote aggregation is not available for source {0}")]
    RemoteUnavailable(String),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// A box set that would break the grid invariants. Single-widget placement never fails (it
/// degrades to a fallback slot); only multi-widget moves are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("box at ({x}, {y}) sized {w}x{h} does not fit the 12-column grid")]
    OutOfBounds { x: i64, y: i64, w: u32, h: u32 },
    #[error("box at ({x}, {y}) overlaps another widget")]
    Overlap { x: u32, y: u32 },
}

/// Failures reported by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown dashboard: {0}")]
    UnknownDashboard(String),
    #[error("unknown page: {0}")]
    UnknownPage(String),
    #[error("unknown widget: {0}")]
    UnknownWidget(String),
    #[error("unknown global filter: {0}")]
    UnknownGlobalFilter(String),
    #[error("no widgets in group {0}")]
    UnknownGroup(String),
    #[error("id already in use: {0}")]
    DuplicateId(String),
    #[error("group {group} cannot be placed: {source}")]
    GroupBlocked { group: String, source: LayoutError },
    #[error("widget {0} has no data source")]
    NoDataSource(String),
    #[error(transparent)]
    Drill(#[from] DrillError),
}
