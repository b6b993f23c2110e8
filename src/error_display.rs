//! User-facing error message formatting.
//!
//! Widget-scoped errors are shown inline on the chart, so messages are short and name the
//! problem rather than the library that reported it. Matching is on typed variants
//! (PolarsError, io::ErrorKind, SourceError), never on parsed strings.

use polars::prelude::PolarsError;
use std::io;
use std::path::Path;

use crate::error::{PersistenceError, SourceError};

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!(
            "Column not found: {}. Check the widget's field names against the data source.",
            msg
        ),
        PE::Duplicate(msg) => format!(
            "Duplicate column in result: {}. Configure each measure only once per aggregation.",
            msg
        ),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Schema mismatch: {}", msg),
        PE::InvalidOperation(msg) => format!("Operation not allowed: {}", msg),
        PE::SchemaFieldNotFound(msg) => format!("Schema field not found: {}", msg),
        PE::ComputeError(msg) => simplify_compute_message(msg),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => err.to_string(),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::ConnectionRefused => "Connection refused.".to_string(),
        ErrorKind::ConnectionReset => "Connection reset.".to_string(),
        ErrorKind::TimedOut => "The data source did not answer in time.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}

/// Message attached to a widget when its data could not be loaded or aggregated.
pub fn user_message_from_source(err: &SourceError) -> String {
    match err {
        SourceError::UnknownSource(id) => {
            format!("Data source {} is not available. Pick another source for this widget.", id)
        }
        SourceError::RemoteUnavailable(id) => format!(
            "Data source {} is too large to load and remote aggregation is unavailable.",
            id
        ),
        SourceError::Polars(e) => user_message_from_polars(e),
        SourceError::Io(e) => user_message_from_io(e, None),
        SourceError::Other(msg) => msg.clone(),
    }
}

pub fn user_message_from_persistence(err: &PersistenceError) -> String {
    match err {
        PersistenceError::NotFound(id) => {
            format!("{} no longer exists on the server. Reload the dashboard.", id)
        }
        PersistenceError::Rejected(msg) => format!("The server rejected the change: {}", msg),
        PersistenceError::Transport(msg) => {
            format!("Changes could not be saved ({}). They will be retried on the next edit.", msg)
        }
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find SourceError, PolarsError or io::Error.
pub fn user_message_from_report(report: &color_eyre::eyre::Report, path: Option<&Path>) -> String {
    let with_path = |msg: String| match path {
        Some(p) => format!("Failed to load {}: {}", p.display(), msg),
        None => msg,
    };
    for cause in report.chain() {
        if let Some(se) = cause.downcast_ref::<SourceError>() {
            return with_path(user_message_from_source(se));
        }
        if let Some(pe) = cause.downcast_ref::<PolarsError>() {
            return with_path(user_message_from_polars(pe));
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return with_path(user_message_from_io(io_err, None));
        }
    }

    // First line only; reports can carry long sections.
    let display = report.to_string();
    let first_line = display.lines().next().unwrap_or("An error occurred");
    with_path(first_line.trim().to_string())
}

/// Strip polars-internal hints that refer to API calls the user never made.
fn simplify_compute_message(msg: &str) -> String {
    let trimmed = match msg.find(". Try ") {
        Some(idx) => &msg[..idx],
        None => msg,
    };
    let trimmed = trimmed.trim_end_matches('.');
    if trimmed.contains("cannot compare") || trimmed.contains("casting from") {
        format!(
            "{}. A filter compares a field with a value of a different type.",
            trimmed
        )
    } else {
        trimmed.to_string()
    }
}
