//! Async series evaluation against a dataset accessor.
//!
//! Chooses the local or remote path per source and supersedes stale runs: a new refresh for a
//! widget cancels the previous one, so an old answer can never overwrite a newer one.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::dataset::DatasetAccessor;
use crate::error_display::user_message_from_source;
use crate::model::WidgetId;
use crate::pipeline::{finish_remote, remote_query, run_local, Limits, PipelineInputs, SeriesResult};
use crate::scheduler::KeyedScheduler;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(SeriesResult),
    /// A newer run for the same widget started before this one finished.
    Superseded,
}

/// Evaluate one widget. Accessor failures become a widget-scoped error on the result.
pub async fn evaluate<A>(accessor: &A, inputs: &PipelineInputs, limits: &Limits) -> SeriesResult
where
    A: DatasetAccessor + ?Sized,
{
    if !inputs.is_configured() {
        return SeriesResult::not_configured();
    }
    let dimension = inputs.dimension.clone();
    let Some(source) = inputs.source_id.as_deref() else {
        return SeriesResult::failed(dimension, "No data source is selected for this widget.");
    };

    let info = match accessor.describe(source).await {
        Ok(info) => info,
        Err(e) => {
            warn!(widget = %inputs.widget.id, source, error = %e, "describe failed");
            return SeriesResult::failed(dimension, user_message_from_source(&e));
        }
    };

    let remote = info.remote_only || info.total_row_count > limits.remote_row_threshold;
    debug!(
        widget = %inputs.widget.id,
        source,
        rows = info.total_row_count,
        remote,
        "evaluating widget"
    );

    if remote {
        let Some(query) = remote_query(inputs, limits) else {
            return SeriesResult::not_configured();
        };
        match accessor.get_remote_aggregate(source, &query).await {
            Ok(rows) => finish_remote(inputs, rows, limits),
            Err(e) => {
                warn!(widget = %inputs.widget.id, source, error = %e, "remote aggregation failed");
                SeriesResult::failed(dimension, user_message_from_source(&e))
            }
        }
    } else {
        match accessor.get_dataset(source).await {
            Ok(dataset) => run_local(inputs, &dataset, limits),
            Err(e) => {
                warn!(widget = %inputs.widget.id, source, error = %e, "dataset load failed");
                SeriesResult::failed(dimension, user_message_from_source(&e))
            }
        }
    }
}

pub struct SeriesRunner<A: ?Sized> {
    accessor: Arc<A>,
    limits: Limits,
    scheduler: KeyedScheduler<WidgetId>,
}

impl<A> SeriesRunner<A>
where
    A: DatasetAccessor + ?Sized + 'static,
{
    pub fn new(accessor: Arc<A>, limits: Limits) -> Self {
        Self {
            accessor,
            limits,
            scheduler: KeyedScheduler::immediate(),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Refresh a widget, superseding any run still in flight for it.
    pub async fn run(&self, inputs: PipelineInputs) -> RunOutcome {
        let widget_id = inputs.widget.id.clone();
        let dimension = inputs.dimension.clone();
        let accessor = Arc::clone(&self.accessor);
        let limits = self.limits;
        let handle = self.scheduler.schedule(widget_id.clone(), move |_| async move {
            evaluate(accessor.as_ref(), &inputs, &limits).await
        });
        match handle.await {
            Ok(Some(result)) => RunOutcome::Completed(result),
            Ok(None) => {
                debug!(widget = %widget_id, "run superseded");
                RunOutcome::Superseded
            }
            Err(e) => {
                warn!(widget = %widget_id, error = %e, "series task failed");
                RunOutcome::Completed(SeriesResult::failed(
                    dimension,
                    "The chart could not be computed.",
                ))
            }
        }
    }

    /// Abort an in-flight run, e.g. when its widget is deleted.
    pub fn cancel(&self, widget_id: &str) -> bool {
        self.scheduler.cancel(&widget_id.to_string())
    }

    pub fn is_running(&self, widget_id: &str) -> bool {
        self.scheduler.is_pending(&widget_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossfilter::CrossFilterBus;
    use crate::dataset::{Dataset, MemoryAccessor};
    use crate::model::Widget;
    use crate::pipeline::SeriesStatus;
    use crate::value::Row;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        json!([
            {"cat": "A", "val": 10}, {"cat": "A", "val": 20}, {"cat": "B", "val": 5}
        ])
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_object().cloned().unwrap())
        .collect()
    }

    fn inputs(source: Option<&str>) -> PipelineInputs {
        let mut w = Widget::new("w1");
        w.x_axis = Some("cat".into());
        w.y_axis = Some("val".into());
        PipelineInputs::capture(&w, source.map(String::from), &CrossFilterBus::new(), &[], None)
    }

    #[tokio::test]
    async fn test_local_and_remote_paths_agree() {
        let mut accessor = MemoryAccessor::new().with_dataset("s", Dataset::from_rows(rows()));
        let local = evaluate(&accessor, &inputs(Some("s")), &Limits::default()).await;
        accessor.mark_remote("s");
        let remote = evaluate(&accessor, &inputs(Some("s")), &Limits::default()).await;
        assert_eq!(local.series, remote.series);
        assert_eq!(local.series[0]["val"], json!(30));
    }

    #[tokio::test]
    async fn test_threshold_selects_remote() {
        let accessor = MemoryAccessor::new().with_dataset("s", Dataset::from_rows(rows()));
        let limits = Limits {
            remote_row_threshold: 2,
            ..Limits::default()
        };
        let out = evaluate(&accessor, &inputs(Some("s")), &limits).await;
        assert_eq!(out.series.len(), 2);
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_widget_scoped() {
        let accessor = MemoryAccessor::new();
        let out = evaluate(&accessor, &inputs(Some("missing")), &Limits::default()).await;
        assert_eq!(out.status, SeriesStatus::Ready);
        assert!(out.error.unwrap().contains("missing"));

        let out = evaluate(&accessor, &inputs(None), &Limits::default()).await;
        assert!(out.error.is_some());
    }

    #[tokio::test]
    async fn test_runner_completes() {
        let accessor = Arc::new(MemoryAccessor::new().with_dataset("s", Dataset::from_rows(rows())));
        let runner = SeriesRunner::new(accessor, Limits::default());
        match runner.run(inputs(Some("s"))).await {
            RunOutcome::Completed(r) => assert_eq!(r.series.len(), 2),
            RunOutcome::Superseded => panic!("nothing superseded this run"),
        }
        assert!(!runner.is_running("w1"));
    }
}
