mod common;

use async_trait::async_trait;
use common::{bar_widget, sales_rows};
use dashcore::crossfilter::CrossFilterBus;
use dashcore::dataset::{Dataset, DatasetAccessor, MemoryAccessor, RemoteQuery, SourceInfo};
use dashcore::model::Aggregation;
use dashcore::pipeline::{Limits, PipelineInputs};
use dashcore::runner::{RunOutcome, SeriesRunner};
use dashcore::value::Row;
use dashcore::SourceError;
use std::sync::Arc;
use std::time::Duration;

/// Accessor that answers after a fixed delay.
struct Slow {
    inner: MemoryAccessor,
    delay: Duration,
}

#[async_trait]
impl DatasetAccessor for Slow {
    async fn describe(&self, source_id: &str) -> Result<SourceInfo, SourceError> {
        self.inner.describe(source_id).await
    }

    async fn get_dataset(&self, source_id: &str) -> Result<Dataset, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_dataset(source_id).await
    }

    async fn get_remote_aggregate(
        &self,
        source_id: &str,
        query: &RemoteQuery,
    ) -> Result<Vec<Row>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_remote_aggregate(source_id, query).await
    }
}

fn inputs(dimension: &str) -> PipelineInputs {
    let widget = bar_widget("w1", dimension, "revenue", Aggregation::Sum);
    PipelineInputs::capture(&widget, Some("sales".into()), &CrossFilterBus::new(), &[], None)
}

#[tokio::test(start_paused = true)]
async fn test_stale_run_is_superseded() {
    let accessor = Arc::new(Slow {
        inner: MemoryAccessor::new().with_dataset("sales", Dataset::from_rows(sales_rows())),
        delay: Duration::from_secs(1),
    });
    let runner = SeriesRunner::new(accessor, Limits::default());

    let (first, second) = tokio::join!(runner.run(inputs("region")), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.run(inputs("product")).await
    });

    assert_eq!(first, RunOutcome::Superseded);
    match second {
        RunOutcome::Completed(result) => {
            assert_eq!(result.dimension.as_deref(), Some("product"));
            assert_eq!(result.series.len(), 2);
        }
        RunOutcome::Superseded => panic!("latest run must complete"),
    }
    assert!(!runner.is_running("w1"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_run() {
    let accessor = Arc::new(Slow {
        inner: MemoryAccessor::new().with_dataset("sales", Dataset::from_rows(sales_rows())),
        delay: Duration::from_secs(5),
    });
    let runner = SeriesRunner::new(accessor, Limits::default());

    let (outcome, cancelled) = tokio::join!(runner.run(inputs("region")), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        runner.cancel("w1")
    });
    assert!(cancelled);
    assert_eq!(outcome, RunOutcome::Superseded);
}
