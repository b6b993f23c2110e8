mod common;

use common::{bar_widget, rows, sales_rows};
use dashcore::crossfilter::CrossFilterBus;
use dashcore::dataset::Dataset;
use dashcore::drilldown::DrillDownRegistry;
use dashcore::filter::{apply_filters, Filter, FilterOperator};
use dashcore::model::{
    Aggregation, GlobalFilter, MeasureConfig, SortDirection, SortKey, SortSpec,
};
use dashcore::pipeline::{compute_series, Limits, SeriesStatus};
use dashcore::series::Notice;
use dashcore::value::Row;
use serde_json::{json, Value};

fn column(series: &[Row], name: &str) -> Vec<Value> {
    series.iter().map(|r| r.get(name).cloned().unwrap_or(Value::Null)).collect()
}

fn run(widget: &dashcore::Widget, data: Vec<Row>) -> dashcore::SeriesResult {
    compute_series(
        widget,
        &Dataset::from_rows(data),
        &CrossFilterBus::new(),
        &[],
        None,
        &Limits::default(),
    )
}

#[test]
fn test_sum_by_category_in_first_seen_order() {
    let data = rows(json!([
        {"cat": "A", "val": 10}, {"cat": "A", "val": 20}, {"cat": "B", "val": 5}
    ]));
    let result = run(&bar_widget("w", "cat", "val", Aggregation::Sum), data);
    assert_eq!(result.status, SeriesStatus::Ready);
    assert_eq!(
        result.series,
        rows(json!([{"cat": "A", "val": 30}, {"cat": "B", "val": 5}]))
    );
    assert!(result.notices.is_empty());
}

#[test]
fn test_null_cells_do_not_break_sum() {
    let result = run(
        &bar_widget("w", "region", "revenue", Aggregation::Sum),
        sales_rows(),
    );
    assert_eq!(column(&result.series, "region"), vec![json!("EU"), json!("US"), json!("APAC")]);
    assert_eq!(column(&result.series, "revenue"), vec![json!(270), json!(200), json!(80)]);
}

#[test]
fn test_large_input_is_sampled_with_notice() {
    let data: Vec<Row> = (0..60_000)
        .map(|i| {
            json!({"cat": format!("c{}", i % 3), "val": 1})
                .as_object()
                .cloned()
                .unwrap()
        })
        .collect();
    let result = run(&bar_widget("w", "cat", "val", Aggregation::Count), data);
    assert!(result.notices.contains(&Notice::Sampled {
        shown: 50_000,
        total: 60_000
    }));
    let counted: u64 = result
        .series
        .iter()
        .map(|r| r["val"].as_u64().unwrap())
        .sum();
    assert_eq!(counted, 50_000);
}

#[test]
fn test_series_truncated_after_sorting() {
    let data: Vec<Row> = (0..2_500)
        .map(|i| json!({"cat": format!("c{}", i), "val": i}).as_object().cloned().unwrap())
        .collect();
    let mut widget = bar_widget("w", "cat", "val", Aggregation::Sum);
    widget.sort = Some(SortSpec::new(SortKey::Value, SortDirection::Desc));
    let result = run(&widget, data);
    assert_eq!(result.series.len(), 2_000);
    assert_eq!(result.series[0]["val"], json!(2_499));
    assert!(result.notices.contains(&Notice::Truncated {
        shown: 2_000,
        total: 2_500
    }));
}

#[test]
fn test_null_values_sort_last_in_both_directions() {
    let mut widget = bar_widget("w", "region", "revenue", Aggregation::None);
    widget.sort = Some(SortSpec::new(SortKey::Value, SortDirection::Desc));
    let desc = run(&widget, sales_rows());
    assert_eq!(
        column(&desc.series, "revenue"),
        vec![json!(200), json!(120), json!(100), json!(80), json!(50), Value::Null]
    );

    widget.sort = Some(SortSpec::new(SortKey::Value, SortDirection::Asc));
    let asc = run(&widget, sales_rows());
    assert_eq!(asc.series.last().unwrap()["revenue"], Value::Null);
    assert_eq!(asc.series[0]["revenue"], json!(50));
}

#[test]
fn test_legend_pivot_fills_missing_combinations() {
    let mut widget = bar_widget("w", "region", "revenue", Aggregation::Sum);
    widget.legend_field = Some("product".into());
    widget
        .legend_aliases
        .insert("Widget".into(), "Widgets".into());
    let result = run(&widget, sales_rows());
    assert_eq!(result.value_columns, vec!["Widgets".to_string(), "Gadget".to_string()]);
    assert_eq!(
        result.series,
        rows(json!([
            {"region": "EU", "Widgets": 220, "Gadget": 50},
            {"region": "US", "Widgets": 200, "Gadget": 0},
            {"region": "APAC", "Gadget": 80, "Widgets": 0}
        ]))
    );
}

#[test]
fn test_multi_measure_on_one_field() {
    let mut widget = bar_widget("w", "region", "revenue", Aggregation::Sum);
    widget.bar_measures = vec![MeasureConfig::new("revenue", Aggregation::Sum).with_alias("Total")];
    widget.line_measures = vec![MeasureConfig::new("units", Aggregation::Max)];
    let result = run(&widget, sales_rows());
    assert_eq!(result.value_columns, vec!["revenue".to_string(), "units".to_string()]);
    assert_eq!(result.labels["revenue"], "Total");
    assert_eq!(result.labels["units"], "units");
    assert_eq!(result.series[0]["units"], json!(12));

    widget.line_measures = vec![MeasureConfig::new("revenue", Aggregation::Avg)];
    let result = run(&widget, sales_rows());
    assert_eq!(
        result.value_columns,
        vec!["SUM(revenue)".to_string(), "AVG(revenue)".to_string()]
    );
    assert_eq!(result.series[0]["AVG(revenue)"], json!(90));
}

#[test]
fn test_unconfigured_axes() {
    let mut widget = bar_widget("w", "region", "revenue", Aggregation::Sum);
    widget.y_axis = None;
    let result = run(&widget, sales_rows());
    assert_eq!(result.status, SeriesStatus::NotConfigured);
    assert!(result.series.is_empty());
    assert!(result.error.is_none());
}

#[test]
fn test_filter_composition_is_order_independent() {
    let a = Filter::new("revenue", FilterOperator::GreaterThan, json!(60));
    let b = Filter::new("region", FilterOperator::NotEquals, json!("US"));
    let c = Filter::new("product", FilterOperator::StartsWith, json!("Wid"));

    assert_eq!(apply_filters(sales_rows(), &[]), sales_rows());
    let abc = apply_filters(sales_rows(), &[a.clone(), b.clone(), c.clone()]);
    let cab = apply_filters(sales_rows(), &[c.clone(), a.clone(), b.clone()]);
    let stepwise = apply_filters(apply_filters(sales_rows(), &[a, b]), &[c]);
    assert_eq!(abc, cab);
    assert_eq!(abc, stepwise);
    assert_eq!(abc.len(), 2);
}

#[test]
fn test_global_filter_targets() {
    let widget = bar_widget("w1", "region", "revenue", Aggregation::Sum);
    let eu_only = GlobalFilter::new("g1", Filter::equals("region", json!("EU")));
    let elsewhere = GlobalFilter::new("g2", Filter::equals("region", json!("US")))
        .targeting(vec!["other".into()]);
    let result = compute_series(
        &widget,
        &Dataset::from_rows(sales_rows()),
        &CrossFilterBus::new(),
        &[eu_only, elsewhere],
        None,
        &Limits::default(),
    );
    assert_eq!(result.series, rows(json!([{"region": "EU", "revenue": 270}])));
}

#[test]
fn test_cross_filter_skips_source_and_opted_out() {
    let data = Dataset::from_rows(sales_rows());
    let mut bus = CrossFilterBus::new();
    bus.toggle_selection("source", "region", json!("EU"));

    let source = bar_widget("source", "region", "revenue", Aggregation::Sum);
    let target = bar_widget("target", "product", "revenue", Aggregation::Sum);
    let mut opted_out = bar_widget("solo", "product", "revenue", Aggregation::Sum);
    opted_out.enable_cross_filter = false;

    let limits = Limits::default();
    let own = compute_series(&source, &data, &bus, &[], None, &limits);
    assert_eq!(own.series.len(), 3);

    let filtered = compute_series(&target, &data, &bus, &[], None, &limits);
    assert_eq!(
        filtered.series,
        rows(json!([{"product": "Widget", "revenue": 220}, {"product": "Gadget", "revenue": 50}]))
    );

    let solo = compute_series(&opted_out, &data, &bus, &[], None, &limits);
    assert_eq!(column(&solo.series, "revenue"), vec![json!(420), json!(130)]);
}

#[test]
fn test_drill_down_regroups_by_next_level() {
    let mut widget = bar_widget("w", "region", "revenue", Aggregation::Sum);
    widget.drill_down_hierarchy = vec!["region".into(), "product".into()];
    let mut registry = DrillDownRegistry::new();
    registry.drill_down(&widget, json!("EU")).unwrap();

    let result = compute_series(
        &widget,
        &Dataset::from_rows(sales_rows()),
        &CrossFilterBus::new(),
        &[],
        registry.get("w"),
        &Limits::default(),
    );
    assert_eq!(result.dimension.as_deref(), Some("product"));
    assert_eq!(
        result.series,
        rows(json!([{"product": "Widget", "revenue": 220}, {"product": "Gadget", "revenue": 50}]))
    );
}
