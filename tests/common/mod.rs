#![allow(dead_code)]

use dashcore::model::{Aggregation, Widget};
use dashcore::value::Row;
use polars::prelude::*;
use serde_json::{json, Value};
use std::fs::File;
use std::path::{Path, PathBuf};

pub fn rows(v: Value) -> Vec<Row> {
    v.as_array()
        .expect("fixture must be an array")
        .iter()
        .map(|r| r.as_object().cloned().expect("fixture rows must be objects"))
        .collect()
}

/// Region / product / quarter sales, small enough to check by hand.
pub fn sales_rows() -> Vec<Row> {
    rows(json!([
        {"region": "EU", "product": "Widget", "quarter": "Q1", "revenue": 100, "units": 10},
        {"region": "EU", "product": "Gadget", "quarter": "Q1", "revenue": 50,  "units": 5},
        {"region": "US", "product": "Widget", "quarter": "Q1", "revenue": 200, "units": 20},
        {"region": "EU", "product": "Widget", "quarter": "Q2", "revenue": 120, "units": 12},
        {"region": "APAC", "product": "Gadget", "quarter": "Q2", "revenue": 80, "units": 8},
        {"region": "US", "product": "Gadget", "quarter": "Q2", "revenue": null, "units": 3}
    ]))
}

pub fn bar_widget(id: &str, dimension: &str, value: &str, aggregation: Aggregation) -> Widget {
    let mut w = Widget::new(id);
    w.title = id.to_uppercase();
    w.x_axis = Some(dimension.to_string());
    w.y_axis = Some(value.to_string());
    w.aggregation = aggregation;
    w
}

/// Write the sales fixture as CSV (null revenue left empty).
pub fn write_sales_csv(dir: &Path) -> PathBuf {
    let path = dir.join("sales.csv");
    let mut df = df!(
        "region" => ["EU", "EU", "US", "EU", "APAC", "US"],
        "product" => ["Widget", "Gadget", "Widget", "Widget", "Gadget", "Gadget"],
        "quarter" => ["Q1", "Q1", "Q1", "Q2", "Q2", "Q2"],
        "revenue" => [Some(100i64), Some(50), Some(200), Some(120), Some(80), None],
        "units" => [10i64, 5, 20, 12, 8, 3]
    )
    .expect("fixture frame");
    let mut file = File::create(&path).expect("create csv");
    CsvWriter::new(&mut file)
        .finish(&mut df)
        .expect("write csv");
    path
}
