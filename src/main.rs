use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use dashcore::cli::Args;
use dashcore::error_display::user_message_from_report;
use dashcore::{
    logging, AppConfig, ConfigManager, Dashboard, DashboardStore, FrameAccessor, RunOutcome,
    SeriesRunner, APP_NAME,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A clicked category from the command line: JSON when it parses, else a plain string.
fn category(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn run(args: &Args, path: &Path, config: &AppConfig) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let dashboard: Dashboard =
        serde_json::from_str(&content).wrap_err("Dashboard file is not valid JSON")?;
    let mut store = DashboardStore::with_layout(dashboard, config.grid_layout());

    let mut accessor = FrameAccessor::new();
    for (id, csv) in &args.sources {
        accessor.register_csv(id, Path::new(csv))?;
    }
    debug!(sources = ?accessor.source_ids(), "registered data sources");

    for (widget, value) in &args.drills {
        store.drill_down(widget, category(value))?;
    }
    for (widget, value) in &args.selections {
        store.select_category(widget, category(value))?;
    }

    let runner = SeriesRunner::new(Arc::new(accessor), config.limits());
    let mut report = serde_json::Map::new();
    for id in store.widget_ids() {
        if !args.widgets.is_empty() && !args.widgets.contains(&id) {
            continue;
        }
        let inputs = store.pipeline_inputs(&id)?;
        if let RunOutcome::Completed(result) = runner.run(inputs).await {
            store.apply_result(&id, result.clone())?;
            report.insert(id, serde_json::to_value(&result)?);
        }
    }
    info!(widgets = report.len(), "computed series");

    let out = Value::Object(report);
    let text = if args.pretty {
        serde_json::to_string_pretty(&out)?
    } else {
        serde_json::to_string(&out)?
    };
    println!("{}", text);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if args.init_config {
        let manager = ConfigManager::new(APP_NAME)?;
        let path = manager.write_default_config(args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = AppConfig::load(APP_NAME)?;
    logging::init(&config.logging.filter, args.debug);

    let path = args
        .dashboard
        .clone()
        .ok_or_else(|| eyre!("A dashboard file is required. See --help."))?;
    if let Err(e) = run(&args, &path, &config).await {
        eprintln!("Error: {}", user_message_from_report(&e, Some(&path)));
        std::process::exit(1);
    }
    Ok(())
}
