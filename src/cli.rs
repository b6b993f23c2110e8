use clap::Parser;
use std::path::PathBuf;

/// Parse `NAME=VALUE` pairs given on the command line.
fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

/// Command-line arguments for dashcore
#[derive(Parser, Debug)]
#[command(version, about = "Compute dashboard widget series from CSV data sources")]
pub struct Args {
    /// Dashboard definition (JSON)
    pub dashboard: Option<PathBuf>,

    /// Register a CSV file as a data source: --source sales=data/sales.csv
    #[arg(long = "source", value_parser = parse_pair)]
    pub sources: Vec<(String, String)>,

    /// Only compute these widgets (repeatable)
    #[arg(long = "widget")]
    pub widgets: Vec<String>,

    /// Drill a widget into a clicked category before computing: --drill w1=Europe
    #[arg(long = "drill", value_parser = parse_pair)]
    pub drills: Vec<(String, String)>,

    /// Broadcast a selected category from a widget to the others: --select w1=Europe
    #[arg(long = "select", value_parser = parse_pair)]
    pub selections: Vec<(String, String)>,

    /// Pretty-print the JSON output
    #[arg(long = "pretty", action)]
    pub pretty: bool,

    /// Enable debug logging
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Write the default configuration file and exit
    #[arg(long = "init-config", action)]
    pub init_config: bool,

    /// Overwrite an existing configuration file with --init-config
    #[arg(long = "force", action, requires = "init_config")]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repeated_pairs() {
        let args = Args::parse_from([
            "dashcore",
            "dash.json",
            "--source",
            "sales=data/sales.csv",
            "--source",
            "web=web.csv",
            "--drill",
            "w1=Europe",
        ]);
        assert_eq!(args.sources.len(), 2);
        assert_eq!(args.sources[0], ("sales".into(), "data/sales.csv".into()));
        assert_eq!(args.drills, vec![("w1".to_string(), "Europe".to_string())]);
    }

    #[test]
    fn test_rejects_malformed_pair() {
        assert!(Args::try_parse_from(["dashcore", "d.json", "--source", "nope"]).is_err());
        assert!(Args::try_parse_from(["dashcore", "--force"]).is_err());
    }
}
