pub mod compile;
pub mod run;

use std::path::Path;
use std::process;

/// Read `path` to a string or print a uniform error and exit — every
/// subcommand needs source text before it can do anything else.
pub fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// A single parsed OHLCV row from the demo CSV format
/// (`time,open,high,low,close,volume`, no header).
pub struct CsvBar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Minimal CSV reader for the CLI demo only (§1 explicitly keeps a real
/// CSV loader out of the crate's core surface — this is not meant to
/// grow into one).
pub fn read_csv_bars(path: &Path) -> Vec<CsvBar> {
    let text = read_source(path);
    let mut bars = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            eprintln!(
                "error: {}:{}: expected 6 comma-separated fields, got {}",
                path.display(),
                lineno + 1,
                fields.len()
            );
            process::exit(1);
        }
        let parse = |s: &str| -> f64 {
            s.parse().unwrap_or_else(|_| {
                eprintln!(
                    "error: {}:{}: could not parse '{}' as a number",
                    path.display(),
                    lineno + 1,
                    s
                );
                process::exit(1);
            })
        };
        bars.push(CsvBar {
            time: parse(fields[0]) as i64,
            open: parse(fields[1]),
            high: parse(fields[2]),
            low: parse(fields[3]),
            close: parse(fields[4]),
            volume: parse(fields[5]),
        });
    }
    bars
}
