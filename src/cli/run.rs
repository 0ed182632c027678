use std::path::PathBuf;
use std::process;

use clap::Args;
use tracing::{debug, info, warn};

use pinescript::{Bar, Context};

use super::{read_csv_bars, read_source};

#[derive(Args)]
pub struct RunArgs {
    /// Script file to run
    pub script: PathBuf,
    /// CSV of OHLCV rows: time,open,high,low,close,volume (no header)
    pub csv: PathBuf,
    /// Starting cash for the strategy book
    #[arg(long, default_value_t = 10_000.0)]
    pub cash: f64,
    /// Emit plots and trades as JSON instead of a text table
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_run(args: RunArgs) {
    let RunArgs {
        script,
        csv,
        cash,
        json,
    } = args;

    let source = read_source(&script);
    let filename = script.display().to_string();
    let program = match pinescript::compile(&source) {
        Ok(program) => program,
        Err(diagnostics) => {
            warn!(count = diagnostics.len(), "compilation failed");
            pinescript::render_diagnostics(&diagnostics, &filename, &source);
            process::exit(1);
        }
    };

    let bars = read_csv_bars(&csv);
    info!(bars = bars.len(), cash, "running");

    let mut ctx = Context::with_initial_cash(cash);
    for (i, row) in bars.iter().enumerate() {
        let bar = Bar {
            time: row.time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        };
        if let Err(e) = program.feed(&mut ctx, bar) {
            eprintln!("error: bar {}: {}", i, e);
            process::exit(1);
        }
        debug!(bar = i, "fed");
    }

    if json {
        print_json(&ctx);
    } else {
        print_table(&ctx);
    }
}

fn print_table(ctx: &Context) {
    println!("== plots ({} bars) ==", ctx.plots.bar_index());
    for title in ctx.plots.titles() {
        let series = ctx.plots.series(title).unwrap_or(&[]);
        let tail: Vec<String> = series
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|v| format!("{:.4}", v))
            .collect();
        println!("  {}: ... {}", title, tail.join(", "));
    }

    println!("== trades ==");
    for trade in &ctx.strategy.trades {
        println!(
            "  {:?} {} qty={:.4} entry={:.4}@{} exit={:.4}@{} pnl={:.4}",
            trade.direction,
            trade.id,
            trade.quantity,
            trade.entry_price,
            trade.entry_time,
            trade.exit_price,
            trade.exit_time,
            trade.pnl
        );
    }
    println!(
        "cash: {:.4} (open position: {})",
        ctx.strategy.cash,
        !ctx.strategy.position.is_flat()
    );
}

#[derive(serde::Serialize)]
struct TradeReport<'a> {
    id: &'a str,
    direction: &'static str,
    quantity: f64,
    entry_time: i64,
    entry_price: f64,
    exit_time: i64,
    exit_price: f64,
    pnl: f64,
}

#[derive(serde::Serialize)]
struct RunReport<'a> {
    plots: std::collections::BTreeMap<&'a str, Vec<Option<f64>>>,
    trades: Vec<TradeReport<'a>>,
    cash: f64,
}

fn print_json(ctx: &Context) {
    let plots = ctx
        .plots
        .iter()
        .map(|(title, series)| {
            let values = series
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect();
            (title, values)
        })
        .collect();

    let trades = ctx
        .strategy
        .trades
        .iter()
        .map(|t| TradeReport {
            id: &t.id,
            direction: match t.direction {
                pinescript::runtime::Direction::Long => "long",
                pinescript::runtime::Direction::Short => "short",
            },
            quantity: t.quantity,
            entry_time: t.entry_time,
            entry_price: t.entry_price,
            exit_time: t.exit_time,
            exit_price: t.exit_price,
            pnl: t.pnl,
        })
        .collect();

    let report = RunReport {
        plots,
        trades,
        cash: ctx.strategy.cash,
    };
    println!("{}", serde_json::to_string_pretty(&report).unwrap());
}
