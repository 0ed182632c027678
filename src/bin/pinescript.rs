#[path = "../cli/mod.rs"]
mod cli;

use clap::{Parser, Subcommand};

use cli::compile::CompileArgs;
use cli::run::RunArgs;

#[derive(Parser)]
#[command(name = "pinescript", version, about = "pinescript-rs demo CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a script and report diagnostics
    Compile(CompileArgs),
    /// Compile a script, feed it a CSV of OHLCV bars, print plots and trades
    Run(RunArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compile(args) => cli::compile::cmd_compile(args),
        Command::Run(args) => cli::run::cmd_run(args),
    }
}
