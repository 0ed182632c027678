use std::path::PathBuf;
use std::process;

use clap::Args;
use tracing::{info, warn};

use super::read_source;

#[derive(Args)]
pub struct CompileArgs {
    /// Input script file
    pub input: PathBuf,
    /// Print the resolved function table and statement count instead of
    /// just "OK"
    #[arg(long)]
    pub verbose: bool,
}

pub fn cmd_compile(args: CompileArgs) {
    let CompileArgs { input, verbose } = args;
    let source = read_source(&input);
    let filename = input.display().to_string();

    info!(file = %filename, "compiling");

    match pinescript::compile(&source) {
        Ok(program) => {
            println!("OK: {}", filename);
            if verbose {
                println!(
                    "  {} top-level statement(s)",
                    program.script().stmts.len()
                );
            }
        }
        Err(diagnostics) => {
            warn!(count = diagnostics.len(), "compilation failed");
            pinescript::render_diagnostics(&diagnostics, &filename, &source);
            process::exit(1);
        }
    }
}
