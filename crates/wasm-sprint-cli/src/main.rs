use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wasm-sprint")]
#[command(about = "Baseline single-pass WebAssembly compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every function of a module and report per-function outcomes.
    Compile {
        #[arg(help = "Input WASM or WAT file")]
        input: PathBuf,

        #[arg(short, long, help = "Write the concatenated code of compiled functions here")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { input, output } => {
            let wasm = read_wasm(&input)?;
            let module = wasm_sprint::compile(&wasm).context("Compilation failed")?;

            let mut compiled = 0usize;
            let mut bailed = 0usize;
            let mut code = Vec::new();
            for function in &module.functions {
                if function.ok {
                    compiled += 1;
                    code.extend_from_slice(function.code());
                    println!(
                        "func {}: ok ({} bytes, safepoint table at {})",
                        function.index,
                        function.code().len(),
                        function.safepoint_table_offset
                    );
                } else {
                    bailed += 1;
                    println!(
                        "func {}: bailout ({})",
                        function.index,
                        function.bailout_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            println!(
                "{} of {} functions compiled, {} deferred to a higher tier",
                compiled,
                module.functions.len(),
                bailed
            );

            if let Some(output) = output {
                fs::write(&output, &code)
                    .with_context(|| format!("Failed to write output to {}", output.display()))?;
                println!("Wrote {} bytes to {}", code.len(), output.display());
            }
        }
    }

    Ok(())
}

fn read_wasm(path: &PathBuf) -> Result<Vec<u8>> {
    let contents = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    if path.extension().is_some_and(|e| e == "wat") {
        wat::parse_bytes(&contents)
            .map(std::borrow::Cow::into_owned)
            .map_err(|e| anyhow::anyhow!("WAT parse error: {e}"))
    } else {
        Ok(contents)
    }
}
