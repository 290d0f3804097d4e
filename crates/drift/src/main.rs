//! Drift CLI: stage an NDJSON file and emit the warehouse load script.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use drift::{BulkLoader, CliArgs, LoaderConfig, NdjsonSource, SqlScriptConnection, init_tracing};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    info!("Loading config from {}", args.config.display());
    let config = match LoaderConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut source = match NdjsonSource::open(
        &args.input,
        args.input_compression(),
        args.fields.clone(),
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open input: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Loading {} into {}",
        args.input.display(),
        config.qualified_table()
    );

    let connection = SqlScriptConnection::new(std::io::stdout(), config.target.columns.clone());
    match BulkLoader::run(config, &mut source, connection).await {
        Ok(outcome) => {
            info!(
                "Loaded {} row(s) from {} file(s), {} rejected",
                outcome.rows_loaded,
                outcome.files.len(),
                outcome.rows_rejected
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Load failed ({}): {e}", e.phase());
            ExitCode::FAILURE
        }
    }
}
