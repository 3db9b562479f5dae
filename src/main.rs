//! Match Review desktop binary.

use std::path::PathBuf;

use clap::Parser;
use matchreview::{GuiOptions, ReviewSchema};
use tracing::info;

/// Review, edit, and validate match results in a table.
#[derive(Parser, Debug)]
#[command(name = "matchreview", version)]
struct Args {
    /// Match results file to open (.json, .json5 or .gz)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// JSON5 file describing key, toggle, dependent fields and columns
    #[arg(short, long, value_name = "PATH")]
    schema: Option<PathBuf>,

    /// File committed rows are merged into (default: <INPUT>.validated.json)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_tracing(args.verbose);

    let schema = match &args.schema {
        Some(path) => ReviewSchema::load_path(path)?,
        None => ReviewSchema::default(),
    };
    info!(
        key_field = %schema.key_field,
        toggle_field = %schema.toggle_field,
        "starting matchreview"
    );

    matchreview::run_gui(GuiOptions {
        input: args.input,
        output: args.output,
        schema,
    })
    .map_err(|e| anyhow::anyhow!("gui failed: {e}"))
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "matchreview=debug" } else { "matchreview=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
