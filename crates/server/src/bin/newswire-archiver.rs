//! newswire-archiver: reads the log under the base consumer group, enriches
//! and upserts every submission.

use clap::Parser;

use newswire_server::lifecycle::{cancel_on_signal, init_tracing, CommonArgs};
use newswire_server::pipeline::run_archiver;

/// Enrich and persist every submission on the log.
#[derive(Parser, Debug)]
#[command(name = "newswire-archiver", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.common.load_config()?;

    run_archiver(config, cancel_on_signal()).await
}
