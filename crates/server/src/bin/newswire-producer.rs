//! newswire-producer: polls the target boards and appends new submissions to
//! the log.

use clap::Parser;

use newswire_server::lifecycle::{cancel_on_signal, init_tracing, CommonArgs};
use newswire_server::pipeline::run_producer;

/// Poll the upstream forum and publish new submissions.
#[derive(Parser, Debug)]
#[command(name = "newswire-producer", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.common.load_config()?;

    run_producer(config, cancel_on_signal()).await
}
