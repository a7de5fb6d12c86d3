//! newswire-api: streaming consumer, socket fan-out and static site.
//!
//! # Usage
//!
//! ```bash
//! # Against Redis and Postgres named in config/config.yaml
//! newswire-api
//!
//! # Single-process dev mode: in-memory log, no database
//! KAFKA_BACKEND=memory newswire-api --no-store
//! ```

use clap::Parser;

use newswire_server::lifecycle::{cancel_on_signal, init_tracing, CommonArgs};
use newswire_server::pipeline::run_api;

/// Serve enriched submissions to browsers over a WebSocket.
#[derive(Parser, Debug)]
#[command(name = "newswire-api", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Skip the database; enriched posts are only broadcast.
    #[arg(long, env = "NEWSWIRE_NO_STORE")]
    no_store: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.common.load_config()?;

    run_api(config, !cli.no_store, cancel_on_signal()).await
}
