//! ## herold
//! **Operator interface for the dispatch engine**
//!
//! - `validate` checks a configuration and prints the dispatch order
//! - `dispatch` routes JSON-lines alerts from a file or stdin
//! - `simulate` replays a seeded scenario against fault-injecting backends

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
