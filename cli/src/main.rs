//! `garage` entry point.

use clap::Parser;
use garage_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    garage_cli::run(Cli::parse()).await
}
