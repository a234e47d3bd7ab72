//! GuidePress CLI: publish partner travel guides as branded pages.
//!
//! Reads the exported guide sheet, fetches full content from the partner
//! portal when credentials are configured, and maintains the published
//! catalog without ever publishing a guide twice.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
