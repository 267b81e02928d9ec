//! textmark CLI — Textile to CommonMark+GFM conversion driver.
//!
//! Converts single documents or whole directory trees of Textile files
//! to Markdown via the textmark pipeline around pandoc.

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
