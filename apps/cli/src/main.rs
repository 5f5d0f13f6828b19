//! CourseMind CLI: AI-authored courses with progress tracking and plan limits.
//!
//! Creates courses from an outline, generates each topic's theory and media,
//! and records users and subscriptions in a local libSQL database.

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
