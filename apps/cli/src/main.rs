//! projectmap CLI: maps every project of an organization into a
//! repository/pipeline diagram and publishes it to the project wiki.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;
use indicatif::ProgressBar;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = commands::load_app_config(&cli)?;
    // Stays undrawn until `run` gives it a style and a tick.
    let spinner = ProgressBar::new_spinner();
    commands::init_tracing(&cli, &config, &spinner)?;
    commands::run(cli, config, spinner).await
}
