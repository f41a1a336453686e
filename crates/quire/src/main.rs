//! quire: render directive templates from the command line.

mod cli;
mod commands;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use quire_render::{RenderingConfig, RenderingKernel};

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level)?;

    let config = RenderingConfig::load(cli.config.as_deref(), cli.overrides())?;
    let kernel = RenderingKernel::new(&config)?;

    match cli.command {
        Command::Render(args) => commands::render(&kernel, &args),
        Command::Compile { templates } => commands::compile(&kernel, &templates),
        Command::Cache { action } => commands::cache(&kernel, &action),
    }
}
