mod args;
mod commands;

use anyhow::Context;
use args::{Cli, Commands};
use clap::Parser;
use dbagent::{AgentConfig, GuestAgent};
use std::process::ExitCode;

/// Logs go to stderr; stdout carries only the JSON response.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AgentConfig::load_from(path)?,
        None => AgentConfig::load()?,
    };
    let agent = GuestAgent::from_config(config).context("Failed to initialize agent")?;

    let request = match cli.command {
        Commands::Request { file } => commands::request::read_request(file)?,
        Commands::User { command } => commands::user::user_request(command),
        Commands::Database { command } => commands::database::database_request(command),
        command => commands::service::service_request(command)?,
    };

    let response = commands::execute(&agent, request).await?;
    Ok(if response.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
