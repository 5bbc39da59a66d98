mod cli;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use workitems::config;
use workitems::WorkItemClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = cli::parse_command(&args)?;
    if command == cli::Command::Help {
        cli::print_help();
        return Ok(());
    }

    let config = config::load_config()?;
    let server = config.server.with_context(|| {
        format!(
            "No server configured. Add a [server] table to {}",
            config::config_path().display()
        )
    })?;

    let client = WorkItemClient::from_config(&server)?;
    tracing::debug!(
        server = client.server_url(),
        collection = client.collection(),
        project = client.project(),
        "client ready"
    );

    cli::run(&client, command, server.batch_size).await
}
