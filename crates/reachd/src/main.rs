//! reachd — the ReachGrid daemon.
//!
//! Keeps the request client pointed at the current cluster members:
//! static servers from the config file, plus the provider list polled in
//! the background when a provider URL is configured.
//!
//! # Usage
//!
//! ```text
//! reachd run --config /etc/reachgrid/reachd.toml
//! reachd check --config /etc/reachgrid/reachd.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use reach_core::address::parse_addresses;
use reach_core::{ClientConfig, ReachConfig};
use reachgrid_discovery::{RequestClient, ServerAddressesReader, ServerList};

#[derive(Parser)]
#[command(name = "reachd", about = "ReachGrid daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon until Ctrl-C.
    Run {
        /// Path to reachd.toml.
        #[arg(long, default_value = "reachd.toml")]
        config: PathBuf,

        /// Override the member id from the config file.
        #[arg(long)]
        member_id: Option<i64>,
    },
    /// Validate a config file and print the resolved settings.
    Check {
        #[arg(long, default_value = "reachd.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, member_id } => {
            let config = load_config(&config, member_id)?;
            run(config).await
        }
        Command::Check { config } => {
            let config = load_config(&config, None)?;
            print!("{}", describe(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,reachd=debug,reachgrid=debug")
        });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path, member_id: Option<i64>) -> anyhow::Result<ReachConfig> {
    let mut config = ReachConfig::from_file(path)?;
    if let Some(id) = member_id {
        config.node.member_id = id;
    }
    Ok(config)
}

/// Human-readable summary of the resolved config.
fn describe(config: &ReachConfig) -> anyhow::Result<String> {
    let client = &config.client;
    let schema = client.schema();
    let servers = parse_addresses(&client.servers, schema);

    let mut out = config.to_toml_string()?;
    out.push_str(&format!("\n# schema: {}\n", schema.scheme()));
    out.push_str(&format!(
        "# read interval: {:?}, request timeout: {:?}\n",
        client.read_interval(),
        client.request_timeout()
    ));
    match client.provider_url() {
        Some(url) => out.push_str(&format!("# provider: {url}\n")),
        None => out.push_str("# provider: none\n"),
    }
    out.push_str(&format!(
        "# static servers: {} of {} usable\n",
        servers.len(),
        client.servers.len()
    ));
    for server in &servers {
        out.push_str(&format!("#   {server}\n"));
    }
    Ok(out)
}

async fn run(config: ReachConfig) -> anyhow::Result<()> {
    info!(member_id = config.node.member_id, "ReachGrid daemon starting");

    let (servers, reader) = start_discovery(&config.client).await?;
    info!(
        channel = %config.client.channel,
        addresses = servers.addresses().len(),
        polling = reader.is_started(),
        "server addresses initialized"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    reader.stop();

    info!("ReachGrid daemon stopped");
    Ok(())
}

/// Build the request client and its address reader. Starts polling when a
/// provider is configured; otherwise loads the static servers once.
async fn start_discovery(
    client: &ClientConfig,
) -> anyhow::Result<(Arc<ServerList>, Arc<ServerAddressesReader>)> {
    let servers = Arc::new(ServerList::new(client.channel));
    let reader = Arc::new(ServerAddressesReader::new(client, servers.clone())?);
    if !reader.try_start().await {
        reader.refresh_server_address();
    }
    Ok((servers, reader))
}
