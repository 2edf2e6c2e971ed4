use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::client::ClientSession;
use crate::config::{load_config, SiestaConfig};
use crate::echo::{echo_registry, echo_routes, ECHO_PATH};
use crate::router::{RouteEntry, Router};
use crate::server::{Acceptor, ErrorSink};

/// Command-line interface for the siesta demo service
#[derive(Debug, Parser)]
#[command(name = "siesta")]
#[command(about = "siesta echo server and client", long_about = None)]
pub struct Cli {
    /// YAML config file; `SIESTA_*` environment variables override it
    #[arg(short, long, global = true, env = "SIESTA_CONFIG")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the echo service until interrupted
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Route table (YAML/JSON list of {path, verb, handler}, or an
        /// OpenAPI JSON document). Handlers resolve against the echo
        /// registry. Defaults to the built-in echo routes.
        #[arg(short, long)]
        routes: Option<PathBuf>,
    },
    /// Submit echo requests over one client session
    Echo {
        /// Server host name or address
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Server port
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Message to echo
        #[arg(short, long, default_value = "hello")]
        message: String,

        /// Number of requests to submit on the session
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
}

/// Run a parsed command line to completion.
///
/// # Errors
///
/// Returns an error if configuration or the route table cannot be loaded,
/// the server cannot listen, or an echo request fails.
pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SiestaConfig::from_env(),
    };

    match cli.command {
        Commands::Serve { addr, routes } => serve(config, addr, routes.as_deref()).await,
        Commands::Echo {
            host,
            port,
            message,
            count,
        } => echo(config, &host, port, &message, count).await,
    }
}

/// Load a route table file. A JSON document with a `paths` object is read as
/// OpenAPI; anything else as a list of route entries.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_routes(path: &Path) -> anyhow::Result<Vec<RouteEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read route table: {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let value: Value = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    if value.get("paths").is_some() {
        return Ok(RouteEntry::from_openapi(&value)?);
    }
    serde_json::from_value(value)
        .with_context(|| format!("Invalid route table: {}", path.display()))
}

async fn serve(
    config: SiestaConfig,
    addr: SocketAddr,
    routes: Option<&Path>,
) -> anyhow::Result<()> {
    let entries = match routes {
        Some(path) => load_routes(path)?,
        None => echo_routes(),
    };
    let router = Router::from_entries(&entries, &echo_registry())?;
    router.dump_routes();

    let handle = Acceptor::new(router)
        .with_config(config.server)
        .with_error_sink(ErrorSink::logging())
        .listen(addr)?;
    println!("siesta listening on http://{}", handle.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    handle.stop().await;
    Ok(())
}

async fn echo(
    config: SiestaConfig,
    host: &str,
    port: u16,
    message: &str,
    count: u32,
) -> anyhow::Result<()> {
    let mut session = ClientSession::new(config.client);
    session
        .start(host, port)
        .await
        .with_context(|| format!("Failed to connect to {host}:{port}"))?;

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("message", message)
        .finish();
    let target = format!("{ECHO_PATH}?{query}");
    for _ in 0..count {
        let res = session.get(&target).await?;
        println!("{}", res.body());
    }

    session.stop().await?;
    Ok(())
}
