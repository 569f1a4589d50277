//! # tether-demo
//!
//! Demo binary: hosts the `store` service and talks to it.

#![deny(unsafe_code)]

mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tether_client::{ClientConfig, RpcClient};
use tether_core::logging::{LogFormat, init_subscriber_with_format};
use tether_server::{ServerConfig, ServiceRegistry, TetherServer};
use tether_settings::TetherSettings;

use crate::store::{StoreClient, StoreOptions, store_service};

/// tether demo: a `store` service with price feeds.
#[derive(Parser, Debug)]
#[command(name = "tether-demo", about = "tether RPC demo")]
struct Cli {
    /// Settings file (defaults to `~/.tether/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings; `RUST_LOG` overrides both).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host the store until Ctrl-C.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind.
        #[arg(long)]
        port: Option<u16>,
        /// WebSocket path.
        #[arg(long)]
        path: Option<String>,
        /// Maximum concurrent connections.
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Query one symbol and print the quote.
    Query {
        /// Symbol name.
        name: String,
        /// Server URL (overrides settings).
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Print price ticks for symbols until Ctrl-C.
    Watch {
        /// Symbol names.
        #[arg(required = true)]
        names: Vec<String>,
        /// Also print store change timestamps.
        #[arg(long)]
        changes: bool,
        /// Server URL (overrides settings).
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Host the store and run a client against it in one process.
    Demo {
        /// Seconds to run before shutting down.
        #[arg(long, default_value = "10")]
        duration_secs: u64,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Result<TetherSettings> {
    let path = path.cloned().unwrap_or_else(tether_settings::settings_path);
    tether_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn server_config(settings: &TetherSettings, command: &Command) -> ServerConfig {
    let mut config = ServerConfig::from_settings(&settings.server);
    if let Command::Serve {
        host,
        port,
        path,
        max_connections,
    } = command
    {
        if let Some(host) = host {
            config.host.clone_from(host);
        }
        if let Some(port) = port {
            config.port = *port;
        }
        if let Some(path) = path {
            config.path.clone_from(path);
        }
        if let Some(max) = max_connections {
            config.max_connections = *max;
        }
    }
    config
}

fn client_config(settings: &TetherSettings, endpoint: Option<&String>) -> ClientConfig {
    let mut config = ClientConfig::from_settings(&settings.client);
    if let Some(endpoint) = endpoint {
        config.endpoint.clone_from(endpoint);
    }
    config
}

fn build_registry(options: StoreOptions) -> Result<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    let _ = registry.register(store_service(options).context("Failed to build store service")?);
    Ok(registry)
}

async fn serve(config: ServerConfig) -> Result<()> {
    let server = TetherServer::new(config, build_registry(StoreOptions::default())?);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("tether demo listening on ws://{addr}{}", server.config().ws_path());

    server.shutdown().shutdown_on_ctrl_c().await;
    tracing::info!("Shutting down...");
    let aborted = server.shutdown().drain(vec![handle], None).await;
    tracing::info!(aborted, "Shutdown complete");
    Ok(())
}

async fn query(config: ClientConfig, name: String) -> Result<()> {
    let client = RpcClient::connect(config)
        .await
        .context("Failed to connect")?;
    let quote = StoreClient::new(&client)
        .query(name)
        .await
        .context("query failed")?;
    println!("{}", serde_json::to_string_pretty(&quote)?);
    client.close().await;
    Ok(())
}

async fn watch(config: ClientConfig, names: Vec<String>, changes: bool) -> Result<()> {
    let client = RpcClient::new(config).context("Failed to start client")?;
    let store = StoreClient::new(&client);

    let mut subscriptions = Vec::new();
    for name in names {
        let label = name.clone();
        subscriptions.push(store.on_price_change(name, move |quote| {
            println!("--> {label} price change {}", quote.price);
        })?);
    }
    if changes {
        subscriptions.push(store.on_change(|at| println!("--> change at {at}"))?);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    for subscription in &subscriptions {
        subscription.dispose();
    }
    client.close().await;
    Ok(())
}

async fn demo(settings: &TetherSettings, duration: Duration) -> Result<()> {
    let config = ServerConfig {
        port: 0,
        ..ServerConfig::from_settings(&settings.server)
    };
    let server = TetherServer::new(config, build_registry(StoreOptions::default())?);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("server listening at {addr}");

    let endpoint = format!("ws://{addr}{}", server.config().ws_path());
    let client = RpcClient::connect(client_config(settings, Some(&endpoint)))
        .await
        .context("Failed to connect")?;
    let store = StoreClient::new(&client);

    let quote = store.query("100".into()).await.context("query failed")?;
    println!("--> query {quote:?}");

    match client.call(StoreClient::SERVICE_ID, "xx", vec![]).await {
        Ok(value) => println!("--> xx unexpectedly returned {value}"),
        Err(e) => println!("--> xx failed as expected: {e}"),
    }

    let subscriptions = vec![
        store.on_price_change("xxx".into(), |q| println!("--> xxx price change {}", q.price))?,
        store.on_price_change("yyy".into(), |q| println!("--> yyy price change {}", q.price))?,
        store.on_change(|at| println!("--> onchange {at}"))?,
    ];

    tokio::select! {
        () = tokio::time::sleep(duration) => {}
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
    }

    for subscription in &subscriptions {
        subscription.dispose();
    }
    client.close().await;
    server.shutdown().shutdown();
    let _ = handle.await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.settings.as_ref())?;
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    let format = settings
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();
    init_subscriber_with_format(level, format);

    match cli.command {
        Command::Serve { .. } => serve(server_config(&settings, &cli.command)).await,
        Command::Query { name, endpoint } => {
            query(client_config(&settings, endpoint.as_ref()), name).await
        }
        Command::Watch {
            names,
            changes,
            endpoint,
        } => watch(client_config(&settings, endpoint.as_ref()), names, changes).await,
        Command::Demo { duration_secs } => {
            demo(&settings, Duration::from_secs(duration_secs)).await
        }
    }
}
