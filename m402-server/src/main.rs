//! Payment-gated tool server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p m402-server --release
//!
//! # Run with custom config path
//! cargo run -p m402-server -- --config /path/to/config.toml
//!
//! # Configure logging level
//! RUST_LOG=m402=debug,info cargo run -p m402-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `8000`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! Variables are also read from a `.env` file in the working directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use clap::Parser;
use m402::replay::{InMemoryReplayStore, ReplayStore};
use m402::service::RpcService;
use m402::verifier::LedgerVerifier;
use m402::{Invoker, InvokerConfig};
use m402_http::{RemoteLedger, rpc_router};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use m402_server::config::ServerConfig;
use m402_server::tools::demo_registry;
use m402_server::verifier::TrustingVerifier;

/// Serves payment-gated demo tools over JSON-RPC.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(&args.config)?;
    tracing::info!(
        path = %args.config.display(),
        host = %config.host,
        port = config.port,
        priced_tools = config.prices.len(),
        "Loaded configuration"
    );

    let verifier: Arc<dyn LedgerVerifier> = match &config.ledger {
        Some(ledger) => {
            let mut remote = RemoteLedger::try_from(ledger.url.as_str())?;
            if let Some(secs) = ledger.timeout_secs {
                remote = remote.with_timeout(Duration::from_secs(secs));
            }
            tracing::info!(url = %remote.base_url(), "Verifying payments with remote ledger");
            Arc::new(remote)
        }
        None => {
            tracing::warn!(
                "No [ledger] configured, payments are NOT verified against any ledger; \
                 declared proof amounts are trusted"
            );
            Arc::new(TrustingVerifier)
        }
    };

    let replay = Arc::new(InMemoryReplayStore::new(config.result_cache()));
    let registry = demo_registry(&config)?;
    for tool in registry.iter() {
        match tool.pricing().price() {
            Some(price) => tracing::info!(
                tool = tool.name(),
                amount = price.amount,
                currency = %price.currency,
                "Registered priced tool"
            ),
            None => tracing::info!(tool = tool.name(), "Registered free tool"),
        }
    }

    let invoker = Invoker::new(registry, verifier)
        .with_replay_store(Arc::clone(&replay) as Arc<dyn ReplayStore>)
        .with_config(InvokerConfig {
            verify_timeout: config.verify_timeout(),
        });

    tokio::spawn(sweep_expired_results(replay, config.result_cache()));

    let app = rpc_router(RpcService::new(Arc::new(invoker)))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}/rpc");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Periodically drops cached paid results older than `window`.
///
/// Consumed signatures are kept; only their results are released.
async fn sweep_expired_results(replay: Arc<InMemoryReplayStore>, window: Duration) {
    let mut interval = tokio::time::interval(window.max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        let evicted = replay.evict_expired_results();
        if evicted > 0 {
            tracing::debug!(evicted, consumed = replay.len(), "Evicted cached results");
        }
    }
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
        () = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
