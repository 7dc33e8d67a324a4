//! Souk messaging server.
//!
//! Serves the JSON API and the `/ws` push channel from one listener.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin souk-server
//!
//! # Run on custom address
//! cargo run --bin souk-server -- --bind 127.0.0.1:9090
//!
//! # Or via environment variable
//! SOUK_ADDR=127.0.0.1:9090 cargo run --bin souk-server
//! ```

use std::sync::Arc;

use clap::Parser;
use souk_server::config::{CliArgs, ServerConfig};
use souk_server::server;
use souk_server::service::ChatService;
use souk_server::store::InMemoryStore;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting souk messaging server");

    let service = ChatService::new(Arc::new(InMemoryStore::new()), config.messaging);

    match server::start_server_with_state(&config.bind_addr, Arc::new(service)).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
