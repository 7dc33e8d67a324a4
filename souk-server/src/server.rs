//! Assembles the router and runs it on a TCP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::task::JoinHandle;

use crate::config::MessagingConfig;
use crate::http::{self, AppState};
use crate::service::ChatService;
use crate::socket;
use crate::store::{ConversationStore, InMemoryStore, MessageStore};

/// How often expired presence, typing and cooldown entries are dropped.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Full application router: JSON API plus the `/ws` push channel.
pub fn router<S>(state: AppState<S>) -> Router
where
    S: ConversationStore + MessageStore + 'static,
{
    http::routes::<S>()
        .route("/ws", get(socket::ws_handler::<S>))
        .with_state(state)
}

/// Starts the server over a fresh in-memory store.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    config: MessagingConfig,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let service = ChatService::new(Arc::new(InMemoryStore::new()), config);
    start_server_with_state(addr, Arc::new(service)).await
}

/// Starts the server with a pre-built [`ChatService`].
///
/// Also spawns the periodic ephemeral sweep, which stops with the server.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state<S>(
    addr: &str,
    state: AppState<S>,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>>
where
    S: ConversationStore + MessageStore + 'static,
{
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let sweeper = tokio::spawn(sweep_loop(state));
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
        sweeper.abort();
    });

    Ok((bound_addr, handle))
}

async fn sweep_loop<S>(state: AppState<S>)
where
    S: ConversationStore + MessageStore + 'static,
{
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let dropped = state.sweep_ephemeral();
        if dropped > 0 {
            tracing::debug!(dropped, "expired ephemeral entries swept");
        }
    }
}
