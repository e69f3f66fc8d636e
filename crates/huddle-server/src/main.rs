//! # Huddle Server
//!
//! Single-process coordination service for multi-party rooms:
//! - WebSocket signaling (join/leave, negotiation relay, control events)
//! - Join-time snapshot HTTP surface (rooms, participants, messages)
//!
//! One authoritative process; live session state is memory-resident and
//! rebuilt from empty on restart.

use huddle_signaling::{Limits, MemoryDirectory, RoomDirectory, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = huddle_common::config::init()?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting Huddle v{}", env!("CARGO_PKG_VERSION"));

    // The directory collaborator. In-process for the single-node deployment;
    // swap in a persistent implementation behind the same trait.
    let directory: Arc<dyn RoomDirectory> = Arc::new(MemoryDirectory::new());

    let state = SignalingState::new(directory).with_limits(Limits {
        max_message_length: config.limits.max_message_length,
        max_display_name_length: config.limits.max_display_name_length,
    });
    let router = huddle_signaling::build_router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Signaling listening on ws://{addr}/signal");
    tracing::info!("Snapshot API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
