//! huddle-relay: room-scoped WebSocket signaling relay.
//!
//! Clients join a room, then exchange offers, answers and ICE candidates
//! addressed to one another by user id. The relay forwards those frames
//! unchanged and announces arrivals, departures and screen sharers to the
//! room. It never touches media.

mod connection;
mod rooms;
mod server;


use std::path::PathBuf;

use clap::Parser;
use huddle_common::HuddleError;
use tokio::net::TcpListener;

use crate::rooms::RoomStore;
use crate::server::{serve, RelaySettings};

#[derive(Parser)]
#[command(name = "huddle-relay", about = "WebSocket signaling relay for huddle calls")]
struct Args {
    /// Config file to load instead of the platform default.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides `relay.port`).
    #[arg(short, long)]
    port: Option<u16>,

    /// Refuse a second concurrent screen sharer per room.
    #[arg(long)]
    exclusive_screen_share: bool,
}

#[tokio::main]
async fn main() -> Result<(), HuddleError> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => huddle_config::load_from_path(path)?,
        None => huddle_config::load_default()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.directive("huddle_relay").into()),
        )
        .init();

    let port = match args.port {
        Some(port) => port,
        None => u16::try_from(config.relay.port)
            .map_err(|_| HuddleError::Other(format!("invalid relay port {}", config.relay.port)))?,
    };

    let mut settings = RelaySettings::from(&config.relay);
    settings.exclusive_screen_share |= args.exclusive_screen_share;

    let addr = format!("{}:{}", config.relay.bind, port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        exclusive_screen_share = settings.exclusive_screen_share,
        "huddle-relay listening on {}",
        addr
    );

    serve(listener, RoomStore::new(), settings).await;
    Ok(())
}
