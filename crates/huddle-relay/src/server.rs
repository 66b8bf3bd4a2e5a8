//! Accept loop shared by the binary and the end-to-end tests.

use std::time::Duration;

use huddle_config::schema::RelayConfig;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::rooms::RoomStore;

/// Per-connection knobs taken from `[relay]`.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub join_timeout: Duration,
    pub exclusive_screen_share: bool,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            join_timeout: Duration::from_secs(config.join_timeout_secs),
            exclusive_screen_share: config.exclusive_screen_share,
        }
    }
}

/// Accept sockets forever, one task per connection.
pub async fn serve(listener: TcpListener, rooms: RoomStore, settings: RelaySettings) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let rooms = rooms.clone();
                let settings = settings.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, rooms, settings).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
