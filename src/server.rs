use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::room::Room;
use crate::session;

pub struct Acceptor {
    listener: TcpListener,
    room: Arc<Room>
}

impl Acceptor {
    pub async fn bind(addr: SocketAddr, room: Arc<Room>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("could not bind {addr}"))?;

        Ok(Self { listener, room })
    }

    /// The bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("chat server listening on {addr}"),
            Err(_) => info!("chat server listening")
        }

        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => {
                    info!(%peer, "accepted connection");

                    let room = self.room.clone();

                    tokio::spawn(async move {
                        if let Err(err) = session::handle(room, socket).await {
                            warn!(%peer, "connection error: {err:?}");
                        }
                    });
                }

                Err(err) => {
                    // One failed accept must not take the server down.
                    warn!("error accepting connection: {err}");
                }
            }
        }
    }
}
