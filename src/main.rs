use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use crier::{Acceptor, Room};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);

    let (Some(port), None) = (args.next(), args.next()) else {
        eprintln!("Usage: crier <port>");
        return ExitCode::from(1);
    };

    let Ok(port) = port.parse::<u16>() else {
        eprintln!("Usage: crier <port>");
        return ExitCode::from(1);
    };

    let room = Arc::new(Room::new());

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    match Acceptor::bind(addr, room).await {
        Ok(acceptor) => acceptor.run().await,
        // A failed bind leaves a process that serves nothing; say so and
        // exit cleanly rather than crash.
        Err(err) => error!("{err:#}")
    }

    ExitCode::SUCCESS
}
