//! Partyline Signal Server
//!
//! WebRTC signaling and lobby coordination for peer-to-peer games.
//!
//! # Usage
//!
//! ```bash
//! partyline-signal --port 8080
//!
//! # or via the environment
//! PORT=9000 partyline-signal
//! ```

use std::net::SocketAddr;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use partyline_signal::{SignalServer, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "partyline-signal")]
#[command(about = "Partyline signaling server for peer-to-peer games")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;

    info!("Starting Partyline Signal Server");

    let server = SignalServer::new();
    tokio::select! {
        result = server.serve(addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
