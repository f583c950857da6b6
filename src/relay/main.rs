//! QKD Relay - Main Entry Point
//!
//! Transparent man-in-the-middle: one listener per role's peer-facing port,
//! forwarding raw bytes to the real endpoints. It can observe all traffic
//! but holds no key material and decrypts nothing.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;

use qkd_chat::relay::{RelayProxy, RelayRoute};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "qkd-relay")]
#[command(about = "QKD Chat Relay - transparent forwarding observer")]
struct Args {
    /// Listener standing in for the initiator's port
    #[arg(long, default_value = "127.0.0.1:55433")]
    initiator_listen: SocketAddr,

    /// Real initiator address to forward to
    #[arg(long, default_value = "127.0.0.1:65433")]
    initiator_forward: SocketAddr,

    /// Listener standing in for the responder's port
    #[arg(long, default_value = "127.0.0.1:55434")]
    responder_listen: SocketAddr,

    /// Real responder address to forward to
    #[arg(long, default_value = "127.0.0.1:65434")]
    responder_forward: SocketAddr,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let proxy = RelayProxy::new(
        RelayRoute {
            listen: args.initiator_listen,
            forward: args.initiator_forward,
        },
        RelayRoute {
            listen: args.responder_listen,
            forward: args.responder_forward,
        },
    );
    proxy.run().await?;
    Ok(())
}
