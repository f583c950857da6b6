//! QKD Initiator - Main Entry Point
//!
//! The listening role: waits for the responder, runs the handshake, persists
//! the derived session key, and can later open the encrypted chat endpoint.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use qkd_chat::chat::ChatEndpoint;
use qkd_chat::handshake::{run_initiator, HandshakeOutcome};
use qkd_chat::keys::{KeyStore, Role};
use qkd_chat::transport::FramedTransport;
use qkd_chat::ProtocolConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "qkd-initiator")]
#[command(about = "QKD Chat Initiator - listening role")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "qkd_config.txt")]
    config: PathBuf,

    /// Directory holding persisted session keys
    #[arg(long, default_value = "keys")]
    key_dir: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the handshake and persist the derived session key
    Handshake {
        /// Address to listen on for the responder
        #[arg(long, default_value = "127.0.0.1:65432")]
        listen: SocketAddr,
    },
    /// Open the encrypted chat endpoint with the persisted session key
    Chat {
        /// Address to listen on for incoming messages
        #[arg(long, default_value = "127.0.0.1:65433")]
        listen: SocketAddr,
        /// Peer chat address to send messages to
        #[arg(long, default_value = "127.0.0.1:65434")]
        peer: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    // Load configuration
    let config = if args.config.exists() {
        ProtocolConfig::from_file(args.config.to_str().unwrap())?
    } else {
        info!("Config file not found, using defaults");
        ProtocolConfig::default()
    };

    let store = KeyStore::new(&args.key_dir);

    match args.command {
        Command::Handshake { listen } => run_handshake(listen, &config, &store).await,
        Command::Chat { listen, peer } => run_chat(listen, peer, &store).await,
    }
}

/// Listen for the responder and run the handshake to completion or abort
async fn run_handshake(
    listen: SocketAddr,
    config: &ProtocolConfig,
    store: &KeyStore,
) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!("Waiting for responder on {}", listen);
    let (stream, peer_addr) = listener.accept().await?;
    info!("Responder connected from {}", peer_addr);

    let mut transport = FramedTransport::new(stream);
    match run_initiator(&mut transport, config).await? {
        HandshakeOutcome::Complete {
            session_key,
            final_key_len,
        } => {
            store.save(Role::Initiator, &session_key)?;
            info!(
                "Session key derived from {} final bits, saved to {}",
                final_key_len,
                store.path(Role::Initiator).display()
            );
            Ok(())
        }
        HandshakeOutcome::Aborted(reason) => anyhow::bail!("handshake aborted: {}", reason),
    }
}

/// Serve the inbound chat listener while reading outbound messages from stdin
async fn run_chat(listen: SocketAddr, peer: SocketAddr, store: &KeyStore) -> Result<()> {
    let session_key = store.load(Role::Initiator)?;
    let endpoint = ChatEndpoint::new(&session_key, peer);

    let listener = TcpListener::bind(listen).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let serve_endpoint = endpoint.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_endpoint.serve(listener, tx).await {
            error!("Chat listener failed: {}", e);
        }
    });
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            println!(
                "\n[{}] {}",
                message.from,
                String::from_utf8_lossy(&message.plaintext)
            );
            prompt();
        }
    });

    println!("[Initiator] Encrypted chat ready on {}. Type a message, or 'quit' to exit.", listen);
    prompt();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            prompt();
            continue;
        }
        if message.eq_ignore_ascii_case("quit") || message.eq_ignore_ascii_case("exit") {
            break;
        }
        if let Err(e) = endpoint.send(message.as_bytes()).await {
            warn!("Failed to send: {}", e);
        }
        prompt();
    }

    println!("[Initiator] Exiting chat.");
    Ok(())
}

fn prompt() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}
