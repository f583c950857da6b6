//! QKD Chat - Simulated Quantum Key Distribution Chat Library
//!
//! This library establishes a shared secret between two parties over an
//! untrusted network with a simulated QKD handshake, detects tampering via
//! statistical sampling, and runs an encrypted point-to-point messaging
//! layer over the derived key, optionally through a transparent relay.

pub mod chat;
pub mod config;
pub mod handshake;
pub mod keys;
pub mod protocol;
pub mod quantum;
pub mod relay;
pub mod transport;

pub use chat::{ChatEndpoint, SecureChannel};
pub use config::{ProtocolConfig, ABORT_THRESHOLD};
pub use handshake::{run_initiator, run_responder, AbortReason, HandshakeOutcome};
pub use keys::{derive_session_key, KeyStore, Role, SessionKey};
pub use relay::{RelayProxy, RelayRoute};
pub use transport::FramedTransport;
