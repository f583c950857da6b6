//! Encrypted Chat Layer
//!
//! Point-to-point messaging over the session key the handshake produced.
//! Every message is one connection: the sender encrypts, dials the peer's
//! listener, writes the whole ciphertext and half-closes; the listener reads
//! to EOF and attempts authenticated decryption. A message that fails to
//! decrypt is reported and dropped, never fatal to the listener.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use log::{error, info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::keys::SessionKey;
use crate::transport::{read_message, write_message};

/// Nonce size for ChaCha20-Poly1305
const NONCE_SIZE: usize = 12;

/// Errors raised by the chat layer
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed: wrong key or corrupted ciphertext")]
    DecryptionFailed,
    #[error("ciphertext too short")]
    CiphertextTooShort,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authenticated-encryption wrapper around the session key.
///
/// Ciphertexts are self-contained: a fresh random 12-byte nonce is prepended
/// to the ChaCha20-Poly1305 output, so `nonce || ciphertext` is all a peer
/// with the same key needs.
#[derive(Clone)]
pub struct SecureChannel {
    cipher: ChaCha20Poly1305,
}

impl SecureChannel {
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Encrypt a plaintext into a self-contained ciphertext
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, ChatError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| ChatError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt and authenticate a sealed message
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, ChatError> {
        if sealed.len() < NONCE_SIZE {
            return Err(ChatError::CiphertextTooShort);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| ChatError::DecryptionFailed)
    }
}

/// A decrypted message surfaced to the application
#[derive(Debug)]
pub struct IncomingMessage {
    pub from: SocketAddr,
    pub plaintext: Vec<u8>,
}

/// One role's chat endpoint: a long-lived inbound listener plus on-demand
/// outbound sends, both keyed by the same session key
#[derive(Clone)]
pub struct ChatEndpoint {
    channel: SecureChannel,
    peer_addr: SocketAddr,
}

impl ChatEndpoint {
    pub fn new(key: &SessionKey, peer_addr: SocketAddr) -> Self {
        Self {
            channel: SecureChannel::new(key),
            peer_addr,
        }
    }

    /// Serve the inbound listener, surfacing each decrypted message through
    /// the channel. Undecryptable messages are logged and skipped; only
    /// listener-level IO failures end the loop.
    pub async fn serve(
        &self,
        listener: TcpListener,
        messages: mpsc::UnboundedSender<IncomingMessage>,
    ) -> std::io::Result<()> {
        info!(
            "Chat listener on {}",
            listener.local_addr().map(|a| a.to_string()).unwrap_or_default()
        );
        loop {
            let (mut stream, from) = listener.accept().await?;
            let channel = self.channel.clone();
            let messages = messages.clone();
            tokio::spawn(async move {
                let sealed = match read_message(&mut stream).await {
                    Ok(sealed) => sealed,
                    Err(e) => {
                        error!("Failed to read message from {}: {}", from, e);
                        return;
                    }
                };
                if sealed.is_empty() {
                    return;
                }
                match channel.open(&sealed) {
                    Ok(plaintext) => {
                        let _ = messages.send(IncomingMessage { from, plaintext });
                    }
                    // Local to this message only; the listener keeps serving
                    Err(e) => warn!("Rejected message from {}: {}", from, e),
                }
            });
        }
    }

    /// Encrypt and deliver one message: dial the peer, write the whole
    /// ciphertext, close. The connection boundary is the message boundary.
    pub async fn send(&self, plaintext: &[u8]) -> Result<(), ChatError> {
        let sealed = self.channel.seal(plaintext)?;
        let mut stream = TcpStream::connect(self.peer_addr).await?;
        write_message(&mut stream, &sealed)
            .await
            .map_err(|e| match e {
                crate::transport::TransportError::Io(io) => ChatError::Io(io),
                other => ChatError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    other.to_string(),
                )),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_session_key;

    #[test]
    fn test_seal_open_round_trip() {
        let channel = SecureChannel::new(&derive_session_key(&[1, 0, 1, 1]));
        for plaintext in [&b""[..], b"hi", b"a longer message with spaces"] {
            let sealed = channel.seal(plaintext).unwrap();
            assert_ne!(sealed, plaintext);
            assert_eq!(channel.open(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_nonce_per_message() {
        let channel = SecureChannel::new(&derive_session_key(&[1, 0, 1, 1]));
        let a = channel.seal(b"same plaintext").unwrap();
        let b = channel.seal(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_to_open() {
        let sender = SecureChannel::new(&derive_session_key(&[1, 0, 1]));
        let receiver = SecureChannel::new(&derive_session_key(&[0, 1, 0]));
        let sealed = sender.seal(b"secret").unwrap();
        assert!(matches!(
            receiver.open(&sealed),
            Err(ChatError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_corrupted_ciphertext_fails_to_open() {
        let channel = SecureChannel::new(&derive_session_key(&[1, 1, 1]));
        let mut sealed = channel.seal(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            channel.open(&sealed),
            Err(ChatError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let channel = SecureChannel::new(&derive_session_key(&[1, 1, 1]));
        assert!(matches!(
            channel.open(b"short"),
            Err(ChatError::CiphertextTooShort)
        ));
    }
}
