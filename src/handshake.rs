//! QKD Handshake State Machine
//!
//! Both roles of the handshake over a framed transport. The initiator
//! transmits `num_bits` basis-tagged pulses, the responder measures each in
//! a freshly drawn basis, the two reconcile bases, and the initiator reveals
//! a random sample of the sifted key to estimate the channel error rate. An
//! error rate above [`ABORT_THRESHOLD`] means the channel cannot be trusted
//! and the handshake aborts without producing a key.
//!
//! The exchange is strictly half-duplex: each step blocks on one network
//! round-trip before the next may proceed. No timeout layer exists; a silent
//! peer hangs the caller until the connection closes.

use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{ProtocolConfig, ABORT_THRESHOLD};
use crate::keys::{derive_session_key, SessionKey};
use crate::protocol::{self, ProtocolError};
use crate::quantum::{self, Basis};
use crate::transport::{FramedTransport, TransportError};

/// Why a handshake terminated without a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Fewer sifted bits than the configured sample size
    InsufficientSiftedBits { sifted: usize, required: usize },
    /// Sample error rate exceeded the abort threshold
    EavesdroppingSuspected { mismatches: usize, sample_size: usize },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::InsufficientSiftedBits { sifted, required } => write!(
                f,
                "insufficient sifted bits ({} sifted, {} required)",
                sifted, required
            ),
            AbortReason::EavesdroppingSuspected {
                mismatches,
                sample_size,
            } => write!(
                f,
                "eavesdropping suspected ({}/{} sample bits mismatched)",
                mismatches, sample_size
            ),
        }
    }
}

/// Terminal result of a handshake attempt
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Both roles hold the same derived session key
    Complete {
        session_key: SessionKey,
        final_key_len: usize,
    },
    /// No key was produced; a fresh attempt must be started from scratch
    Aborted(AbortReason),
}

/// Fatal handshake failures (as opposed to protocol-level aborts)
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Keep only the values at indices where both basis sequences agree
pub fn sift(values: &[u8], local_bases: &[Basis], remote_bases: &[Basis]) -> Vec<u8> {
    values
        .iter()
        .zip(local_bases.iter().zip(remote_bases))
        .filter(|(_, (a, b))| a == b)
        .map(|(&v, _)| v)
        .collect()
}

/// Remove the sampled (now public) indices, preserving order
pub fn remove_samples(sifted: &[u8], sample_indices: &[usize]) -> Vec<u8> {
    sifted
        .iter()
        .enumerate()
        .filter(|(i, _)| !sample_indices.contains(i))
        .map(|(_, &v)| v)
        .collect()
}

/// Count positional mismatches and return them with the resulting error rate
pub fn sample_error_rate(expected: &[u8], observed: &[u8]) -> (usize, f64) {
    let mismatches = expected
        .iter()
        .zip(observed)
        .filter(|(a, b)| a != b)
        .count();
    (mismatches, mismatches as f64 / expected.len() as f64)
}

/// Draw a uniform `k`-subset of `[0, len)` without replacement
pub fn choose_sample_indices(len: usize, k: usize) -> Vec<usize> {
    rand::seq::index::sample(&mut rand::thread_rng(), len, k).into_vec()
}

/// Run the handshake as the initiating (transmitting) role.
///
/// The caller supplies an already-connected transport; the initiator is the
/// listening side of the connection.
pub async fn run_initiator<S>(
    transport: &mut FramedTransport<S>,
    config: &ProtocolConfig,
) -> Result<HandshakeOutcome, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let n = config.num_bits;
    let k = config.error_bits;

    // TRANSMIT: one pulse line per slot, in order
    let bits = quantum::random_bits(n);
    let bases = quantum::random_bases(n);
    for i in 0..n {
        transport
            .send_line(&protocol::encode_pulse(bases[i], bits[i]))
            .await?;
    }
    debug!("Transmitted {} pulses", n);

    // AWAIT_BASES: the peer reveals its basis choices
    let line = transport.recv_line().await?;
    let peer_bases = protocol::parse_basis_list(&line)?;
    if peer_bases.len() != n {
        return Err(ProtocolError::MalformedMessage(format!(
            "basis reconciliation has {} entries, expected {}",
            peer_bases.len(),
            n
        ))
        .into());
    }

    let sifted = sift(&bits, &bases, &peer_bases);
    info!("Sifted key: {} of {} bits survive", sifted.len(), n);

    // SAMPLE_REQUEST: reveal k sifted positions for error estimation.
    // Too few sifted bits means aborting silently; the peer detects the
    // closed connection and aborts identically.
    if sifted.len() < k {
        warn!(
            "Only {} sifted bits, need {} for error estimation; aborting",
            sifted.len(),
            k
        );
        return Ok(HandshakeOutcome::Aborted(
            AbortReason::InsufficientSiftedBits {
                sifted: sifted.len(),
                required: k,
            },
        ));
    }

    // With no error-check bits configured the sampling exchange carries no
    // information; both sides skip it and keep the whole sifted key
    if k == 0 {
        info!("Error estimation disabled, handshake complete with {} bits", sifted.len());
        return Ok(HandshakeOutcome::Complete {
            session_key: derive_session_key(&sifted),
            final_key_len: sifted.len(),
        });
    }

    let sample_indices = choose_sample_indices(sifted.len(), k);
    transport
        .send_line(&protocol::encode_sample_request(&sample_indices))
        .await?;

    // AWAIT_SAMPLE_REPLY
    let reply = transport.recv_line().await?;
    let peer_sample = protocol::parse_bit_list(&reply)?;
    if peer_sample.len() != k {
        return Err(ProtocolError::MalformedMessage(format!(
            "sample reply has {} bits, expected {}",
            peer_sample.len(),
            k
        ))
        .into());
    }

    // FINALIZE
    let ours: Vec<u8> = sample_indices.iter().map(|&i| sifted[i]).collect();
    let (mismatches, error_rate) = sample_error_rate(&ours, &peer_sample);
    info!(
        "Error estimation: {} of {} sample bits mismatched (rate {:.2})",
        mismatches, k, error_rate
    );
    if error_rate > ABORT_THRESHOLD {
        warn!("Error rate {:.2} exceeds threshold; aborting", error_rate);
        return Ok(HandshakeOutcome::Aborted(
            AbortReason::EavesdroppingSuspected {
                mismatches,
                sample_size: k,
            },
        ));
    }

    let final_key = remove_samples(&sifted, &sample_indices);
    info!("Handshake complete, {} final key bits", final_key.len());
    Ok(HandshakeOutcome::Complete {
        session_key: derive_session_key(&final_key),
        final_key_len: final_key.len(),
    })
}

/// Run the handshake as the responding (measuring) role.
///
/// The caller supplies an already-connected transport; the responder is the
/// dialing side of the connection.
pub async fn run_responder<S>(
    transport: &mut FramedTransport<S>,
    config: &ProtocolConfig,
) -> Result<HandshakeOutcome, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let n = config.num_bits;

    // TRANSMIT: measure each incoming pulse in a freshly drawn basis
    let mut peer_bases = Vec::with_capacity(n);
    let mut bases = Vec::with_capacity(n);
    let mut measured = Vec::with_capacity(n);
    for _ in 0..n {
        let line = transport.recv_line().await?;
        let (sender_basis, bit) = protocol::parse_pulse(&line)?;
        let basis = Basis::random(&mut rand::thread_rng());
        measured.push(quantum::measure(bit, sender_basis, basis));
        peer_bases.push(sender_basis);
        bases.push(basis);
    }
    debug!("Measured {} pulses", n);

    // AWAIT_BASES: reveal our basis choices so both sides sift identically
    transport
        .send_line(&protocol::encode_basis_list(&bases))
        .await?;

    let sifted = sift(&measured, &bases, &peer_bases);
    info!("Sifted key: {} of {} bits survive", sifted.len(), n);

    // Mirror the peer: no error-check bits means no sampling exchange
    if config.error_bits == 0 {
        info!("Error estimation disabled, handshake complete with {} bits", sifted.len());
        return Ok(HandshakeOutcome::Complete {
            session_key: derive_session_key(&sifted),
            final_key_len: sifted.len(),
        });
    }

    // SAMPLE_REQUEST: a peer that found too few sifted bits aborts by
    // closing the connection instead of sending the request
    let line = match transport.recv_line().await {
        Ok(line) => line,
        Err(TransportError::ConnectionClosed) => {
            warn!("Peer closed before sampling; aborting");
            return Ok(HandshakeOutcome::Aborted(
                AbortReason::InsufficientSiftedBits {
                    sifted: sifted.len(),
                    required: config.error_bits,
                },
            ));
        }
        Err(e) => return Err(e.into()),
    };
    let sample_indices = protocol::parse_sample_request(&line)?;
    if let Some(&bad) = sample_indices.iter().find(|&&i| i >= sifted.len()) {
        return Err(ProtocolError::MalformedMessage(format!(
            "sample index {} out of range for {} sifted bits",
            bad,
            sifted.len()
        ))
        .into());
    }

    // AWAIT_SAMPLE_REPLY: reveal our sifted bits at the requested indices,
    // in request order
    let sample: Vec<u8> = sample_indices.iter().map(|&i| sifted[i]).collect();
    transport
        .send_line(&protocol::encode_bit_list(&sample))
        .await?;

    // FINALIZE: the peer's verdict is not observable from this side; like
    // the sampled bits themselves, it only surfaces through whether the chat
    // layer can later decrypt anything
    let final_key = remove_samples(&sifted, &sample_indices);
    info!("Handshake complete, {} final key bits", final_key.len());
    Ok(HandshakeOutcome::Complete {
        session_key: derive_session_key(&final_key),
        final_key_len: final_key.len(),
    })
}
