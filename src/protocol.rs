//! Handshake Wire Grammar
//!
//! Text line formats exchanged during the handshake:
//! - pulse line: `<basis>|<bit>` with basis `Z`/`X` and bit `0`/`1`
//! - basis reconciliation: comma-joined basis symbols
//! - sample request: `SAMPLE:` prefix followed by comma-joined indices
//! - sample reply: comma-joined bit values
//!
//! Parsing is contextual: each phase of the handshake knows which line form
//! it expects, so the grammar exposes one parser and one encoder per form.

use crate::quantum::Basis;
use thiserror::Error;

/// Prefix of the sample request line
pub const SAMPLE_PREFIX: &str = "SAMPLE:";

/// Errors raised while parsing handshake lines
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

fn malformed(context: &str, line: &str) -> ProtocolError {
    ProtocolError::MalformedMessage(format!("{}: {:?}", context, line))
}

/// Encode one qubit pulse as a wire line
pub fn encode_pulse(basis: Basis, bit: u8) -> String {
    format!("{}|{}", basis.symbol(), bit)
}

/// Parse a pulse line into its basis and bit
pub fn parse_pulse(line: &str) -> Result<(Basis, u8), ProtocolError> {
    let (basis_part, bit_part) = line
        .split_once('|')
        .ok_or_else(|| malformed("pulse line missing separator", line))?;

    let mut symbols = basis_part.chars();
    let basis = match (symbols.next(), symbols.next()) {
        (Some(c), None) => Basis::from_symbol(c),
        _ => None,
    }
    .ok_or_else(|| malformed("invalid basis symbol", line))?;

    let bit = parse_bit(bit_part).ok_or_else(|| malformed("invalid bit value", line))?;
    Ok((basis, bit))
}

/// Encode a full basis sequence as one comma-joined line
pub fn encode_basis_list(bases: &[Basis]) -> String {
    bases
        .iter()
        .map(|b| b.symbol().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined basis reconciliation line
pub fn parse_basis_list(line: &str) -> Result<Vec<Basis>, ProtocolError> {
    line.split(',')
        .map(|token| {
            let mut symbols = token.chars();
            match (symbols.next(), symbols.next()) {
                (Some(c), None) => Basis::from_symbol(c),
                _ => None,
            }
            .ok_or_else(|| malformed("invalid basis token", token))
        })
        .collect()
}

/// Encode a sample request line from the chosen sifted-key indices
pub fn encode_sample_request(indices: &[usize]) -> String {
    let joined = indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{}", SAMPLE_PREFIX, joined)
}

/// Parse a sample request line into its index list
pub fn parse_sample_request(line: &str) -> Result<Vec<usize>, ProtocolError> {
    let body = line
        .strip_prefix(SAMPLE_PREFIX)
        .ok_or_else(|| malformed("sample request missing prefix", line))?;
    body.split(',')
        .map(|token| {
            token
                .trim()
                .parse::<usize>()
                .map_err(|_| malformed("invalid sample index", token))
        })
        .collect()
}

/// Encode a list of bits as one comma-joined line
pub fn encode_bit_list(bits: &[u8]) -> String {
    bits.iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined bit list (the sample reply)
pub fn parse_bit_list(line: &str) -> Result<Vec<u8>, ProtocolError> {
    line.split(',')
        .map(|token| parse_bit(token.trim()).ok_or_else(|| malformed("invalid bit value", token)))
        .collect()
}

fn parse_bit(token: &str) -> Option<u8> {
    match token {
        "0" => Some(0),
        "1" => Some(1),
        _ => None,
    }
}
