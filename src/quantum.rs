//! Qubit Transmission Model
//!
//! Random bit/basis sequence generation and the measurement oracle that
//! stands in for the physical channel: measuring in the sender's basis
//! reproduces the sent bit, measuring in the other basis yields a fresh
//! uniformly random bit.

use rand::Rng;

/// Measurement basis for a single transmitted bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    /// Rectilinear basis, wire symbol `Z`
    Rectilinear,
    /// Diagonal basis, wire symbol `X`
    Diagonal,
}

impl Basis {
    /// Wire symbol for this basis
    pub fn symbol(&self) -> char {
        match self {
            Basis::Rectilinear => 'Z',
            Basis::Diagonal => 'X',
        }
    }

    /// Parse a wire symbol back into a basis
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'Z' => Some(Basis::Rectilinear),
            'X' => Some(Basis::Diagonal),
            _ => None,
        }
    }

    /// Draw a uniformly random basis
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Basis::Rectilinear
        } else {
            Basis::Diagonal
        }
    }
}

/// Generate `n` independent uniformly random bits
pub fn random_bits(n: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(0..=1u8)).collect()
}

/// Generate `n` independent uniformly random basis choices
pub fn random_bases(n: usize) -> Vec<Basis> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| Basis::random(&mut rng)).collect()
}

/// Measure a transmitted bit in the receiver's basis.
///
/// If the receiver chose the same basis as the sender the bit is recovered
/// exactly; otherwise the measurement outcome is uniformly random and
/// independent of the sent bit.
pub fn measure(sent_bit: u8, sender_basis: Basis, receiver_basis: Basis) -> u8 {
    if sender_basis == receiver_basis {
        sent_bit
    } else {
        rand::thread_rng().gen_range(0..=1)
    }
}
