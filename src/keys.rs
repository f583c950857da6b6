//! Session Key Derivation and Storage
//!
//! Turns the surviving handshake bits into a fixed 256-bit symmetric key and
//! persists one key record per role for the chat layer to load later.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Length of a derived session key in bytes
pub const SESSION_KEY_LEN: usize = 32;

/// The 256-bit symmetric key both roles converge on
pub type SessionKey = [u8; SESSION_KEY_LEN];

/// The two protocol roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

/// Pack a bit sequence into bytes, big-endian, left-padded to whole bytes.
///
/// The first bit of the sequence becomes the most significant bit of the
/// packed value, matching a big-endian integer rendering of the bit string.
pub fn pack_bits(bits: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; (bits.len() + 7) / 8];
    let offset = bytes.len() * 8 - bits.len();
    for (i, &bit) in bits.iter().enumerate() {
        if bit != 0 {
            let pos = offset + i;
            bytes[pos / 8] |= 1 << (7 - pos % 8);
        }
    }
    bytes
}

/// Derive the session key from the final key bits.
///
/// Deterministic: both roles run this independently on their own copy of the
/// final key and obtain the same 256-bit secret without ever exchanging it.
pub fn derive_session_key(final_key: &[u8]) -> SessionKey {
    Sha256::digest(pack_bits(final_key)).into()
}

/// Errors raised by the keystore
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid key record: {0}")]
    Format(#[from] serde_json::Error),
    #[error("stored key is not valid hex")]
    InvalidHex,
    #[error("stored key has wrong length")]
    InvalidKeyLength,
}

/// On-disk key record, one per role
#[derive(Debug, Serialize, Deserialize)]
struct KeyRecord {
    role: String,
    session_key: String,
}

/// Durable per-role storage for derived session keys.
///
/// A key is written exactly once per successful handshake and is read-only
/// afterwards; only the owning role's handshake completion writes it.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, role: Role) -> PathBuf {
        self.dir.join(format!("session_key_{}.json", role.name()))
    }

    /// Persist a role's session key
    pub fn save(&self, role: Role, key: &SessionKey) -> Result<(), KeyStoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let record = KeyRecord {
            role: role.name().to_string(),
            session_key: hex::encode(key),
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(self.record_path(role), json)?;
        Ok(())
    }

    /// Load a role's session key
    pub fn load(&self, role: Role) -> Result<SessionKey, KeyStoreError> {
        let json = std::fs::read_to_string(self.record_path(role))?;
        let record: KeyRecord = serde_json::from_str(&json)?;
        let bytes = hex::decode(&record.session_key).map_err(|_| KeyStoreError::InvalidHex)?;
        bytes
            .try_into()
            .map_err(|_| KeyStoreError::InvalidKeyLength)
    }

    /// Path of a role's key record, for diagnostics
    pub fn path(&self, role: Role) -> PathBuf {
        self.record_path(role)
    }

    /// Directory the store writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_bits_big_endian_left_pad() {
        // 101 -> 0b0000_0101
        assert_eq!(pack_bits(&[1, 0, 1]), vec![0b0000_0101]);
        // 1_0000_0001 (9 bits) -> 0b0000_0001, 0b0000_0001
        assert_eq!(
            pack_bits(&[1, 0, 0, 0, 0, 0, 0, 0, 1]),
            vec![0b0000_0001, 0b0000_0001]
        );
        assert_eq!(pack_bits(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_derivation_deterministic() {
        let bits = [1, 0, 1, 1, 0, 0, 1];
        assert_eq!(derive_session_key(&bits), derive_session_key(&bits));
    }

    #[test]
    fn test_derivation_distinguishes_inputs() {
        assert_ne!(
            derive_session_key(&[1, 0, 1]),
            derive_session_key(&[1, 0, 0])
        );
        assert_ne!(derive_session_key(&[0]), derive_session_key(&[]));
    }

    #[test]
    fn test_empty_final_key_still_derives() {
        // Permissive edge case: k == len(sifted) leaves nothing, but the
        // digest of the empty byte string is still a shared 256-bit value.
        let key = derive_session_key(&[]);
        assert_eq!(key.len(), SESSION_KEY_LEN);
    }

    #[test]
    fn test_keystore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());

        let key = derive_session_key(&[1, 1, 0, 1]);
        store.save(Role::Initiator, &key).unwrap();
        assert_eq!(store.load(Role::Initiator).unwrap(), key);

        // The other role's record is independent
        assert!(store.load(Role::Responder).is_err());
    }

    #[test]
    fn test_keystore_rejects_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        std::fs::write(store.path(Role::Responder), "{\"role\":\"responder\",\"session_key\":\"zz\"}")
            .unwrap();
        assert!(store.load(Role::Responder).is_err());
    }
}
