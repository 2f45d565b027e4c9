// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! X25519 Key Material
//!
//! Long-term identity keys and per-generation ratchet keys. Secrets never
//! leave these types except through `diffie_hellman`, and `Debug` output is
//! redacted so handles can be logged safely.

use base64::Engine;
use rand::rngs::OsRng;
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

/// Size of an X25519 public key or shared secret.
pub const X25519_KEY_LEN: usize = 32;

/// Key agreement error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Key agreement produced a non-contributory shared secret")]
    NonContributory,
}

/// Performs X25519 and rejects low-order peer keys.
pub(crate) fn agree(
    secret: &StaticSecret,
    their_public: &[u8; X25519_KEY_LEN],
) -> Result<[u8; 32], KeyError> {
    let shared = secret.diffie_hellman(&PublicKey::from(*their_public));
    if !shared.was_contributory() {
        return Err(KeyError::NonContributory);
    }
    Ok(*shared.as_bytes())
}

/// A public key as stored in session state.
///
/// Displays as a short fingerprint instead of the key bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHandle([u8; X25519_KEY_LEN]);

impl KeyHandle {
    /// Wraps raw public key bytes.
    pub fn from_bytes(bytes: [u8; X25519_KEY_LEN]) -> Self {
        KeyHandle(bytes)
    }

    /// Parses a handle from a slice, validating its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; X25519_KEY_LEN] =
            bytes.try_into().map_err(|_| KeyError::InvalidLength {
                expected: X25519_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(KeyHandle(array))
    }

    /// Returns the public key bytes.
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LEN] {
        &self.0
    }

    /// First 8 bytes of SHA-256 over the key, hex encoded.
    pub fn fingerprint(&self) -> String {
        let hash = digest(&SHA256, &self.0);
        hex::encode(&hash.as_ref()[..8])
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyHandle({})", self.fingerprint())
    }
}

impl std::fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Serializes as standard base64.
impl Serialize for KeyHandle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for KeyHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)?;
        KeyHandle::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// The peer's long-term identity public key.
pub type IdentityPublicKey = KeyHandle;

/// Our long-term X25519 identity key pair.
pub struct IdentityKeyPair {
    secret: StaticSecret,
    public: KeyHandle,
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("secret", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

impl IdentityKeyPair {
    /// Generates a new random identity key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = KeyHandle(*PublicKey::from(&secret).as_bytes());
        IdentityKeyPair { secret, public }
    }

    /// Restores an identity key pair from its 32-byte secret.
    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = KeyHandle(*PublicKey::from(&secret).as_bytes());
        IdentityKeyPair { secret, public }
    }

    /// Returns the public half as a handle.
    pub fn public_key(&self) -> KeyHandle {
        self.public
    }

    /// X25519 agreement with a peer's identity key.
    pub fn diffie_hellman(&self, their_public: &KeyHandle) -> Result<[u8; 32], KeyError> {
        agree(&self.secret, their_public.as_bytes())
    }
}

/// An X25519 key pair used for one generation of the DH ratchet.
#[derive(Clone)]
pub struct RatchetKeyPair {
    secret: StaticSecret,
    public: [u8; X25519_KEY_LEN],
}

impl std::fmt::Debug for RatchetKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetKeyPair")
            .field("secret", &"[REDACTED]")
            .field("public", &KeyHandle(self.public))
            .finish()
    }
}

impl RatchetKeyPair {
    /// Generates a new random ratchet key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = *PublicKey::from(&secret).as_bytes();
        RatchetKeyPair { secret, public }
    }

    /// Returns the public key bytes.
    pub fn public_key(&self) -> &[u8; X25519_KEY_LEN] {
        &self.public
    }

    /// Returns the secret key bytes.
    ///
    /// Only used by tests that check secrets never escape into exports.
    #[cfg(test)]
    pub(crate) fn secret_bytes(&self) -> [u8; X25519_KEY_LEN] {
        self.secret.to_bytes()
    }

    /// X25519 agreement with a peer's ratchet public key.
    pub fn diffie_hellman(
        &self,
        their_public: &[u8; X25519_KEY_LEN],
    ) -> Result<[u8; 32], KeyError> {
        agree(&self.secret, their_public)
    }
}
