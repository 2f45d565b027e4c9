// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Authenticated Symmetric Encryption (XChaCha20-Poly1305)
//!
//! Tagged ciphertext format: `0x02 || nonce (24 bytes) || ciphertext || tag (16 bytes)`
//!
//! Any other tag is rejected. Associated data is authenticated but not
//! carried in the output; the caller supplies it again on decrypt.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::XChaCha20Poly1305;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroize;

/// Encryption error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Random number generation failed")]
    RandomFailed,
}

/// Algorithm tag for XChaCha20-Poly1305.
pub const ALG_TAG_XCHACHA20: u8 = 0x02;

/// Nonce size for XChaCha20-Poly1305 (192 bits).
pub const XCHACHA20_NONCE_SIZE: usize = 24;
/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Fills `dest` from the system RNG.
pub fn fill_random(dest: &mut [u8]) -> Result<(), EncryptionError> {
    SystemRandom::new()
        .fill(dest)
        .map_err(|_| EncryptionError::RandomFailed)
}

/// 256-bit symmetric encryption key.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        ring::constant_time::verify_slices_are_equal(&self.bytes, &other.bytes).is_ok()
    }
}

impl Eq for SymmetricKey {}

impl SymmetricKey {
    /// Generates a new random symmetric key.
    pub fn generate() -> Result<Self, EncryptionError> {
        let mut bytes = [0u8; 32];
        fill_random(&mut bytes)?;
        Ok(SymmetricKey { bytes })
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SymmetricKey { bytes }
    }

    /// Returns a reference to the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Encrypts with XChaCha20-Poly1305 and no associated data.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Decrypts a tagged ciphertext with no associated data.
pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    decrypt_with_aad(key, ciphertext, &[])
}

/// Encrypts with XChaCha20-Poly1305, binding `aad`.
///
/// Output format: `0x02 || nonce (24 bytes) || ciphertext || tag (16 bytes)`
pub fn encrypt_with_aad(
    key: &SymmetricKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let mut nonce_bytes = [0u8; XCHACHA20_NONCE_SIZE];
    fill_random(&mut nonce_bytes)?;

    let ciphertext = seal_xchacha20(key, &nonce_bytes, plaintext, aad)?;

    let mut output = Vec::with_capacity(1 + XCHACHA20_NONCE_SIZE + ciphertext.len());
    output.push(ALG_TAG_XCHACHA20);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypts a tagged ciphertext.
pub fn decrypt_with_aad(
    key: &SymmetricKey,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    match ciphertext.split_first() {
        Some((&ALG_TAG_XCHACHA20, rest)) => decrypt_xchacha20(key, rest, aad),
        _ => Err(EncryptionError::DecryptionFailed),
    }
}

/// Raw XChaCha20-Poly1305 seal with a caller-chosen nonce.
///
/// Output is `ciphertext || tag`; the nonce is not prepended.
pub fn seal_xchacha20(
    key: &SymmetricKey,
    nonce: &[u8; XCHACHA20_NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(
            chacha20poly1305::XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptionFailed)
}

/// Raw XChaCha20-Poly1305 open with a caller-supplied nonce.
pub fn open_xchacha20(
    key: &SymmetricKey,
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if nonce.len() != XCHACHA20_NONCE_SIZE || ciphertext.len() < TAG_SIZE {
        return Err(EncryptionError::DecryptionFailed);
    }
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(
            chacha20poly1305::XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptionFailed)
}

/// Input format: `nonce (24 bytes) || ciphertext || tag (16 bytes)`
fn decrypt_xchacha20(
    key: &SymmetricKey,
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < XCHACHA20_NONCE_SIZE + TAG_SIZE {
        return Err(EncryptionError::DecryptionFailed);
    }
    let (nonce, body) = data.split_at(XCHACHA20_NONCE_SIZE);
    open_xchacha20(key, nonce, body, aad)
}
