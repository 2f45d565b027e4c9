// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HKDF Key Derivation Function
//!
//! HKDF-SHA256 (RFC 5869) on top of `ring::hkdf`. Every derivation in the
//! ratchet goes through here with a domain-separated `info` string.

use ring::hkdf::{KeyType, Salt, HKDF_SHA256};
use thiserror::Error;

/// Output size of a single derived key.
pub const KEY_LEN: usize = 32;

/// Maximum HKDF-SHA256 output (255 * HashLen).
const MAX_OUTPUT: usize = 255 * KEY_LEN;

/// KDF error types.
#[derive(Error, Debug)]
pub enum KdfError {
    #[error("Output length exceeds maximum (255 * hash_len)")]
    OutputTooLong,
}

/// Requested output length, in the shape `ring` expects.
struct OutputLen(usize);

impl KeyType for OutputLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// HKDF-SHA256 key derivation.
pub struct Hkdf;

impl Hkdf {
    /// Extract-then-expand into `length` bytes.
    ///
    /// A missing salt is treated as HashLen zero bytes.
    pub fn derive(
        salt: Option<&[u8]>,
        ikm: &[u8],
        info: &[u8],
        length: usize,
    ) -> Result<Vec<u8>, KdfError> {
        if length > MAX_OUTPUT {
            return Err(KdfError::OutputTooLong);
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        let default_salt = [0u8; KEY_LEN];
        let salt = Salt::new(HKDF_SHA256, salt.unwrap_or(&default_salt));
        let prk = salt.extract(ikm);
        let info_parts = [info];
        let okm = prk
            .expand(&info_parts, OutputLen(length))
            .map_err(|_| KdfError::OutputTooLong)?;

        let mut out = vec![0u8; length];
        okm.fill(&mut out).map_err(|_| KdfError::OutputTooLong)?;
        Ok(out)
    }

    /// Derives a single 32-byte key.
    pub fn derive_key(
        salt: Option<&[u8]>,
        ikm: &[u8],
        info: &[u8],
    ) -> Result<[u8; KEY_LEN], KdfError> {
        let default_salt = [0u8; KEY_LEN];
        let salt = Salt::new(HKDF_SHA256, salt.unwrap_or(&default_salt));
        let info_parts = [info];
        let prk = salt.extract(ikm);
        let okm = prk
            .expand(&info_parts, OutputLen(KEY_LEN))
            .map_err(|_| KdfError::OutputTooLong)?;

        let mut key = [0u8; KEY_LEN];
        okm.fill(&mut key).map_err(|_| KdfError::OutputTooLong)?;
        Ok(key)
    }

    /// Derives two 32-byte keys from one extract/expand pass.
    ///
    /// Used for (root_key, chain_key) style splits.
    pub fn derive_key_pair(
        salt: Option<&[u8]>,
        ikm: &[u8],
        info: &[u8],
    ) -> Result<([u8; KEY_LEN], [u8; KEY_LEN]), KdfError> {
        let mut okm = Self::derive(salt, ikm, info, 2 * KEY_LEN)?;
        let mut first = [0u8; KEY_LEN];
        let mut second = [0u8; KEY_LEN];
        first.copy_from_slice(&okm[..KEY_LEN]);
        second.copy_from_slice(&okm[KEY_LEN..]);
        zeroize::Zeroize::zeroize(&mut okm);
        Ok((first, second))
    }
}
