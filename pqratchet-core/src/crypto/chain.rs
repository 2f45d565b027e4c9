// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Chain Key Ratcheting
//!
//! Symmetric half of the Double Ratchet. Each step consumes the current
//! chain key and yields one message key plus the next chain key:
//!
//! - `message_key = HKDF(chain_key, "message")`
//! - `chain_key'  = HKDF(chain_key, "next")`

use super::encryption::SymmetricKey;
use super::kdf::Hkdf;
use thiserror::Error;
use zeroize::Zeroize;

/// Hard cap on a single chain's length unless configured otherwise.
pub const DEFAULT_MAX_CHAIN_LENGTH: u32 = 2000;

/// Chain key ratcheting error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChainError {
    #[error("Chain length limit exceeded (max {limit})")]
    LengthLimitExceeded { limit: u32 },

    #[error("Skip limit exceeded (requested {requested}, max {limit})")]
    SkipLimitExceeded { requested: u32, limit: u32 },

    #[error("Cannot skip backwards (current: {current}, target: {target})")]
    CannotSkipBackwards { current: u32, target: u32 },

    #[error("Key derivation failed")]
    Derivation,
}

const CHAIN_KEY_INFO: &[u8] = b"next";
const MESSAGE_KEY_INFO: &[u8] = b"message";

/// A chain key used for symmetric ratcheting.
///
/// Chain keys are never used directly for encryption. Its position is the
/// message number of the next key it will produce.
#[derive(Clone)]
pub struct ChainKey {
    key: [u8; 32],
    position: u32,
    max_length: u32,
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey")
            .field("key", &"[REDACTED]")
            .field("position", &self.position)
            .finish()
    }
}

impl Drop for ChainKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl ChainKey {
    /// Creates a new chain key at position 0.
    pub fn new(key: [u8; 32], max_length: u32) -> Self {
        ChainKey {
            key,
            position: 0,
            max_length,
        }
    }

    /// Creates a chain key at a specific position.
    pub fn at_position(key: [u8; 32], position: u32, max_length: u32) -> Self {
        ChainKey {
            key,
            position,
            max_length,
        }
    }

    /// Message number of the next key this chain will produce.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Advances the chain by one step, returning a message key and the next chain key.
    pub fn ratchet(&self) -> Result<(MessageKey, ChainKey), ChainError> {
        if self.position >= self.max_length {
            return Err(ChainError::LengthLimitExceeded {
                limit: self.max_length,
            });
        }

        let message_key_bytes = Hkdf::derive_key(None, &self.key, MESSAGE_KEY_INFO)
            .map_err(|_| ChainError::Derivation)?;
        let next_chain_key_bytes = Hkdf::derive_key(None, &self.key, CHAIN_KEY_INFO)
            .map_err(|_| ChainError::Derivation)?;

        let message_key = MessageKey {
            key: SymmetricKey::from_bytes(message_key_bytes),
            message_number: self.position,
        };

        let next_chain = ChainKey {
            key: next_chain_key_bytes,
            position: self.position + 1,
            max_length: self.max_length,
        };

        Ok((message_key, next_chain))
    }

    /// Skips forward to `target`, returning every intermediate message key.
    ///
    /// The returned chain sits at `target`, ready to produce that key.
    pub fn skip_to(
        &self,
        target: u32,
        max_skip: u32,
    ) -> Result<(Vec<MessageKey>, ChainKey), ChainError> {
        if target < self.position {
            return Err(ChainError::CannotSkipBackwards {
                current: self.position,
                target,
            });
        }

        let skip_count = target - self.position;
        if skip_count > max_skip {
            return Err(ChainError::SkipLimitExceeded {
                requested: skip_count,
                limit: max_skip,
            });
        }

        let mut keys = Vec::with_capacity(skip_count as usize);
        let mut current = self.clone();

        while current.position < target {
            let (msg_key, next) = current.ratchet()?;
            keys.push(msg_key);
            current = next;
        }

        Ok((keys, current))
    }

    /// Returns a reference to the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// A message encryption key derived from a chain key.
///
/// Message keys are single-use and are dropped (zeroized) after use.
#[derive(Clone)]
pub struct MessageKey {
    key: SymmetricKey,
    message_number: u32,
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKey")
            .field("key", &"[REDACTED]")
            .field("message_number", &self.message_number)
            .finish()
    }
}

impl MessageKey {
    /// Returns the message number this key was derived at.
    pub fn message_number(&self) -> u32 {
        self.message_number
    }

    /// Returns the underlying symmetric key for encryption.
    pub fn symmetric_key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }
}
