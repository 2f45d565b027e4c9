// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error Types
//!
//! Unified error type for session and envelope operations.

use thiserror::Error;

use crate::crypto::{EncryptionError, KdfError, KeyError};

/// Unified error type for end-to-end encryption operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum E2eeError {
    /// No session exists for this chat.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Identity or ratchet key material was malformed or rejected.
    #[error("key agreement error: {0}")]
    KeyAgreement(String),

    /// A skipped key was requested but has been consumed or evicted.
    #[error("message key not available: chat {chat_id}, generation {generation}, message {message_number}")]
    KeyNotAvailable {
        chat_id: String,
        generation: u32,
        message_number: u32,
    },

    /// Authenticated decryption failed.
    #[error("decryption failed")]
    Decryption,

    /// Algorithm tag is not recognized or not valid for this operation.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Session was cleared by a compromise and has not been recovered.
    #[error("session compromised: {0}")]
    CompromisedState(String),

    /// Session is an imported shell without private key material.
    #[error("session not established: {0}")]
    NotEstablished(String),

    /// A single receive would derive more keys than allowed.
    #[error("skip limit exceeded: requested {requested}, limit {limit}")]
    SkipLimitExceeded { requested: u32, limit: u32 },

    /// Chain reached its hard length cap before a DH ratchet.
    #[error("rekey required: {0}")]
    RekeyRequired(String),

    /// PQC key or signature bytes were malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Randomness or primitive failure.
    #[error("crypto error: {0}")]
    Crypto(String),
}

/// Result type for end-to-end encryption operations.
pub type E2eeResult<T> = Result<T, E2eeError>;

impl From<KeyError> for E2eeError {
    fn from(err: KeyError) -> Self {
        E2eeError::KeyAgreement(err.to_string())
    }
}

impl From<KdfError> for E2eeError {
    fn from(err: KdfError) -> Self {
        E2eeError::Crypto(err.to_string())
    }
}

impl From<EncryptionError> for E2eeError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::DecryptionFailed => E2eeError::Decryption,
            other => E2eeError::Crypto(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for E2eeError {
    fn from(err: serde_json::Error) -> Self {
        E2eeError::Serialization(err.to_string())
    }
}
