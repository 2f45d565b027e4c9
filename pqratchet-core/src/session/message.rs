// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ratchet Messages
//!
//! Header-carrying envelopes for messages encrypted with session keys. The
//! header is bound to the ciphertext as associated data, so a tampered
//! header fails authentication like a tampered body.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::manager::{unix_now, SessionManager};
use crate::crypto::{decrypt_with_aad, encrypt_with_aad, KeyHandle};
use crate::error::{E2eeError, E2eeResult};

const HEADER_AAD_DOMAIN: &[u8] = b"pqratchet-header-v1";

/// Cleartext routing information for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetHeader {
    pub chat_id: String,
    /// DH ratchet generation the message was sent in
    pub generation: u32,
    pub message_number: u32,
    /// Messages the sender sent in its previous generation
    pub previous_chain_length: u32,
    /// Sender's ratchet public key for this generation
    pub ratchet_public_key: KeyHandle,
    /// Sender's ratchet public key for the previous generation
    pub previous_ratchet_public_key: Option<KeyHandle>,
}

impl RatchetHeader {
    /// Deterministic encoding used as associated data.
    pub fn aad(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(HEADER_AAD_DOMAIN.len() + self.chat_id.len() + 81);
        aad.extend_from_slice(HEADER_AAD_DOMAIN);
        aad.extend_from_slice(&(self.chat_id.len() as u32).to_be_bytes());
        aad.extend_from_slice(self.chat_id.as_bytes());
        aad.extend_from_slice(&self.generation.to_be_bytes());
        aad.extend_from_slice(&self.message_number.to_be_bytes());
        aad.extend_from_slice(&self.previous_chain_length.to_be_bytes());
        aad.extend_from_slice(self.ratchet_public_key.as_bytes());
        match &self.previous_ratchet_public_key {
            Some(key) => {
                aad.push(1);
                aad.extend_from_slice(key.as_bytes());
            }
            None => aad.push(0),
        }
        aad
    }
}

/// An encrypted message and its header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetEnvelope {
    pub header: RatchetHeader,
    pub ciphertext: Vec<u8>,
}

impl RatchetEnvelope {
    pub fn to_bytes(&self) -> E2eeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> E2eeResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl SessionManager {
    /// Encrypts `plaintext` with the next sending key of `chat_id`.
    ///
    /// Performs a due rekey first when the peer's ratchet key is known.
    pub fn encrypt_message(&self, chat_id: &str, plaintext: &[u8]) -> E2eeResult<RatchetEnvelope> {
        self.encrypt_message_at(chat_id, plaintext, unix_now())
    }

    pub fn encrypt_message_at(
        &self,
        chat_id: &str,
        plaintext: &[u8],
        now: u64,
    ) -> E2eeResult<RatchetEnvelope> {
        self.with_state(chat_id, |state, config| {
            state.ensure_active()?;
            state.rekey_if_due(config, now)?;

            let header = RatchetHeader {
                chat_id: chat_id.to_string(),
                generation: state.generation,
                message_number: state.sending_message_number,
                previous_chain_length: state.previous_sending_chain_length,
                ratchet_public_key: state.our_ratchet_public_key,
                previous_ratchet_public_key: state.our_previous_ratchet_public_key,
            };
            let key = state.next_sending_key()?;
            let ciphertext = encrypt_with_aad(key.symmetric_key(), plaintext, &header.aad())?;

            Ok(RatchetEnvelope { header, ciphertext })
        })
    }

    /// Decrypts an envelope for `chat_id`.
    ///
    /// Works on a copy of the session and commits it only once the message
    /// authenticates, so a forged or corrupted envelope leaves the session
    /// exactly as it was.
    pub fn decrypt_message(&self, chat_id: &str, envelope: &RatchetEnvelope) -> E2eeResult<Vec<u8>> {
        self.decrypt_message_at(chat_id, envelope, unix_now())
    }

    pub fn decrypt_message_at(
        &self,
        chat_id: &str,
        envelope: &RatchetEnvelope,
        now: u64,
    ) -> E2eeResult<Vec<u8>> {
        let header = &envelope.header;
        if header.chat_id != chat_id {
            return Err(E2eeError::Decryption);
        }

        self.with_state(chat_id, |state, config| {
            state.ensure_active()?;
            let not_available = || E2eeError::KeyNotAvailable {
                chat_id: chat_id.to_string(),
                generation: header.generation,
                message_number: header.message_number,
            };

            let mut working = state.clone();
            let key = match header.generation.cmp(&working.generation) {
                Ordering::Equal => working.receiving_key(header.message_number, config)?,
                Ordering::Less => working.earlier_generation_key(
                    header.generation,
                    header.message_number,
                    config,
                )?,
                Ordering::Greater if header.generation == working.generation + 1 => {
                    let previous = header
                        .previous_ratchet_public_key
                        .ok_or_else(not_available)?;
                    if !working.dh_ratchet(
                        previous,
                        Some(header.previous_chain_length),
                        config,
                        now,
                    )? {
                        return Err(not_available());
                    }
                    debug!(chat_id, generation = working.generation, "Followed peer ratchet");
                    working.receiving_key(header.message_number, config)?
                }
                Ordering::Greater => return Err(not_available()),
            };

            let plaintext = decrypt_with_aad(key.symmetric_key(), &envelope.ciphertext, &header.aad())
                .map_err(|_| E2eeError::Decryption)?;

            if header.generation == working.generation {
                working.settle_previous_chain(header.previous_chain_length, config);
                if working.their_ratchet_public_key != Some(header.ratchet_public_key) {
                    working.peer_ratchet_hint = Some(header.ratchet_public_key);
                }
            }
            *state = working;
            Ok(plaintext)
        })
    }
}
