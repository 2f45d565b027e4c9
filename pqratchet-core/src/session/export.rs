// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ratchet state export and import.
//!
//! Only public bookkeeping is exported: identifiers, counters, public keys
//! and timestamps. Importing produces a shell that cannot encrypt until the
//! session is re-established.

use serde::{Deserialize, Serialize};

use super::state::{RatchetState, SessionStatus};
use crate::config::SessionConfig;
use crate::crypto::KeyHandle;
use crate::error::{E2eeError, E2eeResult};

/// Current export format version.
pub const EXPORT_VERSION: u32 = 1;

/// Serialized form of a session's non-secret fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedRatchetState {
    pub version: u32,
    pub chat_id: String,
    pub state_id: String,
    pub generation: u32,
    pub status: SessionStatus,
    pub our_identity_key: KeyHandle,
    pub their_identity_key: KeyHandle,
    pub our_ratchet_public_key: KeyHandle,
    pub their_ratchet_public_key: Option<KeyHandle>,
    pub sending_message_number: u32,
    pub receiving_message_number: u32,
    pub previous_sending_chain_length: u32,
    pub skipped_key_count: usize,
    pub created_at: u64,
    pub last_ratchet: u64,
}

impl ExportedRatchetState {
    pub(super) fn from_state(state: &RatchetState) -> Self {
        ExportedRatchetState {
            version: EXPORT_VERSION,
            chat_id: state.chat_id.clone(),
            state_id: state.state_id.clone(),
            generation: state.generation,
            status: state.status,
            our_identity_key: state.our_identity_key,
            their_identity_key: state.their_identity_key,
            our_ratchet_public_key: state.our_ratchet_public_key,
            their_ratchet_public_key: state.their_ratchet_public_key,
            sending_message_number: state.sending_message_number,
            receiving_message_number: state.receiving_message_number,
            previous_sending_chain_length: state.previous_sending_chain_length,
            skipped_key_count: state.skipped.len(),
            created_at: state.created_at,
            last_ratchet: state.last_ratchet,
        }
    }

    pub fn to_bytes(&self) -> E2eeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an export blob, rejecting unknown versions.
    pub fn from_bytes(blob: &[u8]) -> E2eeResult<Self> {
        let exported: ExportedRatchetState = serde_json::from_slice(blob)?;
        if exported.version != EXPORT_VERSION {
            return Err(E2eeError::Serialization(format!(
                "unsupported export version {}",
                exported.version
            )));
        }
        Ok(exported)
    }

    /// Builds an imported shell keyed by `chat_id`.
    ///
    /// A compromised session stays compromised across export and import.
    pub(super) fn into_shell(self, chat_id: &str, config: &SessionConfig) -> RatchetState {
        let compromised = self.status == SessionStatus::Compromised;
        let mut shell = RatchetState::imported_shell(
            chat_id,
            self.state_id,
            self.generation,
            self.our_identity_key,
            self.their_identity_key,
            self.our_ratchet_public_key,
            self.their_ratchet_public_key,
            (
                self.sending_message_number,
                self.receiving_message_number,
                self.previous_sending_chain_length,
            ),
            (self.created_at, self.last_ratchet),
            config,
        );
        if compromised {
            shell.status = SessionStatus::Compromised;
        }
        shell
    }
}
