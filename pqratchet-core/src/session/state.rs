// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ratchet State
//!
//! Per-conversation Double Ratchet state and the pure state transitions on
//! it. Locking, compromise flags and logging live in the session manager.
//!
//! Both chains are seeded from the root key with directional labels. The
//! peer whose identity public key sorts lower sends on `chain:low->high`, so
//! the two sides agree on which chain is whose without an initiator role.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use super::skipped::SkippedKeyCache;
use crate::config::SessionConfig;
use crate::crypto::{
    ChainError, ChainKey, Hkdf, IdentityKeyPair, KeyHandle, MessageKey, RatchetKeyPair,
};
use crate::error::{E2eeError, E2eeResult};

const ROOT_INFO: &[u8] = b"root";
const RATCHET_INFO: &[u8] = b"ratchet";
const CHAIN_LOW_TO_HIGH: &[u8] = b"chain:low->high";
const CHAIN_HIGH_TO_LOW: &[u8] = b"chain:high->low";

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Keys are live.
    Active,
    /// Secrets were cleared; only recovery or removal is possible.
    Compromised,
    /// Bookkeeping shell restored from an export, with no secrets.
    Imported,
}

/// Non-secret view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
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

/// Derives (sending, receiving) chains for our side of the conversation.
fn directional_chains(
    root_key: &[u8; 32],
    ours: &KeyHandle,
    theirs: &KeyHandle,
    max_length: u32,
) -> E2eeResult<(ChainKey, ChainKey)> {
    let (send_info, recv_info) = if ours <= theirs {
        (CHAIN_LOW_TO_HIGH, CHAIN_HIGH_TO_LOW)
    } else {
        (CHAIN_HIGH_TO_LOW, CHAIN_LOW_TO_HIGH)
    };
    let sending = Hkdf::derive_key(None, root_key, send_info)?;
    let receiving = Hkdf::derive_key(None, root_key, recv_info)?;
    Ok((
        ChainKey::new(sending, max_length),
        ChainKey::new(receiving, max_length),
    ))
}

/// Root key from an identity agreement.
fn root_from_identities(ours: &IdentityKeyPair, theirs: &KeyHandle) -> E2eeResult<[u8; 32]> {
    let mut shared = ours.diffie_hellman(theirs)?;
    let root = Hkdf::derive_key(None, &shared, ROOT_INFO);
    shared.zeroize();
    Ok(root?)
}

/// Double Ratchet state for one conversation.
#[derive(Clone)]
pub struct RatchetState {
    pub(super) chat_id: String,
    pub(super) state_id: String,
    pub(super) generation: u32,
    pub(super) our_identity_key: KeyHandle,
    pub(super) their_identity_key: KeyHandle,
    root_key: Option<[u8; 32]>,
    sending_chain: Option<ChainKey>,
    receiving_chain: Option<ChainKey>,
    /// Receiving chain of the previous generation, for in-flight messages
    previous_receiving_chain: Option<(u32, ChainKey)>,
    our_ratchet: Option<RatchetKeyPair>,
    pub(super) our_ratchet_public_key: KeyHandle,
    pub(super) our_previous_ratchet_public_key: Option<KeyHandle>,
    pub(super) their_ratchet_public_key: Option<KeyHandle>,
    /// Peer ratchet key for the current generation, seen on an inbound message
    pub(super) peer_ratchet_hint: Option<KeyHandle>,
    pub(super) sending_message_number: u32,
    pub(super) receiving_message_number: u32,
    pub(super) previous_sending_chain_length: u32,
    pub(super) skipped: SkippedKeyCache,
    pub(super) created_at: u64,
    pub(super) last_ratchet: u64,
    pub(super) status: SessionStatus,
}

impl std::fmt::Debug for RatchetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetState")
            .field("chat_id", &self.chat_id)
            .field("state_id", &self.state_id)
            .field("generation", &self.generation)
            .field("status", &self.status)
            .field("root_key", &"[REDACTED]")
            .field("sending_message_number", &self.sending_message_number)
            .field("receiving_message_number", &self.receiving_message_number)
            .field("skipped_keys", &self.skipped.len())
            .finish()
    }
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        if let Some(root) = self.root_key.as_mut() {
            root.zeroize();
        }
    }
}

impl RatchetState {
    /// Creates a fresh state from an identity agreement.
    pub(super) fn new(
        chat_id: &str,
        our_identity: &IdentityKeyPair,
        their_identity: KeyHandle,
        config: &SessionConfig,
        now: u64,
    ) -> E2eeResult<Self> {
        let our_identity_key = our_identity.public_key();
        let root = root_from_identities(our_identity, &their_identity)?;
        let (sending, receiving) = directional_chains(
            &root,
            &our_identity_key,
            &their_identity,
            config.max_chain_length,
        )?;
        let ratchet = RatchetKeyPair::generate();

        Ok(RatchetState {
            chat_id: chat_id.to_string(),
            state_id: Uuid::new_v4().to_string(),
            generation: 0,
            our_identity_key,
            their_identity_key: their_identity,
            root_key: Some(root),
            sending_chain: Some(sending),
            receiving_chain: Some(receiving),
            previous_receiving_chain: None,
            our_ratchet_public_key: KeyHandle::from_bytes(*ratchet.public_key()),
            our_ratchet: Some(ratchet),
            our_previous_ratchet_public_key: None,
            their_ratchet_public_key: None,
            peer_ratchet_hint: None,
            sending_message_number: 0,
            receiving_message_number: 0,
            previous_sending_chain_length: 0,
            skipped: SkippedKeyCache::new(config.max_skipped_keys),
            created_at: now,
            last_ratchet: now,
            status: SessionStatus::Active,
        })
    }

    /// Creates a secret-less shell from exported bookkeeping fields.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn imported_shell(
        chat_id: &str,
        state_id: String,
        generation: u32,
        our_identity_key: KeyHandle,
        their_identity_key: KeyHandle,
        our_ratchet_public_key: KeyHandle,
        their_ratchet_public_key: Option<KeyHandle>,
        counters: (u32, u32, u32),
        timestamps: (u64, u64),
        config: &SessionConfig,
    ) -> Self {
        let (sending, receiving, previous) = counters;
        let (created_at, last_ratchet) = timestamps;
        RatchetState {
            chat_id: chat_id.to_string(),
            state_id,
            generation,
            our_identity_key,
            their_identity_key,
            root_key: None,
            sending_chain: None,
            receiving_chain: None,
            previous_receiving_chain: None,
            our_ratchet: None,
            our_ratchet_public_key,
            our_previous_ratchet_public_key: None,
            their_ratchet_public_key,
            peer_ratchet_hint: None,
            sending_message_number: sending,
            receiving_message_number: receiving,
            previous_sending_chain_length: previous,
            skipped: SkippedKeyCache::new(config.max_skipped_keys),
            created_at,
            last_ratchet,
            status: SessionStatus::Imported,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            chat_id: self.chat_id.clone(),
            state_id: self.state_id.clone(),
            generation: self.generation,
            status: self.status,
            our_identity_key: self.our_identity_key,
            their_identity_key: self.their_identity_key,
            our_ratchet_public_key: self.our_ratchet_public_key,
            their_ratchet_public_key: self.their_ratchet_public_key,
            sending_message_number: self.sending_message_number,
            receiving_message_number: self.receiving_message_number,
            previous_sending_chain_length: self.previous_sending_chain_length,
            skipped_key_count: self.skipped.len(),
            created_at: self.created_at,
            last_ratchet: self.last_ratchet,
        }
    }

    /// Fails unless the state holds live key material.
    pub(super) fn ensure_active(&self) -> E2eeResult<()> {
        match self.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Compromised => Err(E2eeError::CompromisedState(self.chat_id.clone())),
            SessionStatus::Imported => Err(E2eeError::NotEstablished(self.chat_id.clone())),
        }
    }

    fn chain_error(&self, err: ChainError) -> E2eeError {
        match err {
            ChainError::LengthLimitExceeded { .. } => {
                E2eeError::RekeyRequired(self.chat_id.clone())
            }
            ChainError::SkipLimitExceeded { requested, limit } => {
                E2eeError::SkipLimitExceeded { requested, limit }
            }
            other => E2eeError::Crypto(other.to_string()),
        }
    }

    fn missing(&self, what: &str) -> E2eeError {
        E2eeError::NotEstablished(format!("{}: no {}", self.chat_id, what))
    }

    fn stash(&mut self, generation: u32, keys: Vec<MessageKey>) {
        let mut evicted = 0;
        for key in keys {
            evicted += self.skipped.insert(generation, key);
        }
        if evicted > 0 {
            warn!(
                chat_id = %self.chat_id,
                evicted,
                "Skipped key cache full, evicted oldest keys"
            );
        }
    }

    /// Advances the sending chain and returns the key for the next outbound message.
    pub(super) fn next_sending_key(&mut self) -> E2eeResult<MessageKey> {
        self.ensure_active()?;
        let chain = self
            .sending_chain
            .as_ref()
            .ok_or_else(|| self.missing("sending chain"))?;
        let (key, next) = chain.ratchet().map_err(|e| self.chain_error(e))?;

        self.sending_chain = Some(next);
        self.sending_message_number += 1;
        Ok(key)
    }

    /// Resolves a receiving key in the current generation.
    pub(super) fn receiving_key(
        &mut self,
        message_number: u32,
        config: &SessionConfig,
    ) -> E2eeResult<MessageKey> {
        self.ensure_active()?;
        let chain = self
            .receiving_chain
            .as_ref()
            .ok_or_else(|| self.missing("receiving chain"))?;

        if message_number < chain.position() {
            return self
                .skipped
                .take(self.generation, message_number)
                .ok_or_else(|| E2eeError::KeyNotAvailable {
                    chat_id: self.chat_id.clone(),
                    generation: self.generation,
                    message_number,
                });
        }

        let (skipped, at_target) = chain
            .skip_to(message_number, config.max_skip_per_message)
            .map_err(|e| self.chain_error(e))?;
        let (key, next) = at_target.ratchet().map_err(|e| self.chain_error(e))?;

        if !skipped.is_empty() {
            debug!(
                chat_id = %self.chat_id,
                generation = self.generation,
                skipped = skipped.len(),
                "Stashing skipped receiving keys"
            );
        }
        self.stash(self.generation, skipped);
        self.receiving_chain = Some(next);
        self.receiving_message_number = message_number + 1;
        Ok(key)
    }

    /// Resolves a receiving key for an older generation.
    ///
    /// The generation right before the current one still has its chain; any
    /// older one is served from the skipped cache only.
    pub(super) fn earlier_generation_key(
        &mut self,
        generation: u32,
        message_number: u32,
        config: &SessionConfig,
    ) -> E2eeResult<MessageKey> {
        self.ensure_active()?;
        if let Some(key) = self.skipped.take(generation, message_number) {
            return Ok(key);
        }

        let not_available = || E2eeError::KeyNotAvailable {
            chat_id: self.chat_id.clone(),
            generation,
            message_number,
        };
        let chain = match &self.previous_receiving_chain {
            Some((previous, chain))
                if *previous == generation && message_number >= chain.position() =>
            {
                chain
            }
            _ => return Err(not_available()),
        };

        let (skipped, at_target) = chain
            .skip_to(message_number, config.max_skip_per_message)
            .map_err(|e| self.chain_error(e))?;
        let (key, next) = at_target.ratchet().map_err(|e| self.chain_error(e))?;

        self.stash(generation, skipped);
        self.previous_receiving_chain = Some((generation, next));
        Ok(key)
    }

    /// Caches the previous generation's receiving keys up to the length the
    /// peer reports for that chain.
    ///
    /// The previous chain is dropped on our next ratchet, so keys for its
    /// in-flight messages have to be in the skipped cache by then. A length
    /// beyond the skip limit is logged and left unsettled.
    pub(super) fn settle_previous_chain(&mut self, chain_length: u32, config: &SessionConfig) {
        let Some((generation, chain)) = self.previous_receiving_chain.as_ref() else {
            return;
        };
        let generation = *generation;
        if generation + 1 != self.generation || chain_length <= chain.position() {
            return;
        }

        match chain.skip_to(chain_length, config.max_skip_per_message) {
            Ok((skipped, at_end)) => {
                debug!(
                    chat_id = %self.chat_id,
                    generation,
                    settled = skipped.len(),
                    "Settled previous receiving chain"
                );
                self.stash(generation, skipped);
                self.previous_receiving_chain = Some((generation, at_end));
            }
            Err(err) => warn!(
                chat_id = %self.chat_id,
                generation,
                error = %err,
                "Could not settle previous receiving chain"
            ),
        }
    }

    /// Derives every remaining receiving key of this generation up to
    /// `chain_length` into the skipped cache.
    fn stash_receiving_up_to(
        &mut self,
        chain_length: u32,
        config: &SessionConfig,
    ) -> E2eeResult<()> {
        let Some(chain) = self.receiving_chain.as_ref() else {
            return Ok(());
        };
        if chain_length <= chain.position() {
            return Ok(());
        }
        let (skipped, at_end) = chain
            .skip_to(chain_length, config.max_skip_per_message)
            .map_err(|e| self.chain_error(e))?;

        self.stash(self.generation, skipped);
        self.receiving_chain = Some(at_end);
        self.receiving_message_number = chain_length;
        Ok(())
    }

    /// Mixes a fresh agreement with the peer's new ratchet key into the root.
    ///
    /// Returns `false` without touching the state if `their_new_key` is the
    /// peer key already in use.
    pub(super) fn dh_ratchet(
        &mut self,
        their_new_key: KeyHandle,
        previous_chain_length: Option<u32>,
        config: &SessionConfig,
        now: u64,
    ) -> E2eeResult<bool> {
        self.ensure_active()?;
        if self.their_ratchet_public_key == Some(their_new_key) {
            return Ok(false);
        }

        let ours = self
            .our_ratchet
            .as_ref()
            .ok_or_else(|| self.missing("ratchet key pair"))?;
        let mut shared = ours.diffie_hellman(their_new_key.as_bytes())?;
        let mut root = self.root_key.ok_or_else(|| self.missing("root key"))?;
        let new_root = Hkdf::derive_key(Some(root.as_slice()), &shared, RATCHET_INFO);
        shared.zeroize();
        root.zeroize();
        let mut new_root = new_root?;

        let prepared = directional_chains(
            &new_root,
            &self.our_identity_key,
            &self.their_identity_key,
            config.max_chain_length,
        )
        .and_then(|chains| match previous_chain_length {
            Some(length) => self.stash_receiving_up_to(length, config).map(|_| chains),
            None => Ok(chains),
        });
        let (sending, receiving) = match prepared {
            Ok(chains) => chains,
            Err(err) => {
                new_root.zeroize();
                return Err(err);
            }
        };

        if let Some(old_root) = self.root_key.as_mut() {
            old_root.zeroize();
        }
        self.root_key = Some(new_root);
        new_root.zeroize();

        self.previous_receiving_chain = self
            .receiving_chain
            .take()
            .map(|chain| (self.generation, chain));
        self.sending_chain = Some(sending);
        self.receiving_chain = Some(receiving);
        self.generation += 1;

        let next_pair = RatchetKeyPair::generate();
        self.our_previous_ratchet_public_key = Some(self.our_ratchet_public_key);
        self.our_ratchet_public_key = KeyHandle::from_bytes(*next_pair.public_key());
        self.our_ratchet = Some(next_pair);
        self.their_ratchet_public_key = Some(their_new_key);
        self.peer_ratchet_hint = None;

        self.previous_sending_chain_length = self.sending_message_number;
        self.sending_message_number = 0;
        self.receiving_message_number = 0;
        self.state_id = Uuid::new_v4().to_string();
        self.last_ratchet = now;
        Ok(true)
    }

    /// Ratchets ahead of a send once the chain is due for a rekey.
    ///
    /// Needs the peer's ratchet key for this generation; until one arrives
    /// the rekey is deferred and sending continues on the current chain.
    pub(super) fn rekey_if_due(&mut self, config: &SessionConfig, now: u64) -> E2eeResult<()> {
        if !self.should_rekey_at(now, config) {
            return Ok(());
        }
        match self.peer_ratchet_hint {
            Some(hint) => {
                if self.dh_ratchet(hint, None, config, now)? {
                    debug!(
                        chat_id = %self.chat_id,
                        generation = self.generation,
                        "Rekeyed before send"
                    );
                }
            }
            None => warn!(
                chat_id = %self.chat_id,
                sent = self.sending_message_number,
                "Rekey due but peer ratchet key unknown, deferring"
            ),
        }
        Ok(())
    }

    /// Whether the next send should be preceded by a DH ratchet.
    pub(super) fn should_rekey_at(&self, now: u64, config: &SessionConfig) -> bool {
        self.sending_message_number >= config.max_messages_per_chain
            || now.saturating_sub(self.last_ratchet) >= config.rekey_interval.as_secs()
    }

    /// Clears every secret. Public bookkeeping survives for export.
    pub(super) fn clear_secrets(&mut self) {
        if let Some(root) = self.root_key.as_mut() {
            root.zeroize();
        }
        self.root_key = None;
        self.sending_chain = None;
        self.receiving_chain = None;
        self.previous_receiving_chain = None;
        self.our_ratchet = None;
        self.peer_ratchet_hint = None;
        self.skipped.clear();
        self.status = SessionStatus::Compromised;
    }

    /// Rebuilds the state from a fresh identity, unrelated to prior secrets.
    pub(super) fn reinitialize(
        &mut self,
        new_identity: &IdentityKeyPair,
        config: &SessionConfig,
        now: u64,
    ) -> E2eeResult<()> {
        let created_at = self.created_at;
        let fresh = RatchetState::new(
            &self.chat_id,
            new_identity,
            self.their_identity_key,
            config,
            now,
        )?;
        let mut old = std::mem::replace(self, fresh);
        old.clear_secrets();
        self.created_at = created_at;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn root_key_bytes(&self) -> Option<[u8; 32]> {
        self.root_key
    }

    #[cfg(test)]
    pub(crate) fn chain_key_bytes(&self) -> (Option<[u8; 32]>, Option<[u8; 32]>) {
        (
            self.sending_chain.as_ref().map(|c| *c.as_bytes()),
            self.receiving_chain.as_ref().map(|c| *c.as_bytes()),
        )
    }

    #[cfg(test)]
    pub(crate) fn ratchet_secret_bytes(&self) -> Option<[u8; 32]> {
        self.our_ratchet.as_ref().map(|pair| pair.secret_bytes())
    }
}
