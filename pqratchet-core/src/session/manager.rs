// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Manager
//!
//! Owns every conversation's ratchet state. The session table sits behind an
//! `RwLock`; each session has its own `Mutex`, so work on one chat never
//! waits on another. A per-session atomic flag lets `mark_key_compromised`
//! fail in-flight operations before it can take the session lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use ring::digest::{digest, SHA256};
use tracing::{debug, info, warn};

use super::export::ExportedRatchetState;
use super::state::{RatchetState, SessionSnapshot, SessionStatus};
use crate::config::SessionConfig;
use crate::crypto::{IdentityKeyPair, KeyHandle, MessageKey};
use crate::error::{E2eeError, E2eeResult};
use crate::pqc::{self, HybridEnvelope};

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One session and its out-of-lock signals.
struct SessionSlot {
    compromised: AtomicBool,
    /// Mirror of `last_ratchet`, readable by the sweeper without the lock
    last_ratchet: AtomicU64,
    state: Mutex<RatchetState>,
}

impl SessionSlot {
    fn new(state: RatchetState) -> Self {
        SessionSlot {
            compromised: AtomicBool::new(state.status() == SessionStatus::Compromised),
            last_ratchet: AtomicU64::new(state.last_ratchet),
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RatchetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Like `lock`, but `None` while another operation holds the session.
    fn try_lock(&self) -> Option<MutexGuard<'_, RatchetState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn is_expired(&self, now: u64, expiry_secs: u64) -> bool {
        now.saturating_sub(self.last_ratchet.load(Ordering::Acquire)) > expiry_secs
    }
}

/// Manages ratchet sessions keyed by `chat_id`.
pub struct SessionManager {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        SessionManager {
            config: SessionConfig::default(),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl SessionManager {
    /// Creates a manager after validating `config`.
    pub fn new(config: SessionConfig) -> E2eeResult<Self> {
        config.validate()?;
        Ok(SessionManager {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn slot(&self, chat_id: &str) -> E2eeResult<Arc<SessionSlot>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chat_id)
            .cloned()
            .ok_or_else(|| E2eeError::SessionNotFound(chat_id.to_string()))
    }

    fn insert(&self, chat_id: &str, state: RatchetState) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat_id.to_string(), Arc::new(SessionSlot::new(state)));
    }

    /// Runs `op` under the session lock.
    ///
    /// Fails with `CompromisedState` if the session is flagged before the lock
    /// is taken or while `op` runs; in the latter case the result is dropped.
    pub(super) fn with_state<T>(
        &self,
        chat_id: &str,
        op: impl FnOnce(&mut RatchetState, &SessionConfig) -> E2eeResult<T>,
    ) -> E2eeResult<T> {
        let slot = self.slot(chat_id)?;
        if slot.compromised.load(Ordering::Acquire) {
            return Err(E2eeError::CompromisedState(chat_id.to_string()));
        }

        let mut state = slot.lock();
        let result = op(&mut state, &self.config)?;

        if slot.compromised.load(Ordering::Acquire) {
            return Err(E2eeError::CompromisedState(chat_id.to_string()));
        }
        slot.last_ratchet.store(state.last_ratchet, Ordering::Release);
        Ok(result)
    }

    // === Lifecycle ===

    /// Starts a session from our identity and the peer's identity public key.
    ///
    /// An existing session for `chat_id` is replaced.
    pub fn initialize(
        &self,
        chat_id: &str,
        our_identity: &IdentityKeyPair,
        their_identity_key: &[u8],
    ) -> E2eeResult<SessionSnapshot> {
        self.initialize_at(chat_id, our_identity, their_identity_key, unix_now())
    }

    pub fn initialize_at(
        &self,
        chat_id: &str,
        our_identity: &IdentityKeyPair,
        their_identity_key: &[u8],
        now: u64,
    ) -> E2eeResult<SessionSnapshot> {
        let their_identity = KeyHandle::from_slice(their_identity_key)?;
        let state = RatchetState::new(chat_id, our_identity, their_identity, &self.config, now)?;
        let snapshot = state.snapshot();

        if self.has_session(chat_id) {
            warn!(chat_id, "Replacing existing session");
        }
        self.insert(chat_id, state);
        info!(
            chat_id,
            peer = %their_identity,
            state_id = %snapshot.state_id,
            "Session initialized"
        );
        Ok(snapshot)
    }

    /// Removes a session. Returns whether it existed.
    pub fn remove_session(&self, chat_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(chat_id);
        removed.is_some()
    }

    pub fn has_session(&self, chat_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(chat_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn chat_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Non-secret view of a session, in any status.
    pub fn snapshot(&self, chat_id: &str) -> E2eeResult<SessionSnapshot> {
        let slot = self.slot(chat_id)?;
        let state = slot.lock();
        Ok(state.snapshot())
    }

    /// Safety number both peers can compare out of band.
    ///
    /// SHA-256 over the two identity keys in sorted order, as hex in groups
    /// of four.
    pub fn session_fingerprint(&self, chat_id: &str) -> E2eeResult<String> {
        let snapshot = self.snapshot(chat_id)?;
        let (low, high) = if snapshot.our_identity_key <= snapshot.their_identity_key {
            (snapshot.our_identity_key, snapshot.their_identity_key)
        } else {
            (snapshot.their_identity_key, snapshot.our_identity_key)
        };

        let mut input = Vec::with_capacity(64);
        input.extend_from_slice(low.as_bytes());
        input.extend_from_slice(high.as_bytes());
        let hash = hex::encode(digest(&SHA256, &input));

        let groups: Vec<&str> = hash
            .as_bytes()
            .chunks(4)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        Ok(groups.join(" "))
    }

    // === Chains ===

    /// Steps the sending chain once, discarding the message key.
    pub fn advance_sending_chain(&self, chat_id: &str) -> E2eeResult<()> {
        self.with_state(chat_id, |state, _| state.next_sending_key().map(drop))
    }

    /// Steps the receiving chain once, discarding the message key.
    pub fn advance_receiving_chain(&self, chat_id: &str) -> E2eeResult<()> {
        self.with_state(chat_id, |state, config| {
            let next = state.receiving_message_number;
            state.receiving_key(next, config).map(drop)
        })
    }

    /// Key for the next outbound message. Each call yields a distinct key.
    pub fn get_sending_message_key(&self, chat_id: &str) -> E2eeResult<MessageKey> {
        self.get_sending_message_key_at(chat_id, unix_now())
    }

    pub fn get_sending_message_key_at(&self, chat_id: &str, now: u64) -> E2eeResult<MessageKey> {
        self.with_state(chat_id, |state, config| {
            state.ensure_active()?;
            state.rekey_if_due(config, now)?;
            state.next_sending_key()
        })
    }

    /// Key for inbound message `message_number` of the current generation.
    ///
    /// Earlier numbers come from the skipped-key cache; later numbers stash
    /// the keys in between.
    pub fn get_receiving_message_key(
        &self,
        chat_id: &str,
        message_number: u32,
    ) -> E2eeResult<MessageKey> {
        self.with_state(chat_id, |state, config| {
            state.receiving_key(message_number, config)
        })
    }

    // === DH ratchet ===

    /// Applies the peer's new ratchet public key.
    ///
    /// Returns `false` if the key is the one already in use.
    pub fn perform_dh_ratchet(&self, chat_id: &str, their_new_key: &[u8]) -> E2eeResult<bool> {
        self.dh_ratchet_at(chat_id, their_new_key, None, unix_now())
    }

    /// Like [`perform_dh_ratchet`](Self::perform_dh_ratchet), first stashing
    /// the old receiving chain's keys up to the peer's reported chain length.
    pub fn perform_dh_ratchet_with_previous(
        &self,
        chat_id: &str,
        their_new_key: &[u8],
        previous_chain_length: u32,
    ) -> E2eeResult<bool> {
        self.dh_ratchet_at(
            chat_id,
            their_new_key,
            Some(previous_chain_length),
            unix_now(),
        )
    }

    pub fn perform_dh_ratchet_at(
        &self,
        chat_id: &str,
        their_new_key: &[u8],
        now: u64,
    ) -> E2eeResult<bool> {
        self.dh_ratchet_at(chat_id, their_new_key, None, now)
    }

    fn dh_ratchet_at(
        &self,
        chat_id: &str,
        their_new_key: &[u8],
        previous_chain_length: Option<u32>,
        now: u64,
    ) -> E2eeResult<bool> {
        let their_new_key = KeyHandle::from_slice(their_new_key)?;
        let ratcheted = self.with_state(chat_id, |state, config| {
            state.dh_ratchet(their_new_key, previous_chain_length, config, now)
        })?;

        if ratcheted {
            debug!(chat_id, peer_ratchet = %their_new_key, "DH ratchet step");
        } else {
            debug!(chat_id, "Ignoring replayed ratchet key");
        }
        Ok(ratcheted)
    }

    /// Whether the next send is due for a DH ratchet.
    pub fn should_rekey(&self, chat_id: &str) -> E2eeResult<bool> {
        self.should_rekey_at(chat_id, unix_now())
    }

    pub fn should_rekey_at(&self, chat_id: &str, now: u64) -> E2eeResult<bool> {
        self.with_state(chat_id, |state, config| {
            state.ensure_active()?;
            Ok(state.should_rekey_at(now, config))
        })
    }

    // === Compromise ===

    /// Irreversibly clears the session's secrets.
    ///
    /// Operations already running on the session fail with `CompromisedState`
    /// instead of returning keys.
    pub fn mark_key_compromised(&self, chat_id: &str) -> E2eeResult<()> {
        let slot = self.slot(chat_id)?;
        slot.compromised.store(true, Ordering::Release);

        let mut state = slot.lock();
        state.clear_secrets();
        warn!(chat_id, state_id = %state.state_id, "Session keys marked compromised");
        Ok(())
    }

    pub fn is_compromised(&self, chat_id: &str) -> E2eeResult<bool> {
        Ok(self.slot(chat_id)?.compromised.load(Ordering::Acquire))
    }

    /// Rebuilds the session from a fresh identity key.
    ///
    /// The new root key depends only on the new identity and the peer's
    /// identity, so nothing captured before recovery can derive it. The peer
    /// follows by calling `initialize` with our new identity public key.
    pub fn recover_from_compromise(
        &self,
        chat_id: &str,
        new_identity: &IdentityKeyPair,
    ) -> E2eeResult<SessionSnapshot> {
        self.recover_from_compromise_at(chat_id, new_identity, unix_now())
    }

    pub fn recover_from_compromise_at(
        &self,
        chat_id: &str,
        new_identity: &IdentityKeyPair,
        now: u64,
    ) -> E2eeResult<SessionSnapshot> {
        let slot = self.slot(chat_id)?;
        let mut state = slot.lock();

        state.reinitialize(new_identity, &self.config, now)?;
        slot.last_ratchet.store(state.last_ratchet, Ordering::Release);
        slot.compromised.store(false, Ordering::Release);

        info!(
            chat_id,
            identity = %new_identity.public_key(),
            state_id = %state.state_id,
            "Session recovered with new identity"
        );
        Ok(state.snapshot())
    }

    // === Export / import ===

    /// Serializes the session's non-secret fields as JSON.
    pub fn export_ratchet_state(&self, chat_id: &str) -> E2eeResult<Vec<u8>> {
        let slot = self.slot(chat_id)?;
        let exported = ExportedRatchetState::from_state(&slot.lock());
        exported.to_bytes()
    }

    /// Restores a secret-less shell from an export blob.
    ///
    /// Returns `false` if an active session already exists for `chat_id`.
    /// The shell rejects key operations with `NotEstablished` until the
    /// session is re-initialized or recovered.
    pub fn import_ratchet_state(&self, chat_id: &str, blob: &[u8]) -> E2eeResult<bool> {
        let exported = ExportedRatchetState::from_bytes(blob)?;
        if exported.chat_id != chat_id {
            debug!(chat_id, exported_as = %exported.chat_id, "Importing under a new chat id");
        }

        let shell = Arc::new(SessionSlot::new(exported.into_shell(chat_id, &self.config)));
        loop {
            let busy = {
                let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
                let busy = match sessions.get(chat_id) {
                    Some(existing) => match existing.try_lock() {
                        Some(state) if state.status() == SessionStatus::Active => {
                            warn!(chat_id, "Import skipped, session is active");
                            return Ok(false);
                        }
                        Some(_) => None,
                        None => Some(Arc::clone(existing)),
                    },
                    None => None,
                };
                match busy {
                    Some(slot) => slot,
                    None => {
                        sessions.insert(chat_id.to_string(), shell);
                        info!(chat_id, "Imported ratchet state shell");
                        return Ok(true);
                    }
                }
            };
            // Wait out the operation holding the session with the table
            // unlocked, then check its status again.
            drop(busy.lock());
        }
    }

    // === Expiry ===

    /// Removes sessions whose last DH ratchet is older than the expiry window.
    pub fn cleanup_expired_ratchet_states(&self) -> usize {
        self.cleanup_expired_ratchet_states_at(unix_now())
    }

    /// The table is read-locked to find candidates and write-locked only to
    /// unlink them; the states are dropped after both locks are released.
    pub fn cleanup_expired_ratchet_states_at(&self, now: u64) -> usize {
        let expiry = self.config.session_expiry.as_secs();

        let candidates: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, slot)| slot.is_expired(now, expiry))
            .map(|(chat_id, _)| chat_id.clone())
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let removed: Vec<Arc<SessionSlot>> = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            candidates
                .iter()
                .filter_map(|chat_id| {
                    if sessions
                        .get(chat_id.as_str())
                        .is_some_and(|slot| slot.is_expired(now, expiry))
                    {
                        sessions.remove(chat_id.as_str())
                    } else {
                        None
                    }
                })
                .collect()
        };

        let count = removed.len();
        drop(removed);
        if count > 0 {
            info!("Cleaned up {} expired ratchet states", count);
        }
        count
    }

    // === Post-quantum policy ===

    /// Seals `plaintext` with the configured KEM.
    pub fn hybrid_encrypt(&self, plaintext: &[u8], public_key: &[u8]) -> E2eeResult<HybridEnvelope> {
        pqc::hybrid_encrypt(plaintext, public_key, self.config.pqc_policy.kem)
    }

    /// Opens an envelope sealed with the configured KEM.
    pub fn hybrid_decrypt(&self, envelope: &HybridEnvelope, secret_key: &[u8]) -> E2eeResult<Vec<u8>> {
        pqc::hybrid_decrypt(envelope, secret_key, self.config.pqc_policy.kem)
    }

    /// Signs with the configured signature scheme.
    pub fn sign(&self, payload: &[u8], secret_key: &[u8]) -> E2eeResult<Vec<u8>> {
        pqc::sign(payload, secret_key, self.config.pqc_policy.signature)
    }

    /// Verifies with the configured signature scheme.
    pub fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> E2eeResult<bool> {
        pqc::verify(
            payload,
            signature,
            public_key,
            self.config.pqc_policy.signature,
        )
    }
}

// INLINE_TEST_REQUIRED: Reads zeroized secrets and holds the session lock directly
#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decrypt_with_aad, encrypt_with_aad, ChainKey};

    fn established(manager: &SessionManager) -> (IdentityKeyPair, IdentityKeyPair) {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        manager
            .initialize_at("chat", &alice, bob.public_key().as_bytes(), 100)
            .unwrap();
        (alice, bob)
    }

    #[test]
    fn test_compromise_zeroes_live_secrets() {
        let manager = SessionManager::default();
        established(&manager);

        manager.mark_key_compromised("chat").unwrap();

        let slot = manager.slot("chat").unwrap();
        let state = slot.lock();
        assert!(state.root_key_bytes().is_none());
        assert_eq!(state.chain_key_bytes(), (None, None));
        assert!(state.ratchet_secret_bytes().is_none());
        assert_eq!(state.status(), SessionStatus::Compromised);
    }

    #[test]
    fn test_flag_fails_operation_in_flight() {
        let manager = SessionManager::default();
        established(&manager);

        let result = manager.with_state("chat", |state, _| {
            let key = state.next_sending_key();
            // Simulates a compromise landing mid-derivation.
            manager
                .slot("chat")
                .unwrap()
                .compromised
                .store(true, Ordering::Release);
            key
        });

        assert_eq!(
            result.unwrap_err(),
            E2eeError::CompromisedState("chat".into())
        );
    }

    #[test]
    fn test_post_compromise_security() {
        let manager = SessionManager::default();
        let (_alice, bob) = established(&manager);
        manager.get_sending_message_key("chat").unwrap();

        let (captured_root, captured_send, captured_recv) = {
            let slot = manager.slot("chat").unwrap();
            let state = slot.lock();
            let (send, recv) = state.chain_key_bytes();
            (state.root_key_bytes().unwrap(), send.unwrap(), recv.unwrap())
        };

        manager.mark_key_compromised("chat").unwrap();
        let recovered_identity = IdentityKeyPair::generate();
        manager
            .recover_from_compromise("chat", &recovered_identity)
            .unwrap();

        let key = manager.get_sending_message_key("chat").unwrap();
        let ciphertext = encrypt_with_aad(key.symmetric_key(), b"after recovery", b"").unwrap();

        {
            let slot = manager.slot("chat").unwrap();
            let state = slot.lock();
            assert_ne!(state.root_key_bytes().unwrap(), captured_root);
        }

        // Every key derivable from the captured chains fails.
        for captured in [captured_send, captured_recv, captured_root] {
            let mut chain = ChainKey::new(captured, 2000);
            for _ in 0..16 {
                let (candidate, next) = chain.ratchet().unwrap();
                assert!(decrypt_with_aad(candidate.symmetric_key(), &ciphertext, b"").is_err());
                chain = next;
            }
        }

        // The peer follows the recovery and can read the message.
        let peer = SessionManager::default();
        peer.initialize("chat", &bob, recovered_identity.public_key().as_bytes())
            .unwrap();
        let peer_key = peer.get_receiving_message_key("chat", 0).unwrap();
        assert_eq!(
            decrypt_with_aad(peer_key.symmetric_key(), &ciphertext, b"").unwrap(),
            b"after recovery".to_vec()
        );
    }

    #[test]
    fn test_import_waits_on_busy_session_without_blocking_table() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let manager = Arc::new(SessionManager::default());
        established(&manager);
        let blob = manager.export_ratchet_state("chat").unwrap();
        manager.mark_key_compromised("chat").unwrap();

        let slot = manager.slot("chat").unwrap();
        let held = slot.lock();

        let importer = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.import_ratchet_state("chat", &blob))
        };
        thread::sleep(Duration::from_millis(50));

        let (tx, rx) = mpsc::channel();
        let reader = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let _ = tx.send(manager.session_count());
            })
        };
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));
        reader.join().unwrap();

        drop(held);
        assert_eq!(importer.join().unwrap(), Ok(true));
        assert_eq!(
            manager.snapshot("chat").unwrap().status,
            SessionStatus::Imported
        );
    }

    #[test]
    fn test_sweep_rechecks_under_write_lock() {
        let config = SessionConfig::default();
        let manager = SessionManager::new(config.clone()).unwrap();
        established(&manager);

        let expiry = config.session_expiry.as_secs();
        assert_eq!(manager.cleanup_expired_ratchet_states_at(100 + expiry), 0);
        assert_eq!(manager.cleanup_expired_ratchet_states_at(101 + expiry), 1);
        assert!(!manager.has_session("chat"));
    }
}
