// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared helpers and fixtures used across test modules.

#![allow(dead_code)]

pub mod strategies;

use pqratchet_core::{IdentityKeyPair, SessionConfig, SessionManager};

pub const CHAT: &str = "chat-1";

/// Fixed clock for tests that must not trip time-based rekeys.
pub const T0: u64 = 1_700_000_000;

/// Two managers holding the two ends of one conversation.
pub struct Peers {
    pub alice: SessionManager,
    pub bob: SessionManager,
    pub alice_identity: IdentityKeyPair,
    pub bob_identity: IdentityKeyPair,
}

pub fn peers() -> Peers {
    peers_with(SessionConfig::default())
}

pub fn peers_with(config: SessionConfig) -> Peers {
    let alice_identity = IdentityKeyPair::generate();
    let bob_identity = IdentityKeyPair::generate();

    let alice = SessionManager::new(config.clone()).unwrap();
    let bob = SessionManager::new(config).unwrap();
    alice
        .initialize_at(CHAT, &alice_identity, bob_identity.public_key().as_bytes(), T0)
        .unwrap();
    bob.initialize_at(CHAT, &bob_identity, alice_identity.public_key().as_bytes(), T0)
        .unwrap();

    Peers {
        alice,
        bob,
        alice_identity,
        bob_identity,
    }
}

/// Raw bytes of the next `count` sending keys.
pub fn sending_keys(manager: &SessionManager, count: usize) -> Vec<[u8; 32]> {
    (0..count)
        .map(|_| *manager.get_sending_message_key_at(CHAT, T0).unwrap().as_bytes())
        .collect()
}

/// Enables log output for a test run when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
