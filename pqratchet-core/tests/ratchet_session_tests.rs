// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for session lifecycle, chain advancement and the DH ratchet

mod common;

use std::collections::HashSet;

use common::*;
use pqratchet_core::*;

// =============================================================================
// INITIALIZATION
// =============================================================================

#[test]
fn test_initialize_creates_active_session() {
    let p = peers();

    let snapshot = p.alice.snapshot(CHAT).unwrap();
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.generation, 0);
    assert_eq!(snapshot.sending_message_number, 0);
    assert_eq!(snapshot.receiving_message_number, 0);
    assert_eq!(snapshot.their_identity_key, p.bob_identity.public_key());
    assert_eq!(snapshot.created_at, T0);
    assert!(p.alice.has_session(CHAT));
    assert_eq!(p.alice.chat_ids(), vec![CHAT.to_string()]);
}

#[test]
fn test_initialize_rejects_malformed_identity_key() {
    let manager = SessionManager::default();
    let ours = IdentityKeyPair::generate();

    let short = manager.initialize(CHAT, &ours, &[1u8; 31]);
    assert!(matches!(short, Err(E2eeError::KeyAgreement(_))));

    let empty = manager.initialize(CHAT, &ours, &[]);
    assert!(matches!(empty, Err(E2eeError::KeyAgreement(_))));

    let zero = manager.initialize(CHAT, &ours, &[0u8; 32]);
    assert!(matches!(zero, Err(E2eeError::KeyAgreement(_))));

    assert!(!manager.has_session(CHAT));
}

#[test]
fn test_initialize_twice_replaces_session() {
    let p = peers();
    let first = p.alice.snapshot(CHAT).unwrap();

    let other = IdentityKeyPair::generate();
    let second = p
        .alice
        .initialize(CHAT, &p.alice_identity, other.public_key().as_bytes())
        .unwrap();

    assert_eq!(p.alice.session_count(), 1);
    assert_ne!(first.state_id, second.state_id);
    assert_eq!(second.their_identity_key, other.public_key());
}

#[test]
fn test_unknown_chat_is_session_not_found() {
    let manager = SessionManager::default();

    assert_eq!(
        manager.get_sending_message_key("missing").unwrap_err(),
        E2eeError::SessionNotFound("missing".into())
    );
    assert!(matches!(
        manager.advance_receiving_chain("missing"),
        Err(E2eeError::SessionNotFound(_))
    ));
    assert!(matches!(
        manager.export_ratchet_state("missing"),
        Err(E2eeError::SessionNotFound(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let config = SessionConfig::default().with_max_skipped_keys(0);
    assert!(matches!(
        SessionManager::new(config),
        Err(E2eeError::Configuration(_))
    ));
}

#[test]
fn test_fingerprint_matches_on_both_sides() {
    let p = peers();

    let ours = p.alice.session_fingerprint(CHAT).unwrap();
    let theirs = p.bob.session_fingerprint(CHAT).unwrap();

    assert_eq!(ours, theirs);
    assert_eq!(ours.split(' ').count(), 16);
    assert!(ours.split(' ').all(|group| group.len() == 4));
}

// =============================================================================
// CHAIN ADVANCEMENT
// =============================================================================

#[test]
fn test_sending_keys_are_unique() {
    let p = peers();

    let keys = sending_keys(&p.alice, 200);
    let unique: HashSet<[u8; 32]> = keys.iter().copied().collect();

    assert_eq!(unique.len(), keys.len());
}

#[test]
fn test_advance_sending_chain_counts_and_moves_forward() {
    let p = peers();

    for _ in 0..5 {
        p.alice.advance_sending_chain(CHAT).unwrap();
    }
    assert_eq!(p.alice.snapshot(CHAT).unwrap().sending_message_number, 5);

    let next = p.alice.get_sending_message_key_at(CHAT, T0).unwrap();
    assert_eq!(next.message_number(), 5);

    // The receiver reaches the same key by position alone.
    let received = p.bob.get_receiving_message_key(CHAT, 5).unwrap();
    assert_eq!(received.as_bytes(), next.as_bytes());
}

#[test]
fn test_advance_receiving_chain_tracks_sender() {
    let p = peers();
    let sent = sending_keys(&p.alice, 3);

    p.bob.advance_receiving_chain(CHAT).unwrap();
    p.bob.advance_receiving_chain(CHAT).unwrap();
    assert_eq!(p.bob.snapshot(CHAT).unwrap().receiving_message_number, 2);

    let key = p.bob.get_receiving_message_key(CHAT, 2).unwrap();
    assert_eq!(key.as_bytes(), &sent[2]);
}

#[test]
fn test_in_order_keys_match_between_peers() {
    let p = peers();
    let sent = sending_keys(&p.alice, 10);

    for (n, expected) in sent.iter().enumerate() {
        let key = p.bob.get_receiving_message_key(CHAT, n as u32).unwrap();
        assert_eq!(key.as_bytes(), expected);
    }

    // The reverse direction uses a different chain.
    let back = sending_keys(&p.bob, 1);
    assert_ne!(back[0], sent[0]);
    let key = p.alice.get_receiving_message_key(CHAT, 0).unwrap();
    assert_eq!(key.as_bytes(), &back[0]);
}

// =============================================================================
// DH RATCHET
// =============================================================================

#[test]
fn test_dh_ratchet_resets_counters_and_rotates_state_id() {
    let p = peers();
    let alice_before = p.alice.snapshot(CHAT).unwrap();
    let bob_before = p.bob.snapshot(CHAT).unwrap();

    let pre_ratchet: HashSet<[u8; 32]> = sending_keys(&p.alice, 3).into_iter().collect();
    p.bob.get_receiving_message_key(CHAT, 0).unwrap();

    assert!(p
        .alice
        .perform_dh_ratchet_at(CHAT, bob_before.our_ratchet_public_key.as_bytes(), T0)
        .unwrap());
    assert!(p
        .bob
        .perform_dh_ratchet_at(CHAT, alice_before.our_ratchet_public_key.as_bytes(), T0)
        .unwrap());

    let alice_after = p.alice.snapshot(CHAT).unwrap();
    let bob_after = p.bob.snapshot(CHAT).unwrap();
    assert_eq!(alice_after.generation, 1);
    assert_eq!(alice_after.sending_message_number, 0);
    assert_eq!(alice_after.receiving_message_number, 0);
    assert_eq!(alice_after.previous_sending_chain_length, 3);
    assert_eq!(bob_after.receiving_message_number, 0);
    assert_ne!(alice_after.state_id, alice_before.state_id);
    assert_ne!(
        alice_after.our_ratchet_public_key,
        alice_before.our_ratchet_public_key
    );

    let sent = p.alice.get_sending_message_key_at(CHAT, T0).unwrap();
    let received = p.bob.get_receiving_message_key(CHAT, 0).unwrap();
    assert_eq!(sent.as_bytes(), received.as_bytes());
    assert!(!pre_ratchet.contains(sent.as_bytes()));
}

#[test]
fn test_dh_ratchet_replay_is_noop() {
    let p = peers();
    let bob_key = p.bob.snapshot(CHAT).unwrap().our_ratchet_public_key;

    assert!(p.alice.perform_dh_ratchet(CHAT, bob_key.as_bytes()).unwrap());
    let after_first = p.alice.snapshot(CHAT).unwrap();

    assert!(!p.alice.perform_dh_ratchet(CHAT, bob_key.as_bytes()).unwrap());
    assert_eq!(p.alice.snapshot(CHAT).unwrap(), after_first);
}

#[test]
fn test_dh_ratchet_rejects_bad_peer_key() {
    let p = peers();

    assert!(matches!(
        p.alice.perform_dh_ratchet(CHAT, &[5u8; 16]),
        Err(E2eeError::KeyAgreement(_))
    ));
    assert!(matches!(
        p.alice.perform_dh_ratchet(CHAT, &[0u8; 32]),
        Err(E2eeError::KeyAgreement(_))
    ));
    assert_eq!(p.alice.snapshot(CHAT).unwrap().generation, 0);
}

#[test]
fn test_dh_ratchet_with_previous_stashes_old_chain() {
    let p = peers();
    let alice_key = p.alice.snapshot(CHAT).unwrap().our_ratchet_public_key;
    let sent = sending_keys(&p.alice, 4);
    p.bob.get_receiving_message_key(CHAT, 0).unwrap();

    assert!(p
        .bob
        .perform_dh_ratchet_with_previous(CHAT, alice_key.as_bytes(), 4)
        .unwrap());

    let snapshot = p.bob.snapshot(CHAT).unwrap();
    assert_eq!(snapshot.generation, 1);
    assert_eq!(snapshot.skipped_key_count, 3);

    // Old-generation keys now live in the skipped cache, not the current chain.
    let current = p.bob.get_receiving_message_key(CHAT, 1).unwrap();
    assert_ne!(current.as_bytes(), &sent[1]);
}

// =============================================================================
// REKEY POLICY
// =============================================================================

#[test]
fn test_should_rekey_by_count_and_by_time() {
    let config = SessionConfig::default().with_max_messages_per_chain(4);
    let p = peers_with(config.clone());

    assert!(!p.alice.should_rekey_at(CHAT, T0).unwrap());
    sending_keys(&p.alice, 4);
    assert!(p.alice.should_rekey_at(CHAT, T0).unwrap());

    let interval = config.rekey_interval.as_secs();
    assert!(!p.bob.should_rekey_at(CHAT, T0 + interval - 1).unwrap());
    assert!(p.bob.should_rekey_at(CHAT, T0 + interval).unwrap());
}

#[test]
fn test_rekey_deferred_without_peer_ratchet_key() {
    let config = SessionConfig::default().with_max_messages_per_chain(2);
    let p = peers_with(config);

    let envelopes: Vec<RatchetEnvelope> = (0..5)
        .map(|i| {
            p.alice
                .encrypt_message_at(CHAT, format!("m{}", i).as_bytes(), T0)
                .unwrap()
        })
        .collect();

    assert_eq!(p.alice.snapshot(CHAT).unwrap().generation, 0);
    for (i, envelope) in envelopes.iter().enumerate() {
        let plaintext = p.bob.decrypt_message_at(CHAT, envelope, T0).unwrap();
        assert_eq!(plaintext, format!("m{}", i).into_bytes());
    }
}

#[test]
fn test_rekey_on_send_after_reply() {
    let config = SessionConfig::default().with_max_messages_per_chain(3);
    let p = peers_with(config);

    for i in 0..3u8 {
        let envelope = p.alice.encrypt_message_at(CHAT, &[i], T0).unwrap();
        assert_eq!(p.bob.decrypt_message_at(CHAT, &envelope, T0).unwrap(), vec![i]);
    }
    let reply = p.bob.encrypt_message_at(CHAT, b"ack", T0).unwrap();
    p.alice.decrypt_message_at(CHAT, &reply, T0).unwrap();

    let envelope = p.alice.encrypt_message_at(CHAT, b"rekeyed", T0 + 1).unwrap();
    assert_eq!(envelope.header.generation, 1);
    assert_eq!(envelope.header.message_number, 0);
    assert_eq!(envelope.header.previous_chain_length, 3);

    assert_eq!(
        p.bob.decrypt_message_at(CHAT, &envelope, T0 + 1).unwrap(),
        b"rekeyed".to_vec()
    );
    assert_eq!(p.bob.snapshot(CHAT).unwrap().generation, 1);
    assert_eq!(p.bob.snapshot(CHAT).unwrap().last_ratchet, T0 + 1);

    // Conversation continues in both directions at the new generation.
    let back = p.bob.encrypt_message_at(CHAT, b"still here", T0 + 2).unwrap();
    assert_eq!(back.header.generation, 1);
    assert_eq!(
        p.alice.decrypt_message_at(CHAT, &back, T0 + 2).unwrap(),
        b"still here".to_vec()
    );
}

#[test]
fn test_chain_cap_requires_rekey() {
    let config = SessionConfig::default()
        .with_max_messages_per_chain(2)
        .with_max_chain_length(3)
        .with_max_skip_per_message(3);
    let p = peers_with(config);

    sending_keys(&p.alice, 3);
    assert_eq!(
        p.alice.get_sending_message_key_at(CHAT, T0).unwrap_err(),
        E2eeError::RekeyRequired(CHAT.into())
    );
}

#[test]
fn test_messages_survive_ratchet_boundary() {
    let config = SessionConfig::default().with_max_messages_per_chain(3);
    let p = peers_with(config);

    let old: Vec<RatchetEnvelope> = (0..3u8)
        .map(|i| p.alice.encrypt_message_at(CHAT, &[i], T0).unwrap())
        .collect();
    p.bob.decrypt_message_at(CHAT, &old[0], T0).unwrap();

    let reply = p.bob.encrypt_message_at(CHAT, b"ack", T0).unwrap();
    p.alice.decrypt_message_at(CHAT, &reply, T0).unwrap();
    let new = p.alice.encrypt_message_at(CHAT, b"new", T0).unwrap();
    assert_eq!(new.header.generation, 1);

    // The new-generation message overtakes the late ones.
    assert_eq!(p.bob.decrypt_message_at(CHAT, &new, T0).unwrap(), b"new".to_vec());
    assert_eq!(p.bob.decrypt_message_at(CHAT, &old[2], T0).unwrap(), vec![2]);
    assert_eq!(p.bob.decrypt_message_at(CHAT, &old[1], T0).unwrap(), vec![1]);
    assert_eq!(p.bob.snapshot(CHAT).unwrap().skipped_key_count, 0);
}

// =============================================================================
// COMPROMISE AND RECOVERY
// =============================================================================

#[test]
fn test_compromised_session_rejects_key_operations() {
    let p = peers();
    p.alice.mark_key_compromised(CHAT).unwrap();

    assert!(p.alice.is_compromised(CHAT).unwrap());
    assert_eq!(
        p.alice.get_sending_message_key(CHAT).unwrap_err(),
        E2eeError::CompromisedState(CHAT.into())
    );
    assert!(matches!(
        p.alice.get_receiving_message_key(CHAT, 0),
        Err(E2eeError::CompromisedState(_))
    ));
    assert!(matches!(
        p.alice.encrypt_message(CHAT, b"x"),
        Err(E2eeError::CompromisedState(_))
    ));
    assert_eq!(
        p.alice.snapshot(CHAT).unwrap().status,
        SessionStatus::Compromised
    );

    // Bookkeeping is still visible.
    assert!(p.alice.export_ratchet_state(CHAT).is_ok());
}

#[test]
fn test_compromise_is_irreversible_without_recovery() {
    let p = peers();
    p.alice.mark_key_compromised(CHAT).unwrap();
    p.alice.mark_key_compromised(CHAT).unwrap();

    assert!(matches!(
        p.alice.perform_dh_ratchet(CHAT, p.bob_identity.public_key().as_bytes()),
        Err(E2eeError::CompromisedState(_))
    ));
    assert!(p.alice.is_compromised(CHAT).unwrap());
}

#[test]
fn test_recovery_restores_conversation() {
    let p = peers();
    let before = p.alice.snapshot(CHAT).unwrap();
    p.alice.mark_key_compromised(CHAT).unwrap();

    let fresh = IdentityKeyPair::generate();
    let recovered = p.alice.recover_from_compromise(CHAT, &fresh).unwrap();
    assert_eq!(recovered.status, SessionStatus::Active);
    assert_eq!(recovered.our_identity_key, fresh.public_key());
    assert_ne!(recovered.state_id, before.state_id);
    assert!(!p.alice.is_compromised(CHAT).unwrap());

    p.bob
        .initialize(CHAT, &p.bob_identity, fresh.public_key().as_bytes())
        .unwrap();
    let envelope = p.alice.encrypt_message(CHAT, b"back online").unwrap();
    assert_eq!(
        p.bob.decrypt_message(CHAT, &envelope).unwrap(),
        b"back online".to_vec()
    );
}

#[test]
fn test_post_recovery_keys_unrelated_to_old_keys() {
    let p = peers();
    let old: HashSet<[u8; 32]> = sending_keys(&p.alice, 20).into_iter().collect();
    let old_fingerprint = p.alice.session_fingerprint(CHAT).unwrap();

    p.alice.mark_key_compromised(CHAT).unwrap();
    p.alice
        .recover_from_compromise(CHAT, &IdentityKeyPair::generate())
        .unwrap();

    let new = sending_keys(&p.alice, 20);
    assert!(new.iter().all(|key| !old.contains(key)));
    assert_ne!(p.alice.session_fingerprint(CHAT).unwrap(), old_fingerprint);
}

#[test]
fn test_remove_session() {
    let p = peers();
    assert!(p.alice.remove_session(CHAT));
    assert!(!p.alice.remove_session(CHAT));
    assert_eq!(p.alice.session_count(), 0);
}
