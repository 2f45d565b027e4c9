// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for ratchet and envelope properties over generated inputs

mod common;

use std::collections::HashSet;

use common::strategies::*;
use common::*;
use pqratchet_core::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sending_keys_unique(count in 1usize..150) {
        let p = peers();
        let keys = sending_keys(&p.alice, count);
        let unique: HashSet<[u8; 32]> = keys.iter().copied().collect();
        prop_assert_eq!(unique.len(), count);
    }

    #[test]
    fn prop_any_delivery_order_decrypts(order in delivery_order_strategy(16)) {
        let p = peers();
        let envelopes: Vec<RatchetEnvelope> = (0..16u32)
            .map(|i| p.alice.encrypt_message_at(CHAT, &i.to_be_bytes(), T0).unwrap())
            .collect();

        for i in order {
            let plaintext = p.bob.decrypt_message_at(CHAT, &envelopes[i as usize], T0).unwrap();
            prop_assert_eq!(plaintext, i.to_be_bytes().to_vec());
        }
        prop_assert_eq!(p.bob.snapshot(CHAT).unwrap().skipped_key_count, 0);
    }

    #[test]
    fn prop_receiving_key_independent_of_order(order in delivery_order_strategy(12)) {
        let p = peers();
        let sent = sending_keys(&p.alice, 12);

        for n in order {
            let key = p.bob.get_receiving_message_key(CHAT, n).unwrap();
            prop_assert_eq!(key.as_bytes(), &sent[n as usize]);
        }
    }

    #[test]
    fn prop_ratchet_envelope_roundtrip(plaintext in plaintext_strategy()) {
        let p = peers();
        let envelope = p.alice.encrypt_message_at(CHAT, &plaintext, T0).unwrap();
        prop_assert_eq!(p.bob.decrypt_message_at(CHAT, &envelope, T0).unwrap(), plaintext);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_hybrid_roundtrip(alg in fast_kem_strategy(), plaintext in plaintext_strategy()) {
        let pair = generate_keypair(alg).unwrap();
        let envelope = hybrid_encrypt(&plaintext, pair.public_key(), alg).unwrap();
        prop_assert_eq!(hybrid_decrypt(&envelope, pair.secret_key(), alg).unwrap(), plaintext);
    }

    #[test]
    fn prop_hybrid_classical_bit_flip_rejected(
        plaintext in plaintext_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let alg = PqcAlgorithm::MlKem768;
        let pair = generate_keypair(alg).unwrap();
        let mut envelope = hybrid_encrypt(&plaintext, pair.public_key(), alg).unwrap();

        let index = position.index(envelope.classical_ciphertext.len());
        envelope.classical_ciphertext[index] ^= 1 << bit;
        prop_assert_eq!(
            hybrid_decrypt(&envelope, pair.secret_key(), alg).unwrap_err(),
            E2eeError::Decryption
        );
    }

    #[test]
    fn prop_hybrid_pqc_bit_flip_rejected(
        alg in fast_kem_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let pair = generate_keypair(alg).unwrap();
        let mut envelope = hybrid_encrypt(b"payload", pair.public_key(), alg).unwrap();

        let index = position.index(envelope.pqc_ciphertext.len());
        envelope.pqc_ciphertext[index] ^= 1 << bit;
        prop_assert_eq!(
            hybrid_decrypt(&envelope, pair.secret_key(), alg).unwrap_err(),
            E2eeError::Decryption
        );
    }
}
