// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies
//!
//! Reusable proptest strategies for property-based testing.

use proptest::prelude::*;
use pqratchet_core::PqcAlgorithm;

/// Strategy for message bodies, including the empty message.
pub fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for a delivery order of `0..count`.
pub fn delivery_order_strategy(count: u32) -> impl Strategy<Value = Vec<u32>> {
    Just((0..count).collect::<Vec<u32>>()).prop_shuffle()
}

/// Strategy for the fast KEM parameter sets, one HQC tier included.
pub fn fast_kem_strategy() -> impl Strategy<Value = PqcAlgorithm> {
    prop_oneof![
        Just(PqcAlgorithm::MlKem512),
        Just(PqcAlgorithm::MlKem768),
        Just(PqcAlgorithm::MlKem1024),
        Just(PqcAlgorithm::X25519MlKem768),
        Just(PqcAlgorithm::Hqc128),
    ]
}
