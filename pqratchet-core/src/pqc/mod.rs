// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Post-Quantum Capability Layer
//!
//! KEM and signature parameter sets behind two traits, plus the hybrid
//! envelope built on top of them. Callers pick algorithms through
//! [`PqcAlgorithm`], usually from `SessionConfig::pqc_policy`.

pub mod algorithm;
pub mod envelope;
pub mod kem;
pub mod signature;

pub use algorithm::{AlgorithmFamily, PqcAlgorithm, SecurityTier};
pub use envelope::{hybrid_decrypt, hybrid_encrypt, HybridEnvelope};
pub use kem::{kem_scheme, Encapsulation, KemScheme};
pub use signature::{sign, signature_scheme, verify, SignatureScheme};

use zeroize::Zeroizing;

use crate::error::E2eeResult;

/// A post-quantum key pair in its encoded form.
pub struct PqcKeyPair {
    algorithm: PqcAlgorithm,
    public_key: Vec<u8>,
    secret_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for PqcKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PqcKeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key_len", &self.public_key.len())
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl PqcKeyPair {
    pub(crate) fn new(
        algorithm: PqcAlgorithm,
        public_key: Vec<u8>,
        secret_key: Zeroizing<Vec<u8>>,
    ) -> Self {
        PqcKeyPair {
            algorithm,
            public_key,
            secret_key,
        }
    }

    pub fn algorithm(&self) -> PqcAlgorithm {
        self.algorithm
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }
}

/// Generates a key pair for any KEM or signature algorithm.
pub fn generate_keypair(algorithm: PqcAlgorithm) -> E2eeResult<PqcKeyPair> {
    if algorithm.is_kem() {
        Ok(kem_scheme(algorithm)?.keypair())
    } else {
        Ok(signature_scheme(algorithm)?.keypair())
    }
}
