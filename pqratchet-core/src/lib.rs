// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! PQRatchet Core Library
//!
//! Per-conversation Double Ratchet key management with compromise recovery,
//! plus a hybrid post-quantum envelope and signatures.
//! Classical primitives use the audited `ring` crate and x25519-dalek.

pub mod config;
pub mod crypto;
pub mod error;
pub mod pqc;
pub mod session;

pub use config::{PqcPolicy, SessionConfig};
pub use crypto::{IdentityKeyPair, IdentityPublicKey, KeyHandle, MessageKey, SymmetricKey};
pub use error::{E2eeError, E2eeResult};
pub use pqc::{
    generate_keypair, hybrid_decrypt, hybrid_encrypt, sign, verify, HybridEnvelope, PqcAlgorithm,
    PqcKeyPair, SecurityTier,
};
pub use session::{
    ExpirySweeper, ExportedRatchetState, RatchetEnvelope, RatchetHeader, SessionManager,
    SessionSnapshot, SessionStatus, EXPORT_VERSION,
};
