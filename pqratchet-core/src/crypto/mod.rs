// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod chain;
pub mod encryption;
pub mod kdf;
pub mod keys;

pub use chain::{ChainError, ChainKey, MessageKey, DEFAULT_MAX_CHAIN_LENGTH};
pub use encryption::{
    decrypt, decrypt_with_aad, encrypt, encrypt_with_aad, EncryptionError, SymmetricKey,
};
pub use kdf::{Hkdf, KdfError};
pub use keys::{IdentityKeyPair, IdentityPublicKey, KeyError, KeyHandle, RatchetKeyPair};
