// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hybrid Post-Quantum Envelope
//!
//! The body is sealed under a random data key with XChaCha20-Poly1305. The
//! data key is wrapped under a key-encryption key derived from a fresh KEM
//! shared secret, so only the holder of the KEM secret key can unwrap it.
//!
//! ```text
//! pqc_ciphertext = kem_ciphertext || wrap(kek, data_key)
//! to_bytes       = tag (1) || nonce (24) || len(pqc_ciphertext) (u32 BE)
//!                  || pqc_ciphertext || classical_ciphertext
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use super::kem::kem_scheme;
use super::PqcAlgorithm;
use crate::crypto::encryption::{
    fill_random, open_xchacha20, seal_xchacha20, TAG_SIZE, XCHACHA20_NONCE_SIZE,
};
use crate::crypto::{Hkdf, SymmetricKey};
use crate::error::{E2eeError, E2eeResult};

const KEK_INFO: &[u8] = b"hybrid-envelope-kek";
const DATA_KEY_LEN: usize = 32;
const WRAPPED_KEY_LEN: usize = DATA_KEY_LEN + TAG_SIZE;

/// The KEK is single-use, so a fixed nonce never repeats under one key.
const WRAP_NONCE: [u8; XCHACHA20_NONCE_SIZE] = [0u8; XCHACHA20_NONCE_SIZE];

const HEADER_LEN: usize = 1 + XCHACHA20_NONCE_SIZE + 4;

/// A message body protected by a post-quantum KEM.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridEnvelope {
    pub pqc_algorithm: PqcAlgorithm,
    pub nonce: [u8; XCHACHA20_NONCE_SIZE],
    /// KEM ciphertext followed by the wrapped data key
    pub pqc_ciphertext: Vec<u8>,
    /// Body ciphertext with authentication tag
    pub classical_ciphertext: Vec<u8>,
}

impl std::fmt::Debug for HybridEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridEnvelope")
            .field("pqc_algorithm", &self.pqc_algorithm)
            .field("pqc_ciphertext_len", &self.pqc_ciphertext.len())
            .field("classical_ciphertext_len", &self.classical_ciphertext.len())
            .finish()
    }
}

impl HybridEnvelope {
    /// Encodes the envelope for transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_LEN + self.pqc_ciphertext.len() + self.classical_ciphertext.len(),
        );
        out.push(self.pqc_algorithm.tag());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(self.pqc_ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.pqc_ciphertext);
        out.extend_from_slice(&self.classical_ciphertext);
        out
    }

    /// Decodes an envelope produced by [`HybridEnvelope::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> E2eeResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(E2eeError::Serialization("envelope too short".into()));
        }
        let pqc_algorithm = PqcAlgorithm::try_from(bytes[0])?;

        let mut nonce = [0u8; XCHACHA20_NONCE_SIZE];
        nonce.copy_from_slice(&bytes[1..1 + XCHACHA20_NONCE_SIZE]);

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[1 + XCHACHA20_NONCE_SIZE..HEADER_LEN]);
        let pqc_len = u32::from_be_bytes(len_bytes) as usize;

        let rest = &bytes[HEADER_LEN..];
        if rest.len() < pqc_len {
            return Err(E2eeError::Serialization(
                "envelope truncated in pqc ciphertext".into(),
            ));
        }
        let (pqc_ciphertext, classical_ciphertext) = rest.split_at(pqc_len);

        Ok(HybridEnvelope {
            pqc_algorithm,
            nonce,
            pqc_ciphertext: pqc_ciphertext.to_vec(),
            classical_ciphertext: classical_ciphertext.to_vec(),
        })
    }
}

fn derive_kek(shared_secret: &[u8], algorithm: PqcAlgorithm) -> E2eeResult<SymmetricKey> {
    let mut info = KEK_INFO.to_vec();
    info.push(algorithm.tag());
    Ok(SymmetricKey::from_bytes(Hkdf::derive_key(
        None,
        shared_secret,
        &info,
    )?))
}

/// Encrypts `plaintext` to the holder of the secret key matching `public_key`.
pub fn hybrid_encrypt(
    plaintext: &[u8],
    public_key: &[u8],
    algorithm: PqcAlgorithm,
) -> E2eeResult<HybridEnvelope> {
    let scheme = kem_scheme(algorithm)?;
    let aad = [algorithm.tag()];

    let data_key = SymmetricKey::generate()?;
    let mut nonce = [0u8; XCHACHA20_NONCE_SIZE];
    fill_random(&mut nonce)?;
    let classical_ciphertext = seal_xchacha20(&data_key, &nonce, plaintext, &aad)?;

    let encapsulation = scheme.encapsulate(public_key)?;
    let kek = derive_kek(&encapsulation.shared_secret, algorithm)?;
    let wrapped = seal_xchacha20(&kek, &WRAP_NONCE, data_key.as_bytes(), &aad)?;

    let mut pqc_ciphertext = encapsulation.ciphertext;
    pqc_ciphertext.extend_from_slice(&wrapped);

    debug!(
        %algorithm,
        pqc_len = pqc_ciphertext.len(),
        body_len = classical_ciphertext.len(),
        "Sealed hybrid envelope"
    );

    Ok(HybridEnvelope {
        pqc_algorithm: algorithm,
        nonce,
        pqc_ciphertext,
        classical_ciphertext,
    })
}

/// Decrypts a hybrid envelope.
///
/// Every failure after algorithm selection is reported as
/// [`E2eeError::Decryption`].
pub fn hybrid_decrypt(
    envelope: &HybridEnvelope,
    secret_key: &[u8],
    algorithm: PqcAlgorithm,
) -> E2eeResult<Vec<u8>> {
    if envelope.pqc_algorithm != algorithm {
        return Err(E2eeError::UnsupportedAlgorithm(format!(
            "envelope uses {}, expected {}",
            envelope.pqc_algorithm, algorithm
        )));
    }
    let scheme = kem_scheme(algorithm)?;
    let aad = [algorithm.tag()];

    let kem_len = scheme.ciphertext_len();
    if envelope.pqc_ciphertext.len() != kem_len + WRAPPED_KEY_LEN {
        return Err(E2eeError::Decryption);
    }
    let (kem_ciphertext, wrapped) = envelope.pqc_ciphertext.split_at(kem_len);

    let shared_secret = scheme
        .decapsulate(kem_ciphertext, secret_key)
        .map_err(|_| E2eeError::Decryption)?;
    let kek = derive_kek(&shared_secret, algorithm).map_err(|_| E2eeError::Decryption)?;

    let data_key_bytes = Zeroizing::new(
        open_xchacha20(&kek, &WRAP_NONCE, wrapped, &aad).map_err(|_| E2eeError::Decryption)?,
    );
    let data_key: [u8; DATA_KEY_LEN] = data_key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| E2eeError::Decryption)?;
    let data_key = SymmetricKey::from_bytes(data_key);

    open_xchacha20(
        &data_key,
        &envelope.nonce,
        &envelope.classical_ciphertext,
        &aad,
    )
    .map_err(|_| E2eeError::Decryption)
}
