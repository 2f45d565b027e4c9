// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Encapsulation Schemes
//!
//! One `KemScheme` implementation per parameter set. ML-KEM and HQC come
//! straight from the PQClean bindings; the X25519+ML-KEM hybrid combines an
//! ephemeral X25519 agreement with ML-KEM through HKDF so the shared secret
//! stays safe while either half holds.

use pqcrypto_hqc::{hqc128, hqc192, hqc256};
use pqcrypto_mlkem::{mlkem1024, mlkem512, mlkem768};
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use super::{PqcAlgorithm, PqcKeyPair};
use crate::crypto::keys::{agree, X25519_KEY_LEN};
use crate::crypto::Hkdf;
use crate::error::{E2eeError, E2eeResult};

/// Output of an encapsulation: the shared secret and the ciphertext to send.
pub struct Encapsulation {
    pub shared_secret: Zeroizing<Vec<u8>>,
    pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for Encapsulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encapsulation")
            .field("shared_secret", &"[REDACTED]")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Capability interface for a KEM parameter set.
pub trait KemScheme: Send + Sync {
    fn algorithm(&self) -> PqcAlgorithm;
    fn public_key_len(&self) -> usize;
    fn secret_key_len(&self) -> usize;
    fn ciphertext_len(&self) -> usize;
    fn shared_secret_len(&self) -> usize;

    /// Generates a fresh key pair.
    fn keypair(&self) -> PqcKeyPair;

    /// Encapsulates a new shared secret to `public_key`.
    fn encapsulate(&self, public_key: &[u8]) -> E2eeResult<Encapsulation>;

    /// Recovers the shared secret from `ciphertext`.
    fn decapsulate(&self, ciphertext: &[u8], secret_key: &[u8]) -> E2eeResult<Zeroizing<Vec<u8>>>;
}

fn invalid_key(alg: PqcAlgorithm, what: &str) -> E2eeError {
    E2eeError::InvalidKey(format!("malformed {} {}", alg, what))
}

/// Decapsulates through the raw PQClean entry point.
///
/// The safe HQC bindings assert on the return code, which panics when the
/// re-encryption check rejects a ciphertext. A nonzero return is reported
/// as `None` instead.
macro_rules! checked_decapsulate {
    ($name:ident, $module:ident, $ffi:ident) => {
        fn $name(
            ct: &$module::Ciphertext,
            sk: &$module::SecretKey,
        ) -> Option<Zeroizing<Vec<u8>>> {
            let mut ss = Zeroizing::new(vec![0u8; $module::shared_secret_bytes()]);
            // SAFETY: `ct` and `sk` are length-checked typed buffers and `ss`
            // holds exactly `shared_secret_bytes()` bytes.
            let ret = unsafe {
                pqcrypto_hqc::ffi::$ffi(
                    ss.as_mut_ptr(),
                    ct.as_bytes().as_ptr(),
                    sk.as_bytes().as_ptr(),
                )
            };
            (ret == 0).then_some(ss)
        }
    };
}

checked_decapsulate!(hqc128_decapsulate, hqc128, PQCLEAN_HQC128_CLEAN_crypto_kem_dec);
checked_decapsulate!(hqc192_decapsulate, hqc192, PQCLEAN_HQC192_CLEAN_crypto_kem_dec);
checked_decapsulate!(hqc256_decapsulate, hqc256, PQCLEAN_HQC256_CLEAN_crypto_kem_dec);

macro_rules! pqclean_kem {
    ($scheme:ident, $module:ident, $alg:expr) => {
        pqclean_kem!($scheme, $module, $alg, |ct, sk| {
            Some(Zeroizing::new($module::decapsulate(ct, sk).as_bytes().to_vec()))
        });
    };
    ($scheme:ident, $module:ident, $alg:expr, $decap:expr) => {
        struct $scheme;

        impl KemScheme for $scheme {
            fn algorithm(&self) -> PqcAlgorithm {
                $alg
            }

            fn public_key_len(&self) -> usize {
                $module::public_key_bytes()
            }

            fn secret_key_len(&self) -> usize {
                $module::secret_key_bytes()
            }

            fn ciphertext_len(&self) -> usize {
                $module::ciphertext_bytes()
            }

            fn shared_secret_len(&self) -> usize {
                $module::shared_secret_bytes()
            }

            fn keypair(&self) -> PqcKeyPair {
                let (pk, sk) = $module::keypair();
                PqcKeyPair::new(
                    $alg,
                    pk.as_bytes().to_vec(),
                    Zeroizing::new(sk.as_bytes().to_vec()),
                )
            }

            fn encapsulate(&self, public_key: &[u8]) -> E2eeResult<Encapsulation> {
                let pk = $module::PublicKey::from_bytes(public_key)
                    .map_err(|_| invalid_key($alg, "public key"))?;
                let (ss, ct) = $module::encapsulate(&pk);
                Ok(Encapsulation {
                    shared_secret: Zeroizing::new(ss.as_bytes().to_vec()),
                    ciphertext: ct.as_bytes().to_vec(),
                })
            }

            fn decapsulate(
                &self,
                ciphertext: &[u8],
                secret_key: &[u8],
            ) -> E2eeResult<Zeroizing<Vec<u8>>> {
                let sk = $module::SecretKey::from_bytes(secret_key)
                    .map_err(|_| invalid_key($alg, "secret key"))?;
                let ct = $module::Ciphertext::from_bytes(ciphertext)
                    .map_err(|_| invalid_key($alg, "ciphertext"))?;
                let decap: fn(
                    &$module::Ciphertext,
                    &$module::SecretKey,
                ) -> Option<Zeroizing<Vec<u8>>> = $decap;
                decap(&ct, &sk).ok_or(E2eeError::Decryption)
            }
        }
    };
}

pqclean_kem!(MlKem512Scheme, mlkem512, PqcAlgorithm::MlKem512);
pqclean_kem!(MlKem768Scheme, mlkem768, PqcAlgorithm::MlKem768);
pqclean_kem!(MlKem1024Scheme, mlkem1024, PqcAlgorithm::MlKem1024);
pqclean_kem!(Hqc128Scheme, hqc128, PqcAlgorithm::Hqc128, hqc128_decapsulate);
pqclean_kem!(Hqc192Scheme, hqc192, PqcAlgorithm::Hqc192, hqc192_decapsulate);
pqclean_kem!(Hqc256Scheme, hqc256, PqcAlgorithm::Hqc256, hqc256_decapsulate);

/// X25519 combined with an ML-KEM tier.
///
/// Layouts: public `x25519_pk || mlkem_pk`, secret `x25519_sk || mlkem_sk`,
/// ciphertext `ephemeral_pk || mlkem_ct`.
struct X25519MlKemScheme {
    algorithm: PqcAlgorithm,
    inner: &'static dyn KemScheme,
}

const HYBRID_INFO: &[u8] = b"x25519-mlkem-shared";
const HYBRID_SECRET_LEN: usize = 32;

impl X25519MlKemScheme {
    fn split<'a>(
        &self,
        bytes: &'a [u8],
        inner_len: usize,
        what: &str,
    ) -> E2eeResult<([u8; 32], &'a [u8])> {
        if bytes.len() != X25519_KEY_LEN + inner_len {
            return Err(invalid_key(self.algorithm, what));
        }
        let (classical, pq) = bytes.split_at(X25519_KEY_LEN);
        let mut array = [0u8; X25519_KEY_LEN];
        array.copy_from_slice(classical);
        Ok((array, pq))
    }

    /// Binds both secrets and the exchanged ciphertext into one key.
    fn combine(
        &self,
        classical: &[u8; 32],
        pq: &[u8],
        ciphertext: &[u8],
    ) -> E2eeResult<Zeroizing<Vec<u8>>> {
        let mut ikm = Zeroizing::new(Vec::with_capacity(classical.len() + pq.len()));
        ikm.extend_from_slice(classical);
        ikm.extend_from_slice(pq);

        let mut info = HYBRID_INFO.to_vec();
        info.push(self.algorithm.tag());
        info.extend_from_slice(ciphertext);

        let key = Hkdf::derive(None, &ikm, &info, HYBRID_SECRET_LEN)?;
        Ok(Zeroizing::new(key))
    }
}

impl KemScheme for X25519MlKemScheme {
    fn algorithm(&self) -> PqcAlgorithm {
        self.algorithm
    }

    fn public_key_len(&self) -> usize {
        X25519_KEY_LEN + self.inner.public_key_len()
    }

    fn secret_key_len(&self) -> usize {
        X25519_KEY_LEN + self.inner.secret_key_len()
    }

    fn ciphertext_len(&self) -> usize {
        X25519_KEY_LEN + self.inner.ciphertext_len()
    }

    fn shared_secret_len(&self) -> usize {
        HYBRID_SECRET_LEN
    }

    fn keypair(&self) -> PqcKeyPair {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        let inner = self.inner.keypair();

        let mut pk = public.as_bytes().to_vec();
        pk.extend_from_slice(inner.public_key());

        let mut secret_bytes = secret.to_bytes();
        let mut sk = Zeroizing::new(secret_bytes.to_vec());
        secret_bytes.zeroize();
        sk.extend_from_slice(inner.secret_key());

        PqcKeyPair::new(self.algorithm, pk, sk)
    }

    fn encapsulate(&self, public_key: &[u8]) -> E2eeResult<Encapsulation> {
        let (their_x25519, their_pq) =
            self.split(public_key, self.inner.public_key_len(), "public key")?;

        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral);
        let mut classical = agree(&ephemeral, &their_x25519)
            .map_err(|_| invalid_key(self.algorithm, "public key"))?;

        let inner = self.inner.encapsulate(their_pq)?;

        let mut ciphertext = ephemeral_public.as_bytes().to_vec();
        ciphertext.extend_from_slice(&inner.ciphertext);

        let shared_secret = self.combine(&classical, &inner.shared_secret, &ciphertext);
        classical.zeroize();

        Ok(Encapsulation {
            shared_secret: shared_secret?,
            ciphertext,
        })
    }

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        secret_key: &[u8],
    ) -> E2eeResult<Zeroizing<Vec<u8>>> {
        let (mut our_x25519, our_pq) =
            self.split(secret_key, self.inner.secret_key_len(), "secret key")?;
        let (ephemeral_public, inner_ct) =
            self.split(ciphertext, self.inner.ciphertext_len(), "ciphertext")?;

        let secret = StaticSecret::from(our_x25519);
        our_x25519.zeroize();
        let mut classical = agree(&secret, &ephemeral_public)
            .map_err(|_| invalid_key(self.algorithm, "ciphertext"))?;

        let inner = self.inner.decapsulate(inner_ct, our_pq);
        let shared_secret = match inner {
            Ok(pq) => self.combine(&classical, &pq, ciphertext),
            Err(err) => Err(err),
        };
        classical.zeroize();
        shared_secret
    }
}

static MLKEM512: MlKem512Scheme = MlKem512Scheme;
static MLKEM768: MlKem768Scheme = MlKem768Scheme;
static MLKEM1024: MlKem1024Scheme = MlKem1024Scheme;
static HQC128: Hqc128Scheme = Hqc128Scheme;
static HQC192: Hqc192Scheme = Hqc192Scheme;
static HQC256: Hqc256Scheme = Hqc256Scheme;
static X25519_MLKEM512: X25519MlKemScheme = X25519MlKemScheme {
    algorithm: PqcAlgorithm::X25519MlKem512,
    inner: &MLKEM512,
};
static X25519_MLKEM768: X25519MlKemScheme = X25519MlKemScheme {
    algorithm: PqcAlgorithm::X25519MlKem768,
    inner: &MLKEM768,
};
static X25519_MLKEM1024: X25519MlKemScheme = X25519MlKemScheme {
    algorithm: PqcAlgorithm::X25519MlKem1024,
    inner: &MLKEM1024,
};

/// Returns the KEM implementation for `algorithm`.
///
/// Signature algorithms are rejected with `UnsupportedAlgorithm`.
pub fn kem_scheme(algorithm: PqcAlgorithm) -> E2eeResult<&'static dyn KemScheme> {
    let scheme: &'static dyn KemScheme = match algorithm {
        PqcAlgorithm::MlKem512 => &MLKEM512,
        PqcAlgorithm::MlKem768 => &MLKEM768,
        PqcAlgorithm::MlKem1024 => &MLKEM1024,
        PqcAlgorithm::Hqc128 => &HQC128,
        PqcAlgorithm::Hqc192 => &HQC192,
        PqcAlgorithm::Hqc256 => &HQC256,
        PqcAlgorithm::X25519MlKem512 => &X25519_MLKEM512,
        PqcAlgorithm::X25519MlKem768 => &X25519_MLKEM768,
        PqcAlgorithm::X25519MlKem1024 => &X25519_MLKEM1024,
        other => {
            return Err(E2eeError::UnsupportedAlgorithm(format!(
                "{} is not a KEM",
                other
            )))
        }
    };
    Ok(scheme)
}
