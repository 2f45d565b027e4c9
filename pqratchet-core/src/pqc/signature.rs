// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Post-quantum detached signatures (ML-DSA, Falcon, SPHINCS+).

use pqcrypto_falcon::{falcon1024, falcon512};
use pqcrypto_mldsa::{mldsa44, mldsa65, mldsa87};
use pqcrypto_sphincsplus::{sphincssha2128fsimple, sphincssha2192fsimple, sphincssha2256fsimple};
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};
use tracing::debug;
use zeroize::Zeroizing;

use super::{PqcAlgorithm, PqcKeyPair};
use crate::error::{E2eeError, E2eeResult};

/// Capability interface for a signature parameter set.
pub trait SignatureScheme: Send + Sync {
    fn algorithm(&self) -> PqcAlgorithm;
    fn public_key_len(&self) -> usize;
    fn secret_key_len(&self) -> usize;

    /// Upper bound on signature size (Falcon signatures vary in length).
    fn max_signature_len(&self) -> usize;

    fn keypair(&self) -> PqcKeyPair;

    /// Produces a detached signature over `payload`.
    fn sign(&self, payload: &[u8], secret_key: &[u8]) -> E2eeResult<Vec<u8>>;

    /// Checks a detached signature.
    ///
    /// A malformed or wrong signature is `Ok(false)`; a malformed public key
    /// is an error.
    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> E2eeResult<bool>;
}

macro_rules! pqclean_signature {
    ($scheme:ident, $module:ident, $alg:expr) => {
        struct $scheme;

        impl SignatureScheme for $scheme {
            fn algorithm(&self) -> PqcAlgorithm {
                $alg
            }

            fn public_key_len(&self) -> usize {
                $module::public_key_bytes()
            }

            fn secret_key_len(&self) -> usize {
                $module::secret_key_bytes()
            }

            fn max_signature_len(&self) -> usize {
                $module::signature_bytes()
            }

            fn keypair(&self) -> PqcKeyPair {
                let (pk, sk) = $module::keypair();
                PqcKeyPair::new(
                    $alg,
                    pk.as_bytes().to_vec(),
                    Zeroizing::new(sk.as_bytes().to_vec()),
                )
            }

            fn sign(&self, payload: &[u8], secret_key: &[u8]) -> E2eeResult<Vec<u8>> {
                let sk = $module::SecretKey::from_bytes(secret_key).map_err(|_| {
                    E2eeError::InvalidKey(format!("malformed {} secret key", $alg))
                })?;
                let signature = $module::detached_sign(payload, &sk);
                Ok(signature.as_bytes().to_vec())
            }

            fn verify(
                &self,
                payload: &[u8],
                signature: &[u8],
                public_key: &[u8],
            ) -> E2eeResult<bool> {
                let pk = $module::PublicKey::from_bytes(public_key).map_err(|_| {
                    E2eeError::InvalidKey(format!("malformed {} public key", $alg))
                })?;
                let Ok(signature) = $module::DetachedSignature::from_bytes(signature) else {
                    let algorithm = $alg;
                    debug!(%algorithm, "Signature has invalid length");
                    return Ok(false);
                };
                Ok($module::verify_detached_signature(&signature, payload, &pk).is_ok())
            }
        }
    };
}

pqclean_signature!(MlDsa44Scheme, mldsa44, PqcAlgorithm::MlDsa44);
pqclean_signature!(MlDsa65Scheme, mldsa65, PqcAlgorithm::MlDsa65);
pqclean_signature!(MlDsa87Scheme, mldsa87, PqcAlgorithm::MlDsa87);
pqclean_signature!(Falcon512Scheme, falcon512, PqcAlgorithm::Falcon512);
pqclean_signature!(Falcon1024Scheme, falcon1024, PqcAlgorithm::Falcon1024);
pqclean_signature!(Sphincs128Scheme, sphincssha2128fsimple, PqcAlgorithm::SphincsSha2_128f);
pqclean_signature!(Sphincs192Scheme, sphincssha2192fsimple, PqcAlgorithm::SphincsSha2_192f);
pqclean_signature!(Sphincs256Scheme, sphincssha2256fsimple, PqcAlgorithm::SphincsSha2_256f);

/// Returns the signature implementation for `algorithm`.
pub fn signature_scheme(algorithm: PqcAlgorithm) -> E2eeResult<&'static dyn SignatureScheme> {
    let scheme: &'static dyn SignatureScheme = match algorithm {
        PqcAlgorithm::MlDsa44 => &MlDsa44Scheme,
        PqcAlgorithm::MlDsa65 => &MlDsa65Scheme,
        PqcAlgorithm::MlDsa87 => &MlDsa87Scheme,
        PqcAlgorithm::Falcon512 => &Falcon512Scheme,
        PqcAlgorithm::Falcon1024 => &Falcon1024Scheme,
        PqcAlgorithm::SphincsSha2_128f => &Sphincs128Scheme,
        PqcAlgorithm::SphincsSha2_192f => &Sphincs192Scheme,
        PqcAlgorithm::SphincsSha2_256f => &Sphincs256Scheme,
        other => {
            return Err(E2eeError::UnsupportedAlgorithm(format!(
                "{} is not a signature scheme",
                other
            )))
        }
    };
    Ok(scheme)
}

/// Signs `payload` with a post-quantum secret key.
pub fn sign(payload: &[u8], secret_key: &[u8], algorithm: PqcAlgorithm) -> E2eeResult<Vec<u8>> {
    signature_scheme(algorithm)?.sign(payload, secret_key)
}

/// Verifies a detached post-quantum signature over `payload`.
pub fn verify(
    payload: &[u8],
    signature: &[u8],
    public_key: &[u8],
    algorithm: PqcAlgorithm,
) -> E2eeResult<bool> {
    signature_scheme(algorithm)?.verify(payload, signature, public_key)
}
