// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Post-quantum algorithm identifiers and their one-byte wire tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::E2eeError;

/// NIST security category of a parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecurityTier {
    Level1,
    Level3,
    Level5,
}

/// Algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    MlKem,
    Hqc,
    X25519MlKem,
    MlDsa,
    Falcon,
    SphincsPlus,
}

impl AlgorithmFamily {
    /// Whether this family performs key encapsulation.
    pub fn is_kem(self) -> bool {
        matches!(
            self,
            AlgorithmFamily::MlKem | AlgorithmFamily::Hqc | AlgorithmFamily::X25519MlKem
        )
    }
}

/// Every KEM and signature parameter set the envelope understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum PqcAlgorithm {
    MlKem512 = 0x01,
    MlKem768 = 0x02,
    MlKem1024 = 0x03,
    MlDsa44 = 0x04,
    MlDsa65 = 0x05,
    MlDsa87 = 0x06,
    Falcon512 = 0x07,
    Falcon1024 = 0x08,
    SphincsSha2_128f = 0x09,
    SphincsSha2_192f = 0x0A,
    SphincsSha2_256f = 0x0B,
    Hqc128 = 0x0C,
    Hqc192 = 0x0D,
    Hqc256 = 0x0E,
    X25519MlKem512 = 0x0F,
    X25519MlKem768 = 0x10,
    X25519MlKem1024 = 0x11,
}

impl PqcAlgorithm {
    pub const ALL: [PqcAlgorithm; 17] = [
        PqcAlgorithm::MlKem512,
        PqcAlgorithm::MlKem768,
        PqcAlgorithm::MlKem1024,
        PqcAlgorithm::MlDsa44,
        PqcAlgorithm::MlDsa65,
        PqcAlgorithm::MlDsa87,
        PqcAlgorithm::Falcon512,
        PqcAlgorithm::Falcon1024,
        PqcAlgorithm::SphincsSha2_128f,
        PqcAlgorithm::SphincsSha2_192f,
        PqcAlgorithm::SphincsSha2_256f,
        PqcAlgorithm::Hqc128,
        PqcAlgorithm::Hqc192,
        PqcAlgorithm::Hqc256,
        PqcAlgorithm::X25519MlKem512,
        PqcAlgorithm::X25519MlKem768,
        PqcAlgorithm::X25519MlKem1024,
    ];

    /// The one-byte wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn family(self) -> AlgorithmFamily {
        use PqcAlgorithm::*;
        match self {
            MlKem512 | MlKem768 | MlKem1024 => AlgorithmFamily::MlKem,
            Hqc128 | Hqc192 | Hqc256 => AlgorithmFamily::Hqc,
            X25519MlKem512 | X25519MlKem768 | X25519MlKem1024 => AlgorithmFamily::X25519MlKem,
            MlDsa44 | MlDsa65 | MlDsa87 => AlgorithmFamily::MlDsa,
            Falcon512 | Falcon1024 => AlgorithmFamily::Falcon,
            SphincsSha2_128f | SphincsSha2_192f | SphincsSha2_256f => AlgorithmFamily::SphincsPlus,
        }
    }

    pub fn tier(self) -> SecurityTier {
        use PqcAlgorithm::*;
        match self {
            MlKem512 | MlDsa44 | Falcon512 | SphincsSha2_128f | Hqc128 | X25519MlKem512 => {
                SecurityTier::Level1
            }
            MlKem768 | MlDsa65 | SphincsSha2_192f | Hqc192 | X25519MlKem768 => {
                SecurityTier::Level3
            }
            MlKem1024 | MlDsa87 | Falcon1024 | SphincsSha2_256f | Hqc256 | X25519MlKem1024 => {
                SecurityTier::Level5
            }
        }
    }

    /// Looks up the parameter set for a family at a tier.
    ///
    /// Falcon has no Level 3 parameter set.
    pub fn from_parts(family: AlgorithmFamily, tier: SecurityTier) -> Result<Self, E2eeError> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.family() == family && alg.tier() == tier)
            .ok_or_else(|| {
                E2eeError::UnsupportedAlgorithm(format!("{:?} at {:?}", family, tier))
            })
    }

    pub fn is_kem(self) -> bool {
        self.family().is_kem()
    }

    pub fn is_signature(self) -> bool {
        !self.is_kem()
    }

    pub fn name(self) -> &'static str {
        use PqcAlgorithm::*;
        match self {
            MlKem512 => "ML-KEM-512",
            MlKem768 => "ML-KEM-768",
            MlKem1024 => "ML-KEM-1024",
            MlDsa44 => "ML-DSA-44",
            MlDsa65 => "ML-DSA-65",
            MlDsa87 => "ML-DSA-87",
            Falcon512 => "Falcon-512",
            Falcon1024 => "Falcon-1024",
            SphincsSha2_128f => "SPHINCS+-SHA2-128f-simple",
            SphincsSha2_192f => "SPHINCS+-SHA2-192f-simple",
            SphincsSha2_256f => "SPHINCS+-SHA2-256f-simple",
            Hqc128 => "HQC-128",
            Hqc192 => "HQC-192",
            Hqc256 => "HQC-256",
            X25519MlKem512 => "X25519+ML-KEM-512",
            X25519MlKem768 => "X25519+ML-KEM-768",
            X25519MlKem1024 => "X25519+ML-KEM-1024",
        }
    }
}

impl fmt::Display for PqcAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PqcAlgorithm {
    type Err = E2eeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| E2eeError::UnsupportedAlgorithm(s.to_string()))
    }
}

impl TryFrom<u8> for PqcAlgorithm {
    type Error = E2eeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.tag() == tag)
            .ok_or_else(|| E2eeError::UnsupportedAlgorithm(format!("tag 0x{:02x}", tag)))
    }
}

impl From<PqcAlgorithm> for u8 {
    fn from(alg: PqcAlgorithm) -> Self {
        alg.tag()
    }
}

impl TryFrom<String> for PqcAlgorithm {
    type Error = E2eeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PqcAlgorithm> for String {
    fn from(alg: PqcAlgorithm) -> Self {
        alg.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(PqcAlgorithm::MlKem512.tag(), 0x01);
        assert_eq!(PqcAlgorithm::Falcon1024.tag(), 0x08);
        assert_eq!(PqcAlgorithm::SphincsSha2_256f.tag(), 0x0B);
        assert_eq!(PqcAlgorithm::X25519MlKem1024.tag(), 0x11);
    }

    #[test]
    fn test_every_tag_resolves_to_itself() {
        for alg in PqcAlgorithm::ALL {
            assert_eq!(PqcAlgorithm::try_from(alg.tag()).unwrap(), alg);
            assert_eq!(alg.name().parse::<PqcAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        assert!(matches!(
            PqcAlgorithm::try_from(0x00),
            Err(E2eeError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            PqcAlgorithm::try_from(0x12),
            Err(E2eeError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_falcon_has_no_level3() {
        assert!(PqcAlgorithm::from_parts(AlgorithmFamily::Falcon, SecurityTier::Level3).is_err());
        assert_eq!(
            PqcAlgorithm::from_parts(AlgorithmFamily::Hqc, SecurityTier::Level3).unwrap(),
            PqcAlgorithm::Hqc192
        );
    }

    #[test]
    fn test_kem_and_signature_partition() {
        let kems = PqcAlgorithm::ALL.iter().filter(|a| a.is_kem()).count();
        assert_eq!(kems, 9);
        assert!(PqcAlgorithm::Falcon512.is_signature());
    }
}
