// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration for session management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eeError, E2eeResult};
use crate::pqc::PqcAlgorithm;

/// Algorithm selection for the post-quantum envelope, chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PqcPolicy {
    /// KEM used by `hybrid_encrypt`.
    pub kem: PqcAlgorithm,
    /// Scheme used by `sign` / `verify`.
    pub signature: PqcAlgorithm,
}

impl Default for PqcPolicy {
    fn default() -> Self {
        Self {
            kem: PqcAlgorithm::MlKem768,
            signature: PqcAlgorithm::MlDsa65,
        }
    }
}

/// Limits and timers for ratchet sessions.
///
/// Durations are (de)serialized as whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on cached skipped message keys per session
    pub max_skipped_keys: usize,

    /// Most keys a single receive may derive ahead of the chain
    pub max_skip_per_message: u32,

    /// Sent messages after which the next send asks for a DH ratchet
    pub max_messages_per_chain: u32,

    /// Hard cap on chain length; sends past it fail until a DH ratchet
    pub max_chain_length: u32,

    /// Age after which the next send asks for a DH ratchet
    #[serde(with = "duration_secs")]
    pub rekey_interval: Duration,

    /// Inactivity after which a session is swept
    #[serde(with = "duration_secs")]
    pub session_expiry: Duration,

    /// How often the background sweeper runs
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,

    pub pqc_policy: PqcPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skipped_keys: 1000,
            max_skip_per_message: 2000,
            max_messages_per_chain: 1000,
            max_chain_length: 2000,
            rekey_interval: Duration::from_secs(24 * 60 * 60), // 24 hours
            session_expiry: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
            sweep_interval: Duration::from_secs(5 * 60),
            pqc_policy: PqcPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Set the skipped-key cache bound
    pub fn with_max_skipped_keys(mut self, max: usize) -> Self {
        self.max_skipped_keys = max;
        self
    }

    /// Set the per-receive skip limit
    pub fn with_max_skip_per_message(mut self, max: u32) -> Self {
        self.max_skip_per_message = max;
        self
    }

    /// Set the soft per-chain message threshold
    pub fn with_max_messages_per_chain(mut self, max: u32) -> Self {
        self.max_messages_per_chain = max;
        self
    }

    /// Set the hard chain length cap
    pub fn with_max_chain_length(mut self, max: u32) -> Self {
        self.max_chain_length = max;
        self
    }

    pub fn with_rekey_interval(mut self, interval: Duration) -> Self {
        self.rekey_interval = interval;
        self
    }

    pub fn with_session_expiry(mut self, expiry: Duration) -> Self {
        self.session_expiry = expiry;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Select the KEM and signature algorithms
    pub fn with_pqc_policy(mut self, policy: PqcPolicy) -> Self {
        self.pqc_policy = policy;
        self
    }

    /// Checks limits are usable and the policy names the right algorithm kinds.
    pub fn validate(&self) -> E2eeResult<()> {
        if self.max_skipped_keys == 0 {
            return Err(E2eeError::Configuration(
                "max_skipped_keys must be at least 1".into(),
            ));
        }
        if self.max_messages_per_chain == 0 {
            return Err(E2eeError::Configuration(
                "max_messages_per_chain must be at least 1".into(),
            ));
        }
        if self.max_chain_length < self.max_messages_per_chain {
            return Err(E2eeError::Configuration(format!(
                "max_chain_length ({}) is below max_messages_per_chain ({})",
                self.max_chain_length, self.max_messages_per_chain
            )));
        }
        if self.max_skip_per_message > self.max_chain_length {
            return Err(E2eeError::Configuration(format!(
                "max_skip_per_message ({}) exceeds max_chain_length ({})",
                self.max_skip_per_message, self.max_chain_length
            )));
        }
        if self.session_expiry.is_zero() || self.sweep_interval.is_zero() {
            return Err(E2eeError::Configuration(
                "session_expiry and sweep_interval must be non-zero".into(),
            ));
        }
        if !self.pqc_policy.kem.is_kem() {
            return Err(E2eeError::Configuration(format!(
                "{} is not a KEM",
                self.pqc_policy.kem
            )));
        }
        if !self.pqc_policy.signature.is_signature() {
            return Err(E2eeError::Configuration(format!(
                "{} is not a signature scheme",
                self.pqc_policy.signature
            )));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
