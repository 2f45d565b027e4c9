// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Skipped Message Key Cache
//!
//! Keys derived ahead of an out-of-order message wait here until their
//! message arrives. Entries are ordered by `(generation, message_number)` and
//! evicted strictly oldest-first once the bound is reached.

use std::collections::BTreeMap;

use crate::crypto::MessageKey;

/// Position of a skipped key: DH ratchet generation and message number.
pub type SkippedKeyId = (u32, u32);

/// Bounded FIFO cache of skipped message keys.
#[derive(Debug, Clone)]
pub struct SkippedKeyCache {
    keys: BTreeMap<SkippedKeyId, MessageKey>,
    max_keys: usize,
}

impl SkippedKeyCache {
    pub fn new(max_keys: usize) -> Self {
        SkippedKeyCache {
            keys: BTreeMap::new(),
            max_keys,
        }
    }

    /// Stores a key, evicting the oldest entries if the cache is full.
    ///
    /// Returns the number of evicted keys.
    pub fn insert(&mut self, generation: u32, key: MessageKey) -> usize {
        self.keys.insert((generation, key.message_number()), key);

        let mut evicted = 0;
        while self.keys.len() > self.max_keys {
            if self.keys.pop_first().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    /// Removes and returns a key. A key can be taken at most once.
    pub fn take(&mut self, generation: u32, message_number: u32) -> Option<MessageKey> {
        self.keys.remove(&(generation, message_number))
    }

    pub fn contains(&self, generation: u32, message_number: u32) -> bool {
        self.keys.contains_key(&(generation, message_number))
    }

    /// Oldest cached position, the next one to be evicted.
    pub fn oldest(&self) -> Option<SkippedKeyId> {
        self.keys.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Drops every cached key.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&SkippedKeyId, &MessageKey)> {
        self.keys.iter()
    }
}
