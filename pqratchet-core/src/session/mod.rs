// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Module
//!
//! Double Ratchet sessions keyed by chat id, plus message envelopes, state
//! export and the background expiry sweeper.

mod export;
mod manager;
mod message;
mod skipped;
mod state;
mod sweeper;

pub use export::{ExportedRatchetState, EXPORT_VERSION};
pub use manager::SessionManager;
pub use message::{RatchetEnvelope, RatchetHeader};
pub use skipped::{SkippedKeyCache, SkippedKeyId};
pub use state::{SessionSnapshot, SessionStatus};
pub use sweeper::ExpirySweeper;
