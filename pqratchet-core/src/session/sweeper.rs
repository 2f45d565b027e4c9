// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Expiry Sweeper
//!
//! Background thread that periodically removes expired sessions. Stopping is
//! signalled over a channel, so `stop` returns as soon as the current sweep
//! (if any) finishes rather than after a full interval.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::manager::SessionManager;
use crate::error::{E2eeError, E2eeResult};

/// Handle to a running sweeper thread. Dropping it stops the thread.
pub struct ExpirySweeper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl std::fmt::Debug for ExpirySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ExpirySweeper {
    /// Starts sweeping at the manager's configured interval.
    pub fn start(manager: Arc<SessionManager>) -> E2eeResult<Self> {
        let interval = manager.config().sweep_interval;
        Self::spawn(manager, interval)
    }

    /// Starts sweeping every `interval`.
    pub fn spawn(manager: Arc<SessionManager>, interval: Duration) -> E2eeResult<Self> {
        if interval.is_zero() {
            return Err(E2eeError::Configuration(
                "sweep interval must be non-zero".into(),
            ));
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("pqratchet-expiry-sweeper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let removed = manager.cleanup_expired_ratchet_states();
                        debug!(removed, "Expiry sweep finished");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| E2eeError::Configuration(format!("cannot spawn sweeper: {}", e)))?;

        info!(interval_secs = interval.as_secs(), "Expiry sweeper started");
        Ok(ExpirySweeper {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the thread and waits for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Expiry sweeper thread panicked");
            } else {
                info!("Expiry sweeper stopped");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
