//! Full-system reset adapter.
//!
//! Implements [`ResetPort`]: records the cause in the NVS reset log, then
//! restarts the chip.  On the host the process exits instead, which is the
//! closest equivalent a simulation has.

use log::error;

use crate::app::ports::{ResetPort, ResetReason, StoragePort};
use crate::diagnostics::{ResetEntry, ResetLog, uptime_ms};

pub struct SystemResetter<S: StoragePort> {
    storage: S,
    log: ResetLog,
    /// Who triggered the reset, recorded as the entry's detail.
    origin: &'static str,
}

impl<S: StoragePort> SystemResetter<S> {
    pub fn new(storage: S, origin: &'static str) -> Self {
        let mut log = ResetLog::new();
        log.init(&storage);
        Self {
            storage,
            log,
            origin,
        }
    }

    fn record(&mut self, reason: ResetReason) {
        let entry = ResetEntry::new(uptime_ms(), reason, self.origin);
        self.log.write_entry(&mut self.storage, &entry);
    }
}

impl<S: StoragePort + Send> ResetPort for SystemResetter<S> {
    fn full_reset(&mut self, reason: ResetReason) {
        self.record(reason);
        error!("full system reset requested by {}: {}", self.origin, reason);

        #[cfg(target_os = "espidf")]
        // SAFETY: esp_restart never returns; every peripheral is reset.
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }

        #[cfg(not(target_os = "espidf"))]
        std::process::exit(1);
    }
}
