//! Reset-cause logging.
//!
//! Stores up to 4 reset entries in an NVS ring buffer under the "reset"
//! namespace.  Each entry captures uptime, reason and a short detail
//! string.  The soft watchdog's reset adapter writes one before restarting
//! the chip, and a custom panic hook does the same for panics; the binary
//! logs whatever is stored at boot.

use serde::{Deserialize, Serialize};

use crate::app::ports::{ResetReason, StoragePort};

const RESET_RING_SLOTS: usize = 4;
const RESET_NAMESPACE: &str = "reset";
const RESET_INDEX_KEY: &str = "reset_idx";
const DETAIL_MAX: usize = 48;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetEntry {
    pub uptime_ms: u64,
    pub reason: ResetReason,
    pub detail: heapless::String<DETAIL_MAX>,
}

impl ResetEntry {
    pub fn new(uptime_ms: u64, reason: ResetReason, detail: &str) -> Self {
        let mut d = heapless::String::new();
        // Truncate on a char boundary so push_str cannot fail.
        let mut end = detail.len().min(DETAIL_MAX);
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        let _ = d.push_str(&detail[..end]);
        Self {
            uptime_ms,
            reason,
            detail: d,
        }
    }
}

/// NVS-backed ring buffer for reset entries.
#[derive(Default)]
pub struct ResetLog {
    write_index: usize,
}

impl ResetLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index from NVS, or default to 0.
    pub fn init(&mut self, nvs: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = nvs.read(RESET_NAMESPACE, RESET_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % RESET_RING_SLOTS;
        }
    }

    /// Write an entry to the next ring slot and advance the index.
    pub fn write_entry(&mut self, nvs: &mut dyn StoragePort, entry: &ResetEntry) {
        let slot_key = Self::slot_key(self.write_index);
        if let Ok(bytes) = postcard::to_allocvec(entry) {
            let _ = nvs.write(RESET_NAMESPACE, &slot_key, &bytes);
        }

        self.write_index = (self.write_index + 1) % RESET_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        let _ = nvs.write(RESET_NAMESPACE, RESET_INDEX_KEY, &idx_bytes);
    }

    /// Read all stored entries (up to 4), in slot order.
    pub fn read_all(&self, nvs: &dyn StoragePort) -> heapless::Vec<ResetEntry, RESET_RING_SLOTS> {
        let mut entries = heapless::Vec::new();
        for i in 0..RESET_RING_SLOTS {
            let mut buf = [0u8; 128];
            if let Ok(len) = nvs.read(RESET_NAMESPACE, &Self::slot_key(i), &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<ResetEntry>(&buf[..len]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    /// Erase all entries and reset the index.
    pub fn clear(&mut self, nvs: &mut dyn StoragePort) {
        for i in 0..RESET_RING_SLOTS {
            let _ = nvs.delete(RESET_NAMESPACE, &Self::slot_key(i));
        }
        let _ = nvs.delete(RESET_NAMESPACE, RESET_INDEX_KEY);
        self.write_index = 0;
    }

    pub fn count(&self, nvs: &dyn StoragePort) -> usize {
        (0..RESET_RING_SLOTS)
            .filter(|i| nvs.exists(RESET_NAMESPACE, &Self::slot_key(*i)))
            .count()
    }

    /// Read every stored entry and erase the log, so each boot reports only
    /// the resets since the previous one.
    pub fn take_all(&mut self, nvs: &mut dyn StoragePort) -> heapless::Vec<ResetEntry, RESET_RING_SLOTS> {
        if self.count(nvs) == 0 {
            return heapless::Vec::new();
        }
        let entries = self.read_all(nvs);
        self.clear(nvs);
        entries
    }

    fn slot_key(index: usize) -> heapless::String<16> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("r{}", index));
        s
    }
}

/// Milliseconds since boot.
#[cfg(target_os = "espidf")]
pub fn uptime_ms() -> u64 {
    // SAFETY: esp_timer_get_time is a plain counter read.
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
}

/// Milliseconds since the first call in this process.
#[cfg(not(target_os = "espidf"))]
pub fn uptime_ms() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u64
}

// ───────────────────────────────────────────────────────────────
// Custom panic handler: writes a ResetEntry to NVS before reset
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that persists the panic reason to NVS.
///
/// Must be called once during init, after NVS is ready.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        log::error!("PANIC: {}", reason);

        #[cfg(target_os = "espidf")]
        {
            // No nvs_flash_init() here: the hook relies on the session
            // opened in main().  If NVS was never initialised the write
            // fails silently.
            let entry = ResetEntry::new(uptime_ms(), ResetReason::Panic, reason);
            let mut nvs = crate::adapters::nvs::NvsAdapter::new();
            let mut log = ResetLog::new();
            log.init(&nvs);
            log.write_entry(&mut nvs, &entry);
        }
    }));
}
