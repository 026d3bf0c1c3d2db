//! Core-pinned thread spawning for the ESP32 dual-core.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task with explicit priority, stack size and, optionally, core
//! affinity.  On non-ESP targets, falls back to a plain named thread.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread. This means the config→spawn pair must not be
//! interleaved with other thread creation on the same thread.

/// CPU core identifiers for the ESP32 Xtensa LX6 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): the sampler, alone with the timer task.
    Pro = 0,
    /// Core 1 (APP_CPU): voter and monitor.
    App = 1,
}

impl Core {
    pub fn from_index(idx: u8) -> Option<Self> {
        match idx {
            0 => Some(Self::Pro),
            1 => Some(Self::App),
            _ => None,
        }
    }
}

/// Smallest stack handed to a host thread; desktop code paths (formatting,
/// test harness) need far more than the device budget.
#[cfg(not(target_os = "espidf"))]
const SIM_MIN_STACK_BYTES: usize = 64 * 1024;

/// Spawn a thread with explicit priority, stack and optional core pinning.
///
/// On ESP-IDF, uses `esp_pthread_set_cfg()` before `std::thread::spawn`.
/// `core = None` keeps the default (no affinity).  The `name` parameter
/// must be a null-terminated string (e.g. `"sampler\0"`).
///
/// Thread creation failure is fatal: there is no degraded mode for a
/// controller that cannot start its tasks.
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    core: Option<Core>,
    priority: u8,
    stack_bytes: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    debug_assert!(name.ends_with('\0'), "task name must be NUL-terminated");

    // SAFETY: `cfg` is a plain C struct filled from the IDF defaults;
    // `name` is 'static and NUL-terminated, so the pointer stays valid for
    // the lifetime of the task.
    unsafe {
        let mut cfg = esp_idf_svc::sys::esp_create_default_pthread_config();
        if let Some(core) = core {
            cfg.pin_to_core = core as i32;
        }
        cfg.prio = priority as i32;
        cfg.stack_size = stack_bytes as _;
        cfg.thread_name = name.as_ptr() as *const _;
        let ret = esp_idf_svc::sys::esp_pthread_set_cfg(&cfg);
        assert!(
            ret == esp_idf_svc::sys::ESP_OK as i32,
            "esp_pthread_set_cfg failed: {ret}"
        );
    }

    let display_name = name.trim_end_matches('\0');
    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}B)",
        display_name,
        core,
        priority,
        stack_bytes
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_bytes)
        .spawn(f)
        .expect("spawn_on_core: thread creation failed")
}

/// Simulation fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    _core: Option<Core>,
    _priority: u8,
    stack_bytes: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    let display_name = name.trim_end_matches('\0');
    log::debug!(
        "Spawning '{}' (sim, no core pinning, stack={}B)",
        display_name,
        stack_bytes
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_bytes.max(SIM_MIN_STACK_BYTES))
        .spawn(f)
        .expect("spawn_on_core(sim): thread creation failed")
}
