//! Periodic sample tick using ESP-IDF's esp_timer API.
//!
//! The timer callback only raises the sampler's [`BinarySignal`]; reading
//! the ADC and sending on the channel happen on the sampler's own thread.
//! Callbacks execute in the ESP timer task context (not ISR), so taking
//! the signal's mutex there is allowed.
//!
//! The timer is owned by the sampler: created in `arm`, stopped and deleted
//! in `disarm` (and on drop).  On simulation targets a helper thread sleeps
//! for the period instead.

use std::sync::Arc;
use std::time::Duration;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
use log::info;

use crate::app::ports::TickSource;
use crate::error::{Error, Result};
use crate::sync::BinarySignal;

pub struct PeriodicTimer {
    /// NUL-terminated timer name.
    name: &'static str,
    signal: Arc<BinarySignal>,
    #[cfg(target_os = "espidf")]
    handle: esp_timer_handle_t,
    #[cfg(not(target_os = "espidf"))]
    sim: Option<SimTicker>,
}

// SAFETY: the esp_timer handle is only used through `&mut self`; the
// callback side touches nothing but the `Arc<BinarySignal>`.
#[cfg(target_os = "espidf")]
unsafe impl Send for PeriodicTimer {}

impl PeriodicTimer {
    pub fn new(name: &'static str) -> Self {
        debug_assert!(name.ends_with('\0'), "timer name must be NUL-terminated");
        Self {
            name,
            signal: Arc::new(BinarySignal::new()),
            #[cfg(target_os = "espidf")]
            handle: core::ptr::null_mut(),
            #[cfg(not(target_os = "espidf"))]
            sim: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        #[cfg(target_os = "espidf")]
        return !self.handle.is_null();
        #[cfg(not(target_os = "espidf"))]
        return self.sim.is_some();
    }

    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

// ---------------------------------------------------------------------------
// ESP-IDF
// ---------------------------------------------------------------------------

/// Runs in the esp_timer task.  Must do nothing but raise the signal.
#[cfg(target_os = "espidf")]
unsafe extern "C" fn tick_cb(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is `Arc::as_ptr` of the owning timer's signal, which
    // outlives the esp_timer (deleted in `disarm` before the Arc can drop).
    let signal = unsafe { &*(arg as *const BinarySignal) };
    signal.give();
}

#[cfg(target_os = "espidf")]
impl TickSource for PeriodicTimer {
    fn arm(&mut self, period: Duration) -> Result<()> {
        self.disarm();

        let args = esp_timer_create_args_t {
            callback: Some(tick_cb),
            arg: Arc::as_ptr(&self.signal) as *mut core::ffi::c_void,
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: self.name.as_ptr() as *const _,
            skip_unhandled_events: true,
        };
        let mut handle: esp_timer_handle_t = core::ptr::null_mut();
        // SAFETY: `args` is fully initialised; the callback argument stays
        // valid while the timer exists (see `tick_cb`).
        let ret = unsafe { esp_timer_create(&args, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(Error::Timer(ret));
        }
        // SAFETY: `handle` was just created.
        let ret = unsafe { esp_timer_start_periodic(handle, period.as_micros() as u64) };
        if ret != ESP_OK as i32 {
            // SAFETY: created above, never started.
            unsafe { esp_timer_delete(handle) };
            return Err(Error::Timer(ret));
        }
        self.handle = handle;
        info!("hw_timer: '{}' every {}us", self.display_name(), period.as_micros());
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> bool {
        self.signal.take(timeout)
    }

    fn disarm(&mut self) {
        if self.handle.is_null() {
            return;
        }
        // SAFETY: `self.handle` is a live timer; stop is a no-op error if
        // it already stopped, and delete is only reached once.
        unsafe {
            esp_timer_stop(self.handle);
            esp_timer_delete(self.handle);
        }
        self.handle = core::ptr::null_mut();
        self.signal.try_take();
        info!("hw_timer: '{}' stopped and deleted", self.display_name());
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "espidf"))]
struct SimTicker {
    stop: Arc<std::sync::atomic::AtomicBool>,
    thread: std::thread::JoinHandle<()>,
}

#[cfg(not(target_os = "espidf"))]
impl TickSource for PeriodicTimer {
    fn arm(&mut self, period: Duration) -> Result<()> {
        use std::sync::atomic::{AtomicBool, Ordering};

        self.disarm();
        if period.is_zero() {
            return Err(Error::Timer(-1));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let signal = Arc::clone(&self.signal);
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name(self.display_name().into())
                .spawn(move || {
                    let mut next = std::time::Instant::now() + period;
                    while !stop.load(Ordering::Acquire) {
                        let now = std::time::Instant::now();
                        if now < next {
                            std::thread::park_timeout(next - now);
                            continue;
                        }
                        signal.give();
                        next += period;
                    }
                })
                .map_err(|_| Error::Timer(-1))?
        };
        self.sim = Some(SimTicker { stop, thread });
        info!("hw_timer(sim): '{}' every {}us", self.display_name(), period.as_micros());
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> bool {
        self.signal.take(timeout)
    }

    fn disarm(&mut self) {
        use std::sync::atomic::Ordering;

        let Some(sim) = self.sim.take() else {
            return;
        };
        sim.stop.store(true, Ordering::Release);
        sim.thread.thread().unpark();
        let _ = sim.thread.join();
        self.signal.try_take();
        info!("hw_timer(sim): '{}' stopped", self.display_name());
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
