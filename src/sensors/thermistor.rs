//! NTC thermistor bank (10 kOhm @ 25 C, B = 3950) on ADC1.
//!
//! Each thermistor sits on the high side of a divider with a fixed series
//! resistor to ground, so the node voltage rises with temperature:
//!
//! ```text
//!   v     = raw × v_ref / adc_max
//!   r_ntc = r_series × (v_ref − v) / v
//!   1/T   = 1/T0 + ln(r_ntc / R0) / β
//! ```
//!
//! ## Dual-target design
//!
//! On ESP-IDF: the bank owns an ADC1 oneshot unit for its lifetime and
//! deletes it on drop.
//! On host/test: reads from a static `AtomicU16` per channel for injection.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::info;

use crate::app::ports::{AdcHandle, AdcPort};
use crate::config::ThermistorModel;
use crate::error::SensorError;
use crate::pins;

const KELVIN_OFFSET: f32 = 273.15;

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert a raw ADC code to °C.
///
/// Codes at either rail (open or shorted thermistor) have no finite
/// resistance and are reported as [`SensorError::OutOfRange`].
pub fn celsius_from_raw(model: &ThermistorModel, raw: u16) -> Result<f32, SensorError> {
    if raw == 0 || raw >= model.adc_max {
        return Err(SensorError::OutOfRange);
    }
    let v = f32::from(raw) * model.v_ref / f32::from(model.adc_max);
    let r_ntc = model.series_resistance_ohms * (model.v_ref - v) / v;
    let inv_t = 1.0 / model.nominal_temperature_k + (r_ntc / model.nominal_resistance_ohms).ln() / model.beta;
    if inv_t <= 0.0 {
        return Err(SensorError::OutOfRange);
    }
    Ok(1.0 / inv_t - KELVIN_OFFSET)
}

/// The raw code a healthy channel reads at `celsius`.  Inverse of
/// [`celsius_from_raw`], rounded to the nearest code.
pub fn raw_from_celsius(model: &ThermistorModel, celsius: f32) -> u16 {
    let t = celsius + KELVIN_OFFSET;
    let r_ntc = model.nominal_resistance_ohms * (model.beta * (1.0 / t - 1.0 / model.nominal_temperature_k)).exp();
    let v = model.v_ref * model.series_resistance_ohms / (model.series_resistance_ohms + r_ntc);
    let raw = (v / model.v_ref * f32::from(model.adc_max)).round();
    raw.clamp(0.0, f32::from(model.adc_max)) as u16
}

// ---------------------------------------------------------------------------
// Simulation injection
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "espidf"))]
static SIM_ADC: [AtomicU16; pins::ADC1_CHANNEL_COUNT as usize] =
    [const { AtomicU16::new(2048) }; pins::ADC1_CHANNEL_COUNT as usize];

/// Set the code the simulated ADC1 returns on `channel`.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_adc(channel: u8, raw: u16) {
    if let Some(slot) = SIM_ADC.get(channel as usize) {
        slot.store(raw, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// ADC1 oneshot unit plus the thermistor model applied to every channel.
pub struct ThermistorBank {
    model: ThermistorModel,
    /// Bitmask of configured ADC1 channels.
    configured: u8,
    #[cfg(target_os = "espidf")]
    unit: adc_oneshot_unit_handle_t,
}

// SAFETY: the oneshot unit handle is only used through `&mut self`, so the
// bank is never touched from two threads at once; moving it to the
// sampler's thread is fine.
#[cfg(target_os = "espidf")]
unsafe impl Send for ThermistorBank {}

impl ThermistorBank {
    #[cfg(target_os = "espidf")]
    pub fn new(model: ThermistorModel) -> Result<Self, SensorError> {
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let mut unit: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        // SAFETY: `init_cfg` and `unit` are valid for the duration of the call.
        let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut unit) };
        if ret != ESP_OK as i32 {
            return Err(SensorError::AdcReadFailed(ret));
        }
        info!("thermistor: ADC1 oneshot unit created");
        Ok(Self {
            model,
            configured: 0,
            unit,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(model: ThermistorModel) -> Result<Self, SensorError> {
        Ok(Self {
            model,
            configured: 0,
        })
    }

    pub fn model(&self) -> &ThermistorModel {
        &self.model
    }

    fn check(&self, handle: AdcHandle) -> Result<(), SensorError> {
        if handle.0 >= pins::ADC1_CHANNEL_COUNT || self.configured & (1 << handle.0) == 0 {
            return Err(SensorError::InvalidChannel(handle.0));
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn configure_hw(&mut self, channel: u8) -> Result<(), SensorError> {
        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: pins::THERMISTOR_ADC_ATTEN as adc_atten_t,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        // SAFETY: `self.unit` is a live unit created in `new`.
        let ret = unsafe { adc_oneshot_config_channel(self.unit, channel as adc_channel_t, &chan_cfg) };
        if ret != ESP_OK as i32 {
            return Err(SensorError::AdcReadFailed(ret));
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn configure_hw(&mut self, _channel: u8) -> Result<(), SensorError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn read_hw(&mut self, channel: u8) -> Result<u16, SensorError> {
        let mut raw: i32 = 0;
        // SAFETY: `self.unit` is live and `channel` was configured.
        let ret = unsafe { adc_oneshot_read(self.unit, channel as adc_channel_t, &mut raw) };
        if ret != ESP_OK as i32 {
            return Err(SensorError::AdcReadFailed(ret));
        }
        Ok(raw.max(0) as u16)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_hw(&mut self, channel: u8) -> Result<u16, SensorError> {
        Ok(SIM_ADC[channel as usize].load(Ordering::Relaxed))
    }
}

impl AdcPort for ThermistorBank {
    fn configure(&mut self, channel: u8) -> Result<AdcHandle, SensorError> {
        if channel >= pins::ADC1_CHANNEL_COUNT {
            return Err(SensorError::InvalidChannel(channel));
        }
        self.configure_hw(channel)?;
        self.configured |= 1 << channel;
        Ok(AdcHandle(channel))
    }

    fn read_raw(&mut self, handle: AdcHandle) -> Result<u16, SensorError> {
        self.check(handle)?;
        self.read_hw(handle.0)
    }

    fn read_calibrated(&mut self, handle: AdcHandle) -> Result<f32, SensorError> {
        let raw = self.read_raw(handle)?;
        celsius_from_raw(&self.model, raw)
    }
}

#[cfg(target_os = "espidf")]
impl Drop for ThermistorBank {
    fn drop(&mut self) {
        // SAFETY: `self.unit` was created in `new` and is deleted only here.
        unsafe {
            adc_oneshot_del_unit(self.unit);
        }
    }
}
