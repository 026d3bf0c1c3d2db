//! ADC / GPIO assignments for the three thermistor dividers.
//!
//! Single source of truth: the default configuration and the thermistor
//! bank reference this module rather than hard-coding channel numbers.
//!
//! Each channel is wired the same way:
//!
//! ```text
//!   3.3V
//!    │
//!  [NTC]   10 kΩ @ 25 °C, β = 3950
//!    │
//!    ├────▶ ADC1 input
//!    │
//!  [10k]   fixed series resistor
//!    │
//!   GND
//! ```

// ---------------------------------------------------------------------------
// Thermistors: Analog (ADC1, 12-bit, 11 dB attenuation)
// ---------------------------------------------------------------------------

/// Thermistor 1: ADC1 channel 6 (GPIO 34).
pub const THERMISTOR_1_ADC_CHANNEL: u8 = 6;
/// Thermistor 2: ADC1 channel 7 (GPIO 35).
pub const THERMISTOR_2_ADC_CHANNEL: u8 = 7;
/// Thermistor 3: ADC1 channel 4 (GPIO 32).
pub const THERMISTOR_3_ADC_CHANNEL: u8 = 4;

/// All three channels in voting order.
pub const THERMISTOR_ADC_CHANNELS: [u8; 3] = [
    THERMISTOR_1_ADC_CHANNEL,
    THERMISTOR_2_ADC_CHANNEL,
    THERMISTOR_3_ADC_CHANNEL,
];

/// Number of ADC1 channels on the ESP32 (CH0–CH7).
pub const ADC1_CHANNEL_COUNT: u8 = 8;

/// ADC attenuation (11 dB → 0 – 3.3 V usable range).
pub const THERMISTOR_ADC_ATTEN: u32 = 3; // ADC_ATTEN_DB_11
