//! Fuzz target: `SensorReading::decode`
//!
//! Drives arbitrary byte sequences into the 25-byte reading decoder and
//! asserts that it never panics, accepts only exact-length input, and
//! re-encodes anything it accepts to the same bytes.
//!
//! cargo fuzz run fuzz_reading_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use tmrsense::message::{SensorReading, WireMessage};
use tmrsense::pipeline::voter::vote;

fuzz_target!(|data: &[u8]| {
    let Ok(reading) = SensorReading::decode(data) else {
        return;
    };
    assert_eq!(data.len(), SensorReading::WIRE_SIZE);

    let mut buf = [0u8; SensorReading::WIRE_SIZE];
    reading.encode_into(&mut buf);
    assert_eq!(&buf[..], data, "decode/encode must be lossless");

    // Voting on garbage (NaN, infinities, any codes) must not panic either.
    let verdict = vote(&reading, 0x00FF);
    assert_eq!(verdict.mean_raw & !0x00FF, 0);
});
