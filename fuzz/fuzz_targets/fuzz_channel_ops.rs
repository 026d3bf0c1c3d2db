//! Fuzz target: `BoundedChannel` operation sequences
//!
//! Interprets each input byte as one reserve/commit, abandoned reserve or
//! receive/release, and checks after every step that the charged bytes
//! never exceed capacity and that an empty channel has all its space back.
//!
//! cargo fuzz run fuzz_channel_ops

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use tmrsense::channel::BoundedChannel;

fuzz_target!(|data: &[u8]| {
    let Some((&cap, ops)) = data.split_first() else {
        return;
    };
    let ch = BoundedChannel::new("fuzz", 16 + cap as usize);
    let mut held = Vec::new();

    for &op in ops {
        let size = (op >> 2) as usize;
        match op & 0b11 {
            0 | 1 => {
                if let Ok(slot) = ch.try_reserve(size, Duration::ZERO) {
                    if op & 1 == 0 {
                        slot.commit();
                    }
                }
            }
            2 => {
                if let Some(item) = ch.receive(Duration::ZERO) {
                    item.release();
                }
            }
            _ => {
                // Hold a received item across later operations.
                if let Some(item) = ch.receive(Duration::ZERO) {
                    held.push(item);
                }
            }
        }
        assert!(ch.free_bytes() <= ch.capacity());
    }

    drop(held);
    while let Some(item) = ch.receive(Duration::ZERO) {
        item.release();
    }
    assert_eq!(ch.free_bytes(), ch.capacity());
});
