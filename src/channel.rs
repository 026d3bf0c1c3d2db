//! Bounded byte channel between pipeline workers.
//!
//! Modelled on a no-split RTOS ring buffer: every item is charged an
//! [`ITEM_HEADER_BYTES`] header plus its payload rounded up to 4 bytes, and
//! no single item may exceed half the capacity minus the header.
//!
//! Send side: [`BoundedChannel::try_reserve`] charges the footprint up front
//! and hands out a [`SendSlot`] the producer writes into; [`SendSlot::commit`]
//! makes it visible to the consumer.  A slot dropped without commit gives its
//! space back.
//!
//! Receive side: [`BoundedChannel::receive`] hands out a [`Received`] item
//! that owns the bytes until [`Received::release`] or drop, which is the only
//! point the footprint is credited back.  Releasing therefore happens on
//! every exit path, including `?` and panics.
//!
//! Both waits are bounded.  Running out of time is a normal outcome
//! (`Err(Full)` / `None`), not a fault.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ChannelError;
use crate::message::WireMessage;

/// Per-item bookkeeping charge.
pub const ITEM_HEADER_BYTES: usize = 8;

/// Bytes of capacity an item of `size` payload bytes occupies.
pub const fn item_footprint(size: usize) -> usize {
    ITEM_HEADER_BYTES + ((size + 3) & !3)
}

#[derive(Debug, Default)]
struct RingState {
    /// Footprint of reserved, committed and unreleased items.
    used: usize,
    /// Committed items waiting for the consumer.
    queue: VecDeque<Box<[u8]>>,
}

/// Fixed-capacity FIFO of byte items with reserve/commit and
/// receive/release.
#[derive(Debug)]
pub struct BoundedChannel {
    name: &'static str,
    capacity: usize,
    state: Mutex<RingState>,
    readable: Condvar,
    writable: Condvar,
}

impl BoundedChannel {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            state: Mutex::new(RingState::default()),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload a single reservation may request.
    pub fn max_item_size(&self) -> usize {
        (self.capacity / 2).saturating_sub(ITEM_HEADER_BYTES)
    }

    /// Capacity not charged to any reserved or unreleased item.
    pub fn free_bytes(&self) -> usize {
        self.capacity - self.lock().used
    }

    /// Committed items not yet received.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve `size` bytes, waiting up to `timeout` for space.
    ///
    /// Fails immediately with [`ChannelError::TooLarge`] if the item could
    /// never fit, and with [`ChannelError::Full`] once the timeout expires.
    pub fn try_reserve(&self, size: usize, timeout: Duration) -> Result<SendSlot<'_>, ChannelError> {
        let max = self.max_item_size();
        if size > max {
            return Err(ChannelError::TooLarge { size, max });
        }
        let footprint = item_footprint(size);
        let deadline = Instant::now() + timeout;

        let mut state = self.lock();
        while self.capacity - state.used < footprint {
            let now = Instant::now();
            if now >= deadline {
                return Err(ChannelError::Full {
                    free: self.capacity - state.used,
                });
            }
            state = self
                .writable
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.used += footprint;
        drop(state);

        Ok(SendSlot {
            channel: self,
            buf: vec![0u8; size].into_boxed_slice(),
            committed: false,
        })
    }

    /// Wait up to `timeout` for the oldest committed item.
    pub fn receive(&self, timeout: Duration) -> Option<Received<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(buf) = state.queue.pop_front() {
                return Some(Received { channel: self, buf });
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .readable
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Reserve, encode and commit one message.
    pub fn send<M: WireMessage>(&self, msg: &M, timeout: Duration) -> Result<(), ChannelError> {
        let mut slot = self.try_reserve(M::WIRE_SIZE, timeout)?;
        msg.encode_into(&mut slot);
        slot.commit();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn credit(&self, footprint: usize) {
        let mut state = self.lock();
        state.used -= footprint;
        drop(state);
        self.writable.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Send side
// ---------------------------------------------------------------------------

/// Space reserved on a channel; write the payload through `DerefMut`.
#[derive(Debug)]
#[must_use = "a slot that is not committed gives its space back on drop"]
pub struct SendSlot<'a> {
    channel: &'a BoundedChannel,
    buf: Box<[u8]>,
    committed: bool,
}

impl SendSlot<'_> {
    /// Publish the slot to the consumer.
    pub fn commit(mut self) {
        let buf = core::mem::take(&mut self.buf);
        self.committed = true;
        let mut state = self.channel.lock();
        state.queue.push_back(buf);
        drop(state);
        self.channel.readable.notify_one();
    }
}

impl Deref for SendSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for SendSlot<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for SendSlot<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.channel.credit(item_footprint(self.buf.len()));
        }
    }
}

// ---------------------------------------------------------------------------
// Receive side
// ---------------------------------------------------------------------------

/// An item taken off the channel; its space returns on release or drop.
#[derive(Debug)]
pub struct Received<'a> {
    channel: &'a BoundedChannel,
    buf: Box<[u8]>,
}

impl Received<'_> {
    /// Return the item's space to the channel.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for Received<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for Received<'_> {
    fn drop(&mut self) {
        self.channel.credit(item_footprint(self.buf.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use crate::message::SensorReading;

    const NOW: Duration = Duration::ZERO;

    fn put(ch: &BoundedChannel, bytes: &[u8]) {
        let mut slot = ch.try_reserve(bytes.len(), NOW).unwrap();
        slot.copy_from_slice(bytes);
        slot.commit();
    }

    #[test]
    fn footprint_rounds_to_words() {
        assert_eq!(item_footprint(0), 8);
        assert_eq!(item_footprint(1), 12);
        assert_eq!(item_footprint(4), 12);
        assert_eq!(item_footprint(25), 36);
    }

    #[test]
    fn max_item_is_half_capacity_minus_header() {
        let ch = BoundedChannel::new("t", 2048);
        assert_eq!(ch.max_item_size(), 1016);
        assert!(matches!(
            ch.try_reserve(1017, NOW),
            Err(ChannelError::TooLarge { size: 1017, max: 1016 })
        ));
    }

    #[test]
    fn fifo_order() {
        let ch = BoundedChannel::new("t", 256);
        for i in 0..5u8 {
            put(&ch, &[i; 3]);
        }
        for i in 0..5u8 {
            let item = ch.receive(NOW).unwrap();
            assert_eq!(&*item, &[i; 3]);
            item.release();
        }
        assert!(ch.receive(NOW).is_none());
    }

    #[test]
    fn uncommitted_item_is_invisible() {
        let ch = BoundedChannel::new("t", 256);
        let mut slot = ch.try_reserve(4, NOW).unwrap();
        slot.copy_from_slice(&[1, 2, 3, 4]);
        assert!(ch.receive(NOW).is_none());
        slot.commit();
        assert_eq!(&*ch.receive(NOW).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn full_channel_rejects_then_accepts_after_release() {
        // 128 bytes → max item 56 → footprint 64 → exactly two items.
        let ch = BoundedChannel::new("t", 128);
        put(&ch, &[0xAA; 56]);
        put(&ch, &[0xBB; 56]);
        assert_eq!(ch.free_bytes(), 0);
        assert!(matches!(ch.try_reserve(1, NOW), Err(ChannelError::Full { free: 0 })));

        ch.receive(NOW).unwrap().release();
        assert_eq!(ch.free_bytes(), 64);
        let slot = ch.try_reserve(56, NOW).unwrap();
        assert_eq!(ch.free_bytes(), 0);
        drop(slot);
        assert_eq!(ch.free_bytes(), 64);
    }

    #[test]
    fn reserve_larger_than_free_fails_smaller_fits() {
        let ch = BoundedChannel::new("t", 128);
        put(&ch, &[0; 56]);
        put(&ch, &[0; 24]); // footprint 32
        assert_eq!(ch.free_bytes(), 32);
        assert!(matches!(ch.try_reserve(25, NOW), Err(ChannelError::Full { free: 32 })));
        assert!(ch.try_reserve(24, NOW).is_ok());
    }

    #[test]
    fn dropped_receive_releases() {
        let ch = BoundedChannel::new("t", 128);
        put(&ch, &[1; 8]);
        {
            let _item = ch.receive(NOW).unwrap();
            assert_eq!(ch.free_bytes(), 128 - 16);
        }
        assert_eq!(ch.free_bytes(), 128);
    }

    #[test]
    fn reserve_waits_for_release_on_other_thread() {
        let ch = Arc::new(BoundedChannel::new("t", 128));
        put(&ch, &[0; 56]);
        put(&ch, &[0; 56]);

        let consumer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                ch.receive(NOW).unwrap().release();
            })
        };
        let slot = ch.try_reserve(56, Duration::from_secs(5));
        assert!(slot.is_ok());
        drop(slot);
        consumer.join().unwrap();
    }

    #[test]
    fn receive_times_out() {
        let ch = BoundedChannel::new("t", 128);
        let start = Instant::now();
        assert!(ch.receive(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn typed_send() {
        let ch = BoundedChannel::new("t", 2048);
        let r = SensorReading::from_sensor([1.0, 2.0, 3.0], [1, 2, 3]);
        ch.send(&r, NOW).unwrap();
        assert_eq!(ch.free_bytes(), 2048 - 36);
        let item = ch.receive(NOW).unwrap();
        assert_eq!(SensorReading::decode(&item).unwrap(), r);
    }
}
