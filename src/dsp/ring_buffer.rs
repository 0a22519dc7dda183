//! Ring buffer for concurrent frame production and playback
//!
//! The sole resource shared between the emulation thread (producer, via
//! the resampler) and the host audio thread (consumer, via the device
//! callback). Neither side ever waits: the producer drops the newest frame
//! when full, the consumer re-emits what it has when starved.
//!
//! Storage is guarded by a mutex with atomic cursors for cross-thread
//! position visibility; all operations are wait-free in the sense that
//! they never block on buffer state.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::StereoSample;
use crate::{ApuError, Result};

/// Fixed-capacity stereo frame queue, single producer / single consumer.
#[derive(Debug)]
pub struct StereoRingBuffer {
    buffer: Mutex<Vec<StereoSample>>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    dropped: AtomicU64,
    capacity: usize,
    mask: usize,
}

impl StereoRingBuffer {
    /// Create a ring buffer; capacity is rounded up to a power of two and
    /// fixed for the buffer's lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ApuError::ConfigError`] for a zero capacity.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(ApuError::ConfigError(
                "ring buffer capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.next_power_of_two();

        Ok(StereoRingBuffer {
            buffer: Mutex::new(vec![StereoSample::default(); capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Fixed frame capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames available to the consumer.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Frames dropped by the producer against a full buffer.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Producer side: append one frame. Returns `false` (dropping the
    /// frame) when the buffer is full; never waits for space.
    pub fn push(&self, frame: StereoSample) -> bool {
        let mut buf = self.buffer.lock();

        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= self.capacity {
            drop(buf);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        buf[write & self.mask] = frame;
        drop(buf);

        self.write_pos.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Consumer side: fill `out` entirely, never waiting for frames.
    ///
    /// With enough frames queued they are drained normally. On underrun
    /// the available frames are re-emitted cyclically without being
    /// consumed, so stale audio is heard instead of a gap; a fully empty
    /// buffer yields silence.
    pub fn drain_or_repeat(&self, out: &mut [StereoSample]) {
        let buf = self.buffer.lock();

        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        let available = write.wrapping_sub(read);

        if available >= out.len() {
            for (x, slot) in out.iter_mut().enumerate() {
                *slot = buf[(read.wrapping_add(x)) & self.mask];
            }
            drop(buf);
            self.read_pos
                .store(read.wrapping_add(out.len()), Ordering::Release);
            return;
        }

        if available == 0 {
            out.fill(StereoSample::default());
            return;
        }

        let mut y = 0;
        for slot in out.iter_mut() {
            *slot = buf[(read.wrapping_add(y)) & self.mask];
            y += 1;
            if y == available {
                y = 0;
            }
        }
    }

    /// Drop every queued frame (producer-side reinitialization).
    pub fn clear(&self) {
        let _guard = self.buffer.lock();
        let write = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write, Ordering::Release);
    }
}
