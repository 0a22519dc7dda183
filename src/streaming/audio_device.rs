//! Audio device integration using rodio
//!
//! Plays finished stereo frames from the ring buffer on the system audio
//! device. The playback source pulls frames on the audio thread's own
//! timing; underruns re-emit the frames still queued instead of going
//! quiet, so a starved (or never-filled) buffer degrades to held audio
//! rather than a crash.

use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::dsp::{StereoRingBuffer, StereoSample};
use crate::{ApuError, Result};

/// Frames fetched from the ring buffer per refill.
const BATCH_FRAMES: usize = 1024;

/// Audio source that reads interleaved stereo samples from the ring
/// buffer.
struct RingBufferSource {
    ring_buffer: Arc<StereoRingBuffer>,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    /// Interleaved refill batch (reduces per-sample locking).
    batch: Vec<f32>,
    batch_pos: usize,
}

impl RingBufferSource {
    fn new(
        ring_buffer: Arc<StereoRingBuffer>,
        sample_rate: u32,
        finished: Arc<AtomicBool>,
    ) -> Self {
        RingBufferSource {
            ring_buffer,
            sample_rate,
            finished,
            batch: vec![0.0; BATCH_FRAMES * 2],
            batch_pos: BATCH_FRAMES * 2,
        }
    }

    fn refill(&mut self) {
        let mut frames = [StereoSample::default(); BATCH_FRAMES];
        self.ring_buffer.drain_or_repeat(&mut frames);
        for (frame, out) in frames.iter().zip(self.batch.chunks_exact_mut(2)) {
            out[0] = frame.left;
            out[1] = frame.right;
        }
        self.batch_pos = 0;
    }
}

impl Source for RingBufferSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for RingBufferSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.batch_pos >= self.batch.len() {
            self.refill();
        }

        let sample = self.batch[self.batch_pos];
        self.batch_pos += 1;
        Some(sample)
    }
}

/// Audio playback device pulling from the frame ring buffer.
pub struct AudioDevice {
    _stream: OutputStream,
    _sink: Sink,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default system output device and start pulling frames.
    ///
    /// # Errors
    ///
    /// Returns [`ApuError::AudioDeviceError`] when no output stream or
    /// sink can be created.
    pub fn new(sample_rate: u32, ring_buffer: Arc<StereoRingBuffer>) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| ApuError::AudioDeviceError(format!("failed to open stream: {e}")))?;

        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| ApuError::AudioDeviceError(format!("failed to create sink: {e}")))?;

        let finished = Arc::new(AtomicBool::new(false));
        let source = RingBufferSource::new(ring_buffer, sample_rate, Arc::clone(&finished));
        sink.append(source);

        Ok(AudioDevice {
            _stream: stream,
            _sink: sink,
            sample_rate,
            finished,
        })
    }

    /// Configured pull rate in Hz. rodio converts internally if the
    /// hardware runs at a different rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Relaxed);
        self._sink.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_reports_stereo_format() {
        let ring = Arc::new(StereoRingBuffer::new(256).unwrap());
        let source = RingBufferSource::new(ring, 48000, Arc::new(AtomicBool::new(false)));
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 48000);
    }

    #[test]
    fn source_interleaves_frames() {
        let ring = Arc::new(StereoRingBuffer::new(4096).unwrap());
        for x in 0..BATCH_FRAMES {
            ring.push(StereoSample::new(x as f32, -(x as f32)));
        }

        let mut source =
            RingBufferSource::new(Arc::clone(&ring), 48000, Arc::new(AtomicBool::new(false)));
        assert_eq!(source.next(), Some(0.0));
        assert_eq!(source.next(), Some(-0.0));
        assert_eq!(source.next(), Some(1.0));
        assert_eq!(source.next(), Some(-1.0));
    }

    #[test]
    fn starved_source_keeps_producing() {
        let ring = Arc::new(StereoRingBuffer::new(256).unwrap());
        let mut source = RingBufferSource::new(ring, 48000, Arc::new(AtomicBool::new(false)));
        for _ in 0..64 {
            assert_eq!(source.next(), Some(0.0), "silence, never None");
        }
    }

    #[test]
    fn finished_signal_ends_the_stream() {
        let ring = Arc::new(StereoRingBuffer::new(256).unwrap());
        let finished = Arc::new(AtomicBool::new(false));
        let mut source = RingBufferSource::new(ring, 48000, Arc::clone(&finished));

        assert!(source.next().is_some());
        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None);
    }
}
