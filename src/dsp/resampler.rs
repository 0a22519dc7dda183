//! Band-limited sample-rate conversion
//!
//! Converts the mixer's bias-derived output rate (`32768 << resolution`)
//! to the host device rate with a 32-tap windowed-sinc kernel. Input
//! frames are accumulated in a short history; once the kernel window fits,
//! exactly one finished frame per output period is pushed into the ring
//! buffer.
//!
//! Rate changes keep the history, so switching resolution mid-stream is
//! bounded by a single-frame transient.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::Arc;

use super::{StereoRingBuffer, StereoSample};

/// Kernel length in input frames.
const TAPS: usize = 32;

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Blackman window over the normalized tap offset `t` in [-1, 1].
fn blackman(t: f64) -> f64 {
    if t.abs() >= 1.0 {
        return 0.0;
    }
    0.42 + 0.5 * (PI * t).cos() + 0.08 * (2.0 * PI * t).cos()
}

/// Windowed-sinc stereo resampler feeding a frame ring buffer.
#[derive(Debug)]
pub struct SincResampler {
    buffer: Arc<StereoRingBuffer>,
    input_rate: u32,
    output_rate: u32,
    /// Input frames advanced per output frame.
    ratio: f64,
    /// Anti-aliasing cutoff relative to the input Nyquist rate.
    cutoff: f64,
    /// Fractional window start of the next output frame.
    phase: f64,
    history: VecDeque<StereoSample>,
}

impl SincResampler {
    /// Create a resampler writing finished frames into `buffer`.
    pub fn new(buffer: Arc<StereoRingBuffer>, input_rate: u32, output_rate: u32) -> Self {
        let mut resampler = SincResampler {
            buffer,
            input_rate: 0,
            output_rate: 0,
            ratio: 1.0,
            cutoff: 1.0,
            phase: 0.0,
            history: VecDeque::with_capacity(2 * TAPS),
        };
        resampler.set_sample_rates(input_rate, output_rate);
        resampler
    }

    /// Reconfigure the conversion ratio. History and phase are kept.
    pub fn set_sample_rates(&mut self, input_rate: u32, output_rate: u32) {
        self.input_rate = input_rate;
        self.output_rate = output_rate;
        self.ratio = f64::from(input_rate) / f64::from(output_rate);
        self.cutoff = (f64::from(output_rate) / f64::from(input_rate)).min(1.0);
    }

    /// Current input rate in Hz.
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Current output rate in Hz.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Feed one input frame, emitting every output frame that becomes
    /// computable.
    pub fn write(&mut self, frame: StereoSample) {
        self.history.push_back(frame);

        loop {
            let base = self.phase.floor() as usize;
            if base + TAPS > self.history.len() {
                break;
            }
            let out = self.interpolate(base, self.phase - base as f64);
            self.buffer.push(out);
            self.phase += self.ratio;
        }

        let consumed = (self.phase.floor() as usize).min(self.history.len());
        if consumed > 0 {
            self.history.drain(..consumed);
            self.phase -= consumed as f64;
        }
    }

    fn interpolate(&self, base: usize, mu: f64) -> StereoSample {
        let center = (TAPS / 2 - 1) as f64 + mu;
        let half = (TAPS / 2) as f64;

        let mut left = 0.0f64;
        let mut right = 0.0f64;
        let mut norm = 0.0f64;

        for k in 0..TAPS {
            let offset = k as f64 - center;
            let coeff = sinc(offset * self.cutoff) * blackman(offset / half);
            let frame = self.history[base + k];
            left += f64::from(frame.left) * coeff;
            right += f64::from(frame.right) * coeff;
            norm += coeff;
        }

        // Normalizing by the coefficient sum pins the DC gain at one for
        // every fractional phase.
        if norm.abs() > f64::EPSILON {
            left /= norm;
            right /= norm;
        }

        StereoSample::new(left as f32, right as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn resampler(input_rate: u32, output_rate: u32) -> (SincResampler, Arc<StereoRingBuffer>) {
        let buffer = Arc::new(StereoRingBuffer::new(4096).unwrap());
        let resampler = SincResampler::new(Arc::clone(&buffer), input_rate, output_rate);
        (resampler, buffer)
    }

    #[test]
    fn constant_signal_keeps_its_amplitude() {
        let (mut resampler, buffer) = resampler(32768, 48000);

        for _ in 0..200 {
            resampler.write(StereoSample::new(0.5, -0.25));
        }

        let available = buffer.available();
        assert!(available > 0);
        let mut out = vec![StereoSample::default(); available];
        buffer.drain_or_repeat(&mut out);
        for frame in &out {
            assert_relative_eq!(frame.left, 0.5, epsilon = 1e-3);
            assert_relative_eq!(frame.right, -0.25, epsilon = 1e-3);
        }
    }

    #[test]
    fn output_count_follows_rate_ratio() {
        let (mut resampler, buffer) = resampler(32768, 16384);

        for _ in 0..1000 {
            resampler.write(StereoSample::default());
        }

        // Two input frames per output frame, minus the kernel fill.
        let available = buffer.available() as i64;
        assert!((available - 500).abs() < (TAPS as i64), "got {available}");
    }

    #[test]
    fn upsampling_produces_more_frames_than_fed() {
        let (mut resampler, buffer) = resampler(32768, 131072);

        for _ in 0..100 {
            resampler.write(StereoSample::default());
        }
        assert!(buffer.available() > 200);
    }

    #[test]
    fn rate_change_keeps_running_without_reset() {
        let (mut resampler, buffer) = resampler(32768, 48000);

        for _ in 0..100 {
            resampler.write(StereoSample::new(0.5, 0.5));
        }
        resampler.set_sample_rates(65536, 48000);
        assert_eq!(resampler.input_rate(), 65536);

        let before = buffer.available();
        for _ in 0..100 {
            resampler.write(StereoSample::new(0.5, 0.5));
        }
        assert!(buffer.available() > before, "output continues after change");
    }

    #[test]
    fn history_stays_bounded() {
        let (mut resampler, _buffer) = resampler(262144, 32768);
        for _ in 0..10_000 {
            resampler.write(StereoSample::default());
        }
        assert!(resampler.history.len() < 2 * TAPS + 16);
    }
}
