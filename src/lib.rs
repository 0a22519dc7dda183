//! Cycle-accurate Game Boy Advance APU emulator
//!
//! Emulates the GBA's sound-generation hardware: four cycle-timed tone
//! channels (two pulse, wave, noise), two direct-sound FIFOs, and the
//! mixing/resampling pipeline that feeds a host audio device in real
//! time. All channel timing runs on an event scheduler in emulated-cycle
//! units; the mixer converts the bias-derived output rate to the host
//! rate and publishes finished stereo frames through a ring buffer that
//! the host audio thread drains on its own timing.
//!
//! # Features
//! - Event-driven channel timing with lateness compensation
//! - Shared length/envelope/sweep sequencing across all channels,
//!   including the envelope "zombie mode" write quirk
//! - LFSR noise generation with skip-ahead rate matching
//! - Direct-sound FIFO latching with edge-triggered DMA refill requests
//! - Band-limited sample-rate conversion to the host device rate
//! - Single-producer/single-consumer frame buffer with underrun masking
//!
//! # Crate feature flags
//! - `streaming` (optional): real-time audio output via rodio
//!
//! # Quick start
//! ```no_run
//! use agb_apu::{Apu, ApuConfig};
//!
//! let mut apu = Apu::new(ApuConfig::default()).unwrap();
//!
//! // Memory-mapped register writes: trigger the noise channel.
//! apu.write_register(0x79, 0xF7); // full volume, DAC on
//! apu.write_register(0x7C, 0x23); // divisor/shift
//! apu.write_register(0x7D, 0x80); // trigger
//!
//! // Report elapsed CPU cycles; due events fire in timestamp order.
//! apu.run(280_896);
//! ```

#![warn(missing_docs)]

pub mod apu;
pub mod dsp;
pub mod scheduler;

#[cfg(feature = "streaming")]
pub mod streaming;

/// Error type for APU emulator operations.
///
/// The emulation core itself has no recoverable errors; everything here
/// is a host-resource failure surfaced at the pipeline boundary.
#[derive(thiserror::Error, Debug)]
pub enum ApuError {
    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for ApuError {
    fn from(msg: String) -> Self {
        ApuError::Other(msg)
    }
}

impl From<&str> for ApuError {
    fn from(msg: &str) -> Self {
        ApuError::Other(msg.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, ApuError>;

// Public API exports
pub use apu::{Apu, ApuConfig, Bias, Fifo, FifoId, NoiseChannel, PulseChannel, WaveChannel};
pub use dsp::{SincResampler, StereoRingBuffer, StereoSample};
pub use scheduler::{Event, PsgChannel, Scheduler};

#[cfg(feature = "streaming")]
pub use streaming::AudioDevice;
