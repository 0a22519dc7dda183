//! Real-time audio output
//!
//! Bridges the frame ring buffer to the system audio device. The device
//! pulls at its own cadence from a separate thread; the emulation side
//! never sees it beyond sharing the ring buffer.

pub mod audio_device;

pub use audio_device::AudioDevice;
