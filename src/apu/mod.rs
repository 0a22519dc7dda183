//! APU emulation core
//!
//! This module contains the audio subsystem components:
//! - Shared sequencing units (length counter, envelope, sweep)
//! - Four tone channels (two pulse, wave, noise)
//! - Direct-sound FIFOs and the bias/resolution register
//! - The mixer/resampler pipeline tying everything together

pub mod fifo;
pub mod mixer;
pub mod noise;
pub mod pulse;
pub mod registers;
pub mod sequencer;
pub mod wave;

pub use fifo::{Fifo, FifoId};
pub use mixer::{Apu, ApuConfig};
pub use noise::NoiseChannel;
pub use pulse::PulseChannel;
pub use registers::Bias;
pub use sequencer::{Direction, Envelope, Sequencer, Sweep, SweepDirection, SweepStep};
pub use wave::WaveChannel;
