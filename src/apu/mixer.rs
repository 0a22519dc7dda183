//! Mixer/resampler pipeline
//!
//! Owns the four tone channels, the two direct-sound FIFO latches, the
//! bias register and the output stage. A mixer-tick event fires every
//! `512 >> resolution` cycles, combines all channel outputs with the FIFO
//! latches into one stereo frame and feeds it to the resampler, which
//! publishes finished frames to the host through the ring buffer.
//!
//! The embedding emulator drives everything through [`Apu::run`]; the host
//! audio thread drains the ring buffer on its own timing.

use std::fmt;
use std::sync::Arc;

use crate::apu::fifo::{Fifo, FifoId};
use crate::apu::noise::NoiseChannel;
use crate::apu::pulse::PulseChannel;
use crate::apu::registers::Bias;
use crate::apu::wave::WaveChannel;
use crate::dsp::{SincResampler, StereoRingBuffer, StereoSample};
use crate::scheduler::{Event, PsgChannel, Scheduler};
use crate::Result;

#[cfg(feature = "streaming")]
use crate::streaming::AudioDevice;

/// Cycles between frame-sequencer steps (512 Hz at 16.777 MHz).
const FRAME_SEQUENCER_INTERVAL: u64 = 32768;

/// A FIFO refill request handler, invoked from [`Apu::latch_fifo`] when a
/// latch leaves the FIFO half empty.
pub type RefillHandler = Box<dyn FnMut(FifoId) + Send>;

/// Host-facing configuration for the mixing pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ApuConfig {
    /// Host device sample rate in Hz.
    pub host_sample_rate: u32,
    /// Ring buffer capacity in stereo frames.
    pub buffer_frames: usize,
}

impl Default for ApuConfig {
    fn default() -> Self {
        ApuConfig {
            host_sample_rate: 48000,
            buffer_frames: 16384,
        }
    }
}

/// The audio subsystem: four tone channels, two direct-sound FIFOs and
/// the mixing/resampling output pipeline.
pub struct Apu {
    /// Pulse channel 1 (with sweep).
    pub pulse1: PulseChannel,
    /// Pulse channel 2.
    pub pulse2: PulseChannel,
    /// Wave channel.
    pub wave: WaveChannel,
    /// Noise channel.
    pub noise: NoiseChannel,
    /// Bias/resolution register.
    pub bias: Bias,
    fifo: [Fifo; 2],
    latch: [i8; 2],
    scheduler: Scheduler,
    resampler: SincResampler,
    buffer: Arc<StereoRingBuffer>,
    resolution_old: u8,
    frame_step: u8,
    config: ApuConfig,
    dma_handler: Option<RefillHandler>,
    #[cfg(feature = "streaming")]
    device: Option<AudioDevice>,
}

impl Apu {
    /// Build the subsystem and perform the initial [`reset`](Self::reset).
    ///
    /// # Errors
    ///
    /// Returns [`crate::ApuError::ConfigError`] for an invalid ring buffer
    /// capacity. An unavailable audio device is not an error; the pipeline
    /// degrades to silent output.
    pub fn new(config: ApuConfig) -> Result<Self> {
        let buffer = Arc::new(StereoRingBuffer::new(config.buffer_frames)?);
        let resampler = SincResampler::new(
            Arc::clone(&buffer),
            Bias::new().sample_rate(),
            config.host_sample_rate,
        );

        let mut apu = Apu {
            pulse1: PulseChannel::new(PsgChannel::Pulse1, true),
            pulse2: PulseChannel::new(PsgChannel::Pulse2, false),
            wave: WaveChannel::new(),
            noise: NoiseChannel::new(),
            bias: Bias::new(),
            fifo: [Fifo::new(), Fifo::new()],
            latch: [0; 2],
            scheduler: Scheduler::new(),
            resampler,
            buffer,
            resolution_old: 0,
            frame_step: 0,
            config,
            dma_handler: None,
            #[cfg(feature = "streaming")]
            device: None,
        };
        apu.reset();
        Ok(apu)
    }

    /// Re-initialize the whole subsystem: FIFOs, bias, latches, channels
    /// (arming their first generation events), the mixer cadence and the
    /// output stage.
    pub fn reset(&mut self) {
        self.fifo[0].reset();
        self.fifo[1].reset();
        self.latch = [0; 2];
        self.bias.reset();

        self.resolution_old = 0;
        self.frame_step = 0;

        self.scheduler.clear();
        self.pulse1.reset(&mut self.scheduler);
        self.pulse2.reset(&mut self.scheduler);
        self.wave.reset(&mut self.scheduler);
        self.noise.reset(&mut self.scheduler);
        self.scheduler
            .add(self.bias.sample_interval() as i64, Event::MixerTick);
        self.scheduler
            .add(FRAME_SEQUENCER_INTERVAL as i64, Event::FrameTick);

        // Drain before reconfiguring so the host callback never reads a
        // half-reinitialized stream.
        self.buffer.clear();
        self.resampler
            .set_sample_rates(self.bias.sample_rate(), self.config.host_sample_rate);

        #[cfg(feature = "streaming")]
        self.reacquire_device();
    }

    /// Install the DMA collaborator's refill handler.
    pub fn set_refill_handler(&mut self, handler: impl FnMut(FifoId) + Send + 'static) {
        self.dma_handler = Some(Box::new(handler));
    }

    /// The frame ring buffer shared with the host audio thread.
    ///
    /// A custom host integration drains it with
    /// [`StereoRingBuffer::drain_or_repeat`], which implements the
    /// underrun fallback contract.
    pub fn frame_buffer(&self) -> Arc<StereoRingBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Report `cycles` of elapsed CPU execution: advances the simulation
    /// clock and fires every due event in timestamp order.
    pub fn run(&mut self, cycles: u64) {
        self.scheduler.advance(cycles);
        while let Some((event, cycles_late)) = self.scheduler.pop_due() {
            self.dispatch(event, cycles_late);
        }
    }

    fn dispatch(&mut self, event: Event, cycles_late: u64) {
        match event {
            Event::Generate(PsgChannel::Pulse1) => {
                self.pulse1
                    .generate(cycles_late, &mut self.scheduler, &self.bias)
            }
            Event::Generate(PsgChannel::Pulse2) => {
                self.pulse2
                    .generate(cycles_late, &mut self.scheduler, &self.bias)
            }
            Event::Generate(PsgChannel::Wave) => {
                self.wave
                    .generate(cycles_late, &mut self.scheduler, &self.bias)
            }
            Event::Generate(PsgChannel::Noise) => {
                self.noise
                    .generate(cycles_late, &mut self.scheduler, &self.bias)
            }
            Event::MixerTick => self.tick(cycles_late),
            Event::FrameTick => self.on_frame_tick(cycles_late),
        }
    }

    /// Mixer tick: combine the FIFO latches with the summed tone channels
    /// into one stereo frame and feed the resampler.
    fn tick(&mut self, cycles_late: u64) {
        if self.bias.resolution != self.resolution_old {
            self.resampler
                .set_sample_rates(self.bias.sample_rate(), self.config.host_sample_rate);
            self.resolution_old = self.bias.resolution;
            log::debug!("mixer sample rate changed to {} Hz", self.bias.sample_rate());
        }

        let frame = self.mix_frame();
        self.resampler.write(frame);

        self.scheduler.add(
            self.bias.sample_interval() as i64 - cycles_late as i64,
            Event::MixerTick,
        );
    }

    /// Current mixed stereo frame: direct audio at full 8-bit scale, tone
    /// channels summed and attenuated.
    pub fn mix_frame(&self) -> StereoSample {
        let psg = f32::from(
            self.pulse1.output() + self.pulse2.output() + self.wave.output() + self.noise.output(),
        );
        StereoSample::new(
            f32::from(self.latch[0]) / 256.0 + psg / 512.0,
            f32::from(self.latch[1]) / 256.0 + psg / 512.0,
        )
    }

    fn on_frame_tick(&mut self, cycles_late: u64) {
        let step = self.frame_step;
        self.frame_step = (step + 1) & 7;

        if step & 1 == 0 {
            self.pulse1.tick_length();
            self.pulse2.tick_length();
            self.wave.tick_length();
            self.noise.tick_length();
        }
        if step == 2 || step == 6 {
            self.pulse1.tick_sweep();
        }
        if step == 7 {
            self.pulse1.tick_envelope();
            self.pulse2.tick_envelope();
            self.noise.tick_envelope();
        }

        self.scheduler.add(
            FRAME_SEQUENCER_INTERVAL as i64 - cycles_late as i64,
            Event::FrameTick,
        );
    }

    /// Pop `times` samples from FIFO `id` into its latch. Each pop that
    /// leaves the FIFO half empty raises a refill request toward the DMA
    /// collaborator.
    pub fn latch_fifo(&mut self, id: FifoId, times: u32) {
        for _ in 0..times {
            let fifo = &mut self.fifo[id.index()];
            self.latch[id.index()] = fifo.read();
            if fifo.count() <= 16 {
                if let Some(handler) = self.dma_handler.as_mut() {
                    handler(id);
                }
            }
        }
    }

    /// Queue one direct-sound sample (CPU or DMA side).
    pub fn write_fifo(&mut self, id: FifoId, sample: i8) {
        self.fifo[id.index()].write(sample);
    }

    /// Read a byte from the audio register block (offsets relative to the
    /// I/O base, 0x60-0xA7). Unmapped offsets read zero.
    pub fn read_register(&self, address: u32) -> u8 {
        match address {
            0x60..=0x65 => self.pulse1.read_register((address - 0x60) as u8),
            0x68..=0x6D => self.pulse2.read_register((address - 0x68) as u8),
            0x70..=0x75 => self.wave.read_register((address - 0x70) as u8),
            0x78..=0x7D => self.noise.read_register((address - 0x78) as u8),
            0x88..=0x89 => self.bias.read_byte((address - 0x88) as u8),
            0x90..=0x9F => self.wave.read_ram((address - 0x90) as u8),
            _ => 0,
        }
    }

    /// Write a byte to the audio register block. Unmapped offsets are
    /// ignored; FIFO slots at 0xA0-0xA7 queue direct-sound samples.
    pub fn write_register(&mut self, address: u32, value: u8) {
        match address {
            0x60..=0x65 => self.pulse1.write_register((address - 0x60) as u8, value),
            0x68..=0x6D => self.pulse2.write_register((address - 0x68) as u8, value),
            0x70..=0x75 => self.wave.write_register((address - 0x70) as u8, value),
            0x78..=0x7D => self.noise.write_register((address - 0x78) as u8, value),
            0x88..=0x89 => self.bias.write_byte((address - 0x88) as u8, value),
            0x90..=0x9F => self.wave.write_ram((address - 0x90) as u8, value),
            0xA0..=0xA3 => self.fifo[0].write(value as i8),
            0xA4..=0xA7 => self.fifo[1].write(value as i8),
            _ => {}
        }
    }

    /// Whether a host audio device is currently attached. `false` means
    /// the pipeline is running silent (device open failed or was lost).
    #[cfg(feature = "streaming")]
    pub fn has_audio_device(&self) -> bool {
        self.device.is_some()
    }

    #[cfg(feature = "streaming")]
    fn reacquire_device(&mut self) {
        // Close before reopening; a failed open leaves the pipeline
        // running with a starved buffer, which the callback masks.
        self.device = None;
        match AudioDevice::new(self.config.host_sample_rate, Arc::clone(&self.buffer)) {
            Ok(device) => self.device = Some(device),
            Err(err) => log::warn!("audio device unavailable, output is silent: {err}"),
        }
    }
}

impl fmt::Debug for Apu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Apu")
            .field("bias", &self.bias)
            .field("latch", &self.latch)
            .field("frame_step", &self.frame_step)
            .field("pending_events", &self.scheduler.pending())
            .finish()
    }
}
