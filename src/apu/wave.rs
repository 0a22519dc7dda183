//! Wave channel
//!
//! Plays 4-bit samples out of a banked 2x16-byte wave RAM through the
//! shared sequencing skeleton. There is no envelope; amplitude comes from
//! a 2-bit volume code plus a force-75 % override. The playback-enable bit
//! acts as the channel's DAC gate.

use crate::apu::registers::Bias;
use crate::apu::sequencer::Sequencer;
use crate::scheduler::{Event, PsgChannel, Scheduler};

/// Nibbles per wave RAM bank.
const BANK_SAMPLES: u8 = 32;

/// The wave-memory tone generator.
#[derive(Debug)]
pub struct WaveChannel {
    /// Length sequencing unit (envelope and sweep statically disabled).
    pub sequencer: Sequencer,
    playing: bool,
    dimension: bool,
    bank: u8,
    volume: u8,
    force_volume: bool,
    frequency: u16,
    length_enable: bool,
    enabled: bool,
    position: u8,
    playback_bank: u8,
    sample: i16,
    skip_count: u64,
    wave_ram: [[u8; 16]; 2],
}

impl WaveChannel {
    /// Create the channel in its reset state. The first generation event
    /// is armed by [`reset`](Self::reset).
    pub fn new() -> Self {
        WaveChannel {
            sequencer: Sequencer::new(256, false, false),
            playing: false,
            dimension: false,
            bank: 0,
            volume: 0,
            force_volume: false,
            frequency: 0,
            length_enable: false,
            enabled: false,
            position: 0,
            playback_bank: 0,
            sample: 0,
            skip_count: 0,
            wave_ram: [[0; 16]; 2],
        }
    }

    /// Re-initialize all state (wave RAM included) and arm the first
    /// generation event at the slowest legal rate.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        self.sequencer.reset();

        self.playing = false;
        self.dimension = false;
        self.bank = 0;
        self.volume = 0;
        self.force_volume = false;
        self.frequency = 0;
        self.length_enable = false;
        self.enabled = false;

        self.position = 0;
        self.playback_bank = 0;
        self.sample = 0;
        self.skip_count = 0;
        self.wave_ram = [[0; 16]; 2];

        scheduler.add(
            Self::synthesis_interval(0) as i64,
            Event::Generate(PsgChannel::Wave),
        );
    }

    /// Cycles per nibble: `8 * (2048 - frequency)`.
    pub fn synthesis_interval(frequency: u16) -> u64 {
        8 * (2048 - frequency as u64)
    }

    /// Current output amplitude (post-volume, zero while playback is off).
    #[inline]
    pub fn output(&self) -> i16 {
        self.sample
    }

    /// Whether the channel is audible.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn step_position(&mut self) {
        self.position += 1;
        if self.position == BANK_SAMPLES {
            self.position = 0;
            if self.dimension {
                self.playback_bank ^= 1;
            }
        }
    }

    fn current_nibble(&self) -> u8 {
        let byte = self.wave_ram[self.playback_bank as usize][(self.position / 2) as usize];
        if self.position & 1 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        }
    }

    /// Generation event handler: step the wave position and re-arm. Same
    /// length-gate-at-generation-time behavior as the noise channel.
    pub fn generate(&mut self, cycles_late: u64, scheduler: &mut Scheduler, bias: &Bias) {
        if self.length_enable && self.sequencer.length <= 0 {
            self.enabled = false;
            self.sample = 0;
            scheduler.add(
                Self::synthesis_interval(0) as i64 - cycles_late as i64,
                Event::Generate(PsgChannel::Wave),
            );
            return;
        }

        self.step_position();

        let raw = self.current_nibble() as i16 - 8;
        self.sample = if self.force_volume {
            raw * 3
        } else {
            match self.volume {
                0 => 0,
                1 => raw * 4,
                2 => raw * 2,
                _ => raw,
            }
        };

        if !self.playing {
            self.sample = 0;
        }

        // Steps the mixer will never sample only move the play position.
        for _ in 0..self.skip_count {
            self.step_position();
        }

        let mut interval = Self::synthesis_interval(self.frequency);
        let mixer_interval = bias.sample_interval();

        if interval < mixer_interval {
            self.skip_count = mixer_interval / interval - 1;
            interval = mixer_interval;
        } else {
            self.skip_count = 0;
        }

        scheduler.add(
            interval as i64 - cycles_late as i64,
            Event::Generate(PsgChannel::Wave),
        );
    }

    /// Read a byte from the channel's register block (offsets 0-5).
    pub fn read_register(&self, offset: u8) -> u8 {
        match offset {
            0 => {
                (u8::from(self.dimension) << 5)
                    | (self.bank << 6)
                    | (u8::from(self.playing) << 7)
            }
            3 => (self.volume << 5) | (u8::from(self.force_volume) << 7),
            5 => {
                if self.length_enable {
                    0x40
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// Write a byte to the channel's register block (offsets 0-5).
    pub fn write_register(&mut self, offset: u8, value: u8) {
        match offset {
            0 => {
                self.dimension = value & 0x20 != 0;
                self.bank = (value >> 6) & 1;
                self.playing = value & 0x80 != 0;
                if !self.playing {
                    self.enabled = false;
                }
            }
            2 => {
                self.sequencer.length = 256 - value as i32;
            }
            3 => {
                self.volume = (value >> 5) & 3;
                self.force_volume = value & 0x80 != 0;
            }
            4 => {
                self.frequency = (self.frequency & 0x700) | value as u16;
            }
            5 => {
                self.frequency = (self.frequency & 0xFF) | (((value & 7) as u16) << 8);
                self.length_enable = value & 0x40 != 0;

                if value & 0x80 != 0 {
                    if self.playing {
                        self.enabled = true;
                    }
                    self.sequencer.restart();
                    self.position = 0;
                    self.playback_bank = self.bank;
                }
            }
            _ => {}
        }
    }

    /// Read a wave RAM byte. Accesses go to the bank not selected for
    /// playback, as on hardware.
    pub fn read_ram(&self, index: u8) -> u8 {
        self.wave_ram[(self.bank ^ 1) as usize][(index & 15) as usize]
    }

    /// Write a wave RAM byte (to the bank not selected for playback).
    pub fn write_ram(&mut self, index: u8, value: u8) {
        self.wave_ram[(self.bank ^ 1) as usize][(index & 15) as usize] = value;
    }

    pub(crate) fn tick_length(&mut self) {
        self.sequencer.tick_length(self.length_enable);
    }
}

impl Default for WaveChannel {
    fn default() -> Self {
        Self::new()
    }
}
