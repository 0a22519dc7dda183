//! Pulse channels
//!
//! Two square-wave generators sharing the noise channel's sequencing
//! skeleton: the sample-generation rule is an 8-step duty pattern instead
//! of an LFSR shift. Channel 1 carries the frequency sweep unit; channel 2
//! has it statically disabled.

use crate::apu::registers::Bias;
use crate::apu::sequencer::{Sequencer, SweepStep};
use crate::scheduler::{Event, PsgChannel, Scheduler};

/// 8-step waveforms for the four duty settings (12.5/25/50/75 %).
const DUTY_PATTERNS: [[i16; 8]; 4] = [
    [-8, -8, -8, -8, -8, -8, -8, 8],
    [8, -8, -8, -8, -8, -8, -8, 8],
    [8, -8, -8, -8, -8, 8, 8, 8],
    [-8, 8, 8, 8, 8, 8, 8, -8],
];

/// A square-wave tone generator.
#[derive(Debug)]
pub struct PulseChannel {
    /// Length/envelope/sweep sequencing unit.
    pub sequencer: Sequencer,
    tag: PsgChannel,
    duty: u8,
    frequency: u16,
    length_enable: bool,
    dac_enable: bool,
    enabled: bool,
    phase: u8,
    sample: i16,
    skip_count: u64,
}

impl PulseChannel {
    /// Create pulse channel 1 or 2; only channel 1 gets a live sweep unit.
    pub fn new(tag: PsgChannel, sweep: bool) -> Self {
        PulseChannel {
            sequencer: Sequencer::new(64, true, sweep),
            tag,
            duty: 0,
            frequency: 0,
            length_enable: false,
            dac_enable: false,
            enabled: false,
            phase: 0,
            sample: 0,
            skip_count: 0,
        }
    }

    /// Re-initialize all state and arm the first generation event at the
    /// slowest legal rate.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        self.sequencer.reset();

        self.duty = 0;
        self.frequency = 0;
        self.length_enable = false;
        self.dac_enable = false;
        self.enabled = false;

        self.phase = 0;
        self.sample = 0;
        self.skip_count = 0;

        scheduler.add(Self::synthesis_interval(0) as i64, Event::Generate(self.tag));
    }

    /// Cycles per duty step: `16 * (2048 - frequency)`.
    pub fn synthesis_interval(frequency: u16) -> u64 {
        16 * (2048 - frequency as u64)
    }

    /// Current output amplitude (post-envelope, zero when the DAC is off).
    #[inline]
    pub fn output(&self) -> i16 {
        self.sample
    }

    /// Whether the channel is audible.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Generation event handler: step the duty pattern and re-arm. Same
    /// length-gate-at-generation-time behavior as the noise channel.
    pub fn generate(&mut self, cycles_late: u64, scheduler: &mut Scheduler, bias: &Bias) {
        if self.length_enable && self.sequencer.length <= 0 {
            self.enabled = false;
            self.sample = 0;
            scheduler.add(
                Self::synthesis_interval(0) as i64 - cycles_late as i64,
                Event::Generate(self.tag),
            );
            return;
        }

        self.phase = (self.phase + 1) & 7;
        self.sample = DUTY_PATTERNS[self.duty as usize][self.phase as usize];
        self.sample *= self.sequencer.envelope.current_volume as i16;

        if !self.dac_enable {
            self.sample = 0;
        }

        // Steps the mixer will never sample only move the duty phase.
        self.phase = (self.phase as u64 + self.skip_count) as u8 & 7;

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
            Event::Generate(self.tag),
        );
    }

    /// Read a byte from the channel's register block (offsets 0-5).
    pub fn read_register(&self, offset: u8) -> u8 {
        match offset {
            0 => self.sequencer.sweep.read(),
            2 => self.duty << 6,
            3 => self.sequencer.envelope.read(),
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
                self.sequencer.sweep.write(value);
            }
            2 => {
                self.sequencer.length = 64 - (value & 63) as i32;
                self.duty = value >> 6;
            }
            3 => {
                self.sequencer.envelope.write(value);

                self.dac_enable = (value >> 3) != 0;
                if !self.dac_enable {
                    self.enabled = false;
                }
            }
            4 => {
                self.frequency = (self.frequency & 0x700) | value as u16;
            }
            5 => {
                self.frequency = (self.frequency & 0xFF) | (((value & 7) as u16) << 8);
                self.length_enable = value & 0x40 != 0;

                if value & 0x80 != 0 {
                    if self.dac_enable {
                        self.enabled = true;
                    }
                    self.sequencer.restart();
                }
            }
            _ => {}
        }
    }

    pub(crate) fn tick_length(&mut self) {
        self.sequencer.tick_length(self.length_enable);
    }

    pub(crate) fn tick_envelope(&mut self) {
        self.sequencer.envelope.tick();
    }

    /// One 128 Hz sweep period; an overflow silences the channel.
    pub(crate) fn tick_sweep(&mut self) {
        match self.sequencer.sweep.tick(self.frequency) {
            SweepStep::Idle => {}
            SweepStep::Updated(frequency) => self.frequency = frequency,
            SweepStep::Overflow => self.enabled = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed_channel(sweep: bool) -> (PulseChannel, Scheduler) {
        let mut scheduler = Scheduler::new();
        let mut channel = PulseChannel::new(PsgChannel::Pulse1, sweep);
        channel.reset(&mut scheduler);
        (channel, scheduler)
    }

    #[test]
    fn synthesis_interval_scales_with_frequency() {
        assert_eq!(PulseChannel::synthesis_interval(0), 32768);
        assert_eq!(PulseChannel::synthesis_interval(2047), 16);
        assert_eq!(PulseChannel::synthesis_interval(1024), 16 * 1024);
    }

    #[test]
    fn duty_pattern_repeats_over_eight_steps() {
        let (mut channel, mut sched) = armed_channel(false);
        let bias = Bias::default();

        channel.write_register(3, 0xF0); // volume 15, DAC on
        channel.write_register(2, 0x80); // duty 50 %
        channel.write_register(4, 0x00); // frequency 0: interval 32768
        channel.write_register(5, 0x80);

        let mut highs = 0;
        for _ in 0..8 {
            channel.generate(0, &mut sched, &bias);
            if channel.output() > 0 {
                highs += 1;
            }
        }
        assert_eq!(highs, 4, "50 % duty is high for four of eight steps");
    }

    #[test]
    fn skip_count_folds_into_duty_phase() {
        let (mut channel, mut sched) = armed_channel(false);
        let bias = Bias::default(); // mixer interval 512

        channel.write_register(3, 0xF0);
        channel.write_register(4, 0xFF); // frequency 2047: interval 16
        channel.write_register(5, 0x87);

        channel.generate(0, &mut sched, &bias);
        assert_eq!(channel.skip_count, 512 / 16 - 1);

        let phase = channel.phase;
        channel.generate(0, &mut sched, &bias);
        let advanced = (phase as u64 + channel.skip_count + 1) & 7;
        assert_eq!(channel.phase as u64, advanced);
    }

    #[test]
    fn sweep_overflow_silences_channel_one() {
        let (mut channel, mut sched) = armed_channel(true);
        let bias = Bias::default();

        channel.write_register(3, 0xF0);
        channel.write_register(0, 0b0001_0001); // divider 1, increase, shift 1
        channel.write_register(4, 0xFF);
        channel.write_register(5, 0x87); // frequency 0x7FF
        assert!(channel.is_enabled());

        channel.tick_sweep();
        assert!(!channel.is_enabled(), "2047 + 1023 overflows the range");

        channel.generate(0, &mut sched, &bias);
        assert_eq!(channel.output(), 0, "silenced channel outputs nothing");
    }

    #[test]
    fn sweep_moves_frequency_between_generations() {
        let (mut channel, _sched) = armed_channel(true);

        channel.write_register(3, 0xF0);
        channel.write_register(0, 0b0001_0010); // divider 1, increase, shift 2
        channel.write_register(4, 0x00);
        channel.write_register(5, 0x84); // frequency 0x400
        channel.tick_sweep();
        assert_eq!(channel.frequency, 0x400 + 0x100);
    }

    #[test]
    fn length_expiry_mutes_at_next_generation() {
        let (mut channel, mut sched) = armed_channel(false);
        let bias = Bias::default();

        channel.write_register(3, 0xF0);
        channel.write_register(2, 63); // length = 1
        channel.write_register(5, 0xC0);
        assert!(channel.is_enabled());

        channel.tick_length();
        channel.generate(0, &mut sched, &bias);
        assert!(!channel.is_enabled());
        assert_eq!(channel.output(), 0);
    }

    #[test]
    fn frequency_write_spans_two_registers() {
        let (mut channel, _sched) = armed_channel(false);
        channel.write_register(4, 0xAB);
        channel.write_register(5, 0x05);
        assert_eq!(channel.frequency, 0x5AB);
    }
}
