//! Noise channel
//!
//! Pseudo-random bitstream generator clocked by a divisor/shift pair. The
//! channel keeps a single generation event alive on the scheduler at all
//! times (even while muted) and re-arms it from inside its own firing.
//!
//! When the channel generates faster than the mixer samples it, the
//! intermediate generation steps would never be read; they are folded into
//! one wake-up via `skip_count`, advancing the LFSR without recomputing the
//! output so the statistical noise character stays correct.

use crate::apu::registers::Bias;
use crate::apu::sequencer::Sequencer;
use crate::scheduler::{Event, PsgChannel, Scheduler};

/// Base cycle divisor per frequency-ratio code. Ratio 0 is special-cased
/// to divisor 8, matching hardware where a zero code still yields a
/// nonzero rate.
const DIVISOR_TABLE: [u64; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

/// LFSR feedback width (bit 3 of the frequency register).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfsrWidth {
    /// 15-bit sequence.
    Long,
    /// 7-bit sequence (short, metallic-sounding loop).
    Short,
}

impl LfsrWidth {
    fn from_bit(bit: u8) -> Self {
        if bit != 0 {
            LfsrWidth::Short
        } else {
            LfsrWidth::Long
        }
    }

    fn bit(self) -> u8 {
        match self {
            LfsrWidth::Long => 0,
            LfsrWidth::Short => 1,
        }
    }

    /// Tap mask XOR-ed into the register when the shifted-out bit is set.
    fn taps(self) -> u16 {
        match self {
            LfsrWidth::Long => 0x6000,
            LfsrWidth::Short => 0x0060,
        }
    }

    /// Pattern the register is reseeded to on trigger.
    fn seed(self) -> u16 {
        match self {
            LfsrWidth::Long => 0x4000,
            LfsrWidth::Short => 0x0040,
        }
    }
}

/// The noise tone generator.
#[derive(Debug)]
pub struct NoiseChannel {
    /// Length/envelope sequencing unit (sweep statically disabled).
    pub sequencer: Sequencer,
    frequency_shift: u8,
    frequency_ratio: u8,
    width: LfsrWidth,
    length_enable: bool,
    dac_enable: bool,
    enabled: bool,
    lfsr: u16,
    sample: i16,
    skip_count: u64,
}

impl NoiseChannel {
    /// Create the channel in its reset state. The first generation event
    /// is armed by [`reset`](Self::reset).
    pub fn new() -> Self {
        NoiseChannel {
            sequencer: Sequencer::new(64, true, false),
            frequency_shift: 0,
            frequency_ratio: 0,
            width: LfsrWidth::Long,
            length_enable: false,
            dac_enable: false,
            enabled: false,
            lfsr: 0,
            sample: 0,
            skip_count: 0,
        }
    }

    /// Re-initialize all state and arm the first generation event at the
    /// slowest legal rate.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        self.sequencer.reset();

        self.frequency_shift = 0;
        self.frequency_ratio = 0;
        self.width = LfsrWidth::Long;
        self.length_enable = false;
        self.dac_enable = false;
        self.enabled = false;

        self.lfsr = 0;
        self.sample = 0;
        self.skip_count = 0;

        scheduler.add(
            Self::synthesis_interval(7, 15) as i64,
            Event::Generate(PsgChannel::Noise),
        );
    }

    /// Cycles between generation steps for a divisor code and shift:
    /// `divisor_table[ratio] << shift`.
    pub fn synthesis_interval(frequency_ratio: u8, frequency_shift: u8) -> u64 {
        DIVISOR_TABLE[(frequency_ratio & 7) as usize] << frequency_shift
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

    fn shift_lfsr(&mut self) -> bool {
        let carry = self.lfsr & 1 != 0;
        self.lfsr >>= 1;
        if carry {
            self.lfsr ^= self.width.taps();
        }
        carry
    }

    /// Generation event handler: produce the next sample and re-arm.
    ///
    /// The length gate is checked here, at generation time, not at the
    /// cycle the counter reaches zero; audible output can linger up to one
    /// generation interval past expiry. Hardware does the same.
    pub fn generate(&mut self, cycles_late: u64, scheduler: &mut Scheduler, bias: &Bias) {
        if self.length_enable && self.sequencer.length <= 0 {
            self.enabled = false;
            self.sample = 0;
            scheduler.add(
                Self::synthesis_interval(7, 15) as i64 - cycles_late as i64,
                Event::Generate(PsgChannel::Noise),
            );
            return;
        }

        if self.shift_lfsr() {
            self.sample = 8;
        } else {
            self.sample = -8;
        }

        self.sample *= self.sequencer.envelope.current_volume as i16;

        if !self.dac_enable {
            self.sample = 0;
        }

        // Steps the mixer will never sample: advance the LFSR, discard the
        // output.
        for _ in 0..self.skip_count {
            self.shift_lfsr();
        }

        let mut noise_interval = Self::synthesis_interval(self.frequency_ratio, self.frequency_shift);
        let mixer_interval = bias.sample_interval();

        // Generating above the mixer rate would only produce samples that
        // get skipped; wake at the mixer rate instead and fold the
        // intermediate steps into skip_count.
        if noise_interval < mixer_interval {
            self.skip_count = mixer_interval / noise_interval - 1;
            noise_interval = mixer_interval;
        } else {
            self.skip_count = 0;
        }

        scheduler.add(
            noise_interval as i64 - cycles_late as i64,
            Event::Generate(PsgChannel::Noise),
        );
    }

    /// Read a byte from the channel's register block (offsets 0-5).
    pub fn read_register(&self, offset: u8) -> u8 {
        match offset {
            1 => self.sequencer.envelope.read(),
            4 => {
                self.frequency_ratio | (self.width.bit() << 3) | (self.frequency_shift << 4)
            }
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
                self.sequencer.length = 64 - (value & 63) as i32;
            }
            1 => {
                self.sequencer.envelope.write(value);

                self.dac_enable = (value >> 3) != 0;
                if !self.dac_enable {
                    self.enabled = false;
                }
            }
            4 => {
                self.frequency_ratio = value & 7;
                self.width = LfsrWidth::from_bit((value >> 3) & 1);
                self.frequency_shift = value >> 4;
            }
            5 => {
                self.length_enable = value & 0x40 != 0;

                if value & 0x80 != 0 {
                    if self.dac_enable {
                        self.enabled = true;
                    }
                    self.sequencer.restart();
                    self.lfsr = self.width.seed();
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
}

impl Default for NoiseChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed_channel() -> (NoiseChannel, Scheduler) {
        let mut scheduler = Scheduler::new();
        let mut channel = NoiseChannel::new();
        channel.reset(&mut scheduler);
        (channel, scheduler)
    }

    /// Reference LFSR step, mirroring the hardware rule.
    fn reference_step(lfsr: u16, width: LfsrWidth) -> u16 {
        let carry = lfsr & 1 != 0;
        let mut next = lfsr >> 1;
        if carry {
            next ^= width.taps();
        }
        next
    }

    #[test]
    fn synthesis_interval_follows_divisor_table() {
        let table = [8u64, 16, 32, 48, 64, 80, 96, 112];
        for ratio in 0..8u8 {
            for shift in 0..16u8 {
                assert_eq!(
                    NoiseChannel::synthesis_interval(ratio, shift),
                    table[ratio as usize] << shift,
                    "ratio {ratio} shift {shift}"
                );
            }
        }
    }

    #[test]
    fn trigger_reseeds_lfsr_per_width() {
        let (mut channel, _sched) = armed_channel();
        channel.write_register(1, 0xF0); // DAC on
        channel.write_register(4, 0x00); // 15-bit width
        channel.write_register(5, 0x80);
        assert!(channel.is_enabled());
        assert_eq!(channel.lfsr, 0x4000);

        channel.write_register(4, 0x08); // 7-bit width
        channel.write_register(5, 0x80);
        assert_eq!(channel.lfsr, 0x0040);
    }

    #[test]
    fn trigger_without_dac_stays_silent() {
        let (mut channel, _sched) = armed_channel();
        channel.write_register(1, 0x00); // DAC off
        channel.write_register(5, 0x80);
        assert!(!channel.is_enabled());
        assert_eq!(channel.lfsr, 0x4000, "LFSR reseeds regardless");
    }

    #[test]
    fn length_expiry_mutes_at_next_generation() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default();

        channel.write_register(1, 0xF2);
        channel.write_register(0, 63); // length = 1
        channel.write_register(5, 0xC0 | 0x80);
        assert!(channel.is_enabled());

        channel.tick_length();
        assert_eq!(channel.sequencer.length, 0);
        assert!(channel.is_enabled(), "gate only applies at generation time");

        channel.generate(0, &mut sched, &bias);
        assert!(!channel.is_enabled());
        assert_eq!(channel.output(), 0);
    }

    #[test]
    fn muted_channel_keeps_event_chain_alive() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default();
        sched.advance(u64::MAX >> 1);
        while sched.pop_due().is_some() {}

        channel.length_enable = true;
        channel.sequencer.length = 0;
        channel.generate(0, &mut sched, &bias);
        assert_eq!(sched.pending(), 1, "re-armed at the slowest legal rate");
    }

    #[test]
    fn sample_is_scaled_by_envelope_volume() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default();

        channel.write_register(1, 0xA0); // initial volume 10, DAC on
        channel.write_register(4, 0x77); // slow: ratio 7, shift 7
        channel.write_register(5, 0x80);

        channel.generate(0, &mut sched, &bias);
        assert_eq!(channel.output().abs(), 80);
    }

    #[test]
    fn dac_off_is_a_hard_mute() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default();

        channel.write_register(1, 0xF0);
        channel.write_register(5, 0x80);
        channel.dac_enable = false;
        channel.generate(0, &mut sched, &bias);
        assert_eq!(channel.output(), 0);
    }

    #[test]
    fn envelope_register_read_back_is_lossless() {
        let (mut channel, _sched) = armed_channel();
        for value in [0x00u8, 0x57, 0xA3, 0xFF] {
            channel.write_register(1, value);
            assert_eq!(channel.read_register(1), value);
        }
    }

    #[test]
    fn frequency_register_read_back_is_lossless() {
        let (mut channel, _sched) = armed_channel();
        channel.write_register(4, 0xAD);
        assert_eq!(channel.read_register(4), 0xAD);
    }

    #[test]
    fn skip_count_matches_rate_ratio() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default(); // resolution 0: mixer interval 512

        channel.write_register(1, 0xF0);
        channel.write_register(4, 0x00); // ratio 0, shift 0: interval 8
        channel.write_register(5, 0x80);

        sched.advance(u64::MAX >> 1);
        while sched.pop_due().is_some() {}

        channel.generate(0, &mut sched, &bias);
        assert_eq!(channel.skip_count, 512 / 8 - 1);

        // Effective re-arm interval is clamped up to the mixer interval.
        let base = sched.now();
        sched.advance(511);
        assert_eq!(sched.pop_due(), None);
        sched.advance(1);
        let (event, late) = sched.pop_due().unwrap();
        assert_eq!(event, Event::Generate(PsgChannel::Noise));
        assert_eq!(late, 0);
        assert_eq!(sched.now() - base, 512);
    }

    #[test]
    fn one_firing_advances_lfsr_by_skip_count_plus_one() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default();

        channel.write_register(1, 0xF0);
        channel.write_register(4, 0x00);
        channel.write_register(5, 0x80);

        // First firing establishes the steady-state skip count.
        channel.generate(0, &mut sched, &bias);
        let skip = channel.skip_count;
        assert!(skip > 0);

        let mut expected = channel.lfsr;
        for _ in 0..skip + 1 {
            expected = reference_step(expected, LfsrWidth::Long);
        }

        channel.generate(0, &mut sched, &bias);
        assert_eq!(channel.lfsr, expected);
    }

    #[test]
    fn natural_rate_runs_without_skipping() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default();

        channel.write_register(1, 0xF0);
        channel.write_register(4, 0x37); // ratio 7, shift 3: interval 896
        channel.write_register(5, 0x80);

        channel.generate(0, &mut sched, &bias);
        assert_eq!(channel.skip_count, 0);
    }

    #[test]
    fn short_width_stays_in_low_bits() {
        let (mut channel, mut sched) = armed_channel();
        let bias = Bias::default();

        channel.write_register(1, 0xF0);
        channel.write_register(4, 0x3F); // 7-bit width, slow rate
        channel.write_register(5, 0x80);

        for _ in 0..64 {
            channel.generate(0, &mut sched, &bias);
            assert!(channel.lfsr <= 0x7F, "7-bit sequence: {:#06x}", channel.lfsr);
        }
    }
}
