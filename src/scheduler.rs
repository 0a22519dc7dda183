//! Cycle-granular event scheduler
//!
//! All timing in the APU is event-driven: each tone channel, the mixer and
//! the frame sequencer keep exactly one pending event in this queue and
//! re-arm it from inside their own firing. Events fire in non-decreasing
//! deadline order; ties break by insertion order.
//!
//! The scheduler owns all event storage. An event is a plain tag naming its
//! owner, never a closure, so firing cannot re-enter the component that
//! scheduled it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One of the four tone generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PsgChannel {
    /// Pulse channel 1 (carries the sweep unit)
    Pulse1,
    /// Pulse channel 2
    Pulse2,
    /// Wave channel
    Wave,
    /// Noise channel
    Noise,
}

/// A schedulable event tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A tone channel recomputes its sample and re-arms itself.
    Generate(PsgChannel),
    /// The mixer reads all channel outputs and feeds the resampler.
    MixerTick,
    /// 512 Hz frame tick driving length/sweep/envelope stepping.
    FrameTick,
}

#[derive(Debug)]
struct Entry {
    deadline: u64,
    seq: u64,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so that BinaryHeap pops the earliest deadline first,
    // with insertion order breaking ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Event queue over the emulated cycle clock.
///
/// The clock advances in whatever increments the embedding emulator
/// reports ([`advance`](Self::advance)); due events are then drained with
/// [`pop_due`](Self::pop_due), which hands back how many cycles the clock
/// had already moved past the deadline so the handler can compensate when
/// re-arming.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: u64,
    seq: u64,
    queue: BinaryHeap<Entry>,
}

impl Scheduler {
    /// Create an empty scheduler at cycle zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in emulated cycles.
    #[inline]
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Number of pending events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedule `event` to fire `delay` cycles from now.
    ///
    /// A negative delay (re-arming with `interval - cycles_late` while
    /// more than one interval behind) lands the deadline in the past; the
    /// event fires on the next [`pop_due`](Self::pop_due) with the
    /// remaining backlog as its lateness, so a chain catches up tick by
    /// tick instead of losing firings.
    pub fn add(&mut self, delay: i64, event: Event) {
        let deadline = if delay >= 0 {
            self.now + delay as u64
        } else {
            self.now.saturating_sub(delay.unsigned_abs())
        };
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Entry {
            deadline,
            seq,
            event,
        });
    }

    /// Advance the clock by `cycles` without firing anything.
    #[inline]
    pub fn advance(&mut self, cycles: u64) {
        self.now += cycles;
    }

    /// Pop the next event whose deadline has been reached.
    ///
    /// Returns the event together with `cycles_late`, the distance the
    /// clock has already advanced past the deadline.
    pub fn pop_due(&mut self) -> Option<(Event, u64)> {
        match self.queue.peek() {
            Some(entry) if entry.deadline <= self.now => {}
            _ => return None,
        }
        let entry = self.queue.pop()?;
        Some((entry.event, self.now - entry.deadline))
    }

    /// Drop every pending event. The clock keeps its value.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
