//! Clock-domain-crossing and timing helpers
//!
//! Status flags coming back from the transceiver are asynchronous to the
//! clock of whichever sequencer consumes them. The only crossing primitive
//! used anywhere in this design is the two-stage synchronizer: the consumer
//! sees a clean level that is one to two ticks stale, never a glitch.
//! Anything that assumes instantaneous visibility of a status line is a
//! bug.

/// Two-stage synchronizer for a single status flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncLatch {
    meta: bool,
    stable: bool,
}

impl SyncLatch {
    /// Shift `raw` in by one stage and return the synchronized level.
    pub fn latch(&mut self, raw: bool) -> bool {
        self.stable = self.meta;
        self.meta = raw;
        self.stable
    }

    /// The synchronized level as of the last `latch` call.
    #[must_use]
    pub fn get(&self) -> bool {
        self.stable
    }
}

/// Rising-edge detector over a level-sensitive flag.
///
/// Some status lines (phase alignment done in particular) are held high
/// once asserted; advancing on the level would retrigger forever, so the
/// sequencer debounces them to the rising edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    prev: bool,
}

impl EdgeDetector {
    /// `reset_high` mirrors the register reset value; starting high
    /// suppresses a spurious edge on the very first sample.
    #[must_use]
    pub fn new(reset_high: bool) -> Self {
        Self { prev: reset_high }
    }

    /// Feed one sample, returning true on a low-to-high transition.
    pub fn rising(&mut self, level: bool) -> bool {
        let edge = level && !self.prev;
        self.prev = level;
        edge
    }

    pub fn reset(&mut self, level: bool) {
        self.prev = level;
    }
}

/// Counts ticks while `wait` is held and reports completion once `period`
/// ticks have elapsed. Dropping `wait` clears the count.
#[derive(Debug, Clone, Copy)]
pub struct WaitTimer {
    period: u32,
    count: u32,
}

impl WaitTimer {
    #[must_use]
    pub fn new(period: u32) -> Self {
        Self { period, count: 0 }
    }

    /// One tick. Returns true once the full period has elapsed with `wait`
    /// held the whole time.
    pub fn tick(&mut self, wait: bool) -> bool {
        if wait {
            if self.count < self.period {
                self.count += 1;
            }
        } else {
            self.count = 0;
        }
        self.done()
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.count >= self.period
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }
}
