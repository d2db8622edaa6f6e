//! Brute-force word alignment monitor for the recovered bit stream
//!
//! Rather than a fast correlator, this is the two-phase scheme the
//! reference designs use: every recovered-clock tick the newest sample is
//! scanned for the comma at all bit offsets (fast accumulation), and at a
//! much slower fixed cadence a verdict is taken from whether the comma
//! counter moved (slow verdict). A counter that is still moving means the
//! framing is still drifting; a counter that stopped after having found
//! the comma means the link is stable. Alignment loss therefore costs tens
//! of milliseconds to detect, in exchange for tolerating noisy or partial
//! comma-detect behavior from the hardware.

use thiserror::Error;
use tracing::trace;

/// The positive-disparity comma of 8b/10b framing.
pub const PCOMMA: u32 = 0b0101111100;
/// The negative-disparity comma (bitwise complement of [`PCOMMA`]).
pub const MCOMMA: u32 = 0b1010000011;
/// Width of the comma pattern in bits.
pub const COMMA_WIDTH: u32 = 10;

#[derive(Debug, Error)]
pub enum Error {
    #[error("word width {0} cannot hold the {COMMA_WIDTH} bit comma")]
    WordTooNarrow(u32),
    #[error("word width {0} exceeds the supported 32 bits")]
    WordTooWide(u32),
}

/// Verdict of one slow check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignVerdict {
    /// The framing is stable; the link may carry data.
    pub ready: bool,
    /// The framing drifted (or was never found); the RX direction must
    /// re-train from scratch.
    pub restart: bool,
}

/// Continuously validates that the receive stream is word-aligned to the
/// comma, and demands RX retraining when it is not.
///
/// Owned state is exactly the alignment bookkeeping: which stream offset
/// the comma was last seen at, how many times it has hopped, and the
/// verdict history. The owner resets it whenever the RX sequencer
/// re-enters its ready stage.
#[derive(Debug)]
pub struct ClockAligner {
    word_width: u32,
    /// Previous sample, for matches straddling a word boundary.
    prev: u32,
    /// Stream offset (mod word width) the comma was last found at.
    locked_offset: Option<u32>,
    /// Bumped every time the comma shows up somewhere new.
    comma_count: u32,
    /// Counter value at the previous check.
    prev_count: u32,
    comma_seen: bool,
    consecutive_good_checks: u32,
    ready: bool,
}

impl ClockAligner {
    pub fn new(word_width: u32) -> Result<Self, Error> {
        if word_width < COMMA_WIDTH {
            return Err(Error::WordTooNarrow(word_width));
        }
        if word_width > 32 {
            return Err(Error::WordTooWide(word_width));
        }
        Ok(Self {
            word_width,
            prev: 0,
            locked_offset: None,
            comma_count: 0,
            prev_count: 0,
            comma_seen: false,
            consecutive_good_checks: 0,
            ready: false,
        })
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Consecutive checks that came back stable since the last rearm.
    #[must_use]
    pub fn consecutive_good_checks(&self) -> u32 {
        self.consecutive_good_checks
    }

    /// Back to the post-reset state: no comma ever seen, first verdict
    /// compares against a prior count of zero.
    pub fn reset(&mut self) {
        self.prev = 0;
        self.locked_offset = None;
        self.comma_count = 0;
        self.prev_count = 0;
        self.rearm();
    }

    /// Clear the verdict state while keeping the locked offset and its
    /// counter. Called when the RX direction re-enters ready: the comma
    /// must be seen again before any ready verdict, but an unchanged
    /// offset does not count as renewed drift, which is what lets the
    /// retrain loop converge instead of restarting forever.
    pub fn rearm(&mut self) {
        self.comma_seen = false;
        self.consecutive_good_checks = 0;
        self.ready = false;
    }

    /// Feed the newest recovered sample, one call per recovered-clock
    /// tick. Bits are stream-ordered LSB first: bit 0 of `sample` is the
    /// oldest bit of the word on the wire.
    pub fn observe(&mut self, sample: u32) {
        let w = self.word_width;
        let mask = (1u64 << COMMA_WIDTH) - 1;
        // Two consecutive words, older bits in the lower positions. Every
        // stream position shows up as exactly one offset of exactly one
        // window, one observation after the bits arrived.
        let window = u64::from(self.prev) | (u64::from(sample) << w);
        for offset in 0..w {
            let candidate = ((window >> offset) & mask) as u32;
            if candidate != PCOMMA && candidate != MCOMMA {
                continue;
            }
            self.comma_seen = true;
            if self.locked_offset != Some(offset) {
                // The comma hopped: the hunt is still on
                self.locked_offset = Some(offset);
                self.comma_count = self.comma_count.wrapping_add(1);
            }
        }
        self.prev = sample;
    }

    /// Take the slow periodic verdict. Called once per check period by the
    /// owner; a moving comma counter (or a comma never found at all) means
    /// the framing is not stable and RX must restart.
    pub fn check(&mut self) -> AlignVerdict {
        let moved = self.comma_count != self.prev_count;
        let verdict = if moved || !self.comma_seen {
            self.consecutive_good_checks = 0;
            self.ready = false;
            AlignVerdict {
                ready: false,
                restart: true,
            }
        } else {
            self.consecutive_good_checks += 1;
            self.ready = true;
            AlignVerdict {
                ready: true,
                restart: false,
            }
        };
        trace!(
            comma_count = self.comma_count,
            prev_count = self.prev_count,
            ready = verdict.ready,
            "alignment check"
        );
        self.prev_count = self.comma_count;
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 20;
    const CHECK_PERIOD: usize = 64;

    /// A stream of words carrying the comma at `offset` bits into each
    /// word, zeros elsewhere.
    fn observe_period(aligner: &mut ClockAligner, offset: u32) {
        for _ in 0..CHECK_PERIOD {
            aligner.observe(PCOMMA << offset);
        }
    }

    #[test]
    fn test_steady_offset_reports_ready_within_two_checks() {
        let mut aligner = ClockAligner::new(W).unwrap();
        observe_period(&mut aligner, 4);
        // First check: the counter moved from its prior of zero, so the
        // aligner is still hunting
        assert!(aligner.check().restart);
        assert!(!aligner.ready());
        observe_period(&mut aligner, 4);
        // Second check: counter stable, comma seen at a fixed offset
        let verdict = aligner.check();
        assert!(verdict.ready);
        assert!(!verdict.restart);
        assert!(aligner.ready());
    }

    #[test]
    fn test_slip_drops_ready_within_one_check_and_recovers() {
        let mut aligner = ClockAligner::new(W).unwrap();
        observe_period(&mut aligner, 4);
        aligner.check();
        observe_period(&mut aligner, 4);
        assert!(aligner.check().ready);

        // Simulate a bit slip: the comma hops to a new steady offset
        observe_period(&mut aligner, 9);
        let verdict = aligner.check();
        assert!(!verdict.ready);
        assert!(verdict.restart);

        // Two more periods at the new offset and the aligner is back
        observe_period(&mut aligner, 9);
        assert!(aligner.check().ready);
        observe_period(&mut aligner, 9);
        assert!(aligner.check().ready);
    }

    #[test]
    fn test_no_comma_never_reports_ready() {
        let mut aligner = ClockAligner::new(W).unwrap();
        for _ in 0..10 * CHECK_PERIOD {
            aligner.observe(0);
        }
        for _ in 0..10 {
            let verdict = aligner.check();
            assert!(!verdict.ready);
            assert!(verdict.restart);
        }
    }

    #[test]
    fn test_first_check_with_zero_observations_is_searching() {
        let mut aligner = ClockAligner::new(W).unwrap();
        // No samples at all: prior is defined as zero, so the verdict is
        // "still searching", never a spurious ready
        let verdict = aligner.check();
        assert!(!verdict.ready);
        assert!(verdict.restart);
    }

    #[test]
    fn test_comma_straddling_word_boundary_is_found() {
        let mut aligner = ClockAligner::new(W).unwrap();
        // Offset 15: bits 15..20 land in one word, 20..25 in the next
        let offset = 15;
        let low = (PCOMMA << offset) & ((1 << W) - 1);
        let high = PCOMMA >> (W - offset);
        for _ in 0..CHECK_PERIOD {
            aligner.observe(low);
            aligner.observe(high);
        }
        aligner.check();
        for _ in 0..CHECK_PERIOD {
            aligner.observe(low);
            aligner.observe(high);
        }
        assert!(aligner.check().ready);
    }

    #[test]
    fn test_negative_disparity_comma_counts() {
        let mut aligner = ClockAligner::new(W).unwrap();
        observe_period(&mut aligner, 2);
        aligner.check();
        // Same offset, opposite disparity: still the same framing
        for _ in 0..CHECK_PERIOD {
            aligner.observe(MCOMMA << 2);
        }
        assert!(aligner.check().ready);
    }

    #[test]
    fn test_reset_forgets_the_lock() {
        let mut aligner = ClockAligner::new(W).unwrap();
        observe_period(&mut aligner, 4);
        aligner.check();
        observe_period(&mut aligner, 4);
        assert!(aligner.check().ready);
        aligner.reset();
        assert!(!aligner.ready());
        // Fresh hunt after reset: first check is searching again
        observe_period(&mut aligner, 4);
        assert!(aligner.check().restart);
    }

    #[test]
    fn test_rearm_keeps_the_lock_but_demands_fresh_commas() {
        let mut aligner = ClockAligner::new(W).unwrap();
        observe_period(&mut aligner, 4);
        aligner.check();
        observe_period(&mut aligner, 4);
        assert!(aligner.check().ready);
        assert_eq!(aligner.consecutive_good_checks(), 1);

        aligner.rearm();
        assert!(!aligner.ready());
        // Nothing seen since the rearm: still restart
        assert!(aligner.check().restart);
        // Commas back at the locked offset: ready on the very next check,
        // with no counter movement charged for the reappearance
        observe_period(&mut aligner, 4);
        assert!(aligner.check().ready);
        assert_eq!(aligner.consecutive_good_checks(), 1);
    }

    #[test]
    fn test_width_bounds() {
        assert!(matches!(
            ClockAligner::new(8).unwrap_err(),
            Error::WordTooNarrow(8)
        ));
        assert!(matches!(
            ClockAligner::new(40).unwrap_err(),
            Error::WordTooWide(40)
        ));
    }
}
