//! Pseudo-random bit sequence generation and checking
//!
//! Implements the standard PRBS7, PRBS15 and PRBS31 polynomials as
//! word-at-a-time LFSRs. The generator replaces the transmit payload with
//! the sequence; the checker free-runs its own LFSR on the received bits,
//! so it self-synchronizes after one LFSR length of clean data and needs
//! no side channel to the far end.

use packed_struct::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("word width must be nonzero")]
    ZeroWidth,
    #[error("word width {0} exceeds the supported 64 bits")]
    WidthTooWide(u32),
}

fn check_width(width: u32) -> Result<(), Error> {
    if width == 0 {
        return Err(Error::ZeroWidth);
    }
    if width > 64 {
        return Err(Error::WidthTooWide(width));
    }
    Ok(())
}

/// Test pattern selection, encoded the way the pattern-select register
/// holds it.
#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrbsPattern {
    Off = 0,
    Prbs7 = 1,
    Prbs15 = 2,
    Prbs31 = 3,
}

impl PrbsPattern {
    /// LFSR length and feedback taps, or `None` when the engine is off
    /// and payload passes through untouched.
    fn params(self) -> Option<(u32, [u32; 2])> {
        match self {
            PrbsPattern::Off => None,
            PrbsPattern::Prbs7 => Some((7, [5, 6])),
            PrbsPattern::Prbs15 => Some((15, [13, 14])),
            PrbsPattern::Prbs31 => Some((31, [27, 30])),
        }
    }
}

fn mask(width: u32) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Produces `n_out` sequence bits per call, newest bit at position 0.
#[derive(Debug)]
pub struct PrbsGenerator {
    n_out: u32,
    pattern: PrbsPattern,
    state: u64,
}

impl PrbsGenerator {
    pub fn new(n_out: u32) -> Result<Self, Error> {
        check_width(n_out)?;
        Ok(Self {
            n_out,
            pattern: PrbsPattern::Off,
            state: 1,
        })
    }

    /// Switch patterns, restarting the sequence from the canonical
    /// all-but-one-zero seed. Reconfiguring to the current pattern is a
    /// no-op.
    pub fn configure(&mut self, pattern: PrbsPattern) {
        if pattern != self.pattern {
            self.pattern = pattern;
            self.state = 1;
        }
    }

    /// The next transmit word: `payload` when the engine is off, the next
    /// `n_out` bits of the sequence otherwise.
    pub fn next(&mut self, payload: u64) -> u64 {
        let out_mask = mask(self.n_out);
        let Some((n_state, taps)) = self.pattern.params() else {
            return payload & out_mask;
        };
        // Run the LFSR n_out steps, shifting each new bit in at position
        // 0 so the oldest bit of the word sits at the highest index
        let width = n_state.max(self.n_out);
        let mut cur = self.state;
        for _ in 0..self.n_out {
            let nv = (cur >> taps[0] ^ cur >> taps[1]) & 1;
            cur = (cur << 1 | nv) & mask(width);
        }
        self.state = cur & mask(n_state);
        cur & out_mask
    }
}

/// Consumes `n_in` received bits per call and flags the ones that do not
/// match the sequence.
#[derive(Debug)]
pub struct PrbsChecker {
    n_in: u32,
    pattern: PrbsPattern,
    state: u64,
}

impl PrbsChecker {
    pub fn new(n_in: u32) -> Result<Self, Error> {
        check_width(n_in)?;
        Ok(Self {
            n_in,
            pattern: PrbsPattern::Off,
            state: 1,
        })
    }

    /// Switch patterns, restarting synchronization. Reconfiguring to the
    /// current pattern is a no-op.
    pub fn configure(&mut self, pattern: PrbsPattern) {
        if pattern != self.pattern {
            self.pattern = pattern;
            self.state = 1;
        }
    }

    /// Check one received word and return a mask of the mismatching bit
    /// positions. The received bits themselves are shifted into the LFSR,
    /// oldest (highest index) first, which is what makes the checker
    /// self-synchronizing.
    pub fn check(&mut self, word: u64) -> u64 {
        let Some((n_state, taps)) = self.pattern.params() else {
            return 0;
        };
        let state_mask = mask(n_state);
        let mut cur = self.state;
        let mut errors = 0u64;
        for i in (0..self.n_in).rev() {
            let bit = word >> i & 1;
            let correct = (cur >> taps[0] ^ cur >> taps[1]) & 1;
            if bit != correct {
                errors |= 1 << i;
            }
            cur = (cur << 1 | bit) & state_mask;
        }
        self.state = cur;
        errors
    }
}
