//! Core types shared across the link-training components

/// Which half of the transceiver a sequencer or control word targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    Tx,
    Rx,
}

/// Cycles of a `freq` Hz clock spanning at least `seconds`.
///
/// Hardware dwell minimums are given as wall-clock times; sequencers
/// convert them to cycle counts of whatever clock drives them.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn cycles_spanning(freq: f64, seconds: f64) -> u32 {
    (freq * seconds).ceil() as u32
}
