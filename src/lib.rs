//! Training controller for high-speed serial transceiver links.
//!
//! This crate brings one direction-pair of an abstract serial transceiver
//! from power-up to a stable, word-aligned, low-error-rate state and keeps
//! it there, the way a firmware engineer would bit-bang a SerDes reset
//! sequence through a register/status interface:
//!
//! - [`init::InitSequencer`] walks the fixed bring-up ordering of PLL
//!   reset, hard reset, delay calibration, and phase alignment for one
//!   direction, with the timing minimums and the RX calibration-register
//!   dance the silicon requires.
//! - [`aligner::ClockAligner`] continuously validates word alignment of
//!   the recovered bit stream and forces RX retraining when it drifts.
//! - [`gearbox::Gearbox`] moves words between two rationally-related clock
//!   domains without loss.
//! - [`prbs`] generates and checks pseudo-random test patterns for
//!   bit-error-rate measurement on a trained link.
//! - [`link::LinkController`] owns the sequencers and the aligner and
//!   drives them through a [`transceiver::Transceiver`] backend.
//!
//! Every component is a cooperative tick automaton: one logical step per
//! call, no blocking, with an external scheduler (real loop or simulated
//! clock) providing the pacing.

pub mod aligner;
pub mod cdc;
pub mod core;
pub mod gearbox;
pub mod init;
pub mod link;
pub mod pll;
pub mod prbs;
pub mod prelude;
pub mod transceiver;
