//! Defines the seam between the training controller and the transceiver
//! hardware (or a simulation of it)

pub mod mock;

use crate::core::Direction;
use packed_struct::prelude::*;

/// DRP address of the receiver CDR calibration register.
pub const RX_CDR_CAL_ADDR: u16 = 0x011;

/// Level-sensitive status lines sampled from one direction of the
/// transceiver, plus the DRP acknowledge port.
///
/// These are raw hardware levels: asynchronous to the sampling clock.
/// Sequencers must pass them through [`crate::cdc::SyncLatch`] before
/// acting on them. The DRP port lives in the system clock domain and needs
/// no synchronization.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStatus {
    /// The channel PLL driving this direction has settled.
    pub pll_locked: bool,
    /// The hard-reset sequence of this direction has completed.
    pub reset_done: bool,
    /// Delay calibration reset has completed.
    pub delay_reset_done: bool,
    /// Phase init handshake has completed.
    pub phase_init_done: bool,
    /// Phase alignment has completed. Held high by some silicon once
    /// asserted; consumers debounce to the rising edge.
    pub phase_align_done: bool,
    /// One-tick acknowledge of the most recently issued DRP transaction.
    pub drp_ready: bool,
    /// Read-back data, valid in the tick `drp_ready` acknowledges a read.
    pub drp_read_data: u16,
}

/// Level-sensitive control lines driven into one direction of the
/// transceiver, recomputed every tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineControl {
    /// Reset request to the shared channel PLL. Only the TX sequencer's
    /// copy is wired through to the PLL; see [`crate::link`].
    pub pll_reset: bool,
    /// Hard reset of this direction.
    pub reset: bool,
    /// Tells the transceiver the user clocks are stable.
    pub user_ready: bool,
    /// Starts delay calibration reset.
    pub delay_reset: bool,
    /// Starts the phase init handshake.
    pub phase_init: bool,
    /// Starts phase alignment.
    pub phase_align: bool,
    /// Enables the calibrated delay path.
    pub delay_enable: bool,
    /// DRP transaction to issue this tick, if any.
    pub drp: Option<DrpOp>,
}

/// A single direct-register-port transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrpOp {
    Read { addr: u16 },
    Write { addr: u16, data: u16 },
}

/// The trait implemented for transceiver backends (hardware bridges or
/// simulators). The methods *assume* the device is powered and reachable.
///
/// One `status`/`apply` pair per direction per tick is the contract; the
/// backend treats `apply` as the clock edge of that direction.
pub trait Transceiver {
    /// Sample the raw (unsynchronized) status lines of `dir`.
    fn status(&mut self, dir: Direction) -> anyhow::Result<LineStatus>;

    /// Drive the control lines of `dir` for this tick.
    fn apply(&mut self, dir: Direction, ctrl: &LineControl) -> anyhow::Result<()>;
}

/// The register behind the PMA-reset erratum workaround: its calibration
/// enable bit must be cleared while the receiver PMA is held in reset and
/// restored afterward. The RX sequencer performs that dance through the
/// DRP port at [`RX_CDR_CAL_ADDR`].
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "2", endian = "msb")]
pub struct RxCdrCalReg {
    #[packed_field(bits = "0..=10")]
    pub rsvd_lo: Integer<u16, packed_bits::Bits<11>>,
    #[packed_field(bits = "11")]
    pub cal_enable: bool,
    #[packed_field(bits = "12..=15")]
    pub rsvd_hi: Integer<u8, packed_bits::Bits<4>>,
}

impl RxCdrCalReg {
    /// `value` with the calibration enable bit cleared; everything else is
    /// carried through untouched.
    #[must_use]
    pub fn masked(value: u16) -> u16 {
        // Packing a fully-covered 16 bit register cannot fail
        let mut reg = Self::unpack(&value.to_be_bytes()).unwrap();
        reg.cal_enable = false;
        u16::from_be_bytes(reg.pack().unwrap())
    }
}
