//! Bring-up sequencer for one direction of the transceiver
//!
//! Walks the fixed ordering of PLL reset, hard reset, delay calibration,
//! and phase alignment that takes a direction from cold to ready, with the
//! dwell minimums the silicon requires. The sequencer is a pure tick
//! automaton: [`InitSequencer::tick`] advances one state per call and
//! returns the control word for that cycle; all hardware I/O belongs to
//! the caller.
//!
//! Recovery is restart-shaped everywhere. A hung handshake trips the
//! watchdog, external restart requests and alignment loss route through
//! [`InitSequencer::request_restart`], and all three land back in
//! [`Stage::ResetAll`]. There is no error surface beyond `done` going
//! false.

use crate::{
    cdc::{
        EdgeDetector,
        SyncLatch,
        WaitTimer,
    },
    core::{
        cycles_spanning,
        Direction,
    },
    transceiver::{
        DrpOp,
        LineControl,
        LineStatus,
        RxCdrCalReg,
    },
};
use thiserror::Error;
use tracing::debug;

/// Ticks the receiver CDR needs to stabilize after reset done, on top of
/// the reset handshake itself.
const CDR_STABLE_CYCLES: u32 = 1024;

#[derive(Debug, Error)]
pub enum Error {
    #[error("system clock frequency must be positive, got {0}")]
    BadClockFreq(f64),
    #[error("the calibration register dance applies to the RX direction only")]
    DanceOnTx,
}

/// Bring-up stages, in the only order they are ever visited.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Post-configuration dwell; RX additionally parks here until enabled.
    Wait,
    /// Everything in reset, PLL included.
    ResetAll,
    /// PLL released, waiting for lock.
    ReleasePllReset,
    /// Hard reset released (after the RX register dance, where
    /// configured), waiting for reset done.
    ReleaseHardReset,
    /// Delay calibration reset.
    AlignDelay,
    /// Phase init handshake.
    PhaseInit,
    /// Phase alignment, gated on a rising edge of the done line.
    PhaseAlign,
    /// Delay path enable, gated on a second rising edge.
    DelayEnable,
    /// Trained; holds until a restart is requested or the watchdog fires.
    Ready,
}

/// Sub-steps of the RX calibration register dance: read the register,
/// write it back with the calibration bit cleared while reset is held,
/// then restore the original value once the reset has visibly taken
/// effect. No step is ever skipped, restart pressure included.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DrpPhase {
    ReadIssue,
    ReadWait,
    ModifyIssue,
    ModifyWait,
    WaitResetFall,
    RestoreIssue,
    RestoreWait,
    WaitResetDone,
}

/// The erratum workaround configuration, RX only.
#[derive(Debug, Clone, Copy)]
pub struct DrpDance {
    /// DRP address of the calibration register.
    pub addr: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct SequencerConfig {
    pub direction: Direction,
    /// Frequency of the clock this sequencer is ticked at, used to derive
    /// the dwell and watchdog windows.
    pub sys_clk_freq: f64,
    /// RX-only calibration register dance; `None` disables it.
    pub drp_dance: Option<DrpDance>,
}

/// What one tick produced: the stage after the step, the derived done
/// flag, and the control word to drive for this cycle.
#[derive(Debug, Clone, Copy)]
pub struct SequencerOutput {
    pub stage: Stage,
    pub done: bool,
    pub ctrl: LineControl,
}

/// Reset/bring-up sequencer for one direction.
#[derive(Debug)]
pub struct InitSequencer {
    dir: Direction,
    dance: Option<DrpDance>,
    stage: Stage,
    drp_phase: DrpPhase,
    /// One-shot post-configuration dwell; resets must stay released for at
    /// least 500 ns after configuration.
    startup: WaitTimer,
    /// Self-healing watchdog: if `done` is not reached within 1 ms the
    /// whole sequence re-runs from `ResetAll`.
    watchdog: WaitTimer,
    cdr_stable: WaitTimer,
    pll_locked: SyncLatch,
    reset_done: SyncLatch,
    delay_reset_done: SyncLatch,
    phase_init_done: SyncLatch,
    phase_align_done: SyncLatch,
    phase_align_edge: EdgeDetector,
    restart_pending: bool,
    enabled: bool,
    drp_saved: u16,
}

impl InitSequencer {
    pub fn new(config: SequencerConfig) -> Result<Self, Error> {
        if !(config.sys_clk_freq > 0.0) {
            return Err(Error::BadClockFreq(config.sys_clk_freq));
        }
        if config.direction == Direction::Tx && config.drp_dance.is_some() {
            return Err(Error::DanceOnTx);
        }
        Ok(Self {
            dir: config.direction,
            dance: config.drp_dance,
            stage: Stage::Wait,
            drp_phase: DrpPhase::ReadIssue,
            startup: WaitTimer::new(cycles_spanning(config.sys_clk_freq, 500e-9)),
            watchdog: WaitTimer::new(cycles_spanning(config.sys_clk_freq, 1e-3)),
            cdr_stable: WaitTimer::new(CDR_STABLE_CYCLES),
            pll_locked: SyncLatch::default(),
            reset_done: SyncLatch::default(),
            delay_reset_done: SyncLatch::default(),
            phase_init_done: SyncLatch::default(),
            phase_align_done: SyncLatch::default(),
            // Reset value high so a held-high line produces no edge
            phase_align_edge: EdgeDetector::new(true),
            restart_pending: false,
            enabled: false,
            drp_saved: 0,
        })
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.stage == Stage::Ready
    }

    /// Latch a restart request; it takes effect on the next tick, after
    /// that tick's outputs, and is idempotent. During the register dance
    /// the request is held until the restore write has been acknowledged.
    pub fn request_restart(&mut self) {
        self.restart_pending = true;
    }

    /// Gate on leaving `Wait`. Only meaningful for RX sequencers; TX
    /// ignores it. The controller wires TX `done` in here.
    pub fn enable(&mut self, flag: bool) {
        self.enabled = flag;
    }

    fn dance_in_flight(&self) -> bool {
        self.stage == Stage::ReleaseHardReset
            && self.dance.is_some()
            && matches!(
                self.drp_phase,
                DrpPhase::ReadWait
                    | DrpPhase::ModifyIssue
                    | DrpPhase::ModifyWait
                    | DrpPhase::WaitResetFall
                    | DrpPhase::RestoreIssue
                    | DrpPhase::RestoreWait
            )
    }

    fn enter(&mut self, next: Stage) {
        debug!(dir = ?self.dir, from = ?self.stage, to = ?next, "bring-up stage");
        self.stage = next;
        self.drp_phase = DrpPhase::ReadIssue;
        if next == Stage::ResetAll {
            self.watchdog.clear();
            self.cdr_stable.clear();
            self.phase_align_edge.reset(true);
        }
    }

    /// Advance one clock step. Pure state transition: the caller samples
    /// the raw status lines beforehand and drives the returned control
    /// word afterwards.
    pub fn tick(&mut self, status: &LineStatus) -> SequencerOutput {
        // Status flags cross into this domain through double latches;
        // everything below sees them one to two ticks stale.
        let pll_locked = self.pll_locked.latch(status.pll_locked);
        let reset_done = self.reset_done.latch(status.reset_done);
        let delay_reset_done = self.delay_reset_done.latch(status.delay_reset_done);
        let phase_init_done = self.phase_init_done.latch(status.phase_init_done);
        let phase_align_done = self.phase_align_done.latch(status.phase_align_done);
        let phase_align_rising = self.phase_align_edge.rising(phase_align_done);

        // Watchdog runs whenever the sequence is in progress
        let in_progress = !matches!(self.stage, Stage::Wait | Stage::Ready);
        let watchdog_fired = self.watchdog.tick(in_progress);

        let mut ctrl = LineControl::default();
        match self.stage {
            Stage::Wait => {
                let dwelled = self.startup.tick(true);
                self.restart_pending = false;
                if dwelled && (self.dir == Direction::Tx || self.enabled) {
                    self.enter(Stage::ResetAll);
                }
            }
            Stage::ResetAll => {
                ctrl.pll_reset = true;
                ctrl.reset = true;
                self.enter(Stage::ReleasePllReset);
            }
            Stage::ReleasePllReset => {
                ctrl.reset = true;
                if pll_locked {
                    self.enter(Stage::ReleaseHardReset);
                }
            }
            Stage::ReleaseHardReset => match self.dance {
                None => {
                    ctrl.user_ready = true;
                    let cdr_ok = match self.dir {
                        Direction::Tx => true,
                        Direction::Rx => self.cdr_stable.tick(true),
                    };
                    if reset_done && cdr_ok {
                        self.enter(Stage::AlignDelay);
                    }
                }
                Some(dance) => self.dance_step(&mut ctrl, status, reset_done, dance),
            },
            Stage::AlignDelay => {
                ctrl.user_ready = true;
                ctrl.delay_reset = true;
                if delay_reset_done {
                    self.enter(Stage::PhaseInit);
                }
            }
            Stage::PhaseInit => {
                ctrl.user_ready = true;
                ctrl.phase_init = true;
                if phase_init_done {
                    self.enter(Stage::PhaseAlign);
                }
            }
            Stage::PhaseAlign => {
                ctrl.user_ready = true;
                ctrl.phase_align = true;
                if phase_align_rising {
                    self.enter(Stage::DelayEnable);
                }
            }
            Stage::DelayEnable => {
                ctrl.user_ready = true;
                ctrl.delay_enable = true;
                if phase_align_rising {
                    self.enter(Stage::Ready);
                }
            }
            Stage::Ready => {
                ctrl.user_ready = true;
            }
        }

        // Restart (external or watchdog) lands back in ResetAll on the
        // tick after the request, once this tick's outputs are complete.
        // Neither may interrupt the register dance: the restore write must
        // land first or the calibration bit stays cleared across the
        // retry.
        if self.stage != Stage::Wait
            && !self.dance_in_flight()
            && (self.restart_pending || watchdog_fired)
        {
            if watchdog_fired {
                debug!(dir = ?self.dir, stage = ?self.stage, "watchdog restart");
            }
            self.restart_pending = false;
            self.enter(Stage::ResetAll);
        }

        SequencerOutput {
            stage: self.stage,
            done: self.done(),
            ctrl,
        }
    }

    /// The RX register dance, played out inside `ReleaseHardReset`. The
    /// hard reset stays asserted through the read and the masked write,
    /// then releases; the restore write goes out once the reset has
    /// visibly pulled `reset_done` low.
    fn dance_step(
        &mut self,
        ctrl: &mut LineControl,
        status: &LineStatus,
        reset_done: bool,
        dance: DrpDance,
    ) {
        match self.drp_phase {
            DrpPhase::ReadIssue => {
                ctrl.reset = true;
                ctrl.drp = Some(DrpOp::Read { addr: dance.addr });
                self.drp_phase = DrpPhase::ReadWait;
            }
            DrpPhase::ReadWait => {
                ctrl.reset = true;
                if status.drp_ready {
                    self.drp_saved = status.drp_read_data;
                    self.drp_phase = DrpPhase::ModifyIssue;
                }
            }
            DrpPhase::ModifyIssue => {
                ctrl.reset = true;
                ctrl.drp = Some(DrpOp::Write {
                    addr: dance.addr,
                    data: RxCdrCalReg::masked(self.drp_saved),
                });
                self.drp_phase = DrpPhase::ModifyWait;
            }
            DrpPhase::ModifyWait => {
                ctrl.reset = true;
                if status.drp_ready {
                    self.drp_phase = DrpPhase::WaitResetFall;
                }
            }
            DrpPhase::WaitResetFall => {
                ctrl.user_ready = true;
                // The held reset already pulled the line low; observing it
                // low through the synchronizer is the deassertion we need
                if !reset_done {
                    self.drp_phase = DrpPhase::RestoreIssue;
                }
            }
            DrpPhase::RestoreIssue => {
                ctrl.user_ready = true;
                ctrl.drp = Some(DrpOp::Write {
                    addr: dance.addr,
                    data: self.drp_saved,
                });
                self.drp_phase = DrpPhase::RestoreWait;
            }
            DrpPhase::RestoreWait => {
                ctrl.user_ready = true;
                if status.drp_ready {
                    self.drp_phase = DrpPhase::WaitResetDone;
                }
            }
            DrpPhase::WaitResetDone => {
                ctrl.user_ready = true;
                let cdr_ok = self.cdr_stable.tick(true);
                if reset_done && cdr_ok {
                    self.enter(Stage::AlignDelay);
                }
            }
        }
    }
}
