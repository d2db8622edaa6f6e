//! Mock transceiver implementations used in testing the controller

use super::{DrpOp, LineControl, LineStatus, Transceiver};
use crate::core::Direction;
use std::collections::HashMap;

/// Handshake latencies of the simulated transceiver, in ticks of the
/// applying clock.
#[derive(Debug, Clone, Copy)]
pub struct MockLatencies {
    /// Ticks from PLL reset release to lock.
    pub pll_lock: u32,
    /// Ticks from hard-reset release (with the PLL locked) to reset done.
    pub reset_done: u32,
    /// Ticks of held delay reset before delay reset done.
    pub delay_reset_done: u32,
    /// Ticks of held phase init before phase init done.
    pub phase_init_done: u32,
    /// Period of the phase-align done pulse train while alignment or the
    /// delay path is being exercised.
    pub phase_align_period: u32,
    /// Ticks to complete a DRP transaction.
    pub drp: u32,
}

impl Default for MockLatencies {
    fn default() -> Self {
        Self {
            pll_lock: 8,
            reset_done: 6,
            delay_reset_done: 5,
            phase_init_done: 4,
            phase_align_period: 3,
            drp: 2,
        }
    }
}

#[derive(Debug, Default)]
struct Channel {
    reset_done: bool,
    reset_done_timer: u32,
    delay_reset_done: bool,
    delay_timer: u32,
    phase_init_done: bool,
    phase_init_timer: u32,
    phase_align_done: bool,
    phase_align_timer: u32,
    drp_pending: Option<DrpOp>,
    drp_timer: u32,
    drp_ready: bool,
    drp_read_data: u16,
}

/// A transceiver that simulates the hardware handshakes, useful for
/// testing the sequencers and the controller without a board attached.
///
/// The PLL is shared between directions and obeys only the TX control
/// word's `pll_reset`, matching the way the real wrappers wire the channel
/// PLL. Reset done rises autonomously once the PLL is locked and the hard
/// reset is released, which is how the PMA behaves after power-up; the RX
/// calibration dance relies on having observed it fall again under reset.
#[derive(Debug)]
pub struct Mock {
    latencies: MockLatencies,
    pll_locked: bool,
    pll_timer: u32,
    tx: Channel,
    rx: Channel,
    registers: HashMap<u16, u16>,
    /// Every DRP transaction issued, in order, for dance accounting.
    pub drp_log: Vec<(Direction, DrpOp)>,
    /// Fault injection: hold `reset_done` low forever on both directions.
    pub stuck_reset_done: bool,
}

impl Mock {
    #[must_use]
    pub fn new(latencies: MockLatencies) -> Self {
        Self {
            latencies,
            pll_locked: false,
            pll_timer: 0,
            tx: Channel::default(),
            rx: Channel::default(),
            registers: HashMap::new(),
            drp_log: Vec::new(),
            stuck_reset_done: false,
        }
    }

    /// Seed a DRP register with an initial value.
    #[must_use]
    pub fn with_register(mut self, addr: u16, value: u16) -> Self {
        self.registers.insert(addr, value);
        self
    }

    /// Current value of a DRP register (0 if never written).
    #[must_use]
    pub fn register(&self, addr: u16) -> u16 {
        self.registers.get(&addr).copied().unwrap_or(0)
    }
}

impl Default for Mock {
    fn default() -> Self {
        Self::new(MockLatencies::default())
    }
}

impl Transceiver for Mock {
    fn status(&mut self, dir: Direction) -> anyhow::Result<LineStatus> {
        let ch = match dir {
            Direction::Tx => &self.tx,
            Direction::Rx => &self.rx,
        };
        Ok(LineStatus {
            pll_locked: self.pll_locked,
            reset_done: ch.reset_done,
            delay_reset_done: ch.delay_reset_done,
            phase_init_done: ch.phase_init_done,
            phase_align_done: ch.phase_align_done,
            drp_ready: ch.drp_ready,
            drp_read_data: ch.drp_read_data,
        })
    }

    fn apply(&mut self, dir: Direction, ctrl: &LineControl) -> anyhow::Result<()> {
        let Self {
            latencies,
            pll_locked,
            pll_timer,
            tx,
            rx,
            registers,
            drp_log,
            stuck_reset_done,
        } = self;
        // The shared PLL steps on the TX edge only
        if dir == Direction::Tx {
            if ctrl.pll_reset {
                *pll_locked = false;
                *pll_timer = 0;
            } else if !*pll_locked {
                *pll_timer += 1;
                if *pll_timer >= latencies.pll_lock {
                    *pll_locked = true;
                }
            }
        }

        let ch = match dir {
            Direction::Tx => tx,
            Direction::Rx => rx,
        };

        // Hard reset handshake. The PMA brings reset_done up on its own
        // once the PLL runs and the reset line is released.
        if *stuck_reset_done || ctrl.reset || !*pll_locked {
            ch.reset_done = false;
            ch.reset_done_timer = 0;
        } else {
            ch.reset_done_timer += 1;
            if ch.reset_done_timer >= latencies.reset_done {
                ch.reset_done = true;
            }
        }

        // Delay calibration reset
        if ctrl.delay_reset {
            ch.delay_timer += 1;
            if ch.delay_timer >= latencies.delay_reset_done {
                ch.delay_reset_done = true;
            }
        } else {
            ch.delay_timer = 0;
            ch.delay_reset_done = false;
        }

        // Phase init
        if ctrl.phase_init {
            ch.phase_init_timer += 1;
            if ch.phase_init_timer >= latencies.phase_init_done {
                ch.phase_init_done = true;
            }
        } else {
            ch.phase_init_timer = 0;
            ch.phase_init_done = false;
        }

        // Phase alignment reports completion as a pulse train so that the
        // align and delay-enable steps each get their own rising edge
        if ctrl.phase_align || ctrl.delay_enable {
            ch.phase_align_timer += 1;
            ch.phase_align_done = ch.phase_align_timer % latencies.phase_align_period == 0;
        } else {
            ch.phase_align_timer = 0;
            ch.phase_align_done = false;
        }

        // DRP: accept one transaction at a time, acknowledge with a
        // one-tick ready pulse after the configured latency
        ch.drp_ready = false;
        if let Some(op) = ctrl.drp {
            if ch.drp_pending.is_none() {
                drp_log.push((dir, op));
                ch.drp_pending = Some(op);
                ch.drp_timer = 0;
            }
        }
        if let Some(op) = ch.drp_pending {
            ch.drp_timer += 1;
            if ch.drp_timer >= latencies.drp {
                match op {
                    DrpOp::Read { addr } => {
                        ch.drp_read_data = registers.get(&addr).copied().unwrap_or(0);
                    }
                    DrpOp::Write { addr, data } => {
                        registers.insert(addr, data);
                    }
                }
                ch.drp_ready = true;
                ch.drp_pending = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_ticks(mock: &mut Mock, dir: Direction, n: usize) {
        for _ in 0..n {
            mock.apply(Direction::Tx, &LineControl::default()).unwrap();
            if dir == Direction::Rx {
                mock.apply(Direction::Rx, &LineControl::default()).unwrap();
            }
        }
    }

    #[test]
    fn test_pll_locks_after_latency() {
        let mut mock = Mock::default();
        assert!(!mock.status(Direction::Tx).unwrap().pll_locked);
        idle_ticks(&mut mock, Direction::Tx, 8);
        assert!(mock.status(Direction::Tx).unwrap().pll_locked);
    }

    #[test]
    fn test_pll_reset_drops_lock() {
        let mut mock = Mock::default();
        idle_ticks(&mut mock, Direction::Tx, 8);
        let ctrl = LineControl {
            pll_reset: true,
            ..Default::default()
        };
        mock.apply(Direction::Tx, &ctrl).unwrap();
        assert!(!mock.status(Direction::Tx).unwrap().pll_locked);
    }

    #[test]
    fn test_reset_done_rises_autonomously_and_falls_under_reset() {
        let mut mock = Mock::default();
        idle_ticks(&mut mock, Direction::Rx, 20);
        assert!(mock.status(Direction::Rx).unwrap().reset_done);
        let ctrl = LineControl {
            reset: true,
            ..Default::default()
        };
        mock.apply(Direction::Rx, &ctrl).unwrap();
        assert!(!mock.status(Direction::Rx).unwrap().reset_done);
    }

    #[test]
    fn test_drp_read_write() {
        let mut mock = Mock::default().with_register(0x011, 0xbeef);
        let read = LineControl {
            drp: Some(DrpOp::Read { addr: 0x011 }),
            ..Default::default()
        };
        mock.apply(Direction::Rx, &read).unwrap();
        // Still pending after one tick with a latency of two
        assert!(!mock.status(Direction::Rx).unwrap().drp_ready);
        mock.apply(Direction::Rx, &LineControl::default()).unwrap();
        let status = mock.status(Direction::Rx).unwrap();
        assert!(status.drp_ready);
        assert_eq!(status.drp_read_data, 0xbeef);
        // The ready pulse is one tick wide
        mock.apply(Direction::Rx, &LineControl::default()).unwrap();
        assert!(!mock.status(Direction::Rx).unwrap().drp_ready);

        let write = LineControl {
            drp: Some(DrpOp::Write {
                addr: 0x011,
                data: 0x1234,
            }),
            ..Default::default()
        };
        mock.apply(Direction::Rx, &write).unwrap();
        mock.apply(Direction::Rx, &LineControl::default()).unwrap();
        assert_eq!(mock.register(0x011), 0x1234);
        assert_eq!(mock.drp_log.len(), 2);
    }

    #[test]
    fn test_stuck_reset_done_never_rises() {
        let mut mock = Mock::default();
        mock.stuck_reset_done = true;
        idle_ticks(&mut mock, Direction::Tx, 100);
        assert!(!mock.status(Direction::Tx).unwrap().reset_done);
    }
}
