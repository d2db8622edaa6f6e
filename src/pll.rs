//! Channel PLL configuration search and per-divider CDR settings
//!
//! An invalid refclk/linerate pairing is a static design error, not a
//! runtime condition: it fails loudly here, at configuration time, and is
//! never retried.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("no PLL config found for {refclk_mhz:.2} MHz refclk / {linerate_gbps:.2} Gbps linerate")]
    NoConfig { refclk_mhz: f64, linerate_gbps: f64 },
    #[error("no CDR configuration for output divider {0}")]
    UnknownDivider(u8),
}

/// A validated channel-PLL divider set.
///
/// `linerate = 2 * vco_freq / d` with `vco_freq = clkin * n1 * n2 / m`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPllConfig {
    pub n1: u8,
    pub n2: u8,
    pub m: u8,
    pub d: u8,
    pub vco_freq: f64,
    pub clkin: f64,
    pub linerate: f64,
}

impl ChannelPllConfig {
    /// Search the divider space for a set hitting `linerate` from
    /// `refclk_freq`, with the VCO kept inside its 1.6-3.3 GHz range.
    pub fn compute(refclk_freq: f64, linerate: f64) -> Result<Self, Error> {
        for n1 in [4u8, 5] {
            for n2 in 1u8..=5 {
                for m in [1u8, 2] {
                    let vco_freq = refclk_freq * f64::from(n1) * f64::from(n2) / f64::from(m);
                    if !(1.6e9..=3.3e9).contains(&vco_freq) {
                        continue;
                    }
                    for d in [1u8, 2, 4, 8, 16] {
                        if vco_freq * 2.0 / f64::from(d) == linerate {
                            return Ok(Self {
                                n1,
                                n2,
                                m,
                                d,
                                vco_freq,
                                clkin: refclk_freq,
                                linerate,
                            });
                        }
                    }
                }
            }
        }
        Err(Error::NoConfig {
            refclk_mhz: refclk_freq / 1e6,
            linerate_gbps: linerate / 1e9,
        })
    }

    /// Frequency of the 20 bit word clock (one 8b/10b symbol pair per
    /// word) recovered from or transmitted at `linerate`.
    #[must_use]
    pub fn word_clk_freq(&self) -> f64 {
        self.linerate / 20.0
    }
}

/// Receiver CDR configuration words keyed by output divider.
///
/// These are per-family constant tables: configuration data, not behavior.
/// They are handed to the controller at construction instead of living as
/// module globals.
#[derive(Debug, Clone)]
pub struct CdrConfigTable {
    entries: Vec<(u8, u128)>,
}

impl CdrConfigTable {
    #[must_use]
    pub fn new(entries: Vec<(u8, u128)>) -> Self {
        Self { entries }
    }

    /// The stock table for the 7-series GTX below 6.6 Gbps.
    #[must_use]
    pub fn gtx_defaults() -> Self {
        Self::new(vec![
            (1, 0x0300_0023_ff10_4000_20),
            (2, 0x0300_0023_ff10_2000_20),
            (4, 0x0300_0023_ff10_1000_20),
            (8, 0x0300_0023_ff10_0800_20),
        ])
    }

    pub fn lookup(&self, d: u8) -> Result<u128, Error> {
        self.entries
            .iter()
            .find(|(div, _)| *div == d)
            .map(|(_, cfg)| *cfg)
            .ok_or(Error::UnknownDivider(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_finds_known_config() {
        let cfg = ChannelPllConfig::compute(125e6, 2.5e9).unwrap();
        assert_eq!(cfg.vco_freq * 2.0 / f64::from(cfg.d), 2.5e9);
        assert!((1.6e9..=3.3e9).contains(&cfg.vco_freq));
        assert_eq!(
            f64::from(cfg.n1) * f64::from(cfg.n2) / f64::from(cfg.m) * 125e6,
            cfg.vco_freq
        );
        assert_eq!(cfg.word_clk_freq(), 125e6);
    }

    #[test]
    fn test_compute_rejects_impossible_linerate() {
        let err = ChannelPllConfig::compute(100e6, 3.0e9).unwrap_err();
        assert!(matches!(err, Error::NoConfig { .. }));
    }

    #[test]
    fn test_cdr_table_lookup() {
        let table = CdrConfigTable::gtx_defaults();
        assert_eq!(table.lookup(2).unwrap(), 0x0300_0023_ff10_2000_20);
        assert_eq!(table.lookup(16).unwrap_err(), Error::UnknownDivider(16));
    }
}
