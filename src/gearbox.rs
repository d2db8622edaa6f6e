//! Elastic rate-conversion buffer between two clock domains
//!
//! Moves fixed-width words from a producer at `(Wi, Ri)` to a consumer at
//! `(Wo, Ro)` where `Wi*Ri == Wo*Ro`. The two sides advance independent
//! modular pointers over a shared storage register of `lcm(Wi, Wo)` bits;
//! the reset offset of the faster-advancing pointer guarantees the slower
//! side always reads slots that were already written. There is no
//! backpressure and no locking: the equal aggregate bit rate of the two
//! phase-locked clocks is what makes overrun impossible, and that is a
//! property of the collaborator clock source, not of this buffer.

use thiserror::Error;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Lowest common multiple of the two word widths.
fn lcm(a: u32, b: u32) -> u32 {
    a / gcd(a, b) * b
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("word widths must be nonzero")]
    ZeroWidth,
    #[error("word width {0} exceeds the supported 64 bits")]
    WidthTooWide(u32),
    #[error("lcm({0}, {1}) = {2} bits exceeds the 128 bit storage")]
    StorageTooWide(u32, u32, u32),
}

/// Width-converting elastic buffer with independent read/write pointers.
#[derive(Debug)]
pub struct Gearbox {
    iwidth: u32,
    owidth: u32,
    storage: u128,
    wrchunks: u32,
    rdchunks: u32,
    wrptr: u32,
    rdptr: u32,
}

impl Gearbox {
    pub fn new(iwidth: u32, owidth: u32) -> Result<Self, Error> {
        if iwidth == 0 || owidth == 0 {
            return Err(Error::ZeroWidth);
        }
        if iwidth > 64 || owidth > 64 {
            return Err(Error::WidthTooWide(iwidth.max(owidth)));
        }
        let bits = lcm(iwidth, owidth);
        if bits > 128 {
            return Err(Error::StorageTooWide(iwidth, owidth, bits));
        }
        let wrchunks = bits / iwidth;
        let rdchunks = bits / owidth;
        // The faster-advancing pointer resets to its last slot so the
        // slower side always reads data already written. Getting this
        // wrong costs the first several words after reset.
        let (wrptr, rdptr) = if iwidth > owidth {
            (0, rdchunks - 1)
        } else {
            (wrchunks - 1, 0)
        };
        Ok(Self {
            iwidth,
            owidth,
            storage: 0,
            wrchunks,
            rdchunks,
            wrptr,
            rdptr,
        })
    }

    /// Store one producer word, called once per producer tick.
    pub fn write(&mut self, word: u64) {
        let mask = mask_bits(self.iwidth);
        let shift = self.iwidth * self.wrptr;
        self.storage &= !(u128::from(mask) << shift);
        self.storage |= u128::from(word & mask) << shift;
        self.wrptr = if self.wrptr == self.wrchunks - 1 {
            0
        } else {
            self.wrptr + 1
        };
    }

    /// Fetch one consumer word, called once per consumer tick.
    pub fn read(&mut self) -> u64 {
        let mask = mask_bits(self.owidth);
        let shift = self.owidth * self.rdptr;
        let word = ((self.storage >> shift) as u64) & mask;
        self.rdptr = if self.rdptr == self.rdchunks - 1 {
            0
        } else {
            self.rdptr + 1
        };
        word
    }
}

fn mask_bits(width: u32) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}
