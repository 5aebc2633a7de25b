//! MSB-first bit cursor over the entropy-coded bytes of one scan.
//!
//! The reader undoes byte stuffing (`0xFF 0x00` reads as a literal `0xFF`),
//! recognizes restart markers embedded in the scan data, and optionally
//! tolerates truncation by yielding zero bits past the end of the data.

use anyhow::{bail, Result};

use crate::marker::Marker;

pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buffer: u32,
    bit_count: u32,
    allow_truncated: bool,

    /// Set when a restart marker is encountered while refilling the buffer.
    /// The caller resets its DC predictors (and EOB run) and clears the flag.
    pub(crate) restart_seen: bool,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8], allow_truncated: bool) -> Self {
        BitReader {
            data,
            pos: 0,
            bit_buffer: 0,
            bit_count: 0,
            allow_truncated,
            restart_seen: false,
        }
    }

    pub(crate) fn allow_truncated(&self) -> bool {
        self.allow_truncated
    }

    pub(crate) fn read_bit(&mut self) -> Result<u32> {
        self.ensure_bits(1)?;
        self.bit_count -= 1;
        let bit = (self.bit_buffer >> self.bit_count) & 1;
        self.bit_buffer &= (1 << self.bit_count) - 1;
        Ok(bit)
    }

    /// Reads `count` bits MSB-first, `count <= 16`.
    pub(crate) fn read_bits(&mut self, count: u32) -> Result<u32> {
        if count == 0 {
            return Ok(0);
        }
        debug_assert!(count <= 16);
        self.ensure_bits(count)?;
        self.bit_count -= count;
        let value = (self.bit_buffer >> self.bit_count) & ((1 << count) - 1);
        self.bit_buffer &= (1u32 << self.bit_count) - 1;
        Ok(value)
    }

    /// Discards buffered bits and consumes exactly one restart marker from the
    /// byte stream, failing if anything else is found first.
    pub(crate) fn expect_restart_marker(&mut self) -> Result<()> {
        self.bit_buffer = 0;
        self.bit_count = 0;

        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            self.pos += 1;
            if b != Marker::PREFIX {
                continue;
            }
            while self.pos < self.data.len() && self.data[self.pos] == Marker::PREFIX {
                self.pos += 1;
            }
            if self.pos >= self.data.len() {
                bail!("unexpected end of scan data");
            }
            let code = self.data[self.pos];
            self.pos += 1;
            if Marker::is_restart(code) {
                self.restart_seen = false;
                return Ok(());
            }
            if code == Marker::STUFFING {
                continue;
            }
            bail!("unexpected marker 0xFF{code:02X} inside scan data");
        }
        bail!("missing restart marker");
    }

    fn ensure_bits(&mut self, count: u32) -> Result<()> {
        while self.bit_count < count {
            let b = self.next_byte()?;
            self.bit_buffer = (self.bit_buffer << 8) | b as u32;
            self.bit_count += 8;
        }
        Ok(())
    }

    fn next_byte(&mut self) -> Result<u8> {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            self.pos += 1;
            if b != Marker::PREFIX {
                return Ok(b);
            }
            if self.pos >= self.data.len() {
                if self.allow_truncated {
                    return Ok(0);
                }
                bail!("unexpected end of scan data");
            }
            let code = self.data[self.pos];
            self.pos += 1;
            if code == Marker::STUFFING {
                return Ok(Marker::PREFIX);
            }
            if Marker::is_restart(code) {
                self.restart_seen = true;
                continue;
            }
            bail!("unexpected marker 0xFF{code:02X} inside scan data");
        }
        if self.allow_truncated {
            return Ok(0);
        }
        bail!("unexpected end of scan data");
    }
}
