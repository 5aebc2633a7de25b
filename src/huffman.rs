//! Canonical Huffman tables for entropy decoding and encoding.
//!
//! A table is specified by a 16-entry histogram of code lengths plus a symbol
//! list ordered by (length, insertion order). Codes are assigned canonically:
//! each length's first code is the previous length's last code plus one,
//! shifted left once.

use std::sync::OnceLock;

use anyhow::{bail, Result};

use crate::bitreader::BitReader;
use crate::tables::{
    STD_AC_CHROMA_BITS, STD_AC_CHROMA_VALUES, STD_AC_LUMA_BITS, STD_AC_LUMA_VALUES,
    STD_DC_CHROMA_BITS, STD_DC_LUMA_BITS, STD_DC_VALUES,
};

/// Class nibble of a DHT segment: 0 selects a DC table, 1 an AC table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum HuffmanClass {
    Dc,
    Ac,
}

impl HuffmanClass {
    pub(crate) fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0 => Ok(HuffmanClass::Dc),
            1 => Ok(HuffmanClass::Ac),
            _ => bail!("unsupported Huffman table class {nibble}"),
        }
    }
}

/// Decode-side canonical table. `min_code`/`max_code`/`val_ptr` are indexed
/// by code length 1..=16; a length with no codes has `max_code == -1`.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
    min_code: [i32; 17],
    max_code: [i32; 17],
    val_ptr: [usize; 17],
    values: Vec<u8>,
}

impl HuffmanTable {
    pub(crate) fn build(counts: &[u8; 16], values: &[u8]) -> Result<Self> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total != values.len() {
            bail!(
                "Huffman length histogram covers {total} symbols, got {}",
                values.len()
            );
        }

        let mut min_code = [-1i32; 17];
        let mut max_code = [-1i32; 17];
        let mut val_ptr = [0usize; 17];

        let mut code = 0i32;
        let mut k = 0usize;
        for len in 1..=16usize {
            let count = counts[len - 1] as i32;
            if count != 0 {
                min_code[len] = code;
                val_ptr[len] = k;
                code += count;
                max_code[len] = code - 1;
                k += count as usize;
            }
            if code > 1 << len {
                bail!("Huffman length histogram overflows {len}-bit codes");
            }
            code <<= 1;
        }

        Ok(HuffmanTable {
            min_code,
            max_code,
            val_ptr,
            values: values.to_vec(),
        })
    }

    /// Reads one bit at a time until the accumulated code falls inside some
    /// length's `[min_code, max_code]` window. Failing to match within 16
    /// bits is a decode error, or symbol 0 under truncation tolerance.
    pub(crate) fn decode(&self, reader: &mut BitReader) -> Result<u8> {
        let mut code = 0i32;
        for len in 1..=16usize {
            code = (code << 1) | reader.read_bit()? as i32;
            if self.max_code[len] < 0 {
                continue;
            }
            if code <= self.max_code[len] {
                let index = self.val_ptr[len] + (code - self.min_code[len]) as usize;
                return Ok(self.values[index]);
            }
        }
        if reader.allow_truncated() {
            return Ok(0);
        }
        bail!("invalid Huffman code");
    }
}

/// Encode-side table: canonical code and length looked up by symbol.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanEncodeTable {
    codes: [u16; 256],
    sizes: [u8; 256],
}

impl HuffmanEncodeTable {
    pub(crate) fn build(counts: &[u8; 16], values: &[u8]) -> Self {
        let mut codes = [0u16; 256];
        let mut sizes = [0u8; 256];

        let mut code = 0u32;
        let mut k = 0usize;
        for len in 1..=16u8 {
            for _ in 0..counts[len as usize - 1] {
                let symbol = values[k] as usize;
                k += 1;
                codes[symbol] = code as u16;
                sizes[symbol] = len;
                code += 1;
            }
            code <<= 1;
        }

        HuffmanEncodeTable { codes, sizes }
    }

    pub(crate) fn code(&self, symbol: u8) -> (u16, u8) {
        (self.codes[symbol as usize], self.sizes[symbol as usize])
    }
}

fn std_table(cell: &OnceLock<HuffmanTable>, counts: &[u8; 16], values: &[u8]) -> HuffmanTable {
    cell.get_or_init(|| {
        HuffmanTable::build(counts, values).expect("standard table constants are well-formed")
    })
    .clone()
}

pub(crate) fn std_dc_luma() -> HuffmanTable {
    static TABLE: OnceLock<HuffmanTable> = OnceLock::new();
    std_table(&TABLE, &STD_DC_LUMA_BITS, &STD_DC_VALUES)
}

pub(crate) fn std_dc_chroma() -> HuffmanTable {
    static TABLE: OnceLock<HuffmanTable> = OnceLock::new();
    std_table(&TABLE, &STD_DC_CHROMA_BITS, &STD_DC_VALUES)
}

pub(crate) fn std_ac_luma() -> HuffmanTable {
    static TABLE: OnceLock<HuffmanTable> = OnceLock::new();
    std_table(&TABLE, &STD_AC_LUMA_BITS, &STD_AC_LUMA_VALUES)
}

pub(crate) fn std_ac_chroma() -> HuffmanTable {
    static TABLE: OnceLock<HuffmanTable> = OnceLock::new();
    std_table(&TABLE, &STD_AC_CHROMA_BITS, &STD_AC_CHROMA_VALUES)
}
