//! Progressive scan decoding. Coefficients accumulate across scans in a
//! per-component store, already dequantized, and are rendered once every
//! scan has been consumed.

use anyhow::{anyhow, ensure, Result};
use log::debug;
use rayon::prelude::*;

use crate::baseline::{extend, SamplePlane};
use crate::bitreader::BitReader;
use crate::dct::idct_block;
use crate::frame::{Frame, ScanHeader, ScanKind};
use crate::huffman::HuffmanTable;
use crate::tables::ZIGZAG;

/// Dequantized DCT coefficients of one component, a 64-entry block per grid
/// cell, padded out to whole MCUs.
pub(crate) struct CoefficientStore {
    pub(crate) blocks_per_row: usize,
    pub(crate) blocks_per_col: usize,
    pub(crate) coeffs: Vec<i32>,
}

pub(crate) struct ProgressiveState {
    pub(crate) components: Vec<CoefficientStore>,
}

impl ProgressiveState {
    pub(crate) fn new(frame: &Frame) -> Self {
        let components = frame
            .components
            .iter()
            .map(|comp| {
                let (blocks_per_row, blocks_per_col) = frame.block_grid(comp);
                CoefficientStore {
                    blocks_per_row,
                    blocks_per_col,
                    coeffs: vec![0; blocks_per_row * blocks_per_col * 64],
                }
            })
            .collect();
        ProgressiveState { components }
    }

    /// Runs the inverse DCT over every accumulated block, one component per
    /// worker.
    pub(crate) fn render(&self) -> Vec<SamplePlane> {
        self.components
            .par_iter()
            .map(|store| {
                let width = store.blocks_per_row * 8;
                let height = store.blocks_per_col * 8;
                let mut plane = SamplePlane {
                    width,
                    height,
                    data: vec![0; width * height],
                };
                let mut block = [0i32; 64];
                let mut pixels = [0u8; 64];
                for by in 0..store.blocks_per_col {
                    for bx in 0..store.blocks_per_row {
                        let base = (by * store.blocks_per_row + bx) * 64;
                        block.copy_from_slice(&store.coeffs[base..base + 64]);
                        idct_block(&block, &mut pixels);
                        plane.write_block(bx, by, &pixels);
                    }
                }
                plane
            })
            .collect()
    }
}

struct BlockDecoder<'t> {
    kind: ScanKind,
    spectral_start: usize,
    spectral_end: usize,
    approx_low: u8,
    dc_table: Option<&'t HuffmanTable>,
    ac_table: Option<&'t HuffmanTable>,
}

impl<'t> BlockDecoder<'t> {
    #[allow(clippy::too_many_arguments)]
    fn decode(
        &self,
        reader: &mut BitReader,
        store: &mut CoefficientStore,
        quant: &[u16; 64],
        prev_dc: &mut i32,
        block_x: usize,
        block_y: usize,
        eob_run: &mut u32,
    ) -> Result<()> {
        let base = (block_y * store.blocks_per_row + block_x) * 64;
        let coeffs = &mut store.coeffs[base..base + 64];

        match self.kind {
            ScanKind::DcFirst => {
                let table = self.dc_table.ok_or_else(|| anyhow!("missing DC table"))?;
                let t = table.decode(reader)? as u32;
                ensure!(t <= 16, "DC magnitude category {t} out of range");
                let diff = extend(reader.read_bits(t)?, t);
                // The predictor tracks the shifted value.
                let dc = *prev_dc + (diff << self.approx_low);
                *prev_dc = dc;
                coeffs[0] = dc * quant[0] as i32;
            }
            ScanKind::DcRefine => {
                if reader.read_bit()? != 0 {
                    let delta = (1 << self.approx_low) * quant[0] as i32;
                    coeffs[0] += if coeffs[0] >= 0 { delta } else { -delta };
                }
            }
            ScanKind::AcFirst => {
                self.decode_ac_first(reader, coeffs, quant, eob_run)?;
            }
            ScanKind::AcRefine => {
                self.decode_ac_refine(reader, coeffs, quant, eob_run)?;
            }
            ScanKind::Baseline => unreachable!("sequential scans take the baseline path"),
        }
        Ok(())
    }

    fn decode_ac_first(
        &self,
        reader: &mut BitReader,
        coeffs: &mut [i32],
        quant: &[u16; 64],
        eob_run: &mut u32,
    ) -> Result<()> {
        if *eob_run > 0 {
            *eob_run -= 1;
            return Ok(());
        }

        let table = self.ac_table.ok_or_else(|| anyhow!("missing AC table"))?;
        let mut k = self.spectral_start;
        while k <= self.spectral_end {
            let rs = table.decode(reader)?;
            if rs == 0 {
                *eob_run = 0;
                break;
            }
            let r = (rs >> 4) as usize;
            let s = (rs & 0x0F) as u32;
            if s == 0 {
                if r == 15 {
                    k += 16;
                    continue;
                }
                *eob_run = (1 << r) - 1;
                if r > 0 {
                    *eob_run += reader.read_bits(r as u32)?;
                }
                break;
            }

            k += r;
            if k > self.spectral_end {
                break;
            }
            let ac = extend(reader.read_bits(s)?, s);
            let zig = ZIGZAG[k];
            coeffs[zig] = (ac << self.approx_low) * quant[zig] as i32;
            k += 1;
        }
        Ok(())
    }

    fn decode_ac_refine(
        &self,
        reader: &mut BitReader,
        coeffs: &mut [i32],
        quant: &[u16; 64],
        eob_run: &mut u32,
    ) -> Result<()> {
        let mut k = self.spectral_start;

        if *eob_run > 0 {
            while k <= self.spectral_end {
                self.refine(reader, coeffs, quant, k)?;
                k += 1;
            }
            *eob_run -= 1;
            return Ok(());
        }

        let table = self.ac_table.ok_or_else(|| anyhow!("missing AC table"))?;
        while k <= self.spectral_end {
            let rs = table.decode(reader)?;
            let mut r = (rs >> 4) as usize;
            let s = (rs & 0x0F) as u32;

            if s == 0 {
                if r == 15 {
                    // Skip past sixteen zero coefficients, refining the
                    // nonzero ones passed over.
                    let mut zeros = 16;
                    while zeros > 0 && k <= self.spectral_end {
                        let zig = ZIGZAG[k];
                        self.refine(reader, coeffs, quant, k)?;
                        if coeffs[zig] == 0 {
                            zeros -= 1;
                        }
                        k += 1;
                    }
                    continue;
                }

                *eob_run = (1 << r) - 1;
                if r > 0 {
                    *eob_run += reader.read_bits(r as u32)?;
                }
                while k <= self.spectral_end {
                    self.refine(reader, coeffs, quant, k)?;
                    k += 1;
                }
                break;
            }

            while r > 0 && k <= self.spectral_end {
                let zig = ZIGZAG[k];
                self.refine(reader, coeffs, quant, k)?;
                if coeffs[zig] == 0 {
                    r -= 1;
                }
                k += 1;
            }

            if k > self.spectral_end {
                break;
            }
            let ac = if s == 1 {
                if reader.read_bit()? == 1 {
                    1
                } else {
                    -1
                }
            } else {
                extend(reader.read_bits(s)?, s)
            };
            let zig = ZIGZAG[k];
            coeffs[zig] = (ac << self.approx_low) * quant[zig] as i32;
            k += 1;
        }
        Ok(())
    }

    /// Adds the next approximation bit to an already-nonzero coefficient.
    fn refine(
        &self,
        reader: &mut BitReader,
        coeffs: &mut [i32],
        quant: &[u16; 64],
        k: usize,
    ) -> Result<()> {
        let zig = ZIGZAG[k];
        if coeffs[zig] == 0 {
            return Ok(());
        }
        if reader.read_bit()? == 0 {
            return Ok(());
        }
        let delta = (1 << self.approx_low) * quant[zig] as i32;
        coeffs[zig] += if coeffs[zig] > 0 { delta } else { -delta };
        Ok(())
    }
}

/// Runs one progressive scan against the accumulated coefficient state.
/// These scans are always decoded leniently with respect to truncation.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_progressive_scan(
    scan_data: &[u8],
    scan: &ScanHeader,
    frame: &Frame,
    state: &mut ProgressiveState,
    quant_tables: &[Option<[u16; 64]>; 4],
    dc_tables: &[Option<HuffmanTable>; 4],
    ac_tables: &[Option<HuffmanTable>; 4],
    restart_interval: usize,
) -> Result<()> {
    let kind = scan.kind(true);

    let mut quants = Vec::with_capacity(scan.components.len());
    let mut decoders = Vec::with_capacity(scan.components.len());
    for sc in &scan.components {
        let comp = &frame.components[sc.index];
        quants.push(
            *quant_tables[comp.quant_id]
                .as_ref()
                .ok_or_else(|| anyhow!("missing quantization table {}", comp.quant_id))?,
        );
        decoders.push(BlockDecoder {
            kind,
            spectral_start: scan.spectral_start,
            spectral_end: scan.spectral_end,
            approx_low: scan.approx_low,
            dc_table: dc_tables[sc.dc_table].as_ref(),
            ac_table: ac_tables[sc.ac_table].as_ref(),
        });
    }

    let mut reader = BitReader::new(scan_data, true);
    let mut prev_dc = vec![0i32; frame.components.len()];
    let mut eob_run = 0u32;

    let single = scan.components.len() == 1;
    let (scan_cols, scan_rows) = if single {
        let store = &state.components[scan.components[0].index];
        (store.blocks_per_row, store.blocks_per_col)
    } else {
        (frame.mcu_cols, frame.mcu_rows)
    };

    let mut decode_one = |reader: &mut BitReader,
                          prev_dc: &mut Vec<i32>,
                          eob_run: &mut u32,
                          mx: usize,
                          my: usize,
                          mcu_index: usize|
     -> Result<()> {
        if restart_interval > 0 && mcu_index > 0 && mcu_index % restart_interval == 0 {
            reader.expect_restart_marker()?;
            for sc in &scan.components {
                prev_dc[sc.index] = 0;
            }
            *eob_run = 0;
        }

        if single {
            let sc = &scan.components[0];
            decoders[0].decode(
                reader,
                &mut state.components[sc.index],
                &quants[0],
                &mut prev_dc[sc.index],
                mx,
                my,
                eob_run,
            )?;
        } else {
            for (i, sc) in scan.components.iter().enumerate() {
                let comp = &frame.components[sc.index];
                for b in 0..comp.h * comp.v {
                    let block_x = mx * comp.h + b % comp.h;
                    let block_y = my * comp.v + b / comp.h;
                    decoders[i].decode(
                        reader,
                        &mut state.components[sc.index],
                        &quants[i],
                        &mut prev_dc[sc.index],
                        block_x,
                        block_y,
                        eob_run,
                    )?;
                }
            }
        }
        Ok(())
    };

    let mut mcu_index = 0usize;
    'scan: for my in 0..scan_rows {
        for mx in 0..scan_cols {
            // Scan errors keep the coefficients accumulated so far.
            if let Err(err) =
                decode_one(&mut reader, &mut prev_dc, &mut eob_run, mx, my, mcu_index)
            {
                debug!("stopping scan at MCU {mcu_index}: {err}");
                break 'scan;
            }

            if reader.restart_seen {
                for sc in &scan.components {
                    prev_dc[sc.index] = 0;
                }
                reader.restart_seen = false;
                eob_run = 0;
            }

            mcu_index += 1;
        }
    }

    Ok(())
}
