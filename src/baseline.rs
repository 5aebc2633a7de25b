//! Sequential (baseline) scan decoding: Huffman-coded DCT blocks straight
//! into component sample planes.

use anyhow::{bail, ensure, Result};
use log::debug;

use crate::bitreader::BitReader;
use crate::dct::idct_block;
use crate::frame::{Frame, ScanHeader};
use crate::huffman::HuffmanTable;
use crate::tables::ZIGZAG;

/// Decoded samples of one component at its own resolution, padded out to
/// whole MCUs. `width` doubles as the row stride.
pub(crate) struct SamplePlane {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) data: Vec<u8>,
}

impl SamplePlane {
    pub(crate) fn for_component(frame: &Frame, index: usize) -> Self {
        let (width, height) = frame.plane_size(&frame.components[index]);
        SamplePlane {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub(crate) fn write_block(&mut self, block_x: usize, block_y: usize, pixels: &[u8; 64]) {
        let base_x = block_x * 8;
        let base_y = block_y * 8;
        for row in 0..8 {
            let dst = (base_y + row) * self.width + base_x;
            self.data[dst..dst + 8].copy_from_slice(&pixels[row * 8..row * 8 + 8]);
        }
    }
}

/// Sign extension for a magnitude category, ITU T.81 F.2.2.1. A value whose
/// top bit is clear encodes a negative coefficient.
pub(crate) fn extend(value: u32, bits: u32) -> i32 {
    if bits == 0 {
        return 0;
    }
    let value = value as i32;
    let limit = 1 << (bits - 1);
    if value < limit {
        value - ((1 << bits) - 1)
    } else {
        value
    }
}

/// Decodes one Huffman-coded block into dequantized coefficients and renders
/// it through the inverse DCT.
fn decode_block(
    reader: &mut BitReader,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    quant: &[u16; 64],
    prev_dc: &mut i32,
    pixels: &mut [u8; 64],
) -> Result<()> {
    let mut coeffs = [0i32; 64];

    let t = dc_table.decode(reader)? as u32;
    ensure!(t <= 11, "DC magnitude category {t} out of range");
    let diff = extend(reader.read_bits(t)?, t);
    let dc = *prev_dc + diff;
    *prev_dc = dc;
    coeffs[0] = dc * quant[0] as i32;

    let mut k = 1;
    while k < 64 {
        let rs = ac_table.decode(reader)?;
        if rs == 0 {
            break;
        }
        let r = (rs >> 4) as usize;
        let s = (rs & 0x0F) as u32;
        if s == 0 {
            if r == 15 {
                k += 16;
                continue;
            }
            break;
        }

        k += r;
        if k >= 64 {
            break;
        }
        let ac = extend(reader.read_bits(s)?, s);
        let zig = ZIGZAG[k];
        coeffs[zig] = ac * quant[zig] as i32;
        k += 1;
    }

    idct_block(&coeffs, pixels);
    Ok(())
}

/// Runs one sequential scan, filling the planes of the components it covers.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_baseline_scan(
    scan_data: &[u8],
    scan: &ScanHeader,
    frame: &Frame,
    quant_tables: &[Option<[u16; 64]>; 4],
    dc_tables: &[Option<HuffmanTable>; 4],
    ac_tables: &[Option<HuffmanTable>; 4],
    restart_interval: usize,
    allow_truncated: bool,
    planes: &mut [SamplePlane],
) -> Result<()> {
    if scan.spectral_start != 0
        || scan.spectral_end != 63
        || scan.approx_high != 0
        || scan.approx_low != 0
    {
        bail!("sequential scan carries progressive parameters");
    }

    // Resolve every table up front so a missing one fails before any
    // entropy decoding happens.
    struct Selected<'t> {
        dc: &'t HuffmanTable,
        ac: &'t HuffmanTable,
        quant: &'t [u16; 64],
    }
    let mut selected = Vec::with_capacity(scan.components.len());
    for sc in &scan.components {
        let comp = &frame.components[sc.index];
        let dc = dc_tables[sc.dc_table]
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("missing DC Huffman table {}", sc.dc_table))?;
        let ac = ac_tables[sc.ac_table]
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("missing AC Huffman table {}", sc.ac_table))?;
        let quant = quant_tables[comp.quant_id]
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("missing quantization table {}", comp.quant_id))?;
        selected.push(Selected { dc, ac, quant });
    }

    let mut reader = BitReader::new(scan_data, allow_truncated);
    let mut prev_dc = vec![0i32; frame.components.len()];
    let mut pixels = [0u8; 64];

    let single = scan.components.len() == 1;
    let (scan_cols, scan_rows) = if single {
        frame.block_grid(&frame.components[scan.components[0].index])
    } else {
        (frame.mcu_cols, frame.mcu_rows)
    };

    // Under truncation tolerance an entropy error ends the scan, keeping
    // whatever decoded so far.
    let mut decode_one = |reader: &mut BitReader,
                          prev_dc: &mut Vec<i32>,
                          mx: usize,
                          my: usize,
                          mcu_index: usize|
     -> Result<()> {
        if restart_interval > 0 && mcu_index > 0 && mcu_index % restart_interval == 0 {
            reader.expect_restart_marker()?;
            for sc in &scan.components {
                prev_dc[sc.index] = 0;
            }
        }

        if single {
            let sc = &scan.components[0];
            let sel = &selected[0];
            decode_block(
                reader,
                sel.dc,
                sel.ac,
                sel.quant,
                &mut prev_dc[sc.index],
                &mut pixels,
            )?;
            planes[sc.index].write_block(mx, my, &pixels);
        } else {
            for (sc, sel) in scan.components.iter().zip(&selected) {
                let comp = &frame.components[sc.index];
                for b in 0..comp.h * comp.v {
                    decode_block(
                        reader,
                        sel.dc,
                        sel.ac,
                        sel.quant,
                        &mut prev_dc[sc.index],
                        &mut pixels,
                    )?;
                    let block_x = mx * comp.h + b % comp.h;
                    let block_y = my * comp.v + b / comp.h;
                    planes[sc.index].write_block(block_x, block_y, &pixels);
                }
            }
        }
        Ok(())
    };

    let mut mcu_index = 0usize;
    'scan: for my in 0..scan_rows {
        for mx in 0..scan_cols {
            if let Err(err) = decode_one(&mut reader, &mut prev_dc, mx, my, mcu_index) {
                if allow_truncated {
                    debug!("stopping scan at MCU {mcu_index}: {err}");
                    break 'scan;
                }
                return Err(err);
            }

            if reader.restart_seen {
                for sc in &scan.components {
                    prev_dc[sc.index] = 0;
                }
                reader.restart_seen = false;
            }

            mcu_index += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::huffman::HuffmanEncodeTable;
    use crate::tables::{STD_AC_LUMA_BITS, STD_AC_LUMA_VALUES, STD_DC_LUMA_BITS, STD_DC_VALUES};

    pub(crate) struct BitSink {
        bytes: Vec<u8>,
        acc: u32,
        bits: u32,
    }

    impl BitSink {
        pub(crate) fn new() -> Self {
            BitSink {
                bytes: vec![],
                acc: 0,
                bits: 0,
            }
        }

        pub(crate) fn push(&mut self, code: u32, size: u32) {
            self.acc = (self.acc << size) | code;
            self.bits += size;
            while self.bits >= 8 {
                self.bits -= 8;
                let b = ((self.acc >> self.bits) & 0xFF) as u8;
                self.bytes.push(b);
                if b == 0xFF {
                    self.bytes.push(0x00);
                }
            }
        }

        /// Pads the final partial byte with ones.
        pub(crate) fn finish(mut self) -> Vec<u8> {
            if self.bits > 0 {
                let pad = 8 - self.bits;
                self.push((1 << pad) - 1, pad);
            }
            self.bytes
        }
    }

    fn category(value: i32) -> u32 {
        let mut magnitude = value.unsigned_abs();
        let mut bits = 0;
        while magnitude > 0 {
            magnitude >>= 1;
            bits += 1;
        }
        bits
    }

    fn dc_raw_bits(value: i32, bits: u32) -> u32 {
        if value >= 0 {
            value as u32
        } else {
            (value + (1 << bits) - 1) as u32
        }
    }

    /// Emits one DC-only block: a DC difference followed by end-of-block.
    fn emit_dc_block(
        sink: &mut BitSink,
        dc_table: &HuffmanEncodeTable,
        ac_table: &HuffmanEncodeTable,
        diff: i32,
    ) {
        let bits = category(diff);
        let (code, size) = dc_table.code(bits as u8);
        sink.push(code as u32, size as u32);
        if bits > 0 {
            sink.push(dc_raw_bits(diff, bits), bits);
        }
        let (eob, eob_size) = ac_table.code(0x00);
        sink.push(eob as u32, eob_size as u32);
    }

    fn unit_quant() -> [Option<[u16; 64]>; 4] {
        [Some([1u16; 64]), None, None, None]
    }

    fn std_luma_tables() -> ([Option<HuffmanTable>; 4], [Option<HuffmanTable>; 4]) {
        let dc = HuffmanTable::build(&STD_DC_LUMA_BITS, &STD_DC_VALUES).unwrap();
        let ac = HuffmanTable::build(&STD_AC_LUMA_BITS, &STD_AC_LUMA_VALUES).unwrap();
        ([Some(dc), None, None, None], [Some(ac), None, None, None])
    }

    fn gray_frame(width: u8, height: u8) -> Result<Frame> {
        Frame::parse(&[8, 0, height, 0, width, 1, 1, 0x11, 0], false)
    }

    fn gray_scan(frame: &Frame) -> Result<ScanHeader> {
        ScanHeader::parse(&[1, 1, 0x00, 0, 63, 0], frame)
    }

    #[test]
    fn test_extend() {
        assert_eq!(extend(0, 0), 0);
        assert_eq!(extend(1, 1), 1);
        assert_eq!(extend(0, 1), -1);
        assert_eq!(extend(16, 5), 16);
        assert_eq!(extend(15, 5), -16);
        assert_eq!(extend(0b01111, 5), -16);
    }

    #[test]
    fn test_single_dc_block_decodes_to_flat_plane() -> Result<()> {
        let frame = gray_frame(8, 8)?;
        let scan = gray_scan(&frame)?;
        let (dc_tables, ac_tables) = std_luma_tables();

        let dc_enc = HuffmanEncodeTable::build(&STD_DC_LUMA_BITS, &STD_DC_VALUES);
        let ac_enc = HuffmanEncodeTable::build(&STD_AC_LUMA_BITS, &STD_AC_LUMA_VALUES);
        let mut sink = BitSink::new();
        emit_dc_block(&mut sink, &dc_enc, &ac_enc, 16);
        let data = sink.finish();

        let mut planes = vec![SamplePlane::for_component(&frame, 0)];
        decode_baseline_scan(
            &data,
            &scan,
            &frame,
            &unit_quant(),
            &dc_tables,
            &ac_tables,
            0,
            false,
            &mut planes,
        )?;

        // DC of 16 with unit quantization raises every sample by 16 / 8.
        assert!(planes[0].data.iter().all(|&v| v == 130));
        Ok(())
    }

    #[test]
    fn test_restart_interval_resets_dc_predictor() -> Result<()> {
        // Two vertically stacked blocks with a restart between them. Both
        // carry the same absolute DC because the predictor resets.
        let frame = gray_frame(8, 16)?;
        let scan = gray_scan(&frame)?;
        let (dc_tables, ac_tables) = std_luma_tables();

        let dc_enc = HuffmanEncodeTable::build(&STD_DC_LUMA_BITS, &STD_DC_VALUES);
        let ac_enc = HuffmanEncodeTable::build(&STD_AC_LUMA_BITS, &STD_AC_LUMA_VALUES);

        let mut sink = BitSink::new();
        emit_dc_block(&mut sink, &dc_enc, &ac_enc, 16);
        let mut data = sink.finish();
        data.extend_from_slice(&[0xFF, 0xD0]);
        let mut sink = BitSink::new();
        emit_dc_block(&mut sink, &dc_enc, &ac_enc, 16);
        data.extend_from_slice(&sink.finish());

        let mut planes = vec![SamplePlane::for_component(&frame, 0)];
        decode_baseline_scan(
            &data,
            &scan,
            &frame,
            &unit_quant(),
            &dc_tables,
            &ac_tables,
            1,
            false,
            &mut planes,
        )?;

        assert!(planes[0].data.iter().all(|&v| v == 130));
        Ok(())
    }

    #[test]
    fn test_missing_restart_marker_is_an_error() -> Result<()> {
        let frame = gray_frame(8, 16)?;
        let scan = gray_scan(&frame)?;
        let (dc_tables, ac_tables) = std_luma_tables();

        let dc_enc = HuffmanEncodeTable::build(&STD_DC_LUMA_BITS, &STD_DC_VALUES);
        let ac_enc = HuffmanEncodeTable::build(&STD_AC_LUMA_BITS, &STD_AC_LUMA_VALUES);

        // Two blocks back to back, no marker despite the declared interval.
        let mut sink = BitSink::new();
        emit_dc_block(&mut sink, &dc_enc, &ac_enc, 16);
        emit_dc_block(&mut sink, &dc_enc, &ac_enc, 16);
        let data = sink.finish();

        let mut planes = vec![SamplePlane::for_component(&frame, 0)];
        let result = decode_baseline_scan(
            &data,
            &scan,
            &frame,
            &unit_quant(),
            &dc_tables,
            &ac_tables,
            1,
            false,
            &mut planes,
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_progressive_parameters_are_rejected() -> Result<()> {
        let frame = gray_frame(8, 8)?;
        let scan = ScanHeader::parse(&[1, 1, 0x00, 0, 0, 0x01], &frame)?;
        let (dc_tables, ac_tables) = std_luma_tables();

        let mut planes = vec![SamplePlane::for_component(&frame, 0)];
        let result = decode_baseline_scan(
            &[0u8; 4],
            &scan,
            &frame,
            &unit_quant(),
            &dc_tables,
            &ac_tables,
            0,
            false,
            &mut planes,
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_missing_quant_table_is_an_error() -> Result<()> {
        let frame = gray_frame(8, 8)?;
        let scan = gray_scan(&frame)?;
        let (dc_tables, ac_tables) = std_luma_tables();

        let mut planes = vec![SamplePlane::for_component(&frame, 0)];
        let result = decode_baseline_scan(
            &[0u8; 4],
            &scan,
            &frame,
            &[None, None, None, None],
            &dc_tables,
            &ac_tables,
            0,
            false,
            &mut planes,
        );
        assert!(result.is_err());
        Ok(())
    }
}
