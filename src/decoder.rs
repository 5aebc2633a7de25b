//! Decoder entry points: the marker walk, table bookkeeping, and scan
//! dispatch for both sequential and progressive streams.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Result};
use log::{debug, warn};
use memmap::Mmap;

use crate::baseline::{decode_baseline_scan, SamplePlane};
use crate::color::compose_rgba;
use crate::frame::{Frame, ScanHeader};
use crate::huffman::{
    std_ac_chroma, std_ac_luma, std_dc_chroma, std_dc_luma, HuffmanClass, HuffmanTable,
};
use crate::marker::Marker;
use crate::orientation::{apply_orientation, parse_exif_orientation};
use crate::progressive::{decode_progressive_scan, ProgressiveState};
use crate::tables::ZIGZAG;

/// Knobs for decoding behavior beyond the defaults.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Substitute zero bits past the end of truncated sequential scan data
    /// instead of failing. Progressive scans are always decoded this way.
    pub allow_truncated: bool,
    /// Upsample subsampled chroma planes bilinearly instead of by nearest
    /// neighbor.
    pub high_quality_chroma: bool,
}

/// A decoded image: tightly packed RGBA, 8 bits per channel, with any EXIF
/// orientation already applied.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// True when the buffer starts with an SOI marker.
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == Marker::PREFIX && data[1] == Marker::SOI as u8
}

/// Decodes a JPEG to RGBA with default options.
pub fn decode_rgba(data: &[u8]) -> Result<DecodedImage> {
    decode_rgba_with(data, &DecodeOptions::default())
}

/// Decodes a JPEG to RGBA.
pub fn decode_rgba_with(data: &[u8], options: &DecodeOptions) -> Result<DecodedImage> {
    ensure!(is_jpeg(data), "missing JPEG signature");

    let mut quant_tables: [Option<[u16; 64]>; 4] = [None, None, None, None];
    let mut dc_tables: [Option<HuffmanTable>; 4] = [None, None, None, None];
    let mut ac_tables: [Option<HuffmanTable>; 4] = [None, None, None, None];

    let mut frame: Option<Frame> = None;
    let mut planes: Vec<SamplePlane> = vec![];
    let mut progressive_state: Option<ProgressiveState> = None;
    let mut restart_interval = 0usize;
    let mut orientation = 1u8;
    let mut adobe_transform: Option<u8> = None;
    let mut scan_seen = false;

    let mut offset = 2usize;
    while offset < data.len() {
        if data[offset] != Marker::PREFIX {
            offset += 1;
            continue;
        }
        while offset < data.len() && data[offset] == Marker::PREFIX {
            offset += 1;
        }
        if offset >= data.len() {
            break;
        }
        let marker = data[offset];
        offset += 1;

        if marker == Marker::EOI as u8 {
            debug!("EOI at offset {offset}");
            break;
        }
        if Marker::is_standalone(marker) {
            continue;
        }

        ensure!(offset + 2 <= data.len(), "segment length missing");
        let seg_len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
        ensure!(
            seg_len >= 2 && offset + seg_len <= data.len(),
            "segment overruns the file"
        );
        let segment = &data[offset + 2..offset + seg_len];
        offset += seg_len;

        match marker {
            m if m == Marker::SOF0 as u8 || m == Marker::SOF2 as u8 => {
                ensure!(frame.is_none(), "duplicate frame header");
                let progressive = m == Marker::SOF2 as u8;
                let parsed = Frame::parse(segment, progressive)?;
                debug!(
                    "SOF{}: {}x{}, {} components",
                    if progressive { 2 } else { 0 },
                    parsed.width,
                    parsed.height,
                    parsed.components.len()
                );
                planes = (0..parsed.components.len())
                    .map(|i| SamplePlane::for_component(&parsed, i))
                    .collect();
                progressive_state = progressive.then(|| ProgressiveState::new(&parsed));
                frame = Some(parsed);
            }
            m if m == Marker::DQT as u8 => {
                parse_dqt(segment, &mut quant_tables)?;
            }
            m if m == Marker::DHT as u8 => {
                parse_dht(segment, &mut dc_tables, &mut ac_tables)?;
            }
            m if m == Marker::DRI as u8 => {
                ensure!(segment.len() == 2, "malformed DRI segment");
                restart_interval = u16::from_be_bytes([segment[0], segment[1]]) as usize;
                debug!("restart interval {restart_interval}");
            }
            m if m == Marker::APP1 as u8 => {
                if let Some(value) = parse_exif_orientation(segment) {
                    debug!("EXIF orientation {value}");
                    orientation = value;
                }
            }
            m if m == Marker::APP14 as u8 => {
                if segment.len() >= 12 && segment.starts_with(b"Adobe") {
                    adobe_transform = Some(segment[11]);
                    debug!("Adobe transform {:?}", adobe_transform);
                }
            }
            m if m == Marker::SOS as u8 => {
                let frame = frame
                    .as_ref()
                    .ok_or_else(|| anyhow!("scan before frame header"))?;
                let scan = ScanHeader::parse(segment, frame)?;
                seed_standard_tables(&scan, frame, &mut dc_tables, &mut ac_tables)?;

                let scan_end = find_scan_end(data, offset);
                let scan_data = &data[offset..scan_end];
                debug!(
                    "SOS: {} components, {} bytes of entropy data",
                    scan.components.len(),
                    scan_data.len()
                );

                if let Some(state) = progressive_state.as_mut() {
                    decode_progressive_scan(
                        scan_data,
                        &scan,
                        frame,
                        state,
                        &quant_tables,
                        &dc_tables,
                        &ac_tables,
                        restart_interval,
                    )?;
                } else {
                    decode_baseline_scan(
                        scan_data,
                        &scan,
                        frame,
                        &quant_tables,
                        &dc_tables,
                        &ac_tables,
                        restart_interval,
                        options.allow_truncated,
                        &mut planes,
                    )?;
                }
                scan_seen = true;
                offset = scan_end;
            }
            _ => {
                debug!("skipping segment 0xFF{marker:02X} ({seg_len} bytes)");
            }
        }
    }

    let frame = frame.ok_or_else(|| anyhow!("no frame header found"))?;
    ensure!(scan_seen, "no scan data found");

    if let Some(state) = progressive_state {
        planes = state.render();
    }

    let mut width = frame.width;
    let mut height = frame.height;
    let rgba = compose_rgba(&frame, &planes, adobe_transform, options.high_quality_chroma);
    let pixels = apply_orientation(rgba, &mut width, &mut height, orientation);

    Ok(DecodedImage {
        pixels,
        width,
        height,
    })
}

fn parse_dqt(segment: &[u8], quant_tables: &mut [Option<[u16; 64]>; 4]) -> Result<()> {
    let mut pos = 0;
    while pos < segment.len() {
        let info = segment[pos];
        pos += 1;
        let precision = info >> 4;
        let id = (info & 0x0F) as usize;
        ensure!(precision == 0, "16-bit quantization tables are unsupported");
        ensure!(id < 4, "quantization table id {id} out of range");
        ensure!(pos + 64 <= segment.len(), "quantization table truncated");

        let mut table = [0u16; 64];
        for i in 0..64 {
            table[ZIGZAG[i]] = segment[pos + i] as u16;
        }
        pos += 64;
        debug!("DQT slot {id}");
        quant_tables[id] = Some(table);
    }
    Ok(())
}

fn parse_dht(
    segment: &[u8],
    dc_tables: &mut [Option<HuffmanTable>; 4],
    ac_tables: &mut [Option<HuffmanTable>; 4],
) -> Result<()> {
    let mut pos = 0;
    while pos < segment.len() {
        let info = segment[pos];
        pos += 1;
        let class = HuffmanClass::from_nibble(info >> 4)?;
        let id = (info & 0x0F) as usize;
        ensure!(id < 4, "Huffman table id {id} out of range");
        ensure!(pos + 16 <= segment.len(), "Huffman histogram truncated");

        let mut counts = [0u8; 16];
        counts.copy_from_slice(&segment[pos..pos + 16]);
        pos += 16;
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        ensure!(pos + total <= segment.len(), "Huffman values truncated");

        let table = HuffmanTable::build(&counts, &segment[pos..pos + total])?;
        pos += total;
        debug!("DHT {class:?} slot {id}, {total} symbols");
        match class {
            HuffmanClass::Dc => dc_tables[id] = Some(table),
            HuffmanClass::Ac => ac_tables[id] = Some(table),
        }
    }
    Ok(())
}

/// Fills undefined table slots 0 and 1 referenced by a scan with the ITU
/// T.81 Annex K tables. Streams that omit DHT segments entirely rely on
/// this.
fn seed_standard_tables(
    scan: &ScanHeader,
    frame: &Frame,
    dc_tables: &mut [Option<HuffmanTable>; 4],
    ac_tables: &mut [Option<HuffmanTable>; 4],
) -> Result<()> {
    for sc in &scan.components {
        if dc_tables[sc.dc_table].is_none() {
            ensure!(sc.dc_table <= 1, "missing DC Huffman table {}", sc.dc_table);
            warn!("DC table {} undefined, substituting the standard table", sc.dc_table);
            dc_tables[sc.dc_table] = Some(if sc.dc_table == 0 {
                std_dc_luma()
            } else {
                std_dc_chroma()
            });
        }
        // DC-only progressive scans never touch an AC table.
        let needs_ac = !frame.progressive || scan.spectral_start > 0 || scan.spectral_end > 0;
        if needs_ac && ac_tables[sc.ac_table].is_none() {
            ensure!(sc.ac_table <= 1, "missing AC Huffman table {}", sc.ac_table);
            warn!("AC table {} undefined, substituting the standard table", sc.ac_table);
            ac_tables[sc.ac_table] = Some(if sc.ac_table == 0 {
                std_ac_luma()
            } else {
                std_ac_chroma()
            });
        }
    }
    Ok(())
}

/// Finds the first marker after `start` that terminates entropy-coded data.
/// Stuffed bytes and restart markers belong to the scan and are skipped.
fn find_scan_end(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == Marker::PREFIX {
            let next = data[i + 1];
            if next == Marker::STUFFING || Marker::is_restart(next) {
                i += 2;
                continue;
            }
            return i;
        }
        i += 1;
    }
    data.len()
}

/// Decodes from a memory-mapped file.
pub struct Decoder {
    mmap: Mmap,
}

impl Decoder {
    pub fn from_file(file: File) -> Result<Self> {
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Decoder { mmap })
    }

    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Decoder::from_file(File::open(path)?)
    }

    pub fn decode(&self) -> Result<DecodedImage> {
        decode_rgba(&self.mmap)
    }

    pub fn decode_with(&self, options: &DecodeOptions) -> Result<DecodedImage> {
        decode_rgba_with(&self.mmap, options)
    }
}
