//! JPEG encoding: RGBA in, baseline or progressive JFIF out, with
//! selectable chroma subsampling, optional image-specific Huffman tables,
//! and EXIF / XMP / ICC metadata segments.

use anyhow::{ensure, Result};
use log::debug;

use crate::dct::fdct_quantize;
use crate::huffman::HuffmanEncodeTable;
use crate::huffman_opt::build_optimized;
use crate::marker::Marker;
use crate::tables::{
    scale_quant_table, STD_AC_CHROMA_BITS, STD_AC_CHROMA_VALUES, STD_AC_LUMA_BITS,
    STD_AC_LUMA_VALUES, STD_CHROMA_QUANT, STD_DC_CHROMA_BITS, STD_DC_LUMA_BITS, STD_DC_VALUES,
    STD_LUMA_QUANT, ZIGZAG,
};

/// Chroma subsampling layouts. The factors describe the luma component;
/// chroma is always stored at 1x1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Subsampling {
    /// Full-resolution chroma.
    #[default]
    S444,
    /// Chroma halved horizontally.
    S422,
    /// Chroma halved in both directions.
    S420,
}

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// 1..=100, where larger is better fidelity.
    pub quality: u8,
    pub subsampling: Subsampling,
    /// Emit a two-scan progressive stream instead of a sequential one.
    pub progressive: bool,
    /// Derive Huffman tables from this image's symbol statistics instead of
    /// using the ITU T.81 Annex K tables.
    pub optimize_huffman: bool,
    /// Emit a JFIF APP0 segment.
    pub write_jfif: bool,
    /// Raw EXIF payload; the `Exif\0\0` prefix is added when absent.
    pub exif: Option<Vec<u8>>,
    /// Raw XMP packet; the XMP namespace prefix is added when absent.
    pub xmp: Option<Vec<u8>>,
    /// ICC profile, split over as many APP2 segments as needed.
    pub icc: Option<Vec<u8>>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            quality: 75,
            subsampling: Subsampling::default(),
            progressive: false,
            optimize_huffman: false,
            write_jfif: true,
            exif: None,
            xmp: None,
            icc: None,
        }
    }
}

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const XMP_PREFIX: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_PREFIX: &[u8] = b"ICC_PROFILE\0";

/// An APP segment length field covers itself, so payloads top out just
/// short of 64 KiB.
const MAX_APP_PAYLOAD: usize = 0xFFFD;

struct ComponentSpec {
    id: u8,
    h: usize,
    v: usize,
    quant_id: u8,
    dc_table: usize,
    ac_table: usize,
}

struct CoefficientPlane {
    blocks_per_row: usize,
    blocks_per_col: usize,
    data: Vec<i32>,
}

/// Clamped, alpha-flattened view of the input buffer. Pixels with partial
/// alpha are composited over white; reads past the edges replicate the
/// nearest pixel.
struct RgbaView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> RgbaView<'a> {
    fn rgb(&self, x: usize, y: usize) -> (i32, i32, i32) {
        let px = x.min(self.width - 1);
        let py = y.min(self.height - 1);
        let p = py * self.stride + px * 4;
        let mut r = self.data[p] as i32;
        let mut g = self.data[p + 1] as i32;
        let mut b = self.data[p + 2] as i32;
        let a = self.data[p + 3] as i32;
        if a != 255 {
            let inv = 255 - a;
            r = (r * a + 255 * inv + 127) / 255;
            g = (g * a + 255 * inv + 127) / 255;
            b = (b * a + 255 * inv + 127) / 255;
        }
        (r, g, b)
    }

    fn is_grayscale(&self) -> bool {
        for y in 0..self.height {
            for x in 0..self.width {
                let (r, g, b) = self.rgb(x, y);
                if r != g || r != b {
                    return false;
                }
            }
        }
        true
    }
}

fn luma(r: i32, g: i32, b: i32) -> i32 {
    (77 * r + 150 * g + 29 * b + 128) >> 8
}

fn chroma_blue(r: i32, g: i32, b: i32) -> i32 {
    ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128
}

fn chroma_red(r: i32, g: i32, b: i32) -> i32 {
    ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128
}

/// Encodes an RGBA buffer as a JPEG. `stride` is the distance between rows
/// in bytes and must cover `width * 4`.
pub fn encode_rgba(
    rgba: &[u8],
    width: usize,
    height: usize,
    stride: usize,
    options: &EncodeOptions,
) -> Result<Vec<u8>> {
    ensure!(width > 0 && height > 0, "image has zero dimension");
    ensure!(
        width <= 0xFFFF && height <= 0xFFFF,
        "image dimensions exceed 65535"
    );
    ensure!(stride >= width * 4, "stride shorter than a pixel row");
    ensure!(
        rgba.len() >= height * stride,
        "RGBA buffer shorter than {height} rows of {stride} bytes"
    );
    ensure!(
        (1..=100).contains(&options.quality),
        "quality {} outside 1..=100",
        options.quality
    );
    validate_metadata(options)?;

    let view = RgbaView {
        data: rgba,
        width,
        height,
        stride,
    };

    let quant_luma = scale_quant_table(&STD_LUMA_QUANT, options.quality);
    let quant_chroma = scale_quant_table(&STD_CHROMA_QUANT, options.quality);

    let grayscale = view.is_grayscale();
    let components = build_components(options.subsampling, grayscale);
    debug!(
        "encoding {width}x{height}, {} components, quality {}, progressive={}",
        components.len(),
        options.quality,
        options.progressive
    );

    let coeffs = build_coefficients(&view, &components, &quant_luma, &quant_chroma);
    let tables = build_tables(&components, &coeffs, options.optimize_huffman);

    let mut out = Vec::new();
    put_marker(&mut out, Marker::SOI as u8);
    if options.write_jfif {
        write_app0(&mut out);
    }
    write_metadata(&mut out, options);

    write_dqt(&mut out, 0, &quant_luma);
    if !grayscale {
        write_dqt(&mut out, 1, &quant_chroma);
    }

    write_sof(&mut out, options.progressive, width, height, &components);

    write_dht(&mut out, 0, 0, &tables.dc_luma);
    write_dht(&mut out, 1, 0, &tables.ac_luma);
    if !grayscale {
        write_dht(&mut out, 0, 1, &tables.dc_chroma);
        write_dht(&mut out, 1, 1, &tables.ac_chroma);
    }

    if options.progressive {
        encode_progressive(&mut out, &components, &coeffs, &tables);
    } else {
        encode_baseline(&mut out, &components, &coeffs, &tables);
    }

    put_marker(&mut out, Marker::EOI as u8);
    Ok(out)
}

fn validate_metadata(options: &EncodeOptions) -> Result<()> {
    if let Some(exif) = &options.exif {
        let extra = if exif.starts_with(EXIF_PREFIX) { 0 } else { EXIF_PREFIX.len() };
        ensure!(exif.len() + extra <= MAX_APP_PAYLOAD, "EXIF payload too large");
    }
    if let Some(xmp) = &options.xmp {
        let extra = if xmp.starts_with(XMP_PREFIX) { 0 } else { XMP_PREFIX.len() };
        ensure!(xmp.len() + extra <= MAX_APP_PAYLOAD, "XMP payload too large");
    }
    if let Some(icc) = &options.icc {
        let max_data = MAX_APP_PAYLOAD - ICC_PREFIX.len() - 2;
        let segments = icc.len().div_ceil(max_data);
        ensure!(segments <= 255, "ICC profile needs more than 255 segments");
    }
    Ok(())
}

fn build_components(subsampling: Subsampling, grayscale: bool) -> Vec<ComponentSpec> {
    if grayscale {
        return vec![ComponentSpec {
            id: 1,
            h: 1,
            v: 1,
            quant_id: 0,
            dc_table: 0,
            ac_table: 0,
        }];
    }

    let (y_h, y_v) = match subsampling {
        Subsampling::S444 => (1, 1),
        Subsampling::S422 => (2, 1),
        Subsampling::S420 => (2, 2),
    };

    vec![
        ComponentSpec {
            id: 1,
            h: y_h,
            v: y_v,
            quant_id: 0,
            dc_table: 0,
            ac_table: 0,
        },
        ComponentSpec {
            id: 2,
            h: 1,
            v: 1,
            quant_id: 1,
            dc_table: 1,
            ac_table: 1,
        },
        ComponentSpec {
            id: 3,
            h: 1,
            v: 1,
            quant_id: 1,
            dc_table: 1,
            ac_table: 1,
        },
    ]
}

fn build_coefficients(
    view: &RgbaView,
    components: &[ComponentSpec],
    quant_luma: &[u16; 64],
    quant_chroma: &[u16; 64],
) -> Vec<CoefficientPlane> {
    let max_h = components.iter().map(|c| c.h).max().unwrap_or(1);
    let max_v = components.iter().map(|c| c.v).max().unwrap_or(1);
    let mcu_cols = view.width.div_ceil(max_h * 8);
    let mcu_rows = view.height.div_ceil(max_v * 8);

    let mut planes: Vec<CoefficientPlane> = components
        .iter()
        .map(|comp| {
            let blocks_per_row = mcu_cols * comp.h;
            let blocks_per_col = mcu_rows * comp.v;
            CoefficientPlane {
                blocks_per_row,
                blocks_per_col,
                data: vec![0; blocks_per_row * blocks_per_col * 64],
            }
        })
        .collect();

    let has_chroma = components.len() == 3;
    let luma_spec = &components[0];

    let mut block = [0f32; 64];
    let mut cb_block = [0f32; 64];
    let mut cr_block = [0f32; 64];

    for my in 0..mcu_rows {
        for mx in 0..mcu_cols {
            for vy in 0..luma_spec.v {
                for vx in 0..luma_spec.h {
                    let block_x = mx * luma_spec.h + vx;
                    let block_y = my * luma_spec.v + vy;
                    load_block_luma(view, block_x * 8, block_y * 8, &mut block);
                    let quantized = fdct_quantize(&block, quant_luma);
                    let base = (block_y * planes[0].blocks_per_row + block_x) * 64;
                    planes[0].data[base..base + 64].copy_from_slice(&quantized);
                }
            }

            if has_chroma {
                let sample_w = max_h;
                let sample_h = max_v;
                load_block_chroma(
                    view,
                    mx * 8 * sample_w,
                    my * 8 * sample_h,
                    sample_w,
                    sample_h,
                    &mut cb_block,
                    &mut cr_block,
                );

                let base = (my * planes[1].blocks_per_row + mx) * 64;
                let quantized = fdct_quantize(&cb_block, quant_chroma);
                planes[1].data[base..base + 64].copy_from_slice(&quantized);
                let quantized = fdct_quantize(&cr_block, quant_chroma);
                planes[2].data[base..base + 64].copy_from_slice(&quantized);
            }
        }
    }

    planes
}

fn load_block_luma(view: &RgbaView, x0: usize, y0: usize, block: &mut [f32; 64]) {
    for y in 0..8 {
        for x in 0..8 {
            let (r, g, b) = view.rgb(x0 + x, y0 + y);
            block[y * 8 + x] = (luma(r, g, b) - 128) as f32;
        }
    }
}

/// Loads one chroma block per MCU, averaging the `sample_w` by `sample_h`
/// pixel footprint of each chroma sample before converting.
fn load_block_chroma(
    view: &RgbaView,
    x0: usize,
    y0: usize,
    sample_w: usize,
    sample_h: usize,
    cb_block: &mut [f32; 64],
    cr_block: &mut [f32; 64],
) {
    let count = (sample_w * sample_h) as i32;
    for y in 0..8 {
        for x in 0..8 {
            let mut sum_r = 0;
            let mut sum_g = 0;
            let mut sum_b = 0;
            for sy in 0..sample_h {
                for sx in 0..sample_w {
                    let (r, g, b) = view.rgb(x0 + x * sample_w + sx, y0 + y * sample_h + sy);
                    sum_r += r;
                    sum_g += g;
                    sum_b += b;
                }
            }
            let r = (sum_r + count / 2) / count;
            let g = (sum_g + count / 2) / count;
            let b = (sum_b + count / 2) / count;
            cb_block[y * 8 + x] = (chroma_blue(r, g, b) - 128) as f32;
            cr_block[y * 8 + x] = (chroma_red(r, g, b) - 128) as f32;
        }
    }
}

struct TableSpec {
    bits: [u8; 16],
    values: Vec<u8>,
    encode: HuffmanEncodeTable,
}

impl TableSpec {
    fn standard(bits: &[u8; 16], values: &[u8]) -> Self {
        TableSpec {
            bits: *bits,
            values: values.to_vec(),
            encode: HuffmanEncodeTable::build(bits, values),
        }
    }
}

struct EncoderTables {
    dc_luma: TableSpec,
    ac_luma: TableSpec,
    dc_chroma: TableSpec,
    ac_chroma: TableSpec,
}

fn build_tables(
    components: &[ComponentSpec],
    coeffs: &[CoefficientPlane],
    optimize: bool,
) -> EncoderTables {
    if !optimize {
        return EncoderTables {
            dc_luma: TableSpec::standard(&STD_DC_LUMA_BITS, &STD_DC_VALUES),
            ac_luma: TableSpec::standard(&STD_AC_LUMA_BITS, &STD_AC_LUMA_VALUES),
            dc_chroma: TableSpec::standard(&STD_DC_CHROMA_BITS, &STD_DC_VALUES),
            ac_chroma: TableSpec::standard(&STD_AC_CHROMA_BITS, &STD_AC_CHROMA_VALUES),
        };
    }

    let mut freq_dc_luma = [0u32; 256];
    let mut freq_ac_luma = [0u32; 256];
    let mut freq_dc_chroma = [0u32; 256];
    let mut freq_ac_chroma = [0u32; 256];

    let mcu_cols = coeffs[0].blocks_per_row / components[0].h;
    let mcu_rows = coeffs[0].blocks_per_col / components[0].v;
    let mut prev_dc = vec![0i32; components.len()];

    for my in 0..mcu_rows {
        for mx in 0..mcu_cols {
            for (ci, comp) in components.iter().enumerate() {
                let plane = &coeffs[ci];
                let (freq_dc, freq_ac) = if ci == 0 {
                    (&mut freq_dc_luma, &mut freq_ac_luma)
                } else {
                    (&mut freq_dc_chroma, &mut freq_ac_chroma)
                };
                for b in 0..comp.h * comp.v {
                    let block_x = mx * comp.h + b % comp.h;
                    let block_y = my * comp.v + b / comp.h;
                    let base = (block_y * plane.blocks_per_row + block_x) * 64;

                    let dc = plane.data[base];
                    let diff = dc - prev_dc[ci];
                    prev_dc[ci] = dc;
                    freq_dc[bit_count(diff) as usize] += 1;

                    accumulate_ac(&plane.data[base..base + 64], freq_ac);
                }
            }
        }
    }

    let dc_luma = build_optimized(&freq_dc_luma);
    let ac_luma = build_optimized(&freq_ac_luma);
    let dc_chroma = build_optimized(&freq_dc_chroma);
    let ac_chroma = build_optimized(&freq_ac_chroma);

    let spec = |t: crate::huffman_opt::OptimizedTable| TableSpec {
        encode: HuffmanEncodeTable::build(&t.bits, &t.values),
        bits: t.bits,
        values: t.values,
    };

    EncoderTables {
        dc_luma: spec(dc_luma),
        ac_luma: spec(ac_luma),
        dc_chroma: spec(dc_chroma),
        ac_chroma: spec(ac_chroma),
    }
}

fn accumulate_ac(block: &[i32], freq: &mut [u32; 256]) {
    let mut zero_run = 0usize;
    for i in 1..64 {
        let v = block[ZIGZAG[i]];
        if v == 0 {
            zero_run += 1;
            continue;
        }
        while zero_run >= 16 {
            freq[0xF0] += 1;
            zero_run -= 16;
        }
        let symbol = (zero_run << 4) | bit_count(v) as usize;
        freq[symbol] += 1;
        zero_run = 0;
    }
    if zero_run > 0 {
        freq[0x00] += 1;
    }
}

fn bit_count(value: i32) -> u32 {
    32 - value.unsigned_abs().leading_zeros()
}

/// Two's-complement style raw bits for a magnitude category, T.81 F.1.2.1.
fn encode_value(value: i32, bits: u32) -> u32 {
    if value >= 0 {
        value as u32
    } else {
        (value + (1 << bits) - 1) as u32
    }
}

struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    buffer: u32,
    bits: u32,
}

impl<'a> BitWriter<'a> {
    fn new(out: &'a mut Vec<u8>) -> Self {
        BitWriter {
            out,
            buffer: 0,
            bits: 0,
        }
    }

    fn write_bits(&mut self, bits: u32, count: u32) {
        if count == 0 {
            return;
        }
        self.buffer = (self.buffer << count) | (bits & ((1u32 << count) - 1));
        self.bits += count;
        while self.bits >= 8 {
            self.bits -= 8;
            self.put_byte(((self.buffer >> self.bits) & 0xFF) as u8);
        }
    }

    fn write_code(&mut self, table: &HuffmanEncodeTable, symbol: u8) {
        let (code, size) = table.code(symbol);
        self.write_bits(code as u32, size as u32);
    }

    fn flush(&mut self) {
        if self.bits > 0 {
            let b = ((self.buffer << (8 - self.bits)) & 0xFF) as u8;
            self.put_byte(b);
            self.bits = 0;
        }
    }

    fn put_byte(&mut self, b: u8) {
        self.out.push(b);
        if b == Marker::PREFIX {
            self.out.push(Marker::STUFFING);
        }
    }
}

fn put_marker(out: &mut Vec<u8>, code: u8) {
    out.push(Marker::PREFIX);
    out.push(code);
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_app0(out: &mut Vec<u8>) {
    put_marker(out, Marker::APP0 as u8);
    put_u16(out, 16);
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[1, 1]); // version
    out.push(0); // aspect ratio units
    put_u16(out, 1);
    put_u16(out, 1);
    out.extend_from_slice(&[0, 0]); // no thumbnail
}

fn write_metadata(out: &mut Vec<u8>, options: &EncodeOptions) {
    if let Some(exif) = options.exif.as_deref().filter(|d| !d.is_empty()) {
        write_prefixed_segment(out, Marker::APP1 as u8, EXIF_PREFIX, exif);
    }
    if let Some(xmp) = options.xmp.as_deref().filter(|d| !d.is_empty()) {
        write_prefixed_segment(out, Marker::APP1 as u8, XMP_PREFIX, xmp);
    }
    if let Some(icc) = options.icc.as_deref().filter(|d| !d.is_empty()) {
        write_icc_segments(out, icc);
    }
}

fn write_prefixed_segment(out: &mut Vec<u8>, marker: u8, prefix: &[u8], data: &[u8]) {
    put_marker(out, marker);
    if data.starts_with(prefix) {
        put_u16(out, (data.len() + 2) as u16);
        out.extend_from_slice(data);
    } else {
        put_u16(out, (prefix.len() + data.len() + 2) as u16);
        out.extend_from_slice(prefix);
        out.extend_from_slice(data);
    }
}

fn write_icc_segments(out: &mut Vec<u8>, icc: &[u8]) {
    let header = ICC_PREFIX.len() + 2;
    let max_data = MAX_APP_PAYLOAD - header;
    let total = icc.len().div_ceil(max_data);

    for (index, chunk) in icc.chunks(max_data).enumerate() {
        put_marker(out, Marker::APP2 as u8);
        put_u16(out, (header + chunk.len() + 2) as u16);
        out.extend_from_slice(ICC_PREFIX);
        out.push((index + 1) as u8);
        out.push(total as u8);
        out.extend_from_slice(chunk);
    }
}

fn write_dqt(out: &mut Vec<u8>, id: u8, table: &[u16; 64]) {
    put_marker(out, Marker::DQT as u8);
    put_u16(out, 67);
    out.push(id);
    for i in 0..64 {
        out.push(table[ZIGZAG[i]] as u8);
    }
}

fn write_sof(
    out: &mut Vec<u8>,
    progressive: bool,
    width: usize,
    height: usize,
    components: &[ComponentSpec],
) {
    let marker = if progressive { Marker::SOF2 } else { Marker::SOF0 };
    put_marker(out, marker as u8);
    put_u16(out, (8 + components.len() * 3) as u16);
    out.push(8); // sample precision
    put_u16(out, height as u16);
    put_u16(out, width as u16);
    out.push(components.len() as u8);
    for comp in components {
        out.push(comp.id);
        out.push(((comp.h as u8) << 4) | comp.v as u8);
        out.push(comp.quant_id);
    }
}

fn write_dht(out: &mut Vec<u8>, class: u8, id: u8, table: &TableSpec) {
    put_marker(out, Marker::DHT as u8);
    put_u16(out, (2 + 1 + 16 + table.values.len()) as u16);
    out.push((class << 4) | id);
    out.extend_from_slice(&table.bits);
    out.extend_from_slice(&table.values);
}

fn write_sos(
    out: &mut Vec<u8>,
    components: &[ComponentSpec],
    spectral_start: u8,
    spectral_end: u8,
    approx_high: u8,
    approx_low: u8,
) {
    put_marker(out, Marker::SOS as u8);
    put_u16(out, (6 + components.len() * 2) as u16);
    out.push(components.len() as u8);
    for comp in components {
        out.push(comp.id);
        out.push(((comp.dc_table as u8) << 4) | comp.ac_table as u8);
    }
    out.push(spectral_start);
    out.push(spectral_end);
    out.push((approx_high << 4) | approx_low);
}

fn encode_dc(
    bw: &mut BitWriter,
    coeffs: &[i32],
    dc_table: &HuffmanEncodeTable,
    prev_dc: &mut i32,
) {
    let dc = coeffs[0];
    let diff = dc - *prev_dc;
    *prev_dc = dc;
    let cat = bit_count(diff);
    bw.write_code(dc_table, cat as u8);
    if cat > 0 {
        bw.write_bits(encode_value(diff, cat), cat);
    }
}

fn encode_ac(
    bw: &mut BitWriter,
    coeffs: &[i32],
    ac_table: &HuffmanEncodeTable,
    spectral_start: usize,
    spectral_end: usize,
) {
    let mut zero_run = 0usize;
    for i in spectral_start..=spectral_end {
        let v = coeffs[ZIGZAG[i]];
        if v == 0 {
            zero_run += 1;
            continue;
        }
        while zero_run >= 16 {
            bw.write_code(ac_table, 0xF0);
            zero_run -= 16;
        }
        let cat = bit_count(v);
        bw.write_code(ac_table, ((zero_run << 4) | cat as usize) as u8);
        bw.write_bits(encode_value(v, cat), cat);
        zero_run = 0;
    }
    if zero_run > 0 {
        bw.write_code(ac_table, 0x00);
    }
}

/// Walks the MCU grid calling `emit` once per block, in interleaved order.
fn for_each_block(
    components: &[ComponentSpec],
    coeffs: &[CoefficientPlane],
    mut emit: impl FnMut(usize, &[i32]),
) {
    let mcu_cols = coeffs[0].blocks_per_row / components[0].h;
    let mcu_rows = coeffs[0].blocks_per_col / components[0].v;

    for my in 0..mcu_rows {
        for mx in 0..mcu_cols {
            for (ci, comp) in components.iter().enumerate() {
                let plane = &coeffs[ci];
                for b in 0..comp.h * comp.v {
                    let block_x = mx * comp.h + b % comp.h;
                    let block_y = my * comp.v + b / comp.h;
                    let base = (block_y * plane.blocks_per_row + block_x) * 64;
                    emit(ci, &plane.data[base..base + 64]);
                }
            }
        }
    }
}

fn encode_baseline(
    out: &mut Vec<u8>,
    components: &[ComponentSpec],
    coeffs: &[CoefficientPlane],
    tables: &EncoderTables,
) {
    write_sos(out, components, 0, 63, 0, 0);

    let mut bw = BitWriter::new(out);
    let mut prev_dc = vec![0i32; components.len()];
    for_each_block(components, coeffs, |ci, block| {
        let (dc, ac) = if ci == 0 {
            (&tables.dc_luma.encode, &tables.ac_luma.encode)
        } else {
            (&tables.dc_chroma.encode, &tables.ac_chroma.encode)
        };
        encode_dc(&mut bw, block, dc, &mut prev_dc[ci]);
        encode_ac(&mut bw, block, ac, 1, 63);
    });
    bw.flush();
}

/// Two scans: the DC coefficients of every component, then the full AC band
/// of every component.
fn encode_progressive(
    out: &mut Vec<u8>,
    components: &[ComponentSpec],
    coeffs: &[CoefficientPlane],
    tables: &EncoderTables,
) {
    write_sos(out, components, 0, 0, 0, 0);
    let mut bw = BitWriter::new(out);
    let mut prev_dc = vec![0i32; components.len()];
    for_each_block(components, coeffs, |ci, block| {
        let dc = if ci == 0 {
            &tables.dc_luma.encode
        } else {
            &tables.dc_chroma.encode
        };
        encode_dc(&mut bw, block, dc, &mut prev_dc[ci]);
    });
    bw.flush();

    write_sos(out, components, 1, 63, 0, 0);
    let mut bw = BitWriter::new(out);
    for_each_block(components, coeffs, |ci, block| {
        let ac = if ci == 0 {
            &tables.ac_luma.encode
        } else {
            &tables.ac_chroma.encode
        };
        encode_ac(&mut bw, block, ac, 1, 63);
    });
    bw.flush();
}
