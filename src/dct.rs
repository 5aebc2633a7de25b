//! 8x8 DCT transforms. The inverse is the classic fixed-point AAN-derived
//! "slow" integer transform; the forward side is a separable float transform
//! folded together with quantization.

use std::sync::OnceLock;

/// Fractional bits carried through the fixed-point inverse transform.
const CONST_BITS: i32 = 13;
/// Extra precision retained between the column and row passes.
const PASS1_BITS: i32 = 2;

// Constants are FIX(x) = round(x * 2^13) for the relevant cosine sums.
const FIX_0_298631336: i64 = 2446;
const FIX_0_390180644: i64 = 3196;
const FIX_0_541196100: i64 = 4433;
const FIX_0_765366865: i64 = 6270;
const FIX_0_899976223: i64 = 7373;
const FIX_1_175875602: i64 = 9633;
const FIX_1_501321110: i64 = 12299;
const FIX_1_847759065: i64 = 15137;
const FIX_1_961570560: i64 = 16069;
const FIX_2_053119869: i64 = 16819;
const FIX_2_562915447: i64 = 20995;
const FIX_3_072711026: i64 = 25172;

/// Rounds `value` to `value / 2^shift` with ties away from zero.
fn descale(value: i64, shift: i32) -> i64 {
    (value + (1 << (shift - 1))) >> shift
}

fn clamp_sample(value: i64) -> u8 {
    (value + 128).clamp(0, 255) as u8
}

/// Inverse DCT of one dequantized block (natural order) into level-shifted
/// 8-bit samples.
pub(crate) fn idct_block(coeffs: &[i32; 64], out: &mut [u8; 64]) {
    let mut workspace = [0i64; 64];

    // Column pass: operates on input columns, leaves PASS1_BITS of extra
    // precision in the workspace.
    for col in 0..8 {
        let at = |row: usize| coeffs[row * 8 + col] as i64;

        // Columns with no AC energy reduce to a constant.
        if (1..8).all(|row| at(row) == 0) {
            let dc = at(0) << PASS1_BITS;
            for row in 0..8 {
                workspace[row * 8 + col] = dc;
            }
            continue;
        }

        // Even part.
        let z2 = at(2);
        let z3 = at(6);
        let z1 = (z2 + z3) * FIX_0_541196100;
        let tmp2 = z1 - z3 * FIX_1_847759065;
        let tmp3 = z1 + z2 * FIX_0_765366865;

        let z2 = at(0);
        let z3 = at(4);
        let tmp0 = (z2 + z3) << CONST_BITS;
        let tmp1 = (z2 - z3) << CONST_BITS;

        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        // Odd part.
        let mut tmp0 = at(7);
        let mut tmp1 = at(5);
        let mut tmp2 = at(3);
        let mut tmp3 = at(1);

        let mut z1 = tmp0 + tmp3;
        let mut z2 = tmp1 + tmp2;
        let mut z3 = tmp0 + tmp2;
        let mut z4 = tmp1 + tmp3;
        let z5 = (z3 + z4) * FIX_1_175875602;

        tmp0 *= FIX_0_298631336;
        tmp1 *= FIX_2_053119869;
        tmp2 *= FIX_3_072711026;
        tmp3 *= FIX_1_501321110;
        z1 *= -FIX_0_899976223;
        z2 *= -FIX_2_562915447;
        z3 *= -FIX_1_961570560;
        z4 *= -FIX_0_390180644;

        z3 += z5;
        z4 += z5;

        tmp0 += z1 + z3;
        tmp1 += z2 + z4;
        tmp2 += z2 + z3;
        tmp3 += z1 + z4;

        let shift = CONST_BITS - PASS1_BITS;
        workspace[col] = descale(tmp10 + tmp3, shift);
        workspace[7 * 8 + col] = descale(tmp10 - tmp3, shift);
        workspace[8 + col] = descale(tmp11 + tmp2, shift);
        workspace[6 * 8 + col] = descale(tmp11 - tmp2, shift);
        workspace[2 * 8 + col] = descale(tmp12 + tmp1, shift);
        workspace[5 * 8 + col] = descale(tmp12 - tmp1, shift);
        workspace[3 * 8 + col] = descale(tmp13 + tmp0, shift);
        workspace[4 * 8 + col] = descale(tmp13 - tmp0, shift);
    }

    // Row pass: removes both PASS1_BITS and the 3 bits of DCT gain, then
    // level-shifts into unsigned samples.
    for row in 0..8 {
        let ws = &workspace[row * 8..row * 8 + 8];

        if ws[1..].iter().all(|&v| v == 0) {
            let dc = clamp_sample(descale(ws[0], PASS1_BITS + 3));
            out[row * 8..row * 8 + 8].fill(dc);
            continue;
        }

        let z2 = ws[2];
        let z3 = ws[6];
        let z1 = (z2 + z3) * FIX_0_541196100;
        let tmp2 = z1 - z3 * FIX_1_847759065;
        let tmp3 = z1 + z2 * FIX_0_765366865;

        let tmp0 = (ws[0] + ws[4]) << CONST_BITS;
        let tmp1 = (ws[0] - ws[4]) << CONST_BITS;

        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        let mut tmp0 = ws[7];
        let mut tmp1 = ws[5];
        let mut tmp2 = ws[3];
        let mut tmp3 = ws[1];

        let mut z1 = tmp0 + tmp3;
        let mut z2 = tmp1 + tmp2;
        let mut z3 = tmp0 + tmp2;
        let mut z4 = tmp1 + tmp3;
        let z5 = (z3 + z4) * FIX_1_175875602;

        tmp0 *= FIX_0_298631336;
        tmp1 *= FIX_2_053119869;
        tmp2 *= FIX_3_072711026;
        tmp3 *= FIX_1_501321110;
        z1 *= -FIX_0_899976223;
        z2 *= -FIX_2_562915447;
        z3 *= -FIX_1_961570560;
        z4 *= -FIX_0_390180644;

        z3 += z5;
        z4 += z5;

        tmp0 += z1 + z3;
        tmp1 += z2 + z4;
        tmp2 += z2 + z3;
        tmp3 += z1 + z4;

        let shift = CONST_BITS + PASS1_BITS + 3;
        let base = row * 8;
        out[base] = clamp_sample(descale(tmp10 + tmp3, shift));
        out[base + 7] = clamp_sample(descale(tmp10 - tmp3, shift));
        out[base + 1] = clamp_sample(descale(tmp11 + tmp2, shift));
        out[base + 6] = clamp_sample(descale(tmp11 - tmp2, shift));
        out[base + 2] = clamp_sample(descale(tmp12 + tmp1, shift));
        out[base + 5] = clamp_sample(descale(tmp12 - tmp1, shift));
        out[base + 3] = clamp_sample(descale(tmp13 + tmp0, shift));
        out[base + 4] = clamp_sample(descale(tmp13 - tmp0, shift));
    }
}

/// cos((2x + 1) * u * pi / 16) indexed by `x * 8 + u`.
fn cosine_table() -> &'static [f32; 64] {
    static TABLE: OnceLock<[f32; 64]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0f32; 64];
        for x in 0..8 {
            for u in 0..8 {
                table[x * 8 + u] =
                    (((2 * x + 1) * u) as f32 * std::f32::consts::PI / 16.0).cos();
            }
        }
        table
    })
}

/// Forward DCT of one level-shifted block followed by quantization. The
/// result is in natural order.
pub(crate) fn fdct_quantize(block: &[f32; 64], quant: &[u16; 64]) -> [i32; 64] {
    let cos = cosine_table();

    // Row transform.
    let mut rows = [0f32; 64];
    for y in 0..8 {
        for u in 0..8 {
            let mut sum = 0f32;
            for x in 0..8 {
                sum += block[y * 8 + x] * cos[x * 8 + u];
            }
            rows[y * 8 + u] = sum;
        }
    }

    // Column transform, normalization, and quantization.
    let mut out = [0i32; 64];
    for v in 0..8 {
        let cv = if v == 0 { std::f32::consts::FRAC_1_SQRT_2 } else { 1.0 };
        for u in 0..8 {
            let cu = if u == 0 { std::f32::consts::FRAC_1_SQRT_2 } else { 1.0 };
            let mut sum = 0f32;
            for y in 0..8 {
                sum += rows[y * 8 + u] * cos[y * 8 + v];
            }
            let coeff = 0.25 * cu * cv * sum;
            out[v * 8 + u] = (coeff as f64 / quant[v * 8 + u] as f64).round() as i32;
        }
    }
    out
}
