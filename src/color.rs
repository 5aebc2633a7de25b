//! Color composition: turns decoded component planes into an RGBA buffer.
//!
//! Handles grayscale, YCbCr, component-id-tagged RGB, direct CMYK, and YCCK
//! under the Adobe transform flag. Subsampled chroma is expanded by nearest
//! neighbor, or bilinearly when requested.

use std::sync::OnceLock;

use rayon::prelude::*;

use crate::baseline::SamplePlane;
use crate::frame::Frame;

struct YccLuts {
    cr_to_r: [i32; 256],
    cr_to_g: [i32; 256],
    cb_to_g: [i32; 256],
    cb_to_b: [i32; 256],
}

/// ITU-R BT.601 expansion in 16.16 fixed point.
fn luts() -> &'static YccLuts {
    static LUTS: OnceLock<YccLuts> = OnceLock::new();
    LUTS.get_or_init(|| {
        let mut t = YccLuts {
            cr_to_r: [0; 256],
            cr_to_g: [0; 256],
            cb_to_g: [0; 256],
            cb_to_b: [0; 256],
        };
        for i in 0..256 {
            let d = i as i32 - 128;
            t.cr_to_r[i] = (91881 * d + 32768) >> 16;
            t.cr_to_g[i] = (46802 * d + 32768) >> 16;
            t.cb_to_g[i] = (22554 * d + 32768) >> 16;
            t.cb_to_b[i] = (116130 * d + 32768) >> 16;
        }
        t
    })
}

fn ycc_to_rgb(y: i32, cb: i32, cr: i32) -> (u8, u8, u8) {
    let luts = luts();
    let cb = cb.clamp(0, 255) as usize;
    let cr = cr.clamp(0, 255) as usize;
    let r = y + luts.cr_to_r[cr];
    let g = y - luts.cb_to_g[cb] - luts.cr_to_g[cr];
    let b = y + luts.cb_to_b[cb];
    (
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    )
}

fn cmyk_channel(c: i32, k: i32) -> u8 {
    (255 - (c + k).min(255)) as u8
}

/// One component plane plus the geometry needed to map full-resolution pixel
/// coordinates into it.
struct Sampler<'a> {
    plane: Option<&'a SamplePlane>,
    h: usize,
    v: usize,
    max_h: usize,
    max_v: usize,
    bilinear: bool,
    fallback: u8,
}

impl<'a> Sampler<'a> {
    fn new(
        frame: &Frame,
        planes: &'a [SamplePlane],
        index: Option<usize>,
        fallback: u8,
        bilinear: bool,
    ) -> Self {
        match index {
            Some(i) if i < planes.len() => {
                let comp = &frame.components[i];
                // Full-resolution planes gain nothing from interpolation.
                let subsampled = comp.h < frame.max_h || comp.v < frame.max_v;
                Sampler {
                    plane: Some(&planes[i]),
                    h: comp.h,
                    v: comp.v,
                    max_h: frame.max_h,
                    max_v: frame.max_v,
                    bilinear: bilinear && subsampled,
                    fallback,
                }
            }
            _ => Sampler {
                plane: None,
                h: 1,
                v: 1,
                max_h: 1,
                max_v: 1,
                bilinear: false,
                fallback,
            },
        }
    }

    fn sample(&self, x: usize, y: usize) -> i32 {
        let Some(plane) = self.plane else {
            return self.fallback as i32;
        };

        if !self.bilinear {
            let sx = x * self.h / self.max_h;
            let sy = y * self.v / self.max_v;
            return plane.data[sy * plane.width + sx] as i32;
        }

        // Sample at the pixel center of the subsampled grid.
        let fx = (x as f32 + 0.5) * self.h as f32 / self.max_h as f32 - 0.5;
        let fy = (y as f32 + 0.5) * self.v as f32 / self.max_v as f32 - 0.5;
        let x0 = (fx.floor() as i64).clamp(0, plane.width as i64 - 1) as usize;
        let y0 = (fy.floor() as i64).clamp(0, plane.height as i64 - 1) as usize;
        let x1 = (x0 + 1).min(plane.width - 1);
        let y1 = (y0 + 1).min(plane.height - 1);
        let tx = (fx - fx.floor()).clamp(0.0, 1.0);
        let ty = (fy - fy.floor()).clamp(0.0, 1.0);

        let at = |px: usize, py: usize| plane.data[py * plane.width + px] as f32;
        let top = at(x0, y0) * (1.0 - tx) + at(x1, y0) * tx;
        let bottom = at(x0, y1) * (1.0 - tx) + at(x1, y1) * tx;
        (top * (1.0 - ty) + bottom * ty + 0.5) as i32
    }
}

/// Composes the decoded planes into a `width * height * 4` RGBA buffer.
pub(crate) fn compose_rgba(
    frame: &Frame,
    planes: &[SamplePlane],
    adobe_transform: Option<u8>,
    high_quality_chroma: bool,
) -> Vec<u8> {
    let width = frame.width;
    let height = frame.height;
    let mut rgba = vec![0u8; width * height * 4];

    let by_id = |id: u8| frame.components.iter().position(|c| c.id == id);

    match frame.components.len() {
        4 => {
            let mut c = by_id(b'C');
            let mut m = by_id(b'M');
            let mut y = by_id(b'Y');
            let mut k = by_id(b'K');
            if c.is_none() || m.is_none() || y.is_none() || k.is_none() {
                (c, m, y, k) = (by_id(1), by_id(2), by_id(3), by_id(4));
                if c.is_none() || m.is_none() || y.is_none() || k.is_none() {
                    (c, m, y, k) = (Some(0), Some(1), Some(2), Some(3));
                }
            }

            let is_ycck = adobe_transform == Some(2);
            let samplers: Vec<Sampler> = if is_ycck {
                let mut ids = [by_id(1), by_id(2), by_id(3), by_id(4)];
                if ids.iter().any(Option::is_none) {
                    ids = [c, m, y, k];
                }
                let fallbacks = [128, 128, 128, 0];
                ids.iter()
                    .zip(fallbacks)
                    .map(|(&i, f)| Sampler::new(frame, planes, i, f, high_quality_chroma))
                    .collect()
            } else {
                [c, m, y, k]
                    .iter()
                    .map(|&i| Sampler::new(frame, planes, i, 0, high_quality_chroma))
                    .collect()
            };

            rgba.par_chunks_mut(width * 4)
                .enumerate()
                .for_each(|(row, out)| {
                    for x in 0..width {
                        let k_val = samplers[3].sample(x, row);
                        let (r, g, b) = if is_ycck {
                            let (r, g, b) = ycc_to_rgb(
                                samplers[0].sample(x, row),
                                samplers[1].sample(x, row),
                                samplers[2].sample(x, row),
                            );
                            (
                                cmyk_channel(255 - r as i32, k_val),
                                cmyk_channel(255 - g as i32, k_val),
                                cmyk_channel(255 - b as i32, k_val),
                            )
                        } else {
                            (
                                cmyk_channel(samplers[0].sample(x, row), k_val),
                                cmyk_channel(samplers[1].sample(x, row), k_val),
                                cmyk_channel(samplers[2].sample(x, row), k_val),
                            )
                        };
                        let p = x * 4;
                        out[p..p + 4].copy_from_slice(&[r, g, b, 255]);
                    }
                });
        }
        1 => {
            let gray = by_id(1).or(Some(0));
            let sampler = Sampler::new(frame, planes, gray, 0, false);
            rgba.par_chunks_mut(width * 4)
                .enumerate()
                .for_each(|(row, out)| {
                    for x in 0..width {
                        let v = sampler.sample(x, row).clamp(0, 255) as u8;
                        let p = x * 4;
                        out[p..p + 4].copy_from_slice(&[v, v, v, 255]);
                    }
                });
        }
        _ => {
            if frame.is_rgb_tagged() {
                let samplers: Vec<Sampler> = [by_id(b'R'), by_id(b'G'), by_id(b'B')]
                    .iter()
                    .map(|&i| Sampler::new(frame, planes, i, 0, high_quality_chroma))
                    .collect();
                rgba.par_chunks_mut(width * 4)
                    .enumerate()
                    .for_each(|(row, out)| {
                        for x in 0..width {
                            let p = x * 4;
                            out[p] = samplers[0].sample(x, row).clamp(0, 255) as u8;
                            out[p + 1] = samplers[1].sample(x, row).clamp(0, 255) as u8;
                            out[p + 2] = samplers[2].sample(x, row).clamp(0, 255) as u8;
                            out[p + 3] = 255;
                        }
                    });
            } else {
                let y_index = by_id(1).or(Some(0));
                let mut cb_index = by_id(2);
                let mut cr_index = by_id(3);
                if cb_index.is_none() {
                    cb_index = Some(if y_index == Some(0) { 1 } else { 0 });
                }
                if cr_index.is_none() {
                    cr_index = Some(if y_index == Some(2) { 1 } else { 2 });
                }

                let y_s = Sampler::new(frame, planes, y_index, 128, false);
                let cb_s = Sampler::new(frame, planes, cb_index, 128, high_quality_chroma);
                let cr_s = Sampler::new(frame, planes, cr_index, 128, high_quality_chroma);

                rgba.par_chunks_mut(width * 4)
                    .enumerate()
                    .for_each(|(row, out)| {
                        for x in 0..width {
                            let (r, g, b) = ycc_to_rgb(
                                y_s.sample(x, row),
                                cb_s.sample(x, row),
                                cr_s.sample(x, row),
                            );
                            let p = x * 4;
                            out[p..p + 4].copy_from_slice(&[r, g, b, 255]);
                        }
                    });
            }
        }
    }

    rgba
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use anyhow::Result;

    fn flat_plane(width: usize, height: usize, value: u8) -> SamplePlane {
        SamplePlane {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    fn frame_from(segment: &[u8]) -> Result<Frame> {
        Frame::parse(segment, false)
    }

    #[test]
    fn test_grayscale_composition() -> Result<()> {
        let frame = frame_from(&[8, 0, 2, 0, 2, 1, 1, 0x11, 0])?;
        let rgba = compose_rgba(&frame, &[flat_plane(8, 8, 200)], None, false);

        assert_eq!(rgba.len(), 2 * 2 * 4);
        assert_eq!(&rgba[..4], &[200, 200, 200, 255]);
        Ok(())
    }

    #[test]
    fn test_neutral_chroma_is_gray() -> Result<()> {
        let frame = frame_from(&[
            8, 0, 2, 0, 2, 3, //
            1, 0x11, 0, //
            2, 0x11, 1, //
            3, 0x11, 1,
        ])?;
        let planes = vec![
            flat_plane(8, 8, 90),
            flat_plane(8, 8, 128),
            flat_plane(8, 8, 128),
        ];
        let rgba = compose_rgba(&frame, &planes, None, false);
        assert_eq!(&rgba[..4], &[90, 90, 90, 255]);
        Ok(())
    }

    #[test]
    fn test_saturated_red() -> Result<()> {
        let frame = frame_from(&[
            8, 0, 1, 0, 1, 3, //
            1, 0x11, 0, //
            2, 0x11, 1, //
            3, 0x11, 1,
        ])?;
        // Pure red in BT.601 is roughly Y=76, Cb=85, Cr=255.
        let planes = vec![
            flat_plane(8, 8, 76),
            flat_plane(8, 8, 85),
            flat_plane(8, 8, 255),
        ];
        let rgba = compose_rgba(&frame, &planes, None, false);
        assert!(rgba[0] >= 250, "red channel {}", rgba[0]);
        assert!(rgba[1] <= 10, "green channel {}", rgba[1]);
        Ok(())
    }

    #[test]
    fn test_rgb_tagged_components_pass_through() -> Result<()> {
        let frame = frame_from(&[
            8, 0, 1, 0, 1, 3, //
            b'R', 0x11, 0, //
            b'G', 0x11, 0, //
            b'B', 0x11, 0,
        ])?;
        let planes = vec![
            flat_plane(8, 8, 10),
            flat_plane(8, 8, 20),
            flat_plane(8, 8, 30),
        ];
        let rgba = compose_rgba(&frame, &planes, None, false);
        assert_eq!(&rgba[..4], &[10, 20, 30, 255]);
        Ok(())
    }

    #[test]
    fn test_cmyk_without_ink_is_white() -> Result<()> {
        let frame = frame_from(&[
            8, 0, 1, 0, 1, 4, //
            1, 0x11, 0, //
            2, 0x11, 0, //
            3, 0x11, 0, //
            4, 0x11, 0,
        ])?;
        let planes = vec![
            flat_plane(8, 8, 0),
            flat_plane(8, 8, 0),
            flat_plane(8, 8, 0),
            flat_plane(8, 8, 0),
        ];
        let rgba = compose_rgba(&frame, &planes, None, false);
        assert_eq!(&rgba[..4], &[255, 255, 255, 255]);
        Ok(())
    }

    #[test]
    fn test_cmyk_full_black_ink() -> Result<()> {
        let frame = frame_from(&[
            8, 0, 1, 0, 1, 4, //
            1, 0x11, 0, //
            2, 0x11, 0, //
            3, 0x11, 0, //
            4, 0x11, 0,
        ])?;
        let planes = vec![
            flat_plane(8, 8, 0),
            flat_plane(8, 8, 0),
            flat_plane(8, 8, 0),
            flat_plane(8, 8, 255),
        ];
        let rgba = compose_rgba(&frame, &planes, None, false);
        assert_eq!(&rgba[..4], &[0, 0, 0, 255]);
        Ok(())
    }

    #[test]
    fn test_ycck_neutral_gray_under_adobe_transform() -> Result<()> {
        let frame = frame_from(&[
            8, 0, 1, 0, 1, 4, //
            1, 0x11, 0, //
            2, 0x11, 0, //
            3, 0x11, 0, //
            4, 0x11, 0,
        ])?;
        // Y=255 with neutral chroma decodes to white before the complement,
        // so zero black ink keeps it white.
        let planes = vec![
            flat_plane(8, 8, 255),
            flat_plane(8, 8, 128),
            flat_plane(8, 8, 128),
            flat_plane(8, 8, 0),
        ];
        let rgba = compose_rgba(&frame, &planes, Some(2), false);
        assert_eq!(&rgba[..4], &[255, 255, 255, 255]);
        Ok(())
    }

    #[test]
    fn test_bilinear_chroma_matches_nearest_on_flat_planes() -> Result<()> {
        let frame = frame_from(&[
            8, 0, 16, 0, 16, 3, //
            1, 0x22, 0, //
            2, 0x11, 1, //
            3, 0x11, 1,
        ])?;
        let planes = vec![
            flat_plane(16, 16, 100),
            flat_plane(8, 8, 128),
            flat_plane(8, 8, 128),
        ];
        let nearest = compose_rgba(&frame, &planes, None, false);
        let smooth = compose_rgba(&frame, &planes, None, true);
        assert_eq!(nearest, smooth);
        Ok(())
    }
}
