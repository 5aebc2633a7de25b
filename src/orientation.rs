//! EXIF orientation: reading tag 0x0112 out of an APP1 payload and applying
//! the flip or transpose it calls for.

const EXIF_PREFIX: &[u8] = b"Exif\0\0";

fn read_u16(data: &[u8], offset: usize, little: bool) -> u16 {
    let pair = [data[offset], data[offset + 1]];
    if little {
        u16::from_le_bytes(pair)
    } else {
        u16::from_be_bytes(pair)
    }
}

fn read_u32(data: &[u8], offset: usize, little: bool) -> u32 {
    let quad = [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ];
    if little {
        u32::from_le_bytes(quad)
    } else {
        u32::from_be_bytes(quad)
    }
}

/// Extracts the orientation (1..=8) from an APP1 payload carrying an EXIF
/// block. Anything malformed yields `None`; a missing or out-of-range tag
/// does too.
pub(crate) fn parse_exif_orientation(payload: &[u8]) -> Option<u8> {
    let tiff = payload.strip_prefix(EXIF_PREFIX)?;
    if tiff.len() < 8 {
        return None;
    }

    let little = &tiff[..2] == b"II";
    if !little && &tiff[..2] != b"MM" {
        return None;
    }
    if read_u16(tiff, 2, little) != 0x2A {
        return None;
    }

    let ifd_offset = read_u32(tiff, 4, little) as usize;
    if ifd_offset + 2 > tiff.len() {
        return None;
    }

    let ifd = &tiff[ifd_offset..];
    let count = read_u16(ifd, 0, little) as usize;
    for i in 0..count {
        let entry = 2 + i * 12;
        if entry + 12 > ifd.len() {
            break;
        }
        if read_u16(ifd, entry, little) != 0x0112 {
            continue;
        }
        let kind = read_u16(ifd, entry + 2, little);
        let entry_count = read_u32(ifd, entry + 4, little);
        if kind != 3 || entry_count != 1 {
            break;
        }
        let value = read_u16(ifd, entry + 8, little);
        if (1..=8).contains(&value) {
            return Some(value as u8);
        }
        break;
    }

    None
}

/// Rewrites an RGBA buffer so the pixels appear upright. Orientations 5..=8
/// transpose, so width and height swap.
pub(crate) fn apply_orientation(
    rgba: Vec<u8>,
    width: &mut usize,
    height: &mut usize,
    orientation: u8,
) -> Vec<u8> {
    if orientation <= 1 {
        return rgba;
    }

    let src_w = *width;
    let src_h = *height;
    let transposed = (5..=8).contains(&orientation);
    let (dst_w, dst_h) = if transposed { (src_h, src_w) } else { (src_w, src_h) };

    let mut out = vec![0u8; dst_w * dst_h * 4];
    for y in 0..dst_h {
        for x in 0..dst_w {
            let (sx, sy) = match orientation {
                2 => (src_w - 1 - x, y),
                3 => (src_w - 1 - x, src_h - 1 - y),
                4 => (x, src_h - 1 - y),
                5 => (y, x),
                6 => (y, src_h - 1 - x),
                7 => (src_w - 1 - y, src_h - 1 - x),
                8 => (src_w - 1 - y, x),
                _ => (x, y),
            };
            let src = (sy * src_w + sx) * 4;
            let dst = (y * dst_w + x) * 4;
            out[dst..dst + 4].copy_from_slice(&rgba[src..src + 4]);
        }
    }

    *width = dst_w;
    *height = dst_h;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal big-endian EXIF payload with a single orientation entry.
    pub(crate) fn exif_payload(orientation: u8) -> Vec<u8> {
        let mut payload = EXIF_PREFIX.to_vec();
        payload.extend_from_slice(b"MM");
        payload.extend_from_slice(&0x2Au16.to_be_bytes());
        payload.extend_from_slice(&8u32.to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload.extend_from_slice(&0x0112u16.to_be_bytes());
        payload.extend_from_slice(&3u16.to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&(orientation as u16).to_be_bytes());
        payload.extend_from_slice(&[0, 0]);
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload
    }

    fn pixel(rgba: &[u8], width: usize, x: usize, y: usize) -> [u8; 4] {
        let p = (y * width + x) * 4;
        [rgba[p], rgba[p + 1], rgba[p + 2], rgba[p + 3]]
    }

    /// 2x1 image with a red pixel on the left and a green one on the right.
    fn two_pixels() -> Vec<u8> {
        vec![255, 0, 0, 255, 0, 255, 0, 255]
    }

    #[test]
    fn test_parse_big_endian() {
        assert_eq!(parse_exif_orientation(&exif_payload(6)), Some(6));
    }

    #[test]
    fn test_parse_little_endian() {
        let mut payload = EXIF_PREFIX.to_vec();
        payload.extend_from_slice(b"II");
        payload.extend_from_slice(&0x2Au16.to_le_bytes());
        payload.extend_from_slice(&8u32.to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&0x0112u16.to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice(&[0, 0]);
        payload.extend_from_slice(&0u32.to_le_bytes());

        assert_eq!(parse_exif_orientation(&payload), Some(3));
    }

    #[test]
    fn test_parse_rejects_out_of_range_value() {
        assert_eq!(parse_exif_orientation(&exif_payload(9)), None);
    }

    #[test]
    fn test_parse_rejects_non_exif_payload() {
        assert_eq!(parse_exif_orientation(b"http://ns.adobe.com/xap/1.0/\0"), None);
    }

    #[test]
    fn test_orientation_2_mirrors_horizontally() {
        let mut w = 2;
        let mut h = 1;
        let out = apply_orientation(two_pixels(), &mut w, &mut h, 2);
        assert_eq!(pixel(&out, w, 0, 0), [0, 255, 0, 255]);
        assert_eq!(pixel(&out, w, 1, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_orientation_6_rotates_and_swaps_dimensions() {
        let mut w = 2;
        let mut h = 1;
        let out = apply_orientation(two_pixels(), &mut w, &mut h, 6);
        assert_eq!((w, h), (1, 2));
        // 90 degree clockwise rotation puts the left pixel on top.
        assert_eq!(pixel(&out, w, 0, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&out, w, 0, 1), [0, 255, 0, 255]);
    }

    #[test]
    fn test_mirror_orientations_are_involutions() {
        for orientation in [2u8, 3, 4, 5, 7] {
            let mut w = 3;
            let mut h = 2;
            let src: Vec<u8> = (0..w * h * 4).map(|i| i as u8).collect();

            let once = apply_orientation(src.clone(), &mut w, &mut h, orientation);
            let twice = apply_orientation(once, &mut w, &mut h, orientation);
            assert_eq!(twice, src, "orientation {orientation} applied twice");
            assert_eq!((w, h), (3, 2));
        }
    }

    #[test]
    fn test_rotations_6_and_8_invert_each_other() {
        let mut w = 3;
        let mut h = 2;
        let src: Vec<u8> = (0..w * h * 4).map(|i| i as u8).collect();

        let rotated = apply_orientation(src.clone(), &mut w, &mut h, 6);
        assert_eq!((w, h), (2, 3));
        let back = apply_orientation(rotated, &mut w, &mut h, 8);
        assert_eq!((w, h), (3, 2));
        assert_eq!(back, src);
    }
}
