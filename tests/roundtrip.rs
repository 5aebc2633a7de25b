//! End-to-end encode/decode coverage over the public API.

use anyhow::Result;
use jpeg_codec::{
    decode_rgba, decode_rgba_with, encode_rgba, DecodeOptions, EncodeOptions, Subsampling,
};

fn solid(width: usize, height: usize, pixel: [u8; 4]) -> Vec<u8> {
    pixel
        .iter()
        .copied()
        .cycle()
        .take(width * height * 4)
        .collect()
}

fn gray_gradient(width: usize, height: usize) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let v = (64 + x * 4 + y * 2) as u8;
            rgba.extend_from_slice(&[v, v, v, 255]);
        }
    }
    rgba
}

fn color_gradient(width: usize, height: usize) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            rgba.extend_from_slice(&[
                (100 + x * 2) as u8,
                (180 - y * 2) as u8,
                (90 + x + y) as u8,
                255,
            ]);
        }
    }
    rgba
}

fn max_channel_error(a: &[u8], b: &[u8]) -> i32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x as i32 - y as i32).abs())
        .max()
        .unwrap_or(0)
}

#[test]
fn test_solid_gray_survives_exactly() -> Result<()> {
    let rgba = solid(16, 16, [128, 128, 128, 255]);
    let options = EncodeOptions {
        quality: 100,
        ..Default::default()
    };
    let jpeg = encode_rgba(&rgba, 16, 16, 64, &options)?;
    let image = decode_rgba(&jpeg)?;

    assert_eq!((image.width, image.height), (16, 16));
    assert_eq!(image.pixels, rgba);
    Ok(())
}

#[test]
fn test_gray_gradient_round_trips_within_two() -> Result<()> {
    let rgba = gray_gradient(16, 16);
    let options = EncodeOptions {
        quality: 100,
        ..Default::default()
    };
    let jpeg = encode_rgba(&rgba, 16, 16, 64, &options)?;
    let image = decode_rgba(&jpeg)?;

    assert!(max_channel_error(&image.pixels, &rgba) <= 2);
    // A grayscale source decodes back with equal channels.
    for px in image.pixels.chunks_exact(4) {
        assert_eq!(px[0], px[1]);
        assert_eq!(px[0], px[2]);
        assert_eq!(px[3], 255);
    }
    Ok(())
}

#[test]
fn test_color_gradient_round_trips_closely() -> Result<()> {
    let rgba = color_gradient(32, 24);
    let options = EncodeOptions {
        quality: 95,
        ..Default::default()
    };
    let jpeg = encode_rgba(&rgba, 32, 24, 128, &options)?;
    let image = decode_rgba(&jpeg)?;

    assert_eq!((image.width, image.height), (32, 24));
    assert!(max_channel_error(&image.pixels, &rgba) <= 8);
    Ok(())
}

#[test]
fn test_subsampled_solid_color_round_trips() -> Result<()> {
    for subsampling in [Subsampling::S422, Subsampling::S420] {
        let rgba = solid(13, 11, [200, 50, 50, 255]);
        let options = EncodeOptions {
            quality: 100,
            subsampling,
            ..Default::default()
        };
        let jpeg = encode_rgba(&rgba, 13, 11, 52, &options)?;
        let image = decode_rgba(&jpeg)?;

        assert_eq!((image.width, image.height), (13, 11));
        assert!(max_channel_error(&image.pixels, &rgba) <= 2);
    }
    Ok(())
}

#[test]
fn test_progressive_matches_baseline_pixels() -> Result<()> {
    let rgba = color_gradient(24, 16);
    let baseline = encode_rgba(&rgba, 24, 16, 96, &EncodeOptions::default())?;
    let options = EncodeOptions {
        progressive: true,
        ..Default::default()
    };
    let progressive = encode_rgba(&rgba, 24, 16, 96, &options)?;

    let a = decode_rgba(&baseline)?;
    let b = decode_rgba(&progressive)?;
    assert_eq!(a.pixels, b.pixels);
    Ok(())
}

#[test]
fn test_optimized_tables_change_bytes_not_pixels() -> Result<()> {
    let rgba = color_gradient(24, 24);
    let standard = encode_rgba(&rgba, 24, 24, 96, &EncodeOptions::default())?;
    let options = EncodeOptions {
        optimize_huffman: true,
        ..Default::default()
    };
    let optimized = encode_rgba(&rgba, 24, 24, 96, &options)?;

    let a = decode_rgba(&standard)?;
    let b = decode_rgba(&optimized)?;
    assert_eq!(a.pixels, b.pixels);
    Ok(())
}

#[test]
fn test_optimized_progressive_round_trips() -> Result<()> {
    let rgba = color_gradient(16, 16);
    let options = EncodeOptions {
        progressive: true,
        optimize_huffman: true,
        ..Default::default()
    };
    let jpeg = encode_rgba(&rgba, 16, 16, 64, &options)?;
    let image = decode_rgba(&jpeg)?;
    assert_eq!((image.width, image.height), (16, 16));
    Ok(())
}

/// Removes every DHT segment from a stream.
fn strip_dht(jpeg: &[u8]) -> Vec<u8> {
    let mut out = jpeg[..2].to_vec();
    let mut i = 2;
    while i + 1 < jpeg.len() {
        if jpeg[i] != 0xFF {
            out.push(jpeg[i]);
            i += 1;
            continue;
        }
        let marker = jpeg[i + 1];
        if marker == 0xD9 {
            out.extend_from_slice(&jpeg[i..]);
            break;
        }
        if marker == 0xC4 {
            let len = ((jpeg[i + 2] as usize) << 8) | jpeg[i + 3] as usize;
            i += 2 + len;
            continue;
        }
        out.push(jpeg[i]);
        out.push(jpeg[i + 1]);
        i += 2;
        if marker == 0xDA {
            let len = ((jpeg[i] as usize) << 8) | jpeg[i + 1] as usize;
            out.extend_from_slice(&jpeg[i..i + len]);
            i += len;
            while i + 1 < jpeg.len() && !(jpeg[i] == 0xFF && jpeg[i + 1] != 0x00) {
                out.push(jpeg[i]);
                i += 1;
            }
        } else if !(0xD0..=0xD7).contains(&marker) && marker != 0xD8 && marker != 0x01 {
            let len = ((jpeg[i] as usize) << 8) | jpeg[i + 1] as usize;
            out.extend_from_slice(&jpeg[i..i + len]);
            i += len;
        }
    }
    out
}

#[test]
fn test_stream_without_dht_decodes_via_standard_tables() -> Result<()> {
    let rgba = color_gradient(16, 16);
    let jpeg = encode_rgba(&rgba, 16, 16, 64, &EncodeOptions::default())?;
    let stripped = strip_dht(&jpeg);
    assert!(stripped.len() < jpeg.len());

    let full = decode_rgba(&jpeg)?;
    let bare = decode_rgba(&stripped)?;
    assert_eq!(full.pixels, bare.pixels);
    Ok(())
}

#[test]
fn test_tiny_images_round_trip() -> Result<()> {
    for (w, h) in [(1usize, 1usize), (5, 3)] {
        let rgba = solid(w, h, [60, 60, 60, 255]);
        let options = EncodeOptions {
            quality: 100,
            ..Default::default()
        };
        let jpeg = encode_rgba(&rgba, w, h, w * 4, &options)?;
        let image = decode_rgba(&jpeg)?;
        assert_eq!((image.width, image.height), (w, h));
        assert!(max_channel_error(&image.pixels, &rgba) <= 2);
    }
    Ok(())
}

#[test]
fn test_truncated_sequential_stream_decodes_leniently() -> Result<()> {
    let rgba = color_gradient(32, 32);
    let jpeg = encode_rgba(&rgba, 32, 32, 128, &EncodeOptions::default())?;

    // Cut the stream shortly after the scan header begins.
    let sos = jpeg
        .windows(2)
        .position(|w| w == [0xFF, 0xDA])
        .expect("SOS marker");
    let header_len = ((jpeg[sos + 2] as usize) << 8) | jpeg[sos + 3] as usize;
    let cut = &jpeg[..sos + 2 + header_len + 8];

    assert!(decode_rgba(cut).is_err());
    let options = DecodeOptions {
        allow_truncated: true,
        ..Default::default()
    };
    let image = decode_rgba_with(cut, &options)?;
    assert_eq!((image.width, image.height), (32, 32));
    Ok(())
}

#[test]
fn test_truncated_progressive_stream_decodes_by_default() -> Result<()> {
    let rgba = color_gradient(32, 32);
    let options = EncodeOptions {
        progressive: true,
        ..Default::default()
    };
    let jpeg = encode_rgba(&rgba, 32, 32, 128, &options)?;

    let sos = jpeg
        .windows(2)
        .position(|w| w == [0xFF, 0xDA])
        .expect("SOS marker");
    let header_len = ((jpeg[sos + 2] as usize) << 8) | jpeg[sos + 3] as usize;
    let cut = &jpeg[..sos + 2 + header_len + 8];

    let image = decode_rgba(cut)?;
    assert_eq!((image.width, image.height), (32, 32));
    Ok(())
}

/// Minimal big-endian EXIF block carrying only an orientation entry.
fn exif_with_orientation(orientation: u16) -> Vec<u8> {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(b"MM");
    payload.extend_from_slice(&0x2Au16.to_be_bytes());
    payload.extend_from_slice(&8u32.to_be_bytes());
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&0x0112u16.to_be_bytes());
    payload.extend_from_slice(&3u16.to_be_bytes());
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&orientation.to_be_bytes());
    payload.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload
}

#[test]
fn test_exif_orientation_rotates_decoded_image() -> Result<()> {
    let rgba = solid(16, 8, [90, 90, 90, 255]);
    let options = EncodeOptions {
        exif: Some(exif_with_orientation(6)),
        ..Default::default()
    };
    let jpeg = encode_rgba(&rgba, 16, 8, 64, &options)?;

    let image = decode_rgba(&jpeg)?;
    assert_eq!((image.width, image.height), (8, 16));
    Ok(())
}

#[test]
fn test_high_quality_chroma_upsampling_decodes() -> Result<()> {
    let rgba = color_gradient(24, 24);
    let options = EncodeOptions {
        subsampling: Subsampling::S420,
        ..Default::default()
    };
    let jpeg = encode_rgba(&rgba, 24, 24, 96, &options)?;

    let nearest = decode_rgba(&jpeg)?;
    let bilinear = decode_rgba_with(
        &jpeg,
        &DecodeOptions {
            high_quality_chroma: true,
            ..Default::default()
        },
    )?;
    assert_eq!((bilinear.width, bilinear.height), (24, 24));
    assert_eq!(nearest.pixels.len(), bilinear.pixels.len());
    Ok(())
}
