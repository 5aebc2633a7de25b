/// The decoder takes compressed image data plus its table specifications and
/// reconstructs tightly packed RGBA pixels, handling sequential and
/// progressive streams, restart markers, CMYK color, and EXIF orientation.
pub mod decoder;

/// The encoder turns RGBA pixels into a sequential or progressive stream
/// with selectable chroma subsampling and optional image-specific Huffman
/// tables.
pub mod encoder;

pub(crate) mod baseline;
pub(crate) mod bitreader;
pub(crate) mod color;
pub(crate) mod dct;
pub(crate) mod frame;
pub(crate) mod huffman;
pub(crate) mod huffman_opt;
pub(crate) mod marker;
pub(crate) mod orientation;
pub(crate) mod progressive;
pub(crate) mod tables;

pub use decoder::{decode_rgba, decode_rgba_with, is_jpeg, DecodeOptions, DecodedImage, Decoder};
pub use encoder::{encode_rgba, EncodeOptions, Subsampling};
