//! JPEG marker codes, the subset this codec recognizes by name.

/// Second byte of a two-byte marker; the first byte is always `0xFF`.
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Hash, Eq)]
pub(crate) enum Marker {
    /// Start of Frame, baseline DCT
    SOF0 = 0xC0,
    /// Start of Frame, progressive DCT
    SOF2 = 0xC2,
    /// Huffman table specification
    DHT = 0xC4,
    /// Start of image
    SOI = 0xD8,
    /// End of image
    EOI = 0xD9,
    /// Start of scan
    SOS = 0xDA,
    /// Define quantization table(s)
    DQT = 0xDB,
    /// Define restart interval
    DRI = 0xDD,
    /// Application segment 0 (JFIF)
    APP0 = 0xE0,
    /// Application segment 1 (EXIF / XMP)
    APP1 = 0xE1,
    /// Application segment 2 (ICC profile)
    APP2 = 0xE2,
    /// Application segment 14 (Adobe)
    APP14 = 0xEE,
}

impl Marker {
    pub(crate) const PREFIX: u8 = 0xFF;
    pub(crate) const STUFFING: u8 = 0x00;

    pub(crate) const RST0: u8 = 0xD0;
    pub(crate) const RST7: u8 = 0xD7;

    /// True for `0xD0..=0xD7`, the eight restart markers.
    pub(crate) fn is_restart(code: u8) -> bool {
        (Self::RST0..=Self::RST7).contains(&code)
    }

    /// True for standalone markers that carry no length-prefixed segment.
    pub(crate) fn is_standalone(code: u8) -> bool {
        Self::is_restart(code)
            || code == Marker::SOI as u8
            || code == Marker::EOI as u8
            || code == 0x01
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_range() {
        assert!(Marker::is_restart(0xD0));
        assert!(Marker::is_restart(0xD7));
        assert!(!Marker::is_restart(0xD8));
        assert!(!Marker::is_restart(0xCF));
    }

    #[test]
    fn test_standalone_markers() {
        assert!(Marker::is_standalone(Marker::SOI as u8));
        assert!(Marker::is_standalone(Marker::EOI as u8));
        assert!(Marker::is_standalone(0xD3));
        assert!(!Marker::is_standalone(Marker::SOS as u8));
        assert!(!Marker::is_standalone(Marker::DQT as u8));
    }
}
