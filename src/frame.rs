//! Frame and scan headers.
//!
//! `Frame` captures the SOF segment plus derived MCU geometry; `ScanHeader`
//! captures one SOS segment, including the spectral selection and successive
//! approximation parameters that drive progressive scans.

use anyhow::{bail, ensure, Result};

/// One image component as declared in the frame header.
#[derive(Debug, Clone)]
pub(crate) struct Component {
    /// Component identifier, Ci. Encoders commonly use 1..=3 for YCbCr but
    /// any byte is allowed; 'R'/'G'/'B' identifiers mark untransformed RGB.
    pub(crate) id: u8,
    /// Horizontal sampling factor, Hi.
    pub(crate) h: usize,
    /// Vertical sampling factor, Vi.
    pub(crate) v: usize,
    /// Quantization table destination, Tqi.
    pub(crate) quant_id: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) progressive: bool,
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) components: Vec<Component>,
    pub(crate) max_h: usize,
    pub(crate) max_v: usize,
    /// MCU grid covering the image.
    pub(crate) mcu_cols: usize,
    pub(crate) mcu_rows: usize,
}

impl Frame {
    pub(crate) fn parse(segment: &[u8], progressive: bool) -> Result<Self> {
        ensure!(segment.len() >= 6, "frame header too short");

        let precision = segment[0];
        if precision != 8 {
            bail!("unsupported sample precision {precision}");
        }

        let height = u16::from_be_bytes([segment[1], segment[2]]) as usize;
        let width = u16::from_be_bytes([segment[3], segment[4]]) as usize;
        ensure!(width > 0 && height > 0, "frame has zero dimension");

        let count = segment[5] as usize;
        if !matches!(count, 1 | 3 | 4) {
            bail!("unsupported component count {count}");
        }
        ensure!(
            segment.len() >= 6 + count * 3,
            "frame header truncated after component count"
        );

        let mut components = Vec::with_capacity(count);
        for i in 0..count {
            let entry = &segment[6 + i * 3..6 + i * 3 + 3];
            let h = (entry[1] >> 4) as usize;
            let v = (entry[1] & 0x0F) as usize;
            ensure!(
                (1..=4).contains(&h) && (1..=4).contains(&v),
                "sampling factors {h}x{v} out of range"
            );
            components.push(Component {
                id: entry[0],
                h,
                v,
                quant_id: (entry[2] & 0x0F) as usize,
            });
        }

        let max_h = components.iter().map(|c| c.h).max().unwrap_or(1);
        let max_v = components.iter().map(|c| c.v).max().unwrap_or(1);
        let mcu_cols = width.div_ceil(max_h * 8);
        let mcu_rows = height.div_ceil(max_v * 8);

        Ok(Frame {
            progressive,
            width,
            height,
            components,
            max_h,
            max_v,
            mcu_cols,
            mcu_rows,
        })
    }

    pub(crate) fn component_index(&self, id: u8) -> Result<usize> {
        self.components
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("scan references unknown component {id}"))
    }

    /// Block grid for one component, padded to whole MCUs.
    pub(crate) fn block_grid(&self, component: &Component) -> (usize, usize) {
        (self.mcu_cols * component.h, self.mcu_rows * component.v)
    }

    /// Subsampled pixel dimensions of one component's plane, padded to whole
    /// MCUs.
    pub(crate) fn plane_size(&self, component: &Component) -> (usize, usize) {
        let (cols, rows) = self.block_grid(component);
        (cols * 8, rows * 8)
    }

    /// True when the component identifiers spell out RGB, meaning no color
    /// transform was applied by the encoder.
    pub(crate) fn is_rgb_tagged(&self) -> bool {
        self.components.len() == 3
            && self.components[0].id == b'R'
            && self.components[1].id == b'G'
            && self.components[2].id == b'B'
    }
}

/// One component's table selections within a scan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanComponent {
    /// Index into `Frame::components`.
    pub(crate) index: usize,
    pub(crate) dc_table: usize,
    pub(crate) ac_table: usize,
}

/// What a scan contributes, derived from its spectral selection and
/// successive approximation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanKind {
    /// Sequential scan carrying all 64 coefficients at full precision.
    Baseline,
    /// First pass over DC coefficients.
    DcFirst,
    /// Refinement pass adding one bit to DC coefficients.
    DcRefine,
    /// First pass over an AC band.
    AcFirst,
    /// Refinement pass adding one bit to an AC band.
    AcRefine,
}

#[derive(Debug, Clone)]
pub(crate) struct ScanHeader {
    pub(crate) components: Vec<ScanComponent>,
    /// Start of spectral selection, Ss.
    pub(crate) spectral_start: usize,
    /// End of spectral selection, Se.
    pub(crate) spectral_end: usize,
    /// Successive approximation high bit, Ah.
    pub(crate) approx_high: u8,
    /// Successive approximation low bit, Al.
    pub(crate) approx_low: u8,
}

impl ScanHeader {
    pub(crate) fn parse(segment: &[u8], frame: &Frame) -> Result<Self> {
        ensure!(!segment.is_empty(), "scan header too short");

        let count = segment[0] as usize;
        ensure!(
            (1..=4).contains(&count),
            "scan declares {count} components"
        );
        ensure!(
            segment.len() >= 1 + count * 2 + 3,
            "scan header truncated"
        );

        let mut components = Vec::with_capacity(count);
        for i in 0..count {
            let entry = &segment[1 + i * 2..1 + i * 2 + 2];
            components.push(ScanComponent {
                index: frame.component_index(entry[0])?,
                dc_table: (entry[1] >> 4) as usize,
                ac_table: (entry[1] & 0x0F) as usize,
            });
        }

        let tail = &segment[1 + count * 2..];
        let spectral_start = tail[0] as usize;
        let spectral_end = tail[1] as usize;
        let approx_high = tail[2] >> 4;
        let approx_low = tail[2] & 0x0F;

        ensure!(
            spectral_start <= spectral_end && spectral_end <= 63,
            "spectral selection {spectral_start}..={spectral_end} out of range"
        );
        if frame.progressive && spectral_start == 0 {
            ensure!(
                spectral_end == 0,
                "progressive DC scan must not carry AC coefficients"
            );
        }

        Ok(ScanHeader {
            components,
            spectral_start,
            spectral_end,
            approx_high,
            approx_low,
        })
    }

    pub(crate) fn kind(&self, progressive: bool) -> ScanKind {
        if !progressive {
            return ScanKind::Baseline;
        }
        match (self.spectral_start, self.approx_high) {
            (0, 0) => ScanKind::DcFirst,
            (0, _) => ScanKind::DcRefine,
            (_, 0) => ScanKind::AcFirst,
            (_, _) => ScanKind::AcRefine,
        }
    }

}
