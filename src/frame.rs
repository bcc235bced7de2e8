use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Bytes per pixel of the packed-RGB output layout.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Pixel layouts crossing the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelLayout {
    /// Single byte per pixel, color-filter-array (RGGB) layout
    Bayer,
    /// Three interleaved channels per pixel
    Rgb24,
}

/// Borrowed view over one upstream Bayer frame.
///
/// The data slice maps the GStreamer buffer directly, so the frame is only
/// valid for the duration of the callback that produced it.
#[derive(Debug, Clone, Copy)]
pub struct BayerFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// Owned converted frame, immutable once filled
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

/// Downstream format fixed by the first upstream frame's geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl NegotiatedFormat {
    pub fn rgb(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layout: PixelLayout::Rgb24,
        }
    }

    /// Size in bytes of one full output frame
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * RGB_BYTES_PER_PIXEL
    }
}
