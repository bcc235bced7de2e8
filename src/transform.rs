//! Pluggable Bayer→RGB pixel transforms
//!
//! Both shipped variants are intentionally trivial stand-ins for real
//! demosaicing algorithms: they honor the buffer contract and the timing
//! hot path, but produce visually incorrect output by design. Replace the
//! body of `apply` with an actual interpolation to get real color.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::RGB_BYTES_PER_PIXEL;

/// Byte used by the constant-fill placeholder.
const FILL_VALUE: u8 = 0xFF;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("source buffer holds {actual} bytes, geometry requires {expected}")]
    UndersizedSource { expected: usize, actual: usize },
    #[error("destination buffer holds {actual} bytes, geometry requires {expected}")]
    MissizedDestination { expected: usize, actual: usize },
}

/// Strategy mapping one Bayer frame into a packed-RGB buffer.
///
/// Contract: `src` carries at least `width*height` bytes (one byte per
/// sensor pixel), `dst` is exactly `width*height*3` bytes and is fully
/// populated on success. Implementations never read or write out of bounds.
pub trait PixelTransform: Send {
    fn apply(&self, src: &[u8], dst: &mut [u8], width: u32, height: u32)
        -> Result<(), TransformError>;
}

fn check_bounds(src: &[u8], dst: &[u8], width: u32, height: u32) -> Result<usize, TransformError> {
    let pixels = width as usize * height as usize;
    if src.len() < pixels {
        return Err(TransformError::UndersizedSource {
            expected: pixels,
            actual: src.len(),
        });
    }
    let rgb_size = pixels * RGB_BYTES_PER_PIXEL;
    if dst.len() != rgb_size {
        return Err(TransformError::MissizedDestination {
            expected: rgb_size,
            actual: dst.len(),
        });
    }
    Ok(pixels)
}

/// Nearest-neighbor placeholder: copies the raw sensor bytes verbatim into
/// the head of the output and leaves the rest zeroed.
#[derive(Debug, Default)]
pub struct NearestNeighbor;

impl PixelTransform for NearestNeighbor {
    fn apply(
        &self,
        src: &[u8],
        dst: &mut [u8],
        width: u32,
        height: u32,
    ) -> Result<(), TransformError> {
        let pixels = check_bounds(src, dst, width, height)?;
        dst[..pixels].copy_from_slice(&src[..pixels]);
        Ok(())
    }
}

/// Bilinear placeholder: ignores the input and saturates the output.
#[derive(Debug, Default)]
pub struct Bilinear;

impl PixelTransform for Bilinear {
    fn apply(
        &self,
        src: &[u8],
        dst: &mut [u8],
        width: u32,
        height: u32,
    ) -> Result<(), TransformError> {
        check_bounds(src, dst, width, height)?;
        dst.fill(FILL_VALUE);
        Ok(())
    }
}

/// Interpolation algorithm selection, bound once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    NearestNeighbor,
    Bilinear,
}

impl Algorithm {
    pub fn transform(self) -> Box<dyn PixelTransform> {
        match self {
            Algorithm::NearestNeighbor => Box::new(NearestNeighbor),
            Algorithm::Bilinear => Box::new(Bilinear),
        }
    }
}
