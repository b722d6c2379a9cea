//! Decoded RGBA animation frame.
//!
//! A [`Frame`] owns a tightly packed `width * height * 4` byte buffer in
//! R,G,B,A order. The empty frame (zero size, no pixels) is a valid value
//! and marks a slot a creature does not provide.

use crate::error::{OverlayError, Result};

/// Bytes per pixel for every frame in the store.
pub const CHANNELS: usize = 4;

/// One decoded animation pose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Allocate a zeroed pixel buffer, reporting allocation failure as an error
/// instead of aborting.
pub(crate) fn alloc_pixels(width: u32, height: u32) -> Result<Vec<u8>> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(CHANNELS))
        .ok_or_else(|| OverlayError::invalid_param(format!("frame {width}x{height} too large")))?;
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(len)
        .map_err(|e| OverlayError::memory(format!("{width}x{height} frame: {e}")))?;
    pixels.resize(len, 0);
    Ok(pixels)
}

impl Frame {
    /// The "no such frame" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an RGBA buffer. The buffer length must match the dimensions.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(OverlayError::invalid_param(format!(
                "frame dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(OverlayError::invalid_param(format!(
                "frame {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A fully transparent frame.
    pub fn transparent(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(OverlayError::invalid_param(format!(
                "frame dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            pixels: alloc_pixels(width, height)?,
        })
    }

    /// A frame filled with one RGBA colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let mut frame = Self::transparent(width, height)?;
        for px in frame.pixels.chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&rgba);
        }
        Ok(frame)
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        CHANNELS
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = self.pixels.get(idx..idx + CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Alpha at `(x, y)` without bounds checks beyond the slice itself.
    #[inline]
    pub(crate) fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y as usize * self.width as usize + x as usize) * CHANNELS + 3]
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}
