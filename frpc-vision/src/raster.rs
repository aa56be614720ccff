//! Conversion of raw harness rasters into `image` buffers.

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};

/// Pixel layout of a raw, row-major raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// One intensity byte per pixel.
    Gray8,
    /// Interleaved RGBRGB... bytes.
    Rgb24,
}

impl PixelLayout {
    pub fn from_depth(depth: u8) -> Option<Self> {
        match depth {
            8 => Some(PixelLayout::Gray8),
            24 => Some(PixelLayout::Rgb24),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb24 => 3,
        }
    }
}

/// Copy `data` into an owned RGB image. Trailing bytes past the raster are ignored.
pub fn to_rgb_image(
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: &[u8],
) -> Result<DynamicImage> {
    let pixels = width as usize * height as usize;
    let expected = pixels * layout.bytes_per_pixel();
    if data.len() < expected {
        anyhow::bail!(
            "short {:?} buffer: got {} bytes, expected {} for {}x{}",
            layout,
            data.len(),
            expected,
            width,
            height
        );
    } else if data.len() > expected {
        log::debug!(
            "raster larger than expected ({} > {}), truncating",
            data.len(),
            expected
        );
    }

    let buf = match layout {
        PixelLayout::Rgb24 => data[..expected].to_vec(),
        PixelLayout::Gray8 => grey_to_rgb(&data[..expected]),
    };
    let rgb = RgbImage::from_raw(width, height, buf).context("failed to build image buffer")?;
    Ok(DynamicImage::ImageRgb8(rgb))
}

fn grey_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 3);
    for &y in data {
        out.extend_from_slice(&[y, y, y]);
    }
    out
}
