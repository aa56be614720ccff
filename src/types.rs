//! Value types exchanged across the verification interface.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::status::EngineError;

/// A single face image.
///
/// Pixels are row-major: interleaved `RGBRGB...` when `depth == 24`,
/// one intensity byte per pixel when `depth == 8`. The buffer is shared with
/// the caller for the duration of one call; an engine that needs the pixels
/// afterwards copies them.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    /// Number of pixels horizontally
    pub width: u16,
    /// Number of pixels vertically
    pub height: u16,
    /// Bits per pixel, 8 or 24
    pub depth: u8,
    pub data: Arc<[u8]>,
}

impl Image {
    pub fn new(width: u16, height: u16, depth: u8, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            depth,
            data: data.into(),
        }
    }

    /// Size in bytes of the raster described by the header.
    pub fn size(&self) -> usize {
        usize::from(self.width) * usize::from(self.height) * usize::from(self.depth / 8)
    }

    /// Check the header against the buffer.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::MalformedImage(format!(
                "empty image {}x{}",
                self.width, self.height
            )));
        }
        if self.depth != 8 && self.depth != 24 {
            return Err(EngineError::MalformedImage(format!(
                "unsupported depth {}, expected 8 or 24",
                self.depth
            )));
        }
        if self.data.len() < self.size() {
            return Err(EngineError::MalformedImage(format!(
                "pixel buffer holds {} bytes, header needs {}",
                self.data.len(),
                self.size()
            )));
        }
        Ok(())
    }
}

impl Default for Image {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            depth: 24,
            data: Arc::from(Vec::new()),
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Purpose of the template being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateRole {
    /// Enrollment template for 1:1
    Enrollment,
    /// Verification template for 1:1
    Verification,
}

impl fmt::Display for TemplateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateRole::Enrollment => f.write_str("enrollment"),
            TemplateRole::Verification => f.write_str("verification"),
        }
    }
}

/// Estimated eye centres. A coordinate is only meaningful when its
/// `is_*_assigned` flag is set; use [`EyePair::left`] / [`EyePair::right`]
/// to read them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyePair {
    pub is_left_assigned: bool,
    pub is_right_assigned: bool,
    pub xleft: u16,
    pub yleft: u16,
    pub xright: u16,
    pub yright: u16,
}

impl EyePair {
    pub fn new(
        is_left_assigned: bool,
        is_right_assigned: bool,
        xleft: u16,
        yleft: u16,
        xright: u16,
        yright: u16,
    ) -> Self {
        Self {
            is_left_assigned,
            is_right_assigned,
            xleft,
            yleft,
            xright,
            yright,
        }
    }

    /// Build from floating point estimates of the subject's left and right
    /// eye. An eye outside `[0, width) x [0, height)` stays unassigned.
    pub fn from_estimates(
        left: Option<(f32, f32)>,
        right: Option<(f32, f32)>,
        width: u16,
        height: u16,
    ) -> Self {
        let mut eyes = EyePair::default();
        if let Some((x, y)) = left.and_then(|p| to_pixel(p, width, height)) {
            eyes.is_left_assigned = true;
            eyes.xleft = x;
            eyes.yleft = y;
        }
        if let Some((x, y)) = right.and_then(|p| to_pixel(p, width, height)) {
            eyes.is_right_assigned = true;
            eyes.xright = x;
            eyes.yright = y;
        }
        eyes
    }

    pub fn left(&self) -> Option<(u16, u16)> {
        self.is_left_assigned.then_some((self.xleft, self.yleft))
    }

    pub fn right(&self) -> Option<(u16, u16)> {
        self.is_right_assigned.then_some((self.xright, self.yright))
    }
}

fn to_pixel((x, y): (f32, f32), width: u16, height: u16) -> Option<(u16, u16)> {
    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return None;
    }
    let (px, py) = (x.floor(), y.floor());
    if px >= f32::from(width) || py >= f32::from(height) {
        return None;
    }
    Some((px as u16, py as u16))
}
