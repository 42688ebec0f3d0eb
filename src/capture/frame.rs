//! Frame data structures for captured camera content

use image::RgbaImage;
use std::time::Instant;

use crate::vision::error::{NormalizeError, Result};

/// A captured camera frame
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// RGBA pixel data
    pub image: RgbaImage,
    /// Clockwise rotation (degrees) needed to display the frame upright
    pub rotation_degrees: i32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl RawFrame {
    /// Wrap an already decoded RGBA image
    pub fn new(image: RgbaImage, rotation_degrees: i32) -> Self {
        Self {
            image,
            rotation_degrees,
            timestamp: Instant::now(),
        }
    }

    /// Create a frame from a tightly packed RGBA8 buffer
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32, rotation_degrees: i32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(NormalizeError::InvalidDimensions(width, height));
        }

        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        if actual != expected {
            return Err(NormalizeError::BufferSize { expected, actual });
        }
        let image = RgbaImage::from_raw(width, height, data)
            .ok_or(NormalizeError::BufferSize { expected, actual })?;

        Ok(Self::new(image, rotation_degrees))
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Replace the pixels, keeping capture metadata
    pub(crate) fn with_image(&self, image: RgbaImage) -> Self {
        Self {
            image,
            rotation_degrees: self.rotation_degrees,
            timestamp: self.timestamp,
        }
    }
}
