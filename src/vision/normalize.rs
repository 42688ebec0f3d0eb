//! Frame normalization for the digit detector
//!
//! Turns a camera frame of any size and orientation into the fixed-size
//! square canvas the detector expects. All operations are pure: they read
//! their inputs and return new buffers.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::time::Instant;
use tracing::debug;

use crate::capture::RawFrame;
use crate::vision::error::{NormalizeError, Result};
use crate::vision::geometry::{BoundingBox, LetterboxTransform};

/// Default side of the model canvas
pub const DEFAULT_TARGET_SIDE: u32 = 640;

/// Neutral gray used for the letterbox bands
pub const CANVAS_GRAY: Rgba<u8> = Rgba([0x88, 0x88, 0x88, 0xFF]);

/// Luminance weights of a zero-saturation color matrix
const LUMA_R: f32 = 0.213;
const LUMA_G: f32 = 0.715;
const LUMA_B: f32 = 0.072;

/// EXIF orientation values handled by `correct_orientation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExifOrientation {
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl ExifOrientation {
    pub const NORMAL: u16 = 1;
    pub const ROTATE_180: u16 = 3;
    pub const ROTATE_90: u16 = 6;
    pub const ROTATE_270: u16 = 8;

    /// Decode an EXIF orientation tag. Mirrored variants are not supported.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            Self::NORMAL => Some(Self::Normal),
            Self::ROTATE_90 => Some(Self::Rotate90),
            Self::ROTATE_180 => Some(Self::Rotate180),
            Self::ROTATE_270 => Some(Self::Rotate270),
            _ => None,
        }
    }

    /// Clockwise rotation that makes the image upright
    pub fn degrees(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Rotate90 => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 => 270,
        }
    }
}

/// Square model input plus the transform that produced it
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Canvas pixels, `target_side x target_side`
    pub image: RgbaImage,
    /// Scale and padding needed for inverse mapping
    pub transform: LetterboxTransform,
}

impl NormalizedImage {
    pub fn side(&self) -> u32 {
        self.transform.target_side
    }

    pub fn scale(&self) -> f32 {
        self.transform.scale
    }

    pub fn pad_left(&self) -> u32 {
        self.transform.pad_left
    }

    pub fn pad_top(&self) -> u32 {
        self.transform.pad_top
    }

    /// Project a model-space box onto the frame this image was built from
    pub fn map_box_to_original(&self, bbox: &BoundingBox) -> BoundingBox {
        self.transform.to_original(bbox)
    }
}

/// Normalization settings for the live pipeline
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Side of the square model canvas
    pub target_side: u32,
    /// Letterbox band color
    pub fill: Rgba<u8>,
    /// Desaturate before letterboxing (helps under colored lighting)
    pub grayscale: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            target_side: DEFAULT_TARGET_SIDE,
            fill: CANVAS_GRAY,
            grayscale: false,
        }
    }
}

impl NormalizerConfig {
    /// Normalize a live camera frame using its own rotation degrees
    pub fn prepare(&self, frame: RawFrame) -> Result<NormalizedImage> {
        let start = Instant::now();
        let (width, height) = frame.dimensions();

        let mut upright = rotate(&frame, frame.rotation_degrees)?;
        drop(frame);
        if self.grayscale {
            upright = to_grayscale(&upright);
        }
        let normalized = letterbox_with_fill(&upright.image, self.target_side, self.fill)?;

        debug!(
            "Normalized {}x{} frame in {:?}: scale={:.4}, pad=({}, {})",
            width,
            height,
            start.elapsed(),
            normalized.scale(),
            normalized.pad_left(),
            normalized.pad_top()
        );

        Ok(normalized)
    }
}

/// Extract a sub-image after clamping `bbox` to the frame.
///
/// Left/top are floored at zero; width/height are cut so the region ends
/// inside the frame. A region that ends up empty is an error.
pub fn crop(frame: &RawFrame, bbox: &BoundingBox) -> Result<RawFrame> {
    let (frame_w, frame_h) = (frame.width() as i64, frame.height() as i64);

    let left = (bbox.left.round() as i64).max(0);
    let top = (bbox.top.round() as i64).max(0);
    let width = (bbox.width().round() as i64).min(frame_w - left);
    let height = (bbox.height().round() as i64).min(frame_h - top);

    if width <= 0 || height <= 0 {
        return Err(NormalizeError::InvalidRegion { left, top, width, height });
    }

    let region = imageops::crop_imm(
        &frame.image,
        left as u32,
        top as u32,
        width as u32,
        height as u32,
    )
    .to_image();

    Ok(frame.with_image(region))
}

/// Scale `frame` to fit a `target_side` square and center it on gray
pub fn letterbox_to_square(frame: &RawFrame, target_side: u32) -> Result<NormalizedImage> {
    letterbox_with_fill(&frame.image, target_side, CANVAS_GRAY)
}

/// Letterbox with a caller-chosen band color
pub fn letterbox_with_fill(image: &RgbaImage, target_side: u32, fill: Rgba<u8>) -> Result<NormalizedImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(NormalizeError::InvalidDimensions(width, height));
    }
    if target_side == 0 {
        return Err(NormalizeError::InvalidDimensions(0, 0));
    }

    let side = target_side as f32;
    let scale = (side / width as f32).min(side / height as f32);
    let scaled_width = ((width as f32 * scale).round() as u32).min(target_side);
    let scaled_height = ((height as f32 * scale).round() as u32).min(target_side);
    if scaled_width == 0 || scaled_height == 0 {
        return Err(NormalizeError::InvalidDimensions(scaled_width, scaled_height));
    }

    let pad_left = (target_side - scaled_width) / 2;
    let pad_top = (target_side - scaled_height) / 2;

    let mut canvas = RgbaImage::from_pixel(target_side, target_side, fill);
    if (scaled_width, scaled_height) == (width, height) {
        imageops::replace(&mut canvas, image, pad_left as i64, pad_top as i64);
    } else {
        let resized = imageops::resize(image, scaled_width, scaled_height, FilterType::Triangle);
        imageops::replace(&mut canvas, &resized, pad_left as i64, pad_top as i64);
    }

    Ok(NormalizedImage {
        image: canvas,
        transform: LetterboxTransform {
            scale,
            pad_left,
            pad_top,
            scaled_width,
            scaled_height,
            original_width: width,
            original_height: height,
            target_side,
        },
    })
}

/// Rotate clockwise by a multiple of 90 degrees (negative values allowed)
pub fn rotate(frame: &RawFrame, degrees: i32) -> Result<RawFrame> {
    if degrees % 90 != 0 {
        return Err(NormalizeError::UnsupportedRotation(degrees));
    }

    let degrees = degrees.rem_euclid(360);
    let mut rotated = frame.with_image(rotate_quarter_turns(&frame.image, (degrees / 90) as u8));
    rotated.rotation_degrees = (frame.rotation_degrees.rem_euclid(360) - degrees).rem_euclid(360);
    Ok(rotated)
}

fn rotate_quarter_turns(image: &RgbaImage, quarter_turns: u8) -> RgbaImage {
    match quarter_turns % 4 {
        1 => imageops::rotate90(image),
        2 => imageops::rotate180(image),
        3 => imageops::rotate270(image),
        _ => image.clone(),
    }
}

/// Apply the rotation encoded by an EXIF orientation tag.
///
/// Unknown codes pass the frame through untouched.
pub fn correct_orientation(frame: RawFrame, exif_orientation: u16) -> RawFrame {
    match ExifOrientation::from_code(exif_orientation) {
        Some(orientation) if orientation != ExifOrientation::Normal => {
            match rotate(&frame, orientation.degrees()) {
                Ok(rotated) => rotated,
                Err(_) => frame,
            }
        }
        _ => frame,
    }
}

/// Zero the saturation of every pixel, keeping alpha
pub fn to_grayscale(frame: &RawFrame) -> RawFrame {
    let mut image = frame.image.clone();
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let gray = (LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32)
            .round()
            .clamp(0.0, 255.0) as u8;
        pixel.0[0] = gray;
        pixel.0[1] = gray;
        pixel.0[2] = gray;
    }
    frame.with_image(image)
}

/// Orientation correction followed by letterboxing.
///
/// Consumes the frame so its buffer is released as soon as the canvas exists.
pub fn prepare_for_model(frame: RawFrame, exif_orientation: u16, target_side: u32) -> Result<NormalizedImage> {
    let upright = correct_orientation(frame, exif_orientation);
    letterbox_to_square(&upright, target_side)
}

/// Like `prepare_for_model` but uses the frame's own rotation degrees
pub fn prepare_rotated(frame: RawFrame, target_side: u32) -> Result<NormalizedImage> {
    let upright = rotate(&frame, frame.rotation_degrees)?;
    drop(frame);
    letterbox_to_square(&upright, target_side)
}

/// Crop a region and place it on the model canvas.
///
/// The returned transform maps into crop space; add the crop origin to reach
/// frame coordinates.
pub fn crop_for_model(frame: &RawFrame, bbox: &BoundingBox, target_side: u32) -> Result<NormalizedImage> {
    let region = crop(frame, bbox)?;
    letterbox_to_square(&region, target_side)
}
