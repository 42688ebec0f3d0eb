//! Coordinate spaces and the letterbox mapping between them
//!
//! A box produced by the detector lives in model space (the square canvas).
//! `LetterboxTransform` is recorded when the canvas is built and is the only
//! way to move a box back to original-frame space.

use serde::{Deserialize, Serialize};

/// Axis-aligned box given by its four edges
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Build from origin and size
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Clip the box to `[0, width] x [0, height]`
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            left: self.left.clamp(0.0, w),
            top: self.top.clamp(0.0, h),
            right: self.right.clamp(0.0, w),
            bottom: self.bottom.clamp(0.0, h),
        }
    }
}

/// Parameters used to letterbox a frame onto the model canvas.
///
/// Invariant: `original * scale + 2 * pad == target_side` on both axes, up to
/// rounding, with `scale` the smaller of the two axis ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LetterboxTransform {
    /// Uniform scale applied to the source
    pub scale: f32,
    /// Horizontal offset of the scaled content on the canvas
    pub pad_left: u32,
    /// Vertical offset of the scaled content on the canvas
    pub pad_top: u32,
    /// Size of the scaled content
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Source frame size before letterboxing
    pub original_width: u32,
    pub original_height: u32,
    /// Side of the square canvas
    pub target_side: u32,
}

impl LetterboxTransform {
    /// Map a model-space box back onto the original frame. No clamping.
    pub fn to_original(&self, bbox: &BoundingBox) -> BoundingBox {
        map_box_to_original(bbox, self.scale, self.pad_left, self.pad_top)
    }

    /// Map an original-frame box into model space
    pub fn to_model(&self, bbox: &BoundingBox) -> BoundingBox {
        map_box_to_model(bbox, self.scale, self.pad_left, self.pad_top)
    }

    /// Model-space box covering exactly the scaled content
    pub fn content_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.pad_left as f32,
            self.pad_top as f32,
            (self.pad_left + self.scaled_width) as f32,
            (self.pad_top + self.scaled_height) as f32,
        )
    }
}

/// Inverse letterbox: `x' = (x - pad) / scale` on each axis
pub fn map_box_to_original(bbox: &BoundingBox, scale: f32, pad_left: u32, pad_top: u32) -> BoundingBox {
    let (px, py) = (pad_left as f32, pad_top as f32);
    BoundingBox {
        left: (bbox.left - px) / scale,
        top: (bbox.top - py) / scale,
        right: (bbox.right - px) / scale,
        bottom: (bbox.bottom - py) / scale,
    }
}

/// Forward letterbox: `x' = x * scale + pad` on each axis
pub fn map_box_to_model(bbox: &BoundingBox, scale: f32, pad_left: u32, pad_top: u32) -> BoundingBox {
    let (px, py) = (pad_left as f32, pad_top as f32);
    BoundingBox {
        left: bbox.left * scale + px,
        top: bbox.top * scale + py,
        right: bbox.right * scale + px,
        bottom: bbox.bottom * scale + py,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_box_near(a: &BoundingBox, b: &BoundingBox, tol: f32) {
        assert!((a.left - b.left).abs() <= tol, "left {} vs {}", a.left, b.left);
        assert!((a.top - b.top).abs() <= tol, "top {} vs {}", a.top, b.top);
        assert!((a.right - b.right).abs() <= tol, "right {} vs {}", a.right, b.right);
        assert!((a.bottom - b.bottom).abs() <= tol, "bottom {} vs {}", a.bottom, b.bottom);
    }

    #[test]
    fn test_map_to_original() {
        let bbox = BoundingBox::new(0.0, 160.0, 640.0, 480.0);
        let mapped = map_box_to_original(&bbox, 3.2, 0, 160);
        assert_box_near(&mapped, &BoundingBox::new(0.0, 0.0, 200.0, 100.0), 1e-3);
    }

    #[test]
    fn test_roundtrip_through_model_space() {
        let scale = 640.0 / 1920.0;
        let (pad_left, pad_top) = (0, 140);
        let boxes = [
            BoundingBox::new(12.0, 30.0, 400.0, 77.5),
            BoundingBox::new(1500.0, 900.0, 1919.0, 1079.0),
            BoundingBox::from_xywh(-20.0, -10.0, 50.0, 40.0),
        ];

        for original in &boxes {
            let model = map_box_to_model(original, scale, pad_left, pad_top);
            let back = map_box_to_original(&model, scale, pad_left, pad_top);
            assert_box_near(&back, original, 1.0);
        }
    }

    #[test]
    fn test_no_clamping_on_inverse() {
        // Box on the top padding band maps to negative frame coordinates
        let mapped = map_box_to_original(&BoundingBox::new(10.0, 0.0, 20.0, 5.0), 2.0, 0, 100);
        assert!(mapped.top < 0.0);
        assert!(mapped.bottom < 0.0);
    }

    #[test]
    fn test_clamp_to() {
        let clamped = BoundingBox::new(-5.0, 3.0, 120.0, 90.0).clamp_to(100, 50);
        assert_eq!(clamped, BoundingBox::new(0.0, 3.0, 100.0, 50.0));
    }

    #[test]
    fn test_box_dimensions() {
        let bbox = BoundingBox::from_xywh(10.0, 20.0, 30.0, 40.0);
        assert_eq!(bbox.right, 40.0);
        assert_eq!(bbox.bottom, 60.0);
        assert_eq!(bbox.width(), 30.0);
        assert!(!bbox.is_empty());
        assert!(BoundingBox::new(5.0, 5.0, 5.0, 10.0).is_empty());
    }
}
