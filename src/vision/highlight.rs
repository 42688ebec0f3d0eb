//! Draw detection boxes onto original frames for display

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::vision::geometry::BoundingBox;

/// Default outline color for a detected reading
pub const HIGHLIGHT_GREEN: Rgba<u8> = Rgba([0x4C, 0xAF, 0x50, 0xFF]);

/// Outline `bbox` (original-frame space) with a border of `thickness` pixels.
///
/// The box is clipped to the image; returns `false` if nothing was visible.
pub fn draw_box(image: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>, thickness: u32) -> bool {
    let clipped = bbox.clamp_to(image.width(), image.height());
    let left = clipped.left.round() as i32;
    let top = clipped.top.round() as i32;
    let width = (clipped.right.round() as i32 - left).max(0) as u32;
    let height = (clipped.bottom.round() as i32 - top).max(0) as u32;

    if width == 0 || height == 0 {
        return false;
    }

    for inset in 0..thickness.max(1) {
        let inner_w = width.saturating_sub(2 * inset);
        let inner_h = height.saturating_sub(2 * inset);
        if inner_w == 0 || inner_h == 0 {
            break;
        }
        let rect = Rect::at(left + inset as i32, top + inset as i32).of_size(inner_w, inner_h);
        draw_hollow_rect_mut(image, rect, color);
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn test_draw_box_outline() {
        let mut image = RgbaImage::from_pixel(20, 20, BLACK);
        assert!(draw_box(&mut image, &BoundingBox::new(5.0, 5.0, 15.0, 15.0), HIGHLIGHT_GREEN, 1));

        assert_eq!(*image.get_pixel(5, 5), HIGHLIGHT_GREEN);
        assert_eq!(*image.get_pixel(14, 10), HIGHLIGHT_GREEN);
        assert_eq!(*image.get_pixel(10, 10), BLACK);
        assert_eq!(*image.get_pixel(2, 2), BLACK);
    }

    #[test]
    fn test_draw_box_thickness() {
        let mut image = RgbaImage::from_pixel(20, 20, BLACK);
        draw_box(&mut image, &BoundingBox::new(2.0, 2.0, 18.0, 18.0), HIGHLIGHT_GREEN, 3);

        assert_eq!(*image.get_pixel(4, 10), HIGHLIGHT_GREEN);
        assert_eq!(*image.get_pixel(5, 10), BLACK);
    }

    #[test]
    fn test_draw_box_outside_image() {
        let mut image = RgbaImage::from_pixel(10, 10, BLACK);
        assert!(!draw_box(&mut image, &BoundingBox::new(20.0, 20.0, 30.0, 30.0), HIGHLIGHT_GREEN, 1));
        assert!(image.pixels().all(|p| *p == BLACK));
    }
}
