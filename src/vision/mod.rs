//! Vision Layer
//!
//! Prepares camera frames for the external digit detector and maps its
//! boxes back onto the camera frame.
//! - `normalize`: crop, rotate, grayscale, letterbox
//! - `geometry`: boxes and the letterbox transform
//! - `detection`: the detector seam
//! - `highlight`: drawing mapped boxes for display

pub mod detection;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod normalize;

pub use detection::{DetectionResult, Detector};
pub use error::NormalizeError;
pub use geometry::{map_box_to_model, map_box_to_original, BoundingBox, LetterboxTransform};
pub use highlight::draw_box;
pub use normalize::{
    correct_orientation, crop, crop_for_model, letterbox_to_square, letterbox_with_fill,
    prepare_for_model, prepare_rotated, rotate, to_grayscale, ExifOrientation, NormalizedImage,
    NormalizerConfig, CANVAS_GRAY, DEFAULT_TARGET_SIDE,
};
