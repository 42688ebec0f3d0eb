//! Detector interface
//!
//! The digit model itself runs outside this crate. It receives a
//! `NormalizedImage` and answers with a `DetectionResult` in model space.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::vision::geometry::BoundingBox;
use crate::vision::normalize::NormalizedImage;

/// Output of the digit detector for one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Recognized digit string, if any
    pub digits: Option<String>,
    /// Whether the detector is confident in this frame
    pub is_valid: bool,
    /// Region of the digits in model space
    pub bbox: BoundingBox,
}

impl DetectionResult {
    /// A confident read of `digits` at `bbox`
    pub fn valid(digits: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            digits: Some(digits.into()),
            is_valid: true,
            bbox,
        }
    }

    /// A frame with no usable detection
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Digits of a confident, non-empty detection
    pub fn confident_digits(&self) -> Option<&str> {
        if !self.is_valid {
            return None;
        }
        self.digits.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }
}

/// The external meter-digit model
pub trait Detector: Send {
    /// Run inference on one prepared canvas
    fn detect(&mut self, image: &NormalizedImage) -> Result<DetectionResult>;
}

impl<F> Detector for F
where
    F: FnMut(&NormalizedImage) -> Result<DetectionResult> + Send,
{
    fn detect(&mut self, image: &NormalizedImage) -> Result<DetectionResult> {
        self(image)
    }
}
