//! One module per control family. Each family is a pure function of the
//! prepared frame and its thresholds.

pub mod button;
pub mod checkbox;
pub mod dropdown;
pub mod image_block;
pub mod radio;
pub mod text_field;

use crate::types::BoundingBox;
use crate::vision::ElementAttributes;
use image::{GrayImage, RgbImage};

/// Decoded frame data shared by all families of one `detect` call.
pub struct Prepared<'a> {
    pub rgb: &'a RgbImage,
    pub gray: GrayImage,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl<'a> Prepared<'a> {
    pub fn new(rgb: &'a RgbImage, canny_low: f32, canny_high: f32) -> Self {
        Self {
            rgb,
            gray: crate::vision::imaging::grayscale(rgb),
            canny_low,
            canny_high,
        }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }
}

/// A family hit before it is stamped with frame geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub attributes: ElementAttributes,
    pub bbox: BoundingBox,
    pub confidence: f64,
}
