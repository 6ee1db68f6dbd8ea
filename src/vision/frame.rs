use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Raster {
    Decoded(Arc<RgbImage>),
    Unreadable(String),
}

/// A single captured view. Cheap to clone, never mutated after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    id: Uuid,
    captured_at: DateTime<Utc>,
    raster: Raster,
}

/// What the policy sees of a frame besides the extracted text and elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub frame_id: Uuid,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    pub readable: bool,
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            raster: Raster::Decoded(Arc::new(image)),
        }
    }

    /// Decode PNG/JPEG bytes. Bytes that do not decode still produce a frame,
    /// marked unreadable, so the perception cycle can degrade instead of failing.
    pub fn decode(bytes: &[u8]) -> Self {
        let raster = match image::load_from_memory(bytes) {
            Ok(img) => Raster::Decoded(Arc::new(img.to_rgb8())),
            Err(e) => Raster::Unreadable(format!("Failed to decode image: {}", e)),
        };
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            raster,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> crate::errors::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::decode(&bytes))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn image(&self) -> Option<&RgbImage> {
        match &self.raster {
            Raster::Decoded(img) => Some(img.as_ref()),
            Raster::Unreadable(_) => None,
        }
    }

    pub fn unreadable_reason(&self) -> Option<&str> {
        match &self.raster {
            Raster::Decoded(_) => None,
            Raster::Unreadable(reason) => Some(reason),
        }
    }

    pub fn width(&self) -> u32 {
        self.image().map(|img| img.width()).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.image().map(|img| img.height()).unwrap_or(0)
    }

    pub fn summary(&self) -> FrameSummary {
        FrameSummary {
            frame_id: self.id,
            width: self.width(),
            height: self.height(),
            captured_at: self.captured_at,
            readable: self.image().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    #[test]
    fn test_garbage_bytes_yield_unreadable_frame() {
        let frame = Frame::decode(b"definitely not a png");
        assert!(frame.image().is_none());
        assert!(frame.unreadable_reason().is_some());
        assert_eq!((frame.width(), frame.height()), (0, 0));
        assert!(!frame.summary().readable);
    }

    #[test]
    fn test_png_bytes_decode() {
        let img = RgbImage::from_pixel(32, 16, Rgb([10, 20, 30]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let frame = Frame::decode(&buf);
        assert_eq!((frame.width(), frame.height()), (32, 16));
        assert_eq!(frame.image().unwrap().get_pixel(3, 3), &Rgb([10, 20, 30]));
    }
}
