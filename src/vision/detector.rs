use super::families::{self, Candidate, Prepared};
use super::{ElementKind, Frame, UiElement};
use crate::core::config::DetectorConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink, TracingSink};
use crate::errors::DetectionFailure;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Classical per-family UI element detector.
///
/// Stateless between calls: `detect` is a pure function of the frame and the
/// thresholds, apart from the events it records into the diagnostics sink.
#[derive(Clone)]
pub struct UiDetector {
    config: DetectorConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl UiDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            diagnostics: Arc::new(TracingSink),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect every control family in `frame`.
    ///
    /// Never fails. An unreadable frame yields no elements; a family that
    /// errors or panics contributes nothing while the others still run.
    pub fn detect(&self, frame: &Frame) -> Vec<UiElement> {
        let Some(image) = frame.image() else {
            self.diagnostics.record(DiagnosticEvent::FrameUnreadable {
                frame_id: frame.id(),
                reason: frame.unreadable_reason().unwrap_or("no raster").to_string(),
            });
            return Vec::new();
        };
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            self.diagnostics.record(DiagnosticEvent::FrameUnreadable {
                frame_id: frame.id(),
                reason: "empty raster".to_string(),
            });
            return Vec::new();
        }

        let cfg = &self.config;
        let prep = Prepared::new(image, cfg.canny_low, cfg.canny_high);
        let mut elements = Vec::new();
        for kind in ElementKind::ALL {
            let candidates = self.run_family(kind, || match kind {
                ElementKind::Button => families::button::detect(&prep, &cfg.button),
                ElementKind::TextField => families::text_field::detect(&prep, &cfg.text_field),
                ElementKind::Checkbox => families::checkbox::detect(&prep, &cfg.checkbox),
                ElementKind::RadioButton => families::radio::detect(&prep, &cfg.radio),
                ElementKind::Dropdown => families::dropdown::detect(&prep, &cfg.dropdown),
                ElementKind::ImageBlock => families::image_block::detect(&prep, &cfg.image_block),
            });
            elements.extend(stamp(candidates, width, height));
        }

        self.diagnostics.record(DiagnosticEvent::ElementsDetected {
            frame_id: frame.id(),
            count: elements.len(),
        });
        elements
    }

    fn run_family<F>(&self, kind: ElementKind, family: F) -> Vec<Candidate>
    where
        F: FnOnce() -> Result<Vec<Candidate>, DetectionFailure>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(family)).unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            Err(DetectionFailure::new(kind, reason))
        });

        match outcome {
            Ok(candidates) => candidates,
            Err(failure) => {
                self.diagnostics.record(DiagnosticEvent::FamilyFailed {
                    family: failure.family,
                    reason: failure.reason,
                });
                Vec::new()
            }
        }
    }
}

impl Default for UiDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

/// Stamp candidates with frame geometry, in reading order, without duplicates.
fn stamp(mut candidates: Vec<Candidate>, width: u32, height: u32) -> Vec<UiElement> {
    candidates.sort_by_key(|c| (c.bbox.y, c.bbox.x, c.bbox.width, c.bbox.height));
    candidates.dedup_by_key(|c| c.bbox);
    candidates
        .into_iter()
        .filter_map(|c| UiElement::new(c.attributes, c.bbox, c.confidence, width, height))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use image::{Rgb, RgbImage};

    fn detector_with_sink() -> (UiDetector, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let detector = UiDetector::default().with_diagnostics(sink.clone());
        (detector, sink)
    }

    fn busy_frame() -> Frame {
        // deterministic pseudo-random blocks plus a few flat controls
        let mut img = RgbImage::from_fn(320, 240, |x, y| {
            let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) % 251;
            let cell = ((x / 16) * 7 + (y / 16) * 13) % 5;
            Rgb([(v as u8).wrapping_mul(cell as u8 + 1), (cell * 50) as u8, 255 - v as u8])
        });
        for y in 20..60 {
            for x in 20..140 {
                img.put_pixel(x, y, Rgb([60, 60, 60]));
            }
        }
        for y in 100..130 {
            for x in 150..310 {
                img.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        Frame::from_image(img)
    }

    #[test]
    fn test_unreadable_frame_yields_nothing() {
        let (detector, sink) = detector_with_sink();
        let frame = Frame::decode(b"definitely not an image");

        assert!(detector.detect(&frame).is_empty());
        assert_eq!(
            sink.count_where(|e| matches!(e, DiagnosticEvent::FrameUnreadable { .. })),
            1
        );
    }

    #[test]
    fn test_blank_frame_yields_nothing() {
        let (detector, _) = detector_with_sink();
        let frame = Frame::from_image(RgbImage::from_pixel(200, 150, Rgb([255, 255, 255])));
        assert!(detector.detect(&frame).is_empty());
    }

    #[test]
    fn test_elements_stay_in_frame() {
        let (detector, _) = detector_with_sink();
        let frame = busy_frame();
        for element in detector.detect(&frame) {
            let b = element.bbox;
            assert!(b.width > 0 && b.height > 0);
            assert!(b.right() <= frame.width() && b.bottom() <= frame.height(), "{:?}", b);
            assert!((0.0..=1.0).contains(&element.confidence));
            assert_eq!((element.frame_width, element.frame_height), (320, 240));
            assert!(b.contains(element.center));
        }
    }

    #[test]
    fn test_detect_is_deterministic() {
        let (detector, _) = detector_with_sink();
        let frame = busy_frame();
        let first = detector.detect(&frame);
        let second = detector.detect(&frame);
        assert_eq!(first, second);
    }

    #[test]
    fn test_output_is_grouped_by_family() {
        let (detector, _) = detector_with_sink();
        let elements = detector.detect(&busy_frame());
        let order: Vec<usize> = elements
            .iter()
            .map(|e| ElementKind::ALL.iter().position(|k| *k == e.kind()).unwrap_or(usize::MAX))
            .collect();
        assert!(order.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_failing_family_is_contained() {
        let (detector, sink) = detector_with_sink();
        let survived = detector.run_family(ElementKind::Dropdown, || panic!("broken family"));
        assert!(survived.is_empty());

        let errored = detector.run_family(ElementKind::Checkbox, || {
            Err(DetectionFailure::new(ElementKind::Checkbox, "bad region"))
        });
        assert!(errored.is_empty());
        assert_eq!(
            sink.count_where(|e| matches!(e, DiagnosticEvent::FamilyFailed { .. })),
            2
        );
    }
}
