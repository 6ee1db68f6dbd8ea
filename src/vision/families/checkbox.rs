use super::{Candidate, Prepared};
use crate::core::config::CheckboxThresholds;
use crate::errors::DetectionFailure;
use crate::vision::{imaging, ElementAttributes};
use image::GrayImage;

/// Checked state of a checkbox region, with the measured dark fraction.
///
/// This is a density heuristic: a tick, a cross and a filled square all count
/// as checked once enough of the box is dark.
pub fn checkbox_state(region: &GrayImage, cfg: &CheckboxThresholds) -> (bool, f64) {
    let fraction = imaging::dark_fraction(region, cfg.binarize_threshold);
    (fraction > cfg.checked_dark_fraction, fraction)
}

/// Small near-square outlines that simplify to exactly four vertices.
pub fn detect(prep: &Prepared<'_>, cfg: &CheckboxThresholds) -> Result<Vec<Candidate>, DetectionFailure> {
    let blurred = imaging::blur(&prep.gray, cfg.blur_kernel);
    let edges = imaging::edge_map(&blurred, prep.canny_low, prep.canny_high);

    let mut boxes = Vec::new();
    for (points, bbox) in imaging::contour_boxes(&edges) {
        if !cfg.aspect_ratio.contains(bbox.aspect_ratio()) || !cfg.area.contains(bbox.area() as f64) {
            continue;
        }
        if imaging::approximate_contour(&points, cfg.approx_epsilon).len() != 4 {
            continue;
        }

        let Some(region) = imaging::crop_gray(&prep.gray, &bbox) else {
            continue;
        };
        let (is_checked, dark_fraction) = checkbox_state(&region, cfg);
        boxes.push(Candidate {
            attributes: ElementAttributes::Checkbox {
                is_checked,
                dark_fraction,
            },
            bbox,
            confidence: cfg.confidence,
        });
    }
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// 40x40 light region whose first `dark` pixels (row-major) are black.
    fn region_with_dark_pixels(dark: u32) -> GrayImage {
        GrayImage::from_fn(40, 40, |x, y| {
            if y * 40 + x < dark {
                Luma([0])
            } else {
                Luma([250])
            }
        })
    }

    #[test]
    fn test_dense_region_is_checked() {
        let cfg = CheckboxThresholds::default();
        let (checked, fraction) = checkbox_state(&region_with_dark_pixels(560), &cfg);
        assert!((fraction - 0.35).abs() < 1e-9);
        assert!(checked);
    }

    #[test]
    fn test_sparse_region_is_unchecked() {
        let cfg = CheckboxThresholds::default();
        let (checked, fraction) = checkbox_state(&region_with_dark_pixels(80), &cfg);
        assert!((fraction - 0.05).abs() < 1e-9);
        assert!(!checked);
    }

    #[test]
    fn test_state_is_monotonic_in_darkness() {
        let cfg = CheckboxThresholds::default();
        let mut seen_checked = false;
        for dark in (0..=1600).step_by(40) {
            let (checked, _) = checkbox_state(&region_with_dark_pixels(dark), &cfg);
            if seen_checked {
                assert!(checked, "flipped back to unchecked at {} dark pixels", dark);
            }
            seen_checked |= checked;
        }
        assert!(seen_checked);
    }

    #[test]
    fn test_filled_square_is_a_checked_checkbox() {
        let mut img = image::RgbImage::from_pixel(100, 80, image::Rgb([255, 255, 255]));
        for y in 30..50 {
            for x in 40..60 {
                img.put_pixel(x, y, image::Rgb([20, 20, 20]));
            }
        }
        let prep = Prepared::new(&img, 50.0, 150.0);
        let boxes = detect(&prep, &CheckboxThresholds::default()).unwrap();

        assert_eq!(boxes.len(), 1, "{:?}", boxes);
        assert!(boxes[0].bbox.contains(crate::types::Point::new(50, 40)));
        assert!(matches!(
            boxes[0].attributes,
            ElementAttributes::Checkbox { is_checked: true, .. }
        ));
    }
}
