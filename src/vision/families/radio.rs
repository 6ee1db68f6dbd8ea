use super::{Candidate, Prepared};
use crate::core::config::RadioThresholds;
use crate::errors::DetectionFailure;
use crate::types::BoundingBox;
use crate::vision::hough::{self, CircleParams};
use crate::vision::{imaging, ElementAttributes};
use image::GrayImage;

/// Selected state of a radio region from its central disc, with the measured
/// brightness. A darker center means a filled dot.
pub fn radio_state(region: &GrayImage, cfg: &RadioThresholds) -> (bool, f64) {
    match imaging::central_disc_brightness(region, cfg.center_disc_fraction) {
        Some(brightness) => (brightness < cfg.selected_max_brightness, brightness),
        None => (false, 255.0),
    }
}

pub fn detect(prep: &Prepared<'_>, cfg: &RadioThresholds) -> Result<Vec<Candidate>, DetectionFailure> {
    let blurred = imaging::blur(&prep.gray, cfg.blur_kernel);
    let edges = imaging::edge_map(&blurred, prep.canny_low, prep.canny_high);
    let params = CircleParams {
        min_radius: cfg.min_radius,
        max_radius: cfg.max_radius,
        min_center_distance: cfg.min_center_distance,
        vote_threshold: cfg.vote_threshold,
        min_edge_coverage: cfg.min_edge_coverage,
    };

    let mut radios = Vec::new();
    for circle in hough::detect_circles(&blurred, &edges, &params) {
        if circle.cx < circle.radius || circle.cy < circle.radius {
            continue;
        }
        let diameter = 2 * circle.radius;
        let bbox = BoundingBox::new(circle.cx - circle.radius, circle.cy - circle.radius, diameter, diameter);
        // circles cut by the frame edge are skipped rather than clipped
        if !bbox.fits_within(prep.width(), prep.height()) {
            continue;
        }
        let Some(region) = imaging::crop_gray(&prep.gray, &bbox) else {
            continue;
        };
        let (is_selected, center_brightness) = radio_state(&region, cfg);
        radios.push(Candidate {
            attributes: ElementAttributes::RadioButton {
                is_selected,
                radius: circle.radius,
                center_brightness,
            },
            bbox,
            confidence: cfg.confidence,
        });
    }
    Ok(radios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn ring(selected: bool) -> RgbImage {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        for y in 0..100u32 {
            for x in 0..100u32 {
                let dx = x as f64 - 50.0;
                let dy = y as f64 - 50.0;
                let d = (dx * dx + dy * dy).sqrt();
                let dark = (d >= 15.0 && d <= 18.0) || (selected && d <= 8.0);
                if dark {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        img
    }

    fn relaxed() -> RadioThresholds {
        RadioThresholds {
            vote_threshold: 15,
            ..RadioThresholds::default()
        }
    }

    #[test]
    fn test_selected_and_unselected_rings() {
        for selected in [true, false] {
            let img = ring(selected);
            let prep = Prepared::new(&img, 50.0, 150.0);
            let radios = detect(&prep, &relaxed()).unwrap();

            let hit = radios
                .iter()
                .find(|r| r.bbox.contains(crate::types::Point::new(50, 50)))
                .unwrap_or_else(|| panic!("no radio found (selected={}): {:?}", selected, radios));
            match hit.attributes {
                ElementAttributes::RadioButton { is_selected, .. } => assert_eq!(is_selected, selected),
                ref other => panic!("unexpected attributes {:?}", other),
            }
        }
    }

    #[test]
    fn test_darker_center_flips_to_selected() {
        let cfg = RadioThresholds::default();
        let mut last = false;
        for level in (0..=255u32).rev().step_by(15) {
            let region = GrayImage::from_pixel(30, 30, Luma([level as u8]));
            let (selected, _) = radio_state(&region, &cfg);
            if last {
                assert!(selected);
            }
            last = selected;
        }
        assert!(last);
    }
}
