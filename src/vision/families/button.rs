use super::{Candidate, Prepared};
use crate::core::config::ButtonThresholds;
use crate::errors::DetectionFailure;
use crate::vision::{imaging, ElementAttributes};

/// Mid-sized, moderately wide blobs with a near-uniform fill.
pub fn detect(prep: &Prepared<'_>, cfg: &ButtonThresholds) -> Result<Vec<Candidate>, DetectionFailure> {
    let blurred = imaging::blur(&prep.gray, cfg.blur_kernel);
    let edges = imaging::edge_map(&blurred, prep.canny_low, prep.canny_high);
    let dilated = imaging::dilate(&edges, cfg.dilate_iterations);

    let mut buttons = Vec::new();
    for (_, bbox) in imaging::contour_boxes(&dilated) {
        let aspect_ratio = bbox.aspect_ratio();
        if !cfg.aspect_ratio.contains(aspect_ratio) || !cfg.area.contains(bbox.area() as f64) {
            continue;
        }
        let Some(roi) = imaging::crop_rgb(prep.rgb, &bbox) else {
            continue;
        };

        // photographs pass the geometric filter but not the color check
        let (hue_std, saturation_std) = imaging::hue_saturation_std(&roi);
        if hue_std < cfg.max_hue_std && saturation_std < cfg.max_saturation_std {
            buttons.push(Candidate {
                attributes: ElementAttributes::Button {
                    aspect_ratio,
                    hue_std,
                    saturation_std,
                },
                bbox,
                confidence: cfg.confidence,
            });
        }
    }
    Ok(buttons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_blank_frame_has_no_buttons() {
        let img = RgbImage::from_pixel(200, 120, Rgb([255, 255, 255]));
        let prep = Prepared::new(&img, 50.0, 150.0);
        assert!(detect(&prep, &ButtonThresholds::default()).unwrap().is_empty());
    }

    #[test]
    fn test_flat_filled_rectangle_is_a_button() {
        let mut img = RgbImage::from_pixel(240, 140, Rgb([255, 255, 255]));
        for y in 50..90 {
            for x in 60..180 {
                img.put_pixel(x, y, Rgb([70, 70, 70]));
            }
        }
        let prep = Prepared::new(&img, 50.0, 150.0);
        let buttons = detect(&prep, &ButtonThresholds::default()).unwrap();

        assert_eq!(buttons.len(), 1, "{:?}", buttons);
        let bbox = buttons[0].bbox;
        assert!(bbox.contains(crate::types::Point::new(120, 70)));
        assert!(bbox.width >= 120 && bbox.width <= 132);
        assert_eq!(buttons[0].confidence, 0.7);
    }
}
