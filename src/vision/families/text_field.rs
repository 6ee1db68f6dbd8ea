use super::{Candidate, Prepared};
use crate::core::config::TextFieldThresholds;
use crate::errors::DetectionFailure;
use crate::vision::{imaging, ElementAttributes};

/// Wide, flat outlines with a light fill.
pub fn detect(prep: &Prepared<'_>, cfg: &TextFieldThresholds) -> Result<Vec<Candidate>, DetectionFailure> {
    let blurred = imaging::blur(&prep.gray, cfg.blur_kernel);
    let edges = imaging::edge_map(&blurred, prep.canny_low, prep.canny_high);

    let mut fields = Vec::new();
    for (_, bbox) in imaging::contour_boxes(&edges) {
        let aspect_ratio = bbox.aspect_ratio();
        if !cfg.aspect_ratio.contains(aspect_ratio) || !cfg.area.contains(bbox.area() as f64) {
            continue;
        }
        let Some(roi) = imaging::crop_gray(&prep.gray, &bbox) else {
            continue;
        };
        let mean_brightness = imaging::mean_brightness(&roi);
        if mean_brightness > cfg.min_mean_brightness {
            fields.push(Candidate {
                attributes: ElementAttributes::TextField {
                    aspect_ratio,
                    mean_brightness,
                },
                bbox,
                confidence: cfg.confidence,
            });
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn outlined_box(fill: Rgb<u8>) -> RgbImage {
        let mut img = RgbImage::from_pixel(300, 120, Rgb([120, 120, 120]));
        for y in 40..70 {
            for x in 40..240 {
                img.put_pixel(x, y, fill);
            }
        }
        img
    }

    #[test]
    fn test_light_input_box_is_a_text_field() {
        let img = outlined_box(Rgb([255, 255, 255]));
        let prep = Prepared::new(&img, 50.0, 150.0);
        let fields = detect(&prep, &TextFieldThresholds::default()).unwrap();

        assert_eq!(fields.len(), 1, "{:?}", fields);
        match fields[0].attributes {
            ElementAttributes::TextField { aspect_ratio, mean_brightness } => {
                assert!(aspect_ratio > 5.0 && aspect_ratio < 8.0);
                assert!(mean_brightness > 200.0);
            }
            ref other => panic!("unexpected attributes {:?}", other),
        }
    }

    #[test]
    fn test_dark_box_is_rejected() {
        let img = outlined_box(Rgb([40, 40, 40]));
        let prep = Prepared::new(&img, 50.0, 150.0);
        assert!(detect(&prep, &TextFieldThresholds::default()).unwrap().is_empty());
    }
}
