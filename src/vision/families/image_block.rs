use super::{Candidate, Prepared};
use crate::core::config::ImageBlockThresholds;
use crate::errors::DetectionFailure;
use crate::vision::{imaging, ElementAttributes};

/// Large regions with high color variance.
pub fn detect(prep: &Prepared<'_>, cfg: &ImageBlockThresholds) -> Result<Vec<Candidate>, DetectionFailure> {
    let edges = imaging::edge_map(&prep.gray, prep.canny_low, prep.canny_high);

    let mut blocks = Vec::new();
    for (_, bbox) in imaging::contour_boxes(&edges) {
        if (bbox.area() as f64) < cfg.min_area {
            continue;
        }
        let Some(roi) = imaging::crop_rgb(prep.rgb, &bbox) else {
            continue;
        };
        let color_variance = imaging::color_variance(&roi);
        if color_variance > cfg.min_color_variance {
            blocks.push(Candidate {
                attributes: ElementAttributes::ImageBlock { color_variance },
                bbox,
                confidence: cfg.confidence,
            });
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_flat_block_is_not_an_image() {
        let mut img = RgbImage::from_pixel(300, 200, Rgb([255, 255, 255]));
        for y in 40..160 {
            for x in 50..250 {
                img.put_pixel(x, y, Rgb([170, 170, 170]));
            }
        }
        let prep = Prepared::new(&img, 50.0, 150.0);
        assert!(detect(&prep, &ImageBlockThresholds::default()).unwrap().is_empty());
    }

    #[test]
    fn test_high_variance_block_is_an_image() {
        let mut img = RgbImage::from_pixel(300, 200, Rgb([255, 255, 255]));
        // coarse checkerboard of saturated primaries
        let palette = [Rgb([255, 0, 0]), Rgb([0, 0, 255]), Rgb([0, 200, 0]), Rgb([0, 0, 0])];
        for y in 40..160u32 {
            for x in 50..250u32 {
                let cell = ((x - 50) / 20 + (y - 40) / 20) as usize % palette.len();
                img.put_pixel(x, y, palette[cell]);
            }
        }
        let prep = Prepared::new(&img, 50.0, 150.0);
        let blocks = detect(&prep, &ImageBlockThresholds::default()).unwrap();

        assert!(!blocks.is_empty());
        assert!(blocks
            .iter()
            .any(|b| b.bbox.contains(crate::types::Point::new(150, 100))));
    }
}
