use super::{Candidate, Prepared};
use crate::core::config::DropdownThresholds;
use crate::errors::DetectionFailure;
use crate::types::BoundingBox;
use crate::vision::{imaging, ElementAttributes};
use image::GrayImage;

/// Solidity of an arrow glyph in the right-hand slice of a control, when the
/// slice holds one that looks like a chevron or triangle.
pub fn arrow_solidity(slice: &GrayImage, cfg: &DropdownThresholds) -> Option<f64> {
    imaging::largest_shape_solidity(slice, cfg.binarize_threshold, cfg.min_arrow_area)
        .filter(|solidity| cfg.solidity.contains(*solidity))
}

/// Wide outlines carrying an arrow-like glyph at their right edge.
pub fn detect(prep: &Prepared<'_>, cfg: &DropdownThresholds) -> Result<Vec<Candidate>, DetectionFailure> {
    let edges = imaging::edge_map(&prep.gray, prep.canny_low, prep.canny_high);

    let mut dropdowns = Vec::new();
    for (_, bbox) in imaging::contour_boxes(&edges) {
        let aspect_ratio = bbox.aspect_ratio();
        if !cfg.aspect_ratio.contains(aspect_ratio) || !cfg.area.contains(bbox.area() as f64) {
            continue;
        }
        if bbox.width <= cfg.arrow_slice_width {
            continue;
        }

        let slice_box = BoundingBox::new(
            bbox.right() - cfg.arrow_slice_width,
            bbox.y,
            cfg.arrow_slice_width,
            bbox.height,
        );
        let Some(slice) = imaging::crop_gray(&prep.gray, &slice_box) else {
            continue;
        };

        if let Some(arrow_solidity) = arrow_solidity(&slice, cfg) {
            dropdowns.push(Candidate {
                attributes: ElementAttributes::Dropdown {
                    aspect_ratio,
                    arrow_solidity,
                },
                bbox,
                confidence: cfg.confidence,
            });
        }
    }
    Ok(dropdowns)
}
