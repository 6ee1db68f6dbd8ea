//! Raster primitives shared by the detector families.

use crate::types::BoundingBox;
use image::{GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::{self, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, convex_hull};
use imageproc::point::Point;

pub type Polygon = Vec<Point<i32>>;

pub fn grayscale(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

/// Gaussian blur for an odd `kernel` size, sigma derived the way box-size
/// based blurs usually pick it. A kernel of 0 or 1 leaves the image as is.
pub fn blur(gray: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return gray.clone();
    }
    let sigma = 0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    imageproc::filter::gaussian_blur_f32(gray, sigma.max(0.1))
}

pub fn edge_map(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    imageproc::edges::canny(gray, low, high)
}

/// `iterations` passes of a 3x3 dilation, expressed as one L-infinity dilation.
pub fn dilate(binary: &GrayImage, iterations: u8) -> GrayImage {
    if iterations == 0 {
        return binary.clone();
    }
    imageproc::morphology::dilate(binary, Norm::LInf, iterations)
}

/// Outer borders that are not nested inside any other border.
pub fn external_contours(binary: &GrayImage) -> Vec<Polygon> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c: &Contour<i32>| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .filter(|points| !points.is_empty())
        .collect()
}

pub fn bounding_rect(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if min_x < 0 || min_y < 0 {
        return None;
    }
    Some(BoundingBox::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Contours of a binary image together with their bounding boxes.
pub fn contour_boxes(binary: &GrayImage) -> Vec<(Polygon, BoundingBox)> {
    external_contours(binary)
        .into_iter()
        .filter_map(|points| bounding_rect(&points).map(|bbox| (points, bbox)))
        .collect()
}

pub fn crop_rgb(img: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let bbox = bbox.clamp_to(img.width(), img.height())?;
    Some(image::imageops::crop_imm(img, bbox.x, bbox.y, bbox.width, bbox.height).to_image())
}

pub fn crop_gray(img: &GrayImage, bbox: &BoundingBox) -> Option<GrayImage> {
    let bbox = bbox.clamp_to(img.width(), img.height())?;
    Some(image::imageops::crop_imm(img, bbox.x, bbox.y, bbox.width, bbox.height).to_image())
}

pub fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn mean_brightness(gray: &GrayImage) -> f64 {
    mean(gray.pixels().map(|p| p[0] as f64))
}

/// Fraction of pixels at or below `threshold` (the ones an inverted binary
/// threshold would turn on).
pub fn dark_fraction(gray: &GrayImage, threshold: u8) -> f64 {
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let dark = gray.pixels().filter(|p| p[0] <= threshold).count() as u64;
    dark as f64 / total as f64
}

/// Inverted binary threshold: dark pixels become foreground (255).
pub fn threshold_inverted(gray: &GrayImage, level: u8) -> GrayImage {
    contrast::threshold(gray, level, ThresholdType::BinaryInverted)
}

/// Douglas-Peucker simplification of a closed contour with a tolerance of
/// `fraction` of its perimeter.
pub fn approximate_contour(points: &[Point<i32>], fraction: f64) -> Polygon {
    let epsilon = fraction * arc_length(points, true);
    if points.len() < 3 || epsilon <= 0.0 {
        return points.to_vec();
    }
    // start from the top-left-most point, which is always a hull vertex
    let start = points
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.y, p.x))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut curve = points[start..].to_vec();
    curve.extend_from_slice(&points[..start]);
    approximate_polygon_dp(&curve, epsilon, true)
}

/// Hue on a 0-180 scale and saturation on 0-255.
pub fn rgb_to_hs(r: u8, g: u8, b: u8) -> (f64, f64) {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max } else { 0.0 };
    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };

    (hue / 2.0, saturation * 255.0)
}

/// Standard deviation of hue and saturation over a region.
pub fn hue_saturation_std(roi: &RgbImage) -> (f64, f64) {
    let (hues, sats): (Vec<f64>, Vec<f64>) = roi
        .pixels()
        .map(|p| rgb_to_hs(p[0], p[1], p[2]))
        .unzip();
    (std_dev(&hues), std_dev(&sats))
}

/// Sum of per-channel standard deviations.
pub fn color_variance(roi: &RgbImage) -> f64 {
    (0..3)
        .map(|channel| {
            let values: Vec<f64> = roi.pixels().map(|p| p[channel] as f64).collect();
            std_dev(&values)
        })
        .sum()
}

/// Mean brightness inside a centered disc of radius `fraction * min(w, h)`.
pub fn central_disc_brightness(gray: &GrayImage, fraction: f64) -> Option<f64> {
    let (w, h) = gray.dimensions();
    let radius = (w.min(h) as f64 * fraction).floor();
    let (cx, cy) = ((w / 2) as f64, (h / 2) as f64);
    let values: Vec<f64> = gray
        .enumerate_pixels()
        .filter(|(x, y, _)| {
            let dx = *x as f64 - cx;
            let dy = *y as f64 - cy;
            dx * dx + dy * dy <= radius * radius
        })
        .map(|(_, _, p)| p[0] as f64)
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(mean(values.into_iter()))
    }
}

/// Solidity of the largest dark shape: contour area over convex hull area.
/// `None` when there is no shape or it is smaller than `min_area`.
pub fn largest_shape_solidity(gray: &GrayImage, threshold: u8, min_area: f64) -> Option<f64> {
    let binary = threshold_inverted(gray, threshold);
    let largest = external_contours(&binary)
        .into_iter()
        .map(|points| (contour_area(&points), points))
        .max_by(|a, b| a.0.total_cmp(&b.0))?;

    let (area, points) = largest;
    if area < min_area {
        return None;
    }
    let hull_area = contour_area(&convex_hull(points.as_slice()));
    if hull_area <= 0.0 {
        return Some(0.0);
    }
    Some(area / hull_area)
}
