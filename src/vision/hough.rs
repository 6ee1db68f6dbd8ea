//! Gradient-directed circle transform.
//!
//! Every edge pixel votes for the centers lying along its gradient line at each
//! radius in the configured range. Accumulator peaks above the vote threshold
//! become centers (strongest first, at most one per `min_center_distance`), and
//! each center gets the radius most supported by surrounding edge pixels.

use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleParams {
    pub min_radius: u32,
    pub max_radius: u32,
    pub min_center_distance: f64,
    pub vote_threshold: u32,
    /// Minimum share of the circumference that must be covered by edge pixels.
    pub min_edge_coverage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Circle {
    pub cx: u32,
    pub cy: u32,
    pub radius: u32,
}

pub fn detect_circles(gray: &GrayImage, edges: &GrayImage, params: &CircleParams) -> Vec<Circle> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 || params.min_radius == 0 || params.max_radius < params.min_radius {
        return Vec::new();
    }

    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let edge_points: Vec<(u32, u32)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 0)
        .map(|(x, y, _)| (x, y))
        .collect();

    let mut acc = vec![0u32; (w * h) as usize];
    for &(x, y) in &edge_points {
        let dx = gx.get_pixel(x, y)[0] as f64;
        let dy = gy.get_pixel(x, y)[0] as f64;
        let mag = (dx * dx + dy * dy).sqrt();
        if mag == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / mag, dy / mag);
        for r in params.min_radius..=params.max_radius {
            for sign in [-1.0, 1.0] {
                let cx = (x as f64 + sign * r as f64 * ux).round();
                let cy = (y as f64 + sign * r as f64 * uy).round();
                if cx >= 0.0 && cy >= 0.0 && (cx as u32) < w && (cy as u32) < h {
                    acc[(cy as u32 * w + cx as u32) as usize] += 1;
                }
            }
        }
    }

    let mut peaks: Vec<(u32, u32, u32)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let votes = acc[(y * w + x) as usize];
            if votes < params.vote_threshold || !is_local_max(&acc, w, h, x, y) {
                continue;
            }
            peaks.push((votes, x, y));
        }
    }
    // strongest first, ties broken by position so the output is stable
    peaks.sort_by(|a, b| b.0.cmp(&a.0).then((a.2, a.1).cmp(&(b.2, b.1))));

    let mut circles: Vec<Circle> = Vec::new();
    for (_, cx, cy) in peaks {
        let too_close = circles.iter().any(|c| {
            let dx = c.cx as f64 - cx as f64;
            let dy = c.cy as f64 - cy as f64;
            (dx * dx + dy * dy).sqrt() < params.min_center_distance
        });
        if too_close {
            continue;
        }
        if let Some(radius) = best_radius(&edge_points, cx, cy, params) {
            circles.push(Circle { cx, cy, radius });
        }
    }
    circles
}

fn is_local_max(acc: &[u32], w: u32, h: u32, x: u32, y: u32) -> bool {
    let votes = acc[(y * w + x) as usize];
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            if (nx, ny) == (x, y) {
                continue;
            }
            let other = acc[(ny * w + nx) as usize];
            // plateaus resolve to their first pixel in scan order
            if other > votes || (other == votes && (ny, nx) < (y, x)) {
                return false;
            }
        }
    }
    true
}

fn best_radius(edge_points: &[(u32, u32)], cx: u32, cy: u32, params: &CircleParams) -> Option<u32> {
    let span = (params.max_radius - params.min_radius + 1) as usize;
    let mut hist = vec![0u32; span];
    for &(x, y) in edge_points {
        let dx = x as f64 - cx as f64;
        let dy = y as f64 - cy as f64;
        let r = (dx * dx + dy * dy).sqrt().round() as u32;
        if r >= params.min_radius && r <= params.max_radius {
            hist[(r - params.min_radius) as usize] += 1;
        }
    }

    // a traced edge wobbles by a pixel, so score each radius with its neighbours
    let (offset, count) = (0..span)
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(span - 1);
            (i, hist[lo..=hi].iter().sum::<u32>())
        })
        .fold((0usize, 0u32), |best, (i, c)| if c > best.1 { (i, c) } else { best });
    let radius = params.min_radius + offset as u32;
    let circumference = 2.0 * std::f64::consts::PI * radius as f64;
    if count as f64 >= params.min_edge_coverage * circumference {
        Some(radius)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::imaging;
    use image::Luma;

    fn params() -> CircleParams {
        CircleParams {
            min_radius: 10,
            max_radius: 25,
            min_center_distance: 20.0,
            vote_threshold: 15,
            min_edge_coverage: 0.5,
        }
    }

    #[test]
    fn test_finds_dark_disc() {
        let mut gray = GrayImage::from_pixel(90, 90, Luma([255]));
        for y in 0..90u32 {
            for x in 0..90u32 {
                let dx = x as f64 - 45.0;
                let dy = y as f64 - 45.0;
                if dx * dx + dy * dy <= 18.0 * 18.0 {
                    gray.put_pixel(x, y, Luma([0]));
                }
            }
        }
        let blurred = imaging::blur(&gray, 5);
        let edges = imaging::edge_map(&blurred, 50.0, 150.0);
        let circles = detect_circles(&blurred, &edges, &params());

        assert!(!circles.is_empty());
        let c = circles[0];
        assert!((c.cx as i64 - 45).abs() <= 2 && (c.cy as i64 - 45).abs() <= 2, "{:?}", c);
        assert!((15..=21).contains(&c.radius), "{:?}", c);
    }

    #[test]
    fn test_blank_image_has_no_circles() {
        let gray = GrayImage::from_pixel(60, 60, Luma([200]));
        let edges = imaging::edge_map(&gray, 50.0, 150.0);
        assert!(detect_circles(&gray, &edges, &params()).is_empty());
    }
}
