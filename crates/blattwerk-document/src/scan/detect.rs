// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document outline detection. Finds the quadrilateral of a paper document in
// a photo using an adaptive-threshold + Canny edge mask and contour analysis,
// with a background-key detector and a fixed inset rectangle as fallbacks.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{arc_length, contour_area};
use imageproc::morphology::{dilate, erode};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::geometry::{Quad, approximate_closed_polygon, min_area_rect};
use super::threshold::{Polarity, adaptive_threshold};

/// Tuning constants for [`GeometryDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    /// Gaussian blur sigma applied before masking.
    pub blur_sigma: f32,
    /// Radius of the adaptive threshold window (5 → 11×11).
    pub threshold_radius: u32,
    /// Constant subtracted from the local mean.
    pub threshold_bias: i32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Chebyshev radius of the square closing kernel (2 → 5×5).
    pub kernel_radius: u8,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub epsilon_fraction: f64,
    /// Minimum contour area, as a fraction of the image, for the primary detector.
    pub min_area_fraction: f64,
    /// Minimum region area, as a fraction of the image, for the background detector.
    pub background_area_fraction: f64,
    /// Pixels brighter than this fraction of the corner mean are foreground.
    pub background_ratio: f64,
    /// Fallback inset on each side, as a fraction of width and height.
    pub fallback_margin: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            threshold_radius: 5,
            threshold_bias: 2,
            canny_low: 50.0,
            canny_high: 150.0,
            kernel_radius: 2,
            epsilon_fraction: 0.02,
            min_area_fraction: 0.20,
            background_area_fraction: 0.10,
            background_ratio: 0.90,
            fallback_margin: 0.05,
        }
    }
}

/// Which detector produced a [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Edge-mask contour with a 4–8 vertex approximation.
    Contour,
    /// Largest region brighter than the corner background.
    BackgroundKey,
    /// Fixed 5% inset rectangle.
    Fallback,
}

/// A located document outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub quad: Quad,
    pub method: DetectionMethod,
}

/// Locates the document quadrilateral in a photo. Never fails.
#[derive(Debug, Clone, Default)]
pub struct GeometryDetector {
    params: DetectorParams,
}

impl GeometryDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect on a working copy no wider than `max_width` and map the quad
    /// back to the coordinates of `image`.
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), max_width))]
    pub fn detect_at_width(&self, image: &DynamicImage, max_width: u32) -> Detection {
        if image.width() <= max_width || max_width == 0 {
            return self.detect(image);
        }

        let scale = max_width as f32 / image.width() as f32;
        let working_height = ((image.height() as f32 * scale).round() as u32).max(1);
        let working = image.resize_exact(max_width, working_height, FilterType::CatmullRom);
        debug!(max_width, working_height, "Downscaled for detection");

        let detection = self.detect(&working);
        let factor = image.width() as f32 / max_width as f32;
        Detection {
            quad: detection.quad.scaled(factor),
            method: detection.method,
        }
    }

    /// Locate the document in `image` at its own resolution.
    ///
    /// Tries the edge-mask contour detector, then the background-key
    /// detector, and finally returns the inset fallback rectangle.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage) -> Detection {
        let (width, height) = (image.width(), image.height());
        let luma = image.to_luma8();
        let gray = gaussian_blur_f32(&luma, self.params.blur_sigma);

        let mask = self.edge_mask(&gray);
        let contours = external_contours(&mask);
        debug!(contour_count = contours.len(), "External contours found");

        if let Some(quad) = self.select_candidate(&contours, width, height) {
            info!(method = "contour", "Document outline detected");
            return Detection {
                quad,
                method: DetectionMethod::Contour,
            };
        }

        if let Some(quad) = self.detect_by_background(&luma) {
            warn!("No contour candidate; using background-key outline");
            return Detection {
                quad,
                method: DetectionMethod::BackgroundKey,
            };
        }

        warn!("No document outline found; using inset fallback rectangle");
        Detection {
            quad: fallback_quad(width, height, self.params.fallback_margin),
            method: DetectionMethod::Fallback,
        }
    }

    /// Binary mask of dark local features OR Canny edges, closed with a
    /// square kernel.
    pub fn edge_mask(&self, gray: &GrayImage) -> GrayImage {
        let p = &self.params;
        let mut mask = adaptive_threshold(gray, p.threshold_radius, p.threshold_bias, Polarity::DarkForeground);
        let edges = canny(gray, p.canny_low, p.canny_high);

        for (m, e) in mask.pixels_mut().zip(edges.pixels()) {
            m.0[0] |= e.0[0];
        }

        let closed = dilate(&mask, Norm::LInf, p.kernel_radius);
        erode(&closed, Norm::LInf, p.kernel_radius)
    }

    /// Pick the first contour (largest area first) whose approximation has
    /// 4–8 vertices and covers at least the minimum area fraction.
    ///
    /// Approximations with more than four vertices are replaced by the
    /// contour's minimum-area bounding rectangle.
    pub fn select_candidate(&self, contours: &[Vec<Point<i32>>], width: u32, height: u32) -> Option<Quad> {
        let image_area = width as f64 * height as f64;
        let min_area = image_area * self.params.min_area_fraction;

        let mut ranked: Vec<(f64, &Vec<Point<i32>>)> =
            contours.iter().map(|c| (contour_area(c), c)).collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (area, contour) in ranked {
            if area < min_area {
                // Sorted descending: nothing further can qualify.
                break;
            }
            let epsilon = self.params.epsilon_fraction * arc_length(contour.as_slice(), true);
            let approx = approximate_closed_polygon(contour, epsilon);
            debug!(area, vertices = approx.len(), "Evaluating contour");

            match approx.len() {
                4 => {
                    let corners = [approx[0], approx[1], approx[2], approx[3]];
                    return Some(Quad::from_points(&corners));
                }
                5..=8 => {
                    if let Some(rect) = min_area_rect(contour) {
                        return Some(Quad::from_points(&rect));
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Treat the mean of the four corner pixels as background and outline the
    /// largest region brighter than `background_ratio` of it. Expects the
    /// unblurred gray image.
    pub fn detect_by_background(&self, gray: &GrayImage) -> Option<Quad> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let corners = [(0, 0), (width - 1, 0), (0, height - 1), (width - 1, height - 1)];
        let background =
            corners.iter().map(|&(x, y)| gray.get_pixel(x, y).0[0] as f64).sum::<f64>() / 4.0;
        let threshold = background * self.params.background_ratio;

        let mut mask = gray.clone();
        for pixel in mask.pixels_mut() {
            pixel.0[0] = if pixel.0[0] as f64 > threshold { 255 } else { 0 };
        }

        let (area, largest) = external_contours(&mask)
            .into_iter()
            .map(|c| (contour_area(&c), c))
            .max_by(|a, b| a.0.total_cmp(&b.0))?;
        debug!(background, area, "Largest background-key region");

        if area < width as f64 * height as f64 * self.params.background_area_fraction {
            return None;
        }
        min_area_rect(&largest).map(|rect| Quad::from_points(&rect))
    }
}

/// Image rectangle inset by `margin` of the width and height on each side,
/// with the inset truncated to whole pixels.
pub fn fallback_quad(width: u32, height: u32, margin: f64) -> Quad {
    let mx = (width as f64 * margin).floor() as f32;
    let my = (height as f64 * margin).floor() as f32;
    let (w, h) = (width as f32, height as f32);
    Quad([(mx, my), (w - mx, my), (w - mx, h - my), (mx, h - my)])
}

/// Outer borders of top-level foreground regions.
fn external_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
    use imageproc::rect::Rect;

    fn pt(x: i32, y: i32) -> Point<i32> {
        Point::new(x, y)
    }

    /// Gray background with a black-bordered white sheet drawn as a trapezoid.
    fn photographed_sheet() -> GrayImage {
        let mut img = GrayImage::from_pixel(600, 800, Luma([90u8]));
        let outer = [pt(100, 80), pt(500, 100), pt(520, 720), pt(80, 700)];
        let inner = [pt(108, 88), pt(492, 108), pt(512, 712), pt(88, 692)];
        draw_polygon_mut(&mut img, &outer, Luma([0u8]));
        draw_polygon_mut(&mut img, &inner, Luma([255u8]));
        img
    }

    #[test]
    fn detects_drawn_sheet_by_contour() {
        let img = DynamicImage::ImageLuma8(photographed_sheet());
        let detection = GeometryDetector::default().detect(&img);
        assert_eq!(detection.method, DetectionMethod::Contour);

        let [tl, tr, br, bl] = detection.quad.ordered();
        for (found, expected) in [(tl, (100.0, 80.0)), (tr, (500.0, 100.0)), (br, (520.0, 720.0)), (bl, (80.0, 700.0))] {
            assert!(
                (found.0 - expected.0).abs() < 8.0 && (found.1 - expected.1).abs() < 8.0,
                "corner {found:?} too far from {expected:?}"
            );
        }
    }

    #[test]
    fn rectified_sheet_keeps_aspect_ratio() {
        let img = DynamicImage::ImageLuma8(photographed_sheet());
        let detection = GeometryDetector::default().detect(&img);
        let flat = crate::scan::rectify::rectify(&img, &detection.quad).unwrap();

        let aspect = flat.width() as f64 / flat.height() as f64;
        let expected = 440.0 / 620.0;
        assert!(
            (aspect - expected).abs() / expected < 0.05,
            "aspect {aspect} ({}x{})",
            flat.width(),
            flat.height()
        );
    }

    #[test]
    fn flat_image_with_bright_corners_falls_back() {
        let mut img = GrayImage::from_pixel(200, 100, Luma([50u8]));
        for (x, y) in [(0, 0), (190, 0), (0, 90), (190, 90)] {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(10, 10), Luma([200u8]));
        }
        let detection = GeometryDetector::default().detect(&DynamicImage::ImageLuma8(img));
        assert_eq!(detection.method, DetectionMethod::Fallback);
        assert_eq!(
            detection.quad.0,
            [(10.0, 5.0), (190.0, 5.0), (190.0, 95.0), (10.0, 95.0)]
        );
    }

    #[test]
    fn background_key_finds_bright_region() {
        let mut img = GrayImage::from_pixel(200, 200, Luma([0u8]));
        for (x, y) in [(0, 0), (190, 0), (0, 190), (190, 190)] {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(10, 10), Luma([100u8]));
        }
        draw_filled_rect_mut(&mut img, Rect::at(40, 30).of_size(120, 140), Luma([150u8]));

        let quad = GeometryDetector::default().detect_by_background(&img).unwrap();
        let area = quad.area();
        assert!((area - 120.0 * 140.0).abs() < 120.0 * 140.0 * 0.05, "area {area}");
        let [tl, _, br, _] = quad.ordered();
        assert!((tl.0 - 40.0).abs() <= 1.0 && (tl.1 - 30.0).abs() <= 1.0, "{tl:?}");
        assert!((br.0 - 159.0).abs() <= 1.0 && (br.1 - 169.0).abs() <= 1.0, "{br:?}");
    }

    #[test]
    fn background_key_rejects_small_region() {
        let mut img = GrayImage::from_pixel(200, 200, Luma([0u8]));
        for (x, y) in [(0, 0), (190, 0), (0, 190), (190, 190)] {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(10, 10), Luma([100u8]));
        }
        // The only region brighter than the corners covers 1% of the image.
        draw_filled_rect_mut(&mut img, Rect::at(90, 90).of_size(20, 20), Luma([200u8]));
        assert!(GeometryDetector::default().detect_by_background(&img).is_none());
    }

    #[test]
    fn candidate_at_exactly_minimum_area_is_accepted() {
        let detector = GeometryDetector::default();
        let rect = vec![pt(0, 0), pt(40, 0), pt(40, 50), pt(0, 50)];
        let quad = detector.select_candidate(&[rect], 100, 100).unwrap();
        assert!((quad.area() - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn candidate_below_minimum_area_is_rejected() {
        let detector = GeometryDetector::default();
        let rect = vec![pt(0, 0), pt(199, 0), pt(199, 100), pt(0, 100)];
        assert!(detector.select_candidate(&[rect], 1000, 100).is_none());
    }

    #[test]
    fn pentagon_candidate_becomes_bounding_rectangle() {
        let detector = GeometryDetector::default();
        // A rectangle with one corner cut off.
        let pentagon = vec![pt(0, 0), pt(80, 0), pt(100, 20), pt(100, 100), pt(0, 100)];
        let quad = detector.select_candidate(&[pentagon], 100, 100).unwrap();
        // Bounding box corners may be rounded out by a pixel.
        assert!((10_000.0..=10_201.0).contains(&quad.area()), "area {}", quad.area());
    }

    #[test]
    fn detection_at_width_maps_back_to_source_coordinates() {
        let mut img = GrayImage::from_pixel(400, 200, Luma([50u8]));
        for (x, y) in [(0, 0), (380, 0), (0, 180), (380, 180)] {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(20, 20), Luma([200u8]));
        }
        let img = DynamicImage::ImageLuma8(img);
        let detection = GeometryDetector::default().detect_at_width(&img, 200);
        assert_eq!(detection.method, DetectionMethod::Fallback);
        // Inset of the 200x100 working copy, scaled by 2.
        assert_eq!(
            detection.quad.0,
            [(20.0, 10.0), (380.0, 10.0), (380.0, 190.0), (20.0, 190.0)]
        );
    }

    #[test]
    fn fallback_inset_truncates() {
        let quad = fallback_quad(205, 99, 0.05);
        assert_eq!(quad.0, [(10.0, 4.0), (195.0, 4.0), (195.0, 95.0), (10.0, 95.0)]);
    }

    #[test]
    fn fallback_on_odd_sized_image_uses_whole_pixel_inset() {
        let mut img = GrayImage::from_pixel(205, 99, Luma([50u8]));
        for (x, y) in [(0, 0), (195, 0), (0, 89), (195, 89)] {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(10, 10), Luma([200u8]));
        }
        let detection = GeometryDetector::default().detect(&DynamicImage::ImageLuma8(img));
        assert_eq!(detection.method, DetectionMethod::Fallback);
        assert_eq!(detection.quad.0[0], (10.0, 4.0));
        assert_eq!(detection.quad.0[2], (195.0, 95.0));
    }

    #[test]
    fn background_key_samples_unblurred_corners() {
        // Single bright corner pixels on a light table. Blurred corners would
        // drop the threshold below the table and flood the whole frame.
        let mut img = GrayImage::from_pixel(200, 200, Luma([215u8]));
        for (x, y) in [(0, 0), (199, 0), (0, 199), (199, 199)] {
            img.put_pixel(x, y, Luma([255u8]));
        }
        // 12.5% of the frame: too small for the contour pass.
        draw_filled_rect_mut(&mut img, Rect::at(50, 75).of_size(100, 50), Luma([240u8]));

        let detection = GeometryDetector::default().detect(&DynamicImage::ImageLuma8(img));
        assert_eq!(detection.method, DetectionMethod::BackgroundKey);
        let area = detection.quad.area();
        assert!((4500.0..=5500.0).contains(&area), "area {area}");
    }
}
