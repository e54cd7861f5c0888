// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar geometry for document outlines: quadrilaterals, corner ordering,
// polygon area and approximation, minimum-area bounding rectangles.

use std::cmp::Ordering;

use imageproc::geometry::{self, approximate_polygon_dp, convex_hull};
use imageproc::point::Point;

/// A document outline as four corner points in image coordinates.
///
/// The points may be in any order; [`Quad::ordered`] returns them as
/// `[top_left, top_right, bottom_right, bottom_left]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad(pub [(f32, f32); 4]);

impl Quad {
    /// Build from integer contour points.
    pub fn from_points(points: &[Point<i32>; 4]) -> Self {
        Self(points.map(|p| (p.x as f32, p.y as f32)))
    }

    /// Corners ordered top-left, top-right, bottom-right, bottom-left.
    pub fn ordered(&self) -> [(f32, f32); 4] {
        order_points(&self.0)
    }

    /// Multiply every coordinate by `factor` (e.g. working → original resolution).
    pub fn scaled(&self, factor: f32) -> Self {
        Self(self.0.map(|(x, y)| (x * factor, y * factor)))
    }

    /// Enclosed area of the ordered outline.
    pub fn area(&self) -> f64 {
        let ordered = self.ordered();
        shoelace_area(&ordered.map(|(x, y)| (x as f64, y as f64)))
    }
}

/// Order four points as `[top_left, top_right, bottom_right, bottom_left]`.
///
/// - top-left has the smallest `x + y`
/// - bottom-right has the largest `x + y`
/// - top-right has the smallest `y - x`
/// - bottom-left has the largest `y - x`
///
/// Ties are broken on `(x, y)` so the result depends only on the set of
/// points, never on the order they were supplied in.
pub fn order_points(points: &[(f32, f32); 4]) -> [(f32, f32); 4] {
    type Key = fn(&(f32, f32)) -> f32;

    fn sum(p: &(f32, f32)) -> f32 {
        p.0 + p.1
    }

    fn diff(p: &(f32, f32)) -> f32 {
        p.1 - p.0
    }

    fn by(key: Key) -> impl Fn(&&(f32, f32), &&(f32, f32)) -> Ordering {
        move |a: &&(f32, f32), b: &&(f32, f32)| {
            key(a)
                .total_cmp(&key(b))
                .then(a.0.total_cmp(&b.0))
                .then(a.1.total_cmp(&b.1))
        }
    }

    let top_left = *points.iter().min_by(by(sum)).unwrap_or(&points[0]);
    let bottom_right = *points.iter().max_by(by(sum)).unwrap_or(&points[2]);
    let top_right = *points.iter().min_by(by(diff)).unwrap_or(&points[1]);
    let bottom_left = *points.iter().max_by(by(diff)).unwrap_or(&points[3]);

    [top_left, top_right, bottom_right, bottom_left]
}

/// Euclidean distance between two points.
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Area of a simple polygon (vertices in order, CW or CCW) by the shoelace formula.
pub fn shoelace_area(vertices: &[(f64, f64)]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i].0 * vertices[j].1;
        area -= vertices[j].0 * vertices[i].1;
    }
    area.abs() / 2.0
}

/// Douglas–Peucker simplification of a closed contour.
///
/// The contour is split at its first point and the point farthest from it.
/// Each half is simplified as an open curve and the halves are joined, so the
/// result has no duplicated closing vertex.
pub fn approximate_closed_polygon(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.len() < 3 || epsilon <= 0.0 {
        return points.to_vec();
    }

    let start = points[0];
    let (split, _) = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, squared_distance(start, *p)))
        .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best });
    if split == 0 {
        return vec![start];
    }

    let first = approximate_polygon_dp(&points[..=split], epsilon, false);
    let mut second_half: Vec<Point<i32>> = points[split..].to_vec();
    second_half.push(start);
    let second = approximate_polygon_dp(&second_half, epsilon, false);

    let mut result = Vec::with_capacity(first.len() + second.len());
    result.extend_from_slice(&first[..first.len() - 1]);
    result.extend_from_slice(&second[..second.len() - 1]);
    result
}

fn squared_distance(a: Point<i32>, b: Point<i32>) -> i64 {
    let dx = (a.x - b.x) as i64;
    let dy = (a.y - b.y) as i64;
    dx * dx + dy * dy
}

/// Minimum-area rotated rectangle enclosing `points`, as four corners.
///
/// Returns `None` when the points span no area (fewer than three hull points).
pub fn min_area_rect(points: &[Point<i32>]) -> Option<[Point<i32>; 4]> {
    if convex_hull(points).len() < 3 {
        return None;
    }
    Some(geometry::min_area_rect(points))
}
