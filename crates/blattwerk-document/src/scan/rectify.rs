// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification: warps a detected document quadrilateral into an
// upright rectangle sized from the quad's own edge lengths.

use blattwerk_core::error::BlattwerkError;
use image::{DynamicImage, Luma, LumaA, Rgb, Rgba};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, info, instrument};

use super::geometry::{Quad, distance};

/// Output size for an ordered quad: the longer of each pair of opposite
/// edges, floored, at least 1×1.
pub fn target_size(ordered: &[(f32, f32); 4]) -> (u32, u32) {
    let [tl, tr, br, bl] = *ordered;
    let width = distance(tl, tr).max(distance(bl, br));
    let height = distance(tl, bl).max(distance(tr, br));
    ((width.floor() as u32).max(1), (height.floor() as u32).max(1))
}

/// Warp the region inside `quad` to an upright rectangle.
///
/// The corners are reordered first, so `quad` may list them in any order.
/// Pixels mapped from outside the source are white. The channel layout of
/// `image` is preserved.
///
/// # Errors
///
/// Returns [`BlattwerkError::ImageError`] when the quad is degenerate and no
/// projective transform exists.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn rectify(image: &DynamicImage, quad: &Quad) -> Result<DynamicImage, BlattwerkError> {
    let ordered = quad.ordered();
    if quad.area() < 1.0 {
        return Err(BlattwerkError::ImageError(format!(
            "degenerate document outline {ordered:?}"
        )));
    }

    let (out_w, out_h) = target_size(&ordered);
    let right = (out_w - 1) as f32;
    let bottom = (out_h - 1) as f32;
    let dest = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];
    debug!(?ordered, out_w, out_h, "Rectification target computed");

    let projection = Projection::from_control_points(ordered, dest).ok_or_else(|| {
        BlattwerkError::ImageError(format!("no projective transform for outline {ordered:?}"))
    })?;

    let warped = match image {
        DynamicImage::ImageLuma8(buf) => {
            let mut out = image::GrayImage::new(out_w, out_h);
            warp_into(buf, &projection, Interpolation::Bilinear, Luma([255]), &mut out);
            DynamicImage::ImageLuma8(out)
        }
        DynamicImage::ImageLumaA8(buf) => {
            let mut out = image::GrayAlphaImage::new(out_w, out_h);
            warp_into(buf, &projection, Interpolation::Bilinear, LumaA([255, 255]), &mut out);
            DynamicImage::ImageLumaA8(out)
        }
        DynamicImage::ImageRgba8(buf) => {
            let mut out = image::RgbaImage::new(out_w, out_h);
            warp_into(buf, &projection, Interpolation::Bilinear, Rgba([255, 255, 255, 255]), &mut out);
            DynamicImage::ImageRgba8(out)
        }
        other => {
            let rgb = other.to_rgb8();
            let mut out = image::RgbImage::new(out_w, out_h);
            warp_into(&rgb, &projection, Interpolation::Bilinear, Rgb([255, 255, 255]), &mut out);
            DynamicImage::ImageRgb8(out)
        }
    };

    info!(out_w, out_h, "Perspective rectification applied");
    Ok(warped)
}
