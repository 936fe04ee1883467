//! Hit-box outline generation from a texture's alpha channel.
//!
//! Every algorithm returns an ordered, closed polygon in image-local space:
//! the origin is the image centre, x grows to the right and **y grows upward**
//! (pixel row 0 maps to `+height / 2`). Winding is counter-clockwise. This is
//! the same convention sprites use in world space, so a hit box only needs
//! scale/rotate/translate to be placed on screen.
//!
//! A pixel counts as opaque when its alpha is non-zero.

mod detailed;
mod simple;

use glam::Vec2;
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::geometry::signed_area;

/// Default RDP tolerance (in pixels) for [`HitBoxAlgorithm::Detailed`].
pub const DEFAULT_DETAIL: f32 = 4.5;

/// Closed set of outline generators behind a single `calculate` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitBoxAlgorithm {
    /// The four image corners.
    BoundingBox,
    /// Opaque bounding box with transparent corners trimmed diagonally (≤ 8 points).
    Simple,
    /// Traced outline of the largest opaque region, simplified to `detail` pixels.
    Detailed {
        #[serde(default = "default_detail")]
        detail: f32,
    },
}

fn default_detail() -> f32 {
    DEFAULT_DETAIL
}

impl Default for HitBoxAlgorithm {
    fn default() -> Self {
        Self::Simple
    }
}

impl HitBoxAlgorithm {
    pub fn detailed() -> Self {
        Self::Detailed {
            detail: DEFAULT_DETAIL,
        }
    }

    /// Stable name used when composing texture cache keys.
    pub fn cache_name(&self) -> String {
        match self {
            Self::BoundingBox => "bounding_box".to_string(),
            Self::Simple => "simple".to_string(),
            Self::Detailed { detail } => format!("detailed:{detail}"),
        }
    }

    pub fn calculate(&self, image: &RgbaImage) -> Vec<Vec2> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return bounding_box(width, height);
        }
        let points = match self {
            Self::BoundingBox => return bounding_box(width, height),
            Self::Simple => simple::calculate(image),
            Self::Detailed { detail } => detailed::calculate(image, *detail),
        };
        points.unwrap_or_else(|| bounding_box(width, height))
    }

    /// Convert any decoded image to RGBA8 before tracing so the alpha channel
    /// is always the fourth byte.
    pub fn calculate_dynamic(&self, image: &DynamicImage) -> Vec<Vec2> {
        match image {
            DynamicImage::ImageRgba8(rgba) => self.calculate(rgba),
            other => self.calculate(&other.to_rgba8()),
        }
    }
}

/// Four corners of a `width × height` image, counter-clockwise from bottom-left.
pub fn bounding_box(width: u32, height: u32) -> Vec<Vec2> {
    let hw = width as f32 * 0.5;
    let hh = height as f32 * 0.5;
    vec![
        Vec2::new(-hw, -hh),
        Vec2::new(hw, -hh),
        Vec2::new(hw, hh),
        Vec2::new(-hw, hh),
    ]
}

pub(crate) fn is_opaque(image: &RgbaImage, x: i64, y: i64) -> bool {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return false;
    }
    image.get_pixel(x as u32, y as u32)[3] != 0
}

/// Map a pixel-corner coordinate (y down, origin top-left) to centred y-up space.
pub(crate) fn to_local(x: f32, y: f32, width: u32, height: u32) -> Vec2 {
    Vec2::new(x - width as f32 * 0.5, height as f32 * 0.5 - y)
}

/// Corner rectangle `[left, right) × [top, bottom)` in pixel-corner space as a
/// centred polygon.
pub(crate) fn rect_outline(
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    width: u32,
    height: u32,
) -> Option<Vec<Vec2>> {
    finish(vec![
        to_local(left as f32, top as f32, width, height),
        to_local(right as f32, top as f32, width, height),
        to_local(right as f32, bottom as f32, width, height),
        to_local(left as f32, bottom as f32, width, height),
    ])
}

/// Drop repeated points (including a closing duplicate) and force
/// counter-clockwise winding. Returns `None` when fewer than three distinct
/// points remain.
pub(crate) fn finish(mut points: Vec<Vec2>) -> Option<Vec<Vec2>> {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return None;
    }
    if signed_area(&points) < 0.0 {
        points.reverse();
    }
    Some(points)
}

/// Tight bounding rectangle of opaque pixels as `(left, top, right_excl, bottom_excl)`.
pub(crate) fn opaque_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, px) in image.enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x + 1, y + 1),
            Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(x + 1), b.max(y + 1)),
        });
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{is_point_in_polygon, signed_area};
    use image::Rgba;

    fn blank(w: u32, h: u32) -> RgbaImage {
        RgbaImage::new(w, h)
    }

    fn filled(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    fn disc(size: u32) -> RgbaImage {
        let mut img = blank(size, size);
        let r = size as f32 * 0.5;
        for (x, y, px) in img.enumerate_pixels_mut() {
            let dx = x as f32 + 0.5 - r;
            let dy = y as f32 + 0.5 - r;
            if dx * dx + dy * dy <= r * r {
                *px = Rgba([200, 10, 10, 255]);
            }
        }
        img
    }

    const ALL: [HitBoxAlgorithm; 3] = [
        HitBoxAlgorithm::BoundingBox,
        HitBoxAlgorithm::Simple,
        HitBoxAlgorithm::Detailed { detail: DEFAULT_DETAIL },
    ];

    #[test]
    fn bounding_box_is_centred_and_ccw() {
        let pts = HitBoxAlgorithm::BoundingBox.calculate(&blank(8, 4));
        assert_eq!(pts.len(), 4);
        assert!(pts.contains(&Vec2::new(-4.0, -2.0)));
        assert!(pts.contains(&Vec2::new(4.0, 2.0)));
        assert!(signed_area(&pts) > 0.0);
    }

    #[test]
    fn transparent_image_falls_back_to_bounding_box() {
        for algo in ALL {
            let pts = algo.calculate(&blank(10, 6));
            assert_eq!(pts, bounding_box(10, 6), "{algo:?}");
        }
    }

    #[test]
    fn every_algorithm_returns_ccw_polygon_with_three_or_more_points() {
        for img in [filled(16, 16), disc(32), filled(1, 1)] {
            for algo in ALL {
                let pts = algo.calculate(&img);
                assert!(pts.len() >= 3, "{algo:?} produced {} points", pts.len());
                assert!(signed_area(&pts) > 0.0, "{algo:?} winding");
            }
        }
    }

    #[test]
    fn opaque_square_matches_bounding_box_for_every_algorithm() {
        let img = filled(12, 12);
        for algo in ALL {
            let pts = algo.calculate(&img);
            let area = signed_area(&pts);
            assert!((area - 144.0).abs() < 1e-3, "{algo:?} area {area}");
        }
    }

    #[test]
    fn y_axis_points_up() {
        // Opaque only in the top half of the image: the hit box must sit at y > 0.
        let mut img = blank(10, 10);
        for y in 0..5 {
            for x in 0..10 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        for algo in [HitBoxAlgorithm::Simple, HitBoxAlgorithm::detailed()] {
            let pts = algo.calculate(&img);
            assert!(pts.iter().all(|p| p.y >= 0.0), "{algo:?}: {pts:?}");
            assert!(pts.iter().any(|p| p.y == 5.0));
        }
    }

    #[test]
    fn disc_outline_contains_centre_but_not_corners() {
        let img = disc(32);
        for algo in [HitBoxAlgorithm::Simple, HitBoxAlgorithm::Detailed { detail: 1.0 }] {
            let pts = algo.calculate(&img);
            assert!(is_point_in_polygon(Vec2::ZERO, &pts), "{algo:?}");
            assert!(!is_point_in_polygon(Vec2::new(15.5, 15.5), &pts), "{algo:?}");
        }
    }

    #[test]
    fn detail_trades_points_for_fidelity() {
        let img = disc(64);
        let fine = HitBoxAlgorithm::Detailed { detail: 0.5 }.calculate(&img);
        let coarse = HitBoxAlgorithm::Detailed { detail: 8.0 }.calculate(&img);
        assert!(fine.len() > coarse.len(), "fine={} coarse={}", fine.len(), coarse.len());
        assert!(coarse.len() >= 3);
    }

    #[test]
    fn calculate_dynamic_converts_to_rgba() {
        let gray = DynamicImage::ImageLumaA8(image::GrayAlphaImage::from_pixel(4, 4, image::LumaA([10, 255])));
        let pts = HitBoxAlgorithm::Simple.calculate_dynamic(&gray);
        assert!((signed_area(&pts) - 16.0).abs() < 1e-4);
    }

    #[test]
    fn algorithm_deserializes_from_tagged_json() {
        let algo: HitBoxAlgorithm = serde_json::from_str(r#"{"kind":"detailed","detail":2.0}"#).unwrap();
        assert_eq!(algo, HitBoxAlgorithm::Detailed { detail: 2.0 });
        let algo: HitBoxAlgorithm = serde_json::from_str(r#"{"kind":"detailed"}"#).unwrap();
        assert_eq!(algo, HitBoxAlgorithm::detailed());
        let algo: HitBoxAlgorithm = serde_json::from_str(r#"{"kind":"bounding_box"}"#).unwrap();
        assert_eq!(algo, HitBoxAlgorithm::BoundingBox);
    }

    #[test]
    fn cache_names_are_distinct() {
        let names: Vec<String> = ALL.iter().map(|a| a.cache_name()).collect();
        assert_eq!(names[0], "bounding_box");
        assert_eq!(names[1], "simple");
        assert!(names[2].starts_with("detailed"));
    }
}
