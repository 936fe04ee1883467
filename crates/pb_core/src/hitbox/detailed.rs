//! Outline tracing for [`HitBoxAlgorithm::Detailed`](super::HitBoxAlgorithm).
//!
//! 1. Label 4-connected opaque regions and keep the largest one.
//! 2. Walk its outer boundary with marching squares on the pixel-corner grid,
//!    emitting a vertex wherever the walk changes direction.
//! 3. Simplify the closed ring with Ramer–Douglas–Peucker at `detail` pixels.
//!
//! Holes are ignored; only the outer boundary contributes to the hit box.

use std::collections::VecDeque;

use glam::Vec2;
use image::RgbaImage;

use super::{finish, rect_outline, to_local};
use crate::geometry::simplify_closed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Up,
    Down,
    Left,
    Right,
}

impl Step {
    fn delta(self) -> (i64, i64) {
        match self {
            Step::Up => (0, -1),
            Step::Down => (0, 1),
            Step::Left => (-1, 0),
            Step::Right => (1, 0),
        }
    }
}

/// Single opaque region as a dense mask plus its pixel bounds.
struct Region {
    mask: Vec<bool>,
    width: u32,
    height: u32,
    start: (u32, u32),
    bounds: (u32, u32, u32, u32),
}

impl Region {
    fn filled(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.mask[(y as u32 * self.width + x as u32) as usize]
    }
}

/// Largest 4-connected region of non-zero alpha; ties keep the first region in
/// row-major order.
fn largest_region(image: &RgbaImage) -> Option<Region> {
    let (width, height) = image.dimensions();
    let idx = |x: u32, y: u32| (y * width + x) as usize;
    let mut label = vec![0u32; (width * height) as usize];
    let mut next_label = 0u32;
    let mut best: Option<(u32, usize, (u32, u32), (u32, u32, u32, u32))> = None;
    let mut queue = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            if image.get_pixel(x, y)[3] == 0 || label[idx(x, y)] != 0 {
                continue;
            }
            next_label += 1;
            label[idx(x, y)] = next_label;
            queue.push_back((x, y));
            let mut count = 0usize;
            let mut bounds = (x, y, x + 1, y + 1);

            while let Some((cx, cy)) = queue.pop_front() {
                count += 1;
                bounds = (
                    bounds.0.min(cx),
                    bounds.1.min(cy),
                    bounds.2.max(cx + 1),
                    bounds.3.max(cy + 1),
                );
                let neighbours = [
                    (cx.wrapping_sub(1), cy),
                    (cx + 1, cy),
                    (cx, cy.wrapping_sub(1)),
                    (cx, cy + 1),
                ];
                for (nx, ny) in neighbours {
                    if nx >= width || ny >= height {
                        continue;
                    }
                    if image.get_pixel(nx, ny)[3] != 0 && label[idx(nx, ny)] == 0 {
                        label[idx(nx, ny)] = next_label;
                        queue.push_back((nx, ny));
                    }
                }
            }

            if best.map_or(true, |(_, best_count, _, _)| count > best_count) {
                best = Some((next_label, count, (x, y), bounds));
            }
        }
    }

    let (keep, _, start, bounds) = best?;
    Some(Region {
        mask: label.iter().map(|&l| l == keep).collect(),
        width,
        height,
        start,
        bounds,
    })
}

/// Marching-squares direction for the 2×2 neighbourhood around a pixel corner.
/// Saddle cases use the previous step so the walk stays on one region.
fn next_step(region: &Region, x: i64, y: i64, prev: Option<Step>) -> Option<Step> {
    let mut state = 0u8;
    if region.filled(x - 1, y - 1) {
        state |= 1;
    }
    if region.filled(x, y - 1) {
        state |= 2;
    }
    if region.filled(x - 1, y) {
        state |= 4;
    }
    if region.filled(x, y) {
        state |= 8;
    }
    let step = match state {
        1 | 5 | 13 => Step::Up,
        8 | 10 | 11 => Step::Down,
        4 | 12 | 14 => Step::Left,
        2 | 3 | 7 => Step::Right,
        6 => {
            if prev == Some(Step::Up) {
                Step::Left
            } else {
                Step::Right
            }
        }
        9 => {
            if prev == Some(Step::Right) {
                Step::Up
            } else {
                Step::Down
            }
        }
        _ => return None,
    };
    Some(step)
}

fn trace(region: &Region) -> Option<Vec<(i64, i64)>> {
    let start = (region.start.0 as i64, region.start.1 as i64);
    let max_steps = 4 * (region.width as usize + 1) * (region.height as usize + 1);
    let mut corners = Vec::new();
    let mut pos = start;
    let mut prev = None;

    for _ in 0..max_steps {
        let step = next_step(region, pos.0, pos.1, prev)?;
        if prev != Some(step) {
            corners.push(pos);
        }
        let (dx, dy) = step.delta();
        pos = (pos.0 + dx, pos.1 + dy);
        prev = Some(step);
        if pos == start {
            return Some(corners);
        }
    }
    log::debug!("hit box trace did not close after {max_steps} steps");
    None
}

pub(super) fn calculate(image: &RgbaImage, detail: f32) -> Option<Vec<Vec2>> {
    let (width, height) = image.dimensions();
    let region = largest_region(image)?;
    let (left, top, right, bottom) = region.bounds;

    let traced = trace(&region).map(|corners| {
        let ring: Vec<Vec2> = corners
            .iter()
            .map(|&(x, y)| to_local(x as f32, y as f32, width, height))
            .collect();
        simplify_closed(&ring, detail)
    });

    traced
        .and_then(finish)
        .or_else(|| rect_outline(left, top, right, bottom, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::signed_area;
    use image::Rgba;

    fn put_block(img: &mut RgbaImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Rgba([9, 9, 9, 255]));
            }
        }
    }

    #[test]
    fn single_pixel_traces_unit_square() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 1]));
        let region = largest_region(&img).unwrap();
        let corners = trace(&region).unwrap();
        assert_eq!(corners, vec![(0, 0), (0, 1), (1, 1), (1, 0)]);
    }

    #[test]
    fn l_shape_keeps_concave_corner() {
        let mut img = RgbaImage::new(10, 10);
        put_block(&mut img, 0, 0, 10, 5);
        put_block(&mut img, 0, 5, 5, 5);
        let pts = calculate(&img, 0.5).unwrap();
        assert_eq!(pts.len(), 6, "{pts:?}");
        assert!((signed_area(&pts) - 75.0).abs() < 1e-3);
        // Concave corner at pixel corner (5, 5) -> local (0, 0).
        assert!(pts.contains(&Vec2::new(0.0, 0.0)));
    }

    #[test]
    fn largest_region_wins() {
        let mut img = RgbaImage::new(20, 10);
        put_block(&mut img, 0, 0, 2, 2);
        put_block(&mut img, 10, 2, 6, 6);
        let pts = calculate(&img, 0.5).unwrap();
        assert!((signed_area(&pts) - 36.0).abs() < 1e-3);
        assert!(pts.iter().all(|p| p.x >= 0.0));
    }

    #[test]
    fn diagonal_neighbours_are_separate_regions() {
        let mut img = RgbaImage::new(4, 4);
        put_block(&mut img, 0, 0, 2, 2);
        put_block(&mut img, 2, 2, 1, 1);
        let region = largest_region(&img).unwrap();
        assert_eq!(region.bounds, (0, 0, 2, 2));
    }

    #[test]
    fn ring_ignores_hole() {
        let mut img = RgbaImage::new(9, 9);
        put_block(&mut img, 0, 0, 9, 9);
        for y in 3..6 {
            for x in 3..6 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
        let pts = calculate(&img, 0.5).unwrap();
        assert_eq!(pts.len(), 4);
        assert!((signed_area(&pts) - 81.0).abs() < 1e-3);
    }

    #[test]
    fn heavy_simplification_falls_back_to_region_bounds() {
        let mut img = RgbaImage::new(8, 8);
        put_block(&mut img, 2, 2, 3, 3);
        let pts = calculate(&img, 100.0).unwrap();
        assert!((signed_area(&pts) - 9.0).abs() < 1e-3);
    }
}
