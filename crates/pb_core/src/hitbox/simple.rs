use glam::Vec2;
use image::RgbaImage;

use super::{finish, is_opaque, opaque_bounds, to_local};

/// Count how many fully transparent anti-diagonals sit in one corner of the
/// opaque bounding box. `(start_x, start_y)` is the corner pixel and
/// `(dir_x, dir_y)` points into the box.
fn corner_offset(image: &RgbaImage, start_x: i64, start_y: i64, dir_x: i64, dir_y: i64, limit: i64) -> i64 {
    let mut offset = 0;
    while offset < limit {
        let blocked = (0..=offset).any(|i| is_opaque(image, start_x + i * dir_x, start_y + (offset - i) * dir_y));
        if blocked {
            break;
        }
        offset += 1;
    }
    offset
}

pub(super) fn calculate(image: &RgbaImage) -> Option<Vec<Vec2>> {
    let (width, height) = image.dimensions();
    let (left, top, right, bottom) = opaque_bounds(image)?;
    let limit = (right - left).min(bottom - top) as i64;

    let (l, t) = (left as i64, top as i64);
    let (r_px, b_px) = (right as i64 - 1, bottom as i64 - 1);

    let top_left = corner_offset(image, l, t, 1, 1, limit) as f32;
    let top_right = corner_offset(image, r_px, t, -1, 1, limit) as f32;
    let bottom_left = corner_offset(image, l, b_px, 1, -1, limit) as f32;
    let bottom_right = corner_offset(image, r_px, b_px, -1, -1, limit) as f32;

    let (l, t, r, b) = (left as f32, top as f32, right as f32, bottom as f32);
    let corners = [
        (l + top_left, t),
        (r - top_right, t),
        (r, t + top_right),
        (r, b - bottom_right),
        (r - bottom_right, b),
        (l + bottom_left, b),
        (l, b - bottom_left),
        (l, t + top_left),
    ];

    finish(
        corners
            .iter()
            .map(|&(x, y)| to_local(x, y, width, height))
            .collect(),
    )
}
