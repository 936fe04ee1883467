//! Collision and proximity queries between sprites and sprite lists.
//!
//! Two sprites collide when their world-space hit boxes overlap with positive
//! area: touching edges or corners do not count. Queries against a list use
//! the list's spatial hash for candidates when it has one, and always return
//! handles in draw order.

use glam::Vec2;
use pb_core::geometry::{are_polygons_intersecting, is_point_in_polygon};
use pb_core::Aabb;
use pb_render::RenderContext;

use crate::sprite::Sprite;
use crate::sprite_list::{SpriteHandle, SpriteList};

pub fn check_for_collision(a: &Sprite, b: &Sprite) -> bool {
    if !a.aabb().overlaps(&b.aabb()) {
        return false;
    }
    are_polygons_intersecting(a.hit_box(), b.hit_box())
}

/// Handles of sprites in `list` colliding with `sprite`. If `sprite` is itself
/// in the list, its own handle is included; see `SpriteList::collisions_of`.
pub fn check_for_collision_with_list<C: RenderContext>(sprite: &Sprite, list: &SpriteList<C>) -> Vec<SpriteHandle> {
    let bounds = sprite.aabb();
    list.candidate_slots(&bounds)
        .into_iter()
        .map(|slot| list.record_at(slot))
        .filter(|(_, other)| check_for_collision(sprite, other))
        .map(|(handle, _)| handle)
        .collect()
}

pub fn check_for_collision_with_lists<C: RenderContext>(sprite: &Sprite, lists: &[&SpriteList<C>]) -> Vec<SpriteHandle> {
    lists
        .iter()
        .flat_map(|list| check_for_collision_with_list(sprite, list))
        .collect()
}

pub fn get_sprites_at_point<C: RenderContext>(point: Vec2, list: &SpriteList<C>) -> Vec<SpriteHandle> {
    list.candidate_slots_at(point)
        .into_iter()
        .map(|slot| list.record_at(slot))
        .filter(|(_, sprite)| sprite.aabb().contains_point(point) && is_point_in_polygon(point, sprite.hit_box()))
        .map(|(handle, _)| handle)
        .collect()
}

/// Sprites whose hit boxes overlap `rect` with positive area.
pub fn get_sprites_in_rect<C: RenderContext>(rect: &Aabb, list: &SpriteList<C>) -> Vec<SpriteHandle> {
    let outline = [
        rect.min,
        Vec2::new(rect.max.x, rect.min.y),
        rect.max,
        Vec2::new(rect.min.x, rect.max.y),
    ];
    list.candidate_slots(rect)
        .into_iter()
        .map(|slot| list.record_at(slot))
        .filter(|(_, sprite)| sprite.aabb().overlaps(rect) && are_polygons_intersecting(&outline, sprite.hit_box()))
        .map(|(handle, _)| handle)
        .collect()
}

/// Distance between sprite centres.
pub fn get_distance_between_sprites(a: &Sprite, b: &Sprite) -> f32 {
    a.position().distance(b.position())
}

/// Nearest sprite in `list` by centre distance; ties go to the earliest in
/// draw order.
pub fn get_closest_sprite<C: RenderContext>(sprite: &Sprite, list: &SpriteList<C>) -> Option<(SpriteHandle, f32)> {
    let mut closest: Option<(SpriteHandle, f32)> = None;
    for (handle, other) in list.iter() {
        let distance = get_distance_between_sprites(sprite, other);
        if closest.map_or(true, |(_, best)| distance < best) {
            closest = Some((handle, distance));
        }
    }
    closest
}
