//! Sprites, sprite lists and collision queries on top of a shared texture atlas.

pub mod collision;
pub mod error;
pub mod sprite;
pub mod sprite_list;

pub use collision::{
    check_for_collision, check_for_collision_with_list, check_for_collision_with_lists, get_closest_sprite,
    get_distance_between_sprites, get_sprites_at_point, get_sprites_in_rect,
};
pub use error::SpriteListError;
pub use sprite::Sprite;
pub use sprite_list::{SpriteHandle, SpriteList, SpriteListOptions, SyncReport};
