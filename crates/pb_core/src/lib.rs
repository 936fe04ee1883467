pub mod allocator;
pub mod color;
pub mod geometry;
pub mod hitbox;
pub mod spatial_hash;
pub mod texture;

pub use allocator::{AllocError, Allocator};
pub use color::Color;
pub use geometry::Aabb;
pub use hitbox::HitBoxAlgorithm;
pub use spatial_hash::SpatialHash;
pub use texture::{FilterMode, Texture, TextureCache, TextureError, TextureOptions, WrapMode};
