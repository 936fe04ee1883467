use pb_render::AtlasError;

use crate::sprite_list::SpriteHandle;

#[derive(Debug, thiserror::Error)]
pub enum SpriteListError {
    #[error("sprite handle {0:?} no longer refers to a live sprite")]
    StaleHandle(SpriteHandle),
    #[error("sprite handle {handle:?} belongs to another list (this list is {list})")]
    ForeignHandle { handle: SpriteHandle, list: u64 },
    #[error("index {index} out of bounds for sprite list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error(transparent)]
    Atlas(#[from] AtlasError),
}
