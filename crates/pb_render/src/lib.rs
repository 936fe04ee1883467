pub mod atlas;
pub mod camera;
pub mod config;
pub mod context;
pub mod headless;
pub mod instance;
pub mod sprite_pipeline;
pub mod wgpu_context;

pub use atlas::{AtlasError, AtlasRegion, TexCoords, TextureAtlas};
pub use camera::Camera2D;
pub use config::{load_atlas_config_from_path, AtlasConfig, ConfigError};
pub use context::{RenderContext, SpriteBatch, Viewport};
pub use headless::{DrawRecord, HeadlessContext, HeadlessStats, HeadlessTarget};
pub use instance::SpriteInstance;
pub use sprite_pipeline::SpritePipeline;
pub use wgpu_context::{GpuInitError, WgpuContext, WgpuTarget};
