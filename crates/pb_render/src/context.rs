//! The seam between atlas/sprite bookkeeping and an actual graphics backend.
//!
//! Atlases and sprite lists only ever talk to a `RenderContext`: they create
//! one RGBA surface per atlas, one instance buffer per sprite list, write
//! sub-rectangles and instance ranges, and issue one instanced draw per list.

use pb_core::FilterMode;

use crate::instance::SpriteInstance;

/// Pixel rectangle inside a surface, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// Everything a backend needs to draw one sprite list in a single call.
pub struct SpriteBatch<'a, C: RenderContext + ?Sized> {
    pub surface: &'a C::Surface,
    pub instances: &'a C::Buffer,
    pub count: u32,
    /// List-level colour multiplied into every instance colour.
    pub tint: [f32; 4],
    pub filter: FilterMode,
}

pub trait RenderContext {
    type Surface;
    type Buffer;
    type Target;

    /// Create a transparent RGBA8 surface.
    fn create_surface(&self, width: u32, height: u32, label: &str) -> Self::Surface;

    /// Overwrite `viewport` with tightly packed RGBA8 rows (top row first).
    fn write_surface(&self, surface: &Self::Surface, rgba: &[u8], viewport: Viewport);

    fn create_instance_buffer(&self, capacity: usize, label: &str) -> Self::Buffer;

    /// Write `instances` starting at slot `first`. The caller keeps writes in bounds.
    fn write_instances(&self, buffer: &Self::Buffer, first: usize, instances: &[SpriteInstance]);

    fn draw_instanced(&self, target: &mut Self::Target, batch: SpriteBatch<'_, Self>);
}
