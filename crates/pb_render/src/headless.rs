//! CPU-only `RenderContext`.
//!
//! Surfaces are plain RGBA images and instance buffers are vectors, so atlas
//! contents and uploaded instance ranges can be inspected directly. The
//! context counts every write and draw, which is how the dirty-range logic is
//! observed in tests. The atlas packer also runs on top of it.

use std::cell::{Cell, RefCell};

use image::RgbaImage;
use pb_core::FilterMode;

use crate::context::{RenderContext, SpriteBatch, Viewport};
use crate::instance::SpriteInstance;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessStats {
    pub surfaces_created: usize,
    pub surface_writes: usize,
    pub buffers_created: usize,
    pub buffer_writes: usize,
    pub instances_written: usize,
    pub draw_calls: usize,
}

#[derive(Debug)]
pub struct HeadlessSurface {
    label: String,
    image: RefCell<RgbaImage>,
}

impl HeadlessSurface {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.borrow().dimensions()
    }

    pub fn snapshot(&self) -> RgbaImage {
        self.image.borrow().clone()
    }
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    label: String,
    instances: RefCell<Vec<SpriteInstance>>,
}

impl HeadlessBuffer {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn snapshot(&self) -> Vec<SpriteInstance> {
        self.instances.borrow().clone()
    }
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub instances: Vec<SpriteInstance>,
    pub tint: [f32; 4],
    pub filter: FilterMode,
}

#[derive(Debug, Default)]
pub struct HeadlessTarget {
    pub draws: Vec<DrawRecord>,
}

impl HeadlessTarget {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
pub struct HeadlessContext {
    stats: Cell<HeadlessStats>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats.get()
    }

    pub fn reset_stats(&self) {
        self.stats.set(HeadlessStats::default());
    }

    fn bump(&self, f: impl FnOnce(&mut HeadlessStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl RenderContext for HeadlessContext {
    type Surface = HeadlessSurface;
    type Buffer = HeadlessBuffer;
    type Target = HeadlessTarget;

    fn create_surface(&self, width: u32, height: u32, label: &str) -> HeadlessSurface {
        self.bump(|s| s.surfaces_created += 1);
        HeadlessSurface {
            label: label.to_string(),
            image: RefCell::new(RgbaImage::new(width, height)),
        }
    }

    fn write_surface(&self, surface: &HeadlessSurface, rgba: &[u8], viewport: Viewport) {
        self.bump(|s| s.surface_writes += 1);
        let mut image = surface.image.borrow_mut();
        let (width, height) = image.dimensions();
        let row_bytes = viewport.width as usize * 4;
        if rgba.len() < row_bytes * viewport.height as usize {
            log::warn!(
                "surface '{}': {} bytes is short for a {}x{} write",
                surface.label,
                rgba.len(),
                viewport.width,
                viewport.height
            );
            return;
        }
        for row in 0..viewport.height {
            let y = viewport.y + row;
            if y >= height {
                break;
            }
            let src = &rgba[row as usize * row_bytes..(row as usize + 1) * row_bytes];
            for col in 0..viewport.width {
                let x = viewport.x + col;
                if x >= width {
                    break;
                }
                let px = &src[col as usize * 4..col as usize * 4 + 4];
                image.put_pixel(x, y, image::Rgba([px[0], px[1], px[2], px[3]]));
            }
        }
    }

    fn create_instance_buffer(&self, capacity: usize, label: &str) -> HeadlessBuffer {
        self.bump(|s| s.buffers_created += 1);
        HeadlessBuffer {
            label: label.to_string(),
            instances: RefCell::new(vec![SpriteInstance::default(); capacity]),
        }
    }

    fn write_instances(&self, buffer: &HeadlessBuffer, first: usize, instances: &[SpriteInstance]) {
        self.bump(|s| {
            s.buffer_writes += 1;
            s.instances_written += instances.len();
        });
        let mut stored = buffer.instances.borrow_mut();
        let end = (first + instances.len()).min(stored.len());
        if first < end {
            stored[first..end].copy_from_slice(&instances[..end - first]);
        }
    }

    fn draw_instanced(&self, target: &mut HeadlessTarget, batch: SpriteBatch<'_, Self>) {
        self.bump(|s| s.draw_calls += 1);
        let stored = batch.instances.instances.borrow();
        let count = (batch.count as usize).min(stored.len());
        target.draws.push(DrawRecord {
            instances: stored[..count].to_vec(),
            tint: batch.tint,
            filter: batch.filter,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_writes_land_in_viewport() {
        let ctx = HeadlessContext::new();
        let surface = ctx.create_surface(4, 4, "test");
        let block = [255u8, 0, 0, 255].repeat(4);
        ctx.write_surface(&surface, &block, Viewport::new(1, 2, 2, 2));

        let img = surface.snapshot();
        assert_eq!(img.get_pixel(1, 2)[0], 255);
        assert_eq!(img.get_pixel(2, 3)[3], 255);
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(ctx.stats().surface_writes, 1);
    }

    #[test]
    fn instance_writes_are_counted_and_clamped() {
        let ctx = HeadlessContext::new();
        let buffer = ctx.create_instance_buffer(2, "instances");
        let inst = SpriteInstance {
            angle: 1.0,
            ..Default::default()
        };
        ctx.write_instances(&buffer, 1, &[inst, inst]);
        assert_eq!(buffer.snapshot()[1].angle, 1.0);
        assert_eq!(buffer.capacity(), 2);

        let stats = ctx.stats();
        assert_eq!(stats.buffer_writes, 1);
        assert_eq!(stats.instances_written, 2);
    }

    #[test]
    fn draw_records_the_live_prefix() {
        let ctx = HeadlessContext::new();
        let surface = ctx.create_surface(1, 1, "atlas");
        let buffer = ctx.create_instance_buffer(8, "instances");
        let mut target = HeadlessTarget::new();
        ctx.draw_instanced(
            &mut target,
            SpriteBatch {
                surface: &surface,
                instances: &buffer,
                count: 3,
                tint: [1.0, 1.0, 1.0, 0.5],
                filter: FilterMode::Nearest,
            },
        );
        assert_eq!(target.draws.len(), 1);
        assert_eq!(target.draws[0].instances.len(), 3);
        assert_eq!(target.draws[0].tint[3], 0.5);
        assert_eq!(ctx.stats().draw_calls, 1);
    }
}
