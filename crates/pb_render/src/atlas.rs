//! Texture atlas: many textures packed into one surface so a sprite list can
//! draw with a single bound texture.
//!
//! Each resident texture occupies a padded block of `width + 2*border` by
//! `height + 2*border` pixels. The border repeats the texture's edge pixels so
//! linear filtering never bleeds a neighbour into view. The atlas keeps a CPU
//! mirror of the surface, which backs `to_image` and `save`.
//!
//! Any operation that moves existing regions (growth, `rebuild`, `resize`,
//! `clear`, replacing the texture set) bumps the layout generation. Regions
//! captured before that point are stale and `texture_coordinates` rejects them.
//! Layout changes are planned in a fresh allocator first and only committed
//! when every texture fits, so a failed operation leaves the atlas as it was.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use pb_core::{AllocError, Allocator, Texture};

use crate::config::{AtlasConfig, ConfigError};
use crate::context::{RenderContext, Viewport};

static NEXT_ATLAS_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error("texture '{name}' ({width}x{height}) does not fit in atlas {atlas_width}x{atlas_height}")]
    AllocationExhausted {
        name: String,
        width: u32,
        height: u32,
        atlas_width: u32,
        atlas_height: u32,
    },
    #[error("{count} textures do not fit in atlas {width}x{height}")]
    LayoutExhausted { count: usize, width: u32, height: u32 },
    #[error("region '{name}' is from layout generation {region_generation}, atlas is at {current_generation}")]
    StaleRegion {
        name: String,
        region_generation: u64,
        current_generation: u64,
    },
    #[error("region '{name}' belongs to atlas {region_atlas}, not atlas {atlas}")]
    ForeignRegion {
        name: String,
        region_atlas: u64,
        atlas: u64,
    },
    #[error("texture '{0}' is not resident in the atlas")]
    NotResident(String),
    #[error("invalid atlas size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to save atlas image: {0}")]
    Save(#[from] image::ImageError),
}

/// Normalized texture coordinates: origin and extent of a region, v pointing
/// down the image rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoords {
    pub u0: f32,
    pub v0: f32,
    pub du: f32,
    pub dv: f32,
}

impl TexCoords {
    pub fn u1(&self) -> f32 {
        self.u0 + self.du
    }

    pub fn v1(&self) -> f32 {
        self.v0 + self.dv
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.u0, self.v0, self.du, self.dv]
    }
}

/// Where a texture's pixels live inside an atlas, excluding the border.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasRegion {
    pub atlas_id: u64,
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub coords: TexCoords,
    pub generation: u64,
}

struct Resident {
    texture: Arc<Texture>,
    region: AtlasRegion,
}

/// Allocate a padded block. A zero-area block takes no space and sits at the
/// origin as a degenerate region.
fn place(allocator: &mut Allocator, width: u32, height: u32) -> Result<(u32, u32), AllocError> {
    if width == 0 || height == 0 {
        return Ok((0, 0));
    }
    allocator.alloc(width, height)
}

/// Copy of `image` with `border` pixels of edge extrusion on every side.
fn extrude(image: &RgbaImage, border: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if border == 0 {
        return image.clone();
    }
    let (padded_w, padded_h) = (width + 2 * border, height + 2 * border);
    if width == 0 || height == 0 {
        return RgbaImage::new(padded_w, padded_h);
    }
    RgbaImage::from_fn(padded_w, padded_h, |x, y| {
        let sx = x.saturating_sub(border).min(width - 1);
        let sy = y.saturating_sub(border).min(height - 1);
        *image.get_pixel(sx, sy)
    })
}

pub struct TextureAtlas<C: RenderContext> {
    id: u64,
    context: Rc<C>,
    surface: C::Surface,
    image: RgbaImage,
    allocator: Allocator,
    config: AtlasConfig,
    residents: Vec<Resident>,
    index: HashMap<String, usize>,
    generation: u64,
}

impl<C: RenderContext> TextureAtlas<C> {
    pub fn new(context: Rc<C>, config: AtlasConfig) -> Result<Self, AtlasError> {
        config.validate()?;
        let id = NEXT_ATLAS_ID.fetch_add(1, Ordering::Relaxed);
        let surface = context.create_surface(config.width, config.height, &format!("pb atlas {id}"));
        Ok(Self {
            id,
            context,
            surface,
            image: RgbaImage::new(config.width, config.height),
            allocator: Allocator::new(config.width, config.height),
            config,
            residents: Vec::new(),
            index: HashMap::new(),
            generation: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn width(&self) -> u32 {
        self.allocator.width()
    }

    pub fn height(&self) -> u32 {
        self.allocator.height()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn border(&self) -> u32 {
        self.config.border
    }

    pub fn auto_resize(&self) -> bool {
        self.config.auto_resize
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn context(&self) -> &Rc<C> {
        &self.context
    }

    pub fn surface(&self) -> &C::Surface {
        &self.surface
    }

    pub fn len(&self) -> usize {
        self.residents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residents.is_empty()
    }

    /// Allocated fraction of the surface, borders included.
    pub fn occupancy(&self) -> f32 {
        self.allocator.occupancy()
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn region(&self, name: &str) -> Option<&AtlasRegion> {
        self.index.get(name).map(|&i| &self.residents[i].region)
    }

    pub fn texture(&self, name: &str) -> Option<&Arc<Texture>> {
        self.index.get(name).map(|&i| &self.residents[i].texture)
    }

    /// Resident textures in insertion order.
    pub fn textures(&self) -> impl Iterator<Item = &Arc<Texture>> + '_ {
        self.residents.iter().map(|r| &r.texture)
    }

    pub fn regions(&self) -> impl Iterator<Item = &AtlasRegion> + '_ {
        self.residents.iter().map(|r| &r.region)
    }

    /// Current coordinates for a resident texture.
    pub fn coordinates(&self, name: &str) -> Result<TexCoords, AtlasError> {
        self.region(name)
            .map(|r| r.coords)
            .ok_or_else(|| AtlasError::NotResident(name.to_string()))
    }

    /// Coordinates for a previously returned region, rejecting regions from
    /// another atlas or from an older layout generation.
    pub fn texture_coordinates(&self, region: &AtlasRegion) -> Result<TexCoords, AtlasError> {
        if region.atlas_id != self.id {
            return Err(AtlasError::ForeignRegion {
                name: region.name.clone(),
                region_atlas: region.atlas_id,
                atlas: self.id,
            });
        }
        if region.generation != self.generation {
            return Err(AtlasError::StaleRegion {
                name: region.name.clone(),
                region_generation: region.generation,
                current_generation: self.generation,
            });
        }
        self.coordinates(&region.name)
    }

    fn padded_size(&self, texture: &Texture) -> (u32, u32) {
        let border = self.config.border.saturating_mul(2);
        (
            texture.width().saturating_add(border),
            texture.height().saturating_add(border),
        )
    }

    fn region_at(&self, texture: &Texture, x: u32, y: u32) -> AtlasRegion {
        let border = self.config.border;
        let (atlas_w, atlas_h) = (self.width() as f32, self.height() as f32);
        let (ix, iy) = (x + border, y + border);
        AtlasRegion {
            atlas_id: self.id,
            name: texture.cache_key().to_string(),
            x: ix,
            y: iy,
            width: texture.width(),
            height: texture.height(),
            coords: TexCoords {
                u0: ix as f32 / atlas_w,
                v0: iy as f32 / atlas_h,
                du: texture.width() as f32 / atlas_w,
                dv: texture.height() as f32 / atlas_h,
            },
            generation: self.generation,
        }
    }

    fn exhausted(&self, texture: &Texture) -> AtlasError {
        AtlasError::AllocationExhausted {
            name: texture.cache_key().to_string(),
            width: texture.width(),
            height: texture.height(),
            atlas_width: self.width(),
            atlas_height: self.height(),
        }
    }

    /// Place `texture` and return its region. Adding a resident texture is a
    /// no-op that returns the existing region.
    pub fn add(&mut self, texture: &Arc<Texture>) -> Result<AtlasRegion, AtlasError> {
        if let Some(region) = self.region(texture.cache_key()) {
            return Ok(region.clone());
        }

        let (padded_w, padded_h) = self.padded_size(texture);
        match place(&mut self.allocator, padded_w, padded_h) {
            Ok((x, y)) => {
                if padded_w > 0 && padded_h > 0 {
                    let block = extrude(texture.image(), self.config.border);
                    image::imageops::replace(&mut self.image, &block, x as i64, y as i64);
                    self.context
                        .write_surface(&self.surface, block.as_raw(), Viewport::new(x, y, padded_w, padded_h));
                }
                let region = self.region_at(texture, x, y);
                self.index.insert(region.name.clone(), self.residents.len());
                self.residents.push(Resident {
                    texture: texture.clone(),
                    region: region.clone(),
                });
                Ok(region)
            }
            Err(_) if self.config.auto_resize => self.grow_for(texture),
            Err(_) => Err(self.exhausted(texture)),
        }
    }

    fn grow_for(&mut self, texture: &Arc<Texture>) -> Result<AtlasRegion, AtlasError> {
        let Some((width, height)) = self.next_size(self.width(), self.height()) else {
            return Err(self.exhausted(texture));
        };
        let mut textures: Vec<Arc<Texture>> = self.textures().cloned().collect();
        textures.push(texture.clone());

        let (old_w, old_h) = self.size();
        if !self.relayout(textures, width, height, true) {
            return Err(self.exhausted(texture));
        }
        log::debug!(
            "atlas {} grew from {old_w}x{old_h} to {}x{} to fit '{}'",
            self.id,
            self.width(),
            self.height(),
            texture.cache_key()
        );
        self.region(texture.cache_key())
            .cloned()
            .ok_or_else(|| AtlasError::NotResident(texture.cache_key().to_string()))
    }

    /// Next size when growing: both axes doubled, capped at the configured maximum.
    fn next_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let max_w = self.config.max_width.max(width);
        let max_h = self.config.max_height.max(height);
        if width >= max_w && height >= max_h {
            return None;
        }
        Some((
            width.saturating_mul(2).min(max_w),
            height.saturating_mul(2).min(max_h),
        ))
    }

    fn plan(&self, textures: &[Arc<Texture>], width: u32, height: u32) -> Option<(Allocator, Vec<(u32, u32)>)> {
        let mut allocator = Allocator::new(width, height);
        let mut positions = Vec::with_capacity(textures.len());
        for texture in textures {
            let (w, h) = self.padded_size(texture);
            positions.push(place(&mut allocator, w, h).ok()?);
        }
        Some((allocator, positions))
    }

    /// Lay `textures` out from scratch at `width × height`, then at doubled
    /// sizes when `grow` is set. Nothing changes unless every texture fits.
    fn relayout(&mut self, textures: Vec<Arc<Texture>>, mut width: u32, mut height: u32, grow: bool) -> bool {
        loop {
            if let Some((allocator, positions)) = self.plan(&textures, width, height) {
                self.commit(textures, allocator, positions);
                return true;
            }
            if !grow {
                return false;
            }
            match self.next_size(width, height) {
                Some(next) => (width, height) = next,
                None => return false,
            }
        }
    }

    fn commit(&mut self, textures: Vec<Arc<Texture>>, allocator: Allocator, positions: Vec<(u32, u32)>) {
        let (width, height) = (allocator.width(), allocator.height());
        if (width, height) != self.size() {
            self.surface = self
                .context
                .create_surface(width, height, &format!("pb atlas {}", self.id));
        }
        self.allocator = allocator;
        self.image = RgbaImage::new(width, height);
        self.generation += 1;
        self.residents.clear();
        self.index.clear();

        for (texture, (x, y)) in textures.into_iter().zip(positions) {
            let block = extrude(texture.image(), self.config.border);
            image::imageops::replace(&mut self.image, &block, x as i64, y as i64);
            let region = self.region_at(&texture, x, y);
            self.index.insert(region.name.clone(), self.residents.len());
            self.residents.push(Resident { texture, region });
        }
        self.context
            .write_surface(&self.surface, self.image.as_raw(), Viewport::full(width, height));
    }

    /// Make the resident set match `textures`. With `keep_old` the current
    /// residents stay and missing textures are added one by one (those added
    /// before a failure stay resident). Otherwise the atlas is laid out again
    /// with exactly `textures`, in order, as one transaction.
    pub fn update_textures(&mut self, textures: &[Arc<Texture>], keep_old: bool) -> Result<(), AtlasError> {
        if keep_old {
            for texture in textures {
                self.add(texture)?;
            }
            return Ok(());
        }

        let mut seen = std::collections::HashSet::new();
        let unique: Vec<Arc<Texture>> = textures
            .iter()
            .filter(|t| seen.insert(t.cache_key().to_string()))
            .cloned()
            .collect();
        let count = unique.len();
        let (width, height) = self.size();
        if self.relayout(unique, width, height, self.config.auto_resize) {
            Ok(())
        } else {
            Err(AtlasError::LayoutExhausted { count, width, height })
        }
    }

    /// Drop a texture's residency. Its pixels stay until the next layout change.
    pub fn remove(&mut self, name: &str) -> Result<Arc<Texture>, AtlasError> {
        let index = self
            .index
            .remove(name)
            .ok_or_else(|| AtlasError::NotResident(name.to_string()))?;
        let resident = self.residents.remove(index);
        for slot in self.index.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        Ok(resident.texture)
    }

    /// Repack every resident texture, reclaiming space left by `remove`.
    pub fn rebuild(&mut self) -> Result<(), AtlasError> {
        let textures: Vec<Arc<Texture>> = self.textures().cloned().collect();
        let count = textures.len();
        let (width, height) = self.size();
        if self.relayout(textures, width, height, self.config.auto_resize) {
            log::debug!("atlas {} rebuilt with {count} textures at {}x{}", self.id, self.width(), self.height());
            Ok(())
        } else {
            Err(AtlasError::LayoutExhausted { count, width, height })
        }
    }

    /// Change the surface size and repack. Fails without changes when the
    /// residents do not fit.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), AtlasError> {
        if width == 0 || height == 0 {
            return Err(AtlasError::InvalidSize { width, height });
        }
        let textures: Vec<Arc<Texture>> = self.textures().cloned().collect();
        let count = textures.len();
        if self.relayout(textures, width, height, false) {
            log::debug!("atlas {} resized to {width}x{height}", self.id);
            Ok(())
        } else {
            Err(AtlasError::LayoutExhausted { count, width, height })
        }
    }

    pub fn clear(&mut self) {
        let (width, height) = self.size();
        self.residents.clear();
        self.index.clear();
        self.allocator.reset();
        self.image = RgbaImage::new(width, height);
        self.generation += 1;
        self.context
            .write_surface(&self.surface, self.image.as_raw(), Viewport::full(width, height));
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn to_image(&self) -> RgbaImage {
        self.image.clone()
    }

    /// Write the atlas contents as PNG.
    pub fn save(&self, path: &Path) -> Result<(), AtlasError> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}
