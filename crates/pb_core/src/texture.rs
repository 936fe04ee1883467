//! Immutable image resources.
//!
//! A `Texture` owns RGBA8 pixels, the hit-box outline computed from them, and a
//! cache key that identifies it to texture caches and atlases. Textures never
//! change after construction; transforms such as `crop` or `flip_horizontally`
//! build a new texture with a derived key. Share them through `Arc<Texture>`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Vec2;
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::color::Color;
use crate::hitbox::HitBoxAlgorithm;

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),
    #[error("failed to decode image '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read texture '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("crop {x},{y} {width}x{height} is outside texture '{name}' ({tex_width}x{tex_height})")]
    CropOutOfBounds {
        name: String,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        tex_width: u32,
        tex_height: u32,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

/// Sampling hints carried with a texture. Atlases sample every resident
/// texture with one sampler, so these are advisory there.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureOptions {
    #[serde(default)]
    pub wrap: WrapMode,
    #[serde(default)]
    pub filter: FilterMode,
}

/// Lowercase hex SHA-256 of raw pixel bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

#[derive(Clone)]
pub struct Texture {
    cache_key: String,
    image: RgbaImage,
    hit_box: Vec<Vec2>,
    hit_box_algorithm: HitBoxAlgorithm,
    options: TextureOptions,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("cache_key", &self.cache_key)
            .field("size", &self.image.dimensions())
            .field("hit_box_points", &self.hit_box.len())
            .field("hit_box_algorithm", &self.hit_box_algorithm)
            .finish()
    }
}

impl Texture {
    pub fn new(cache_key: impl Into<String>, image: RgbaImage, algorithm: HitBoxAlgorithm) -> Self {
        let hit_box = algorithm.calculate(&image);
        Self {
            cache_key: cache_key.into(),
            image,
            hit_box,
            hit_box_algorithm: algorithm,
            options: TextureOptions::default(),
        }
    }

    /// Anonymous texture keyed by the SHA-256 of its pixels and the hit-box algorithm.
    pub fn from_image(image: RgbaImage, algorithm: HitBoxAlgorithm) -> Self {
        let key = format!("{}|{}", content_hash(image.as_raw()), algorithm.cache_name());
        Self::new(key, image, algorithm)
    }

    pub fn from_dynamic(cache_key: impl Into<String>, image: DynamicImage, algorithm: HitBoxAlgorithm) -> Self {
        Self::new(cache_key, image.into_rgba8(), algorithm)
    }

    /// Build from a raw row-major buffer (rows top-first). One to four
    /// channels are converted to RGBA8; anything else is rejected.
    pub fn from_raw(
        cache_key: impl Into<String>,
        width: u32,
        height: u32,
        channels: u8,
        bytes: Vec<u8>,
        algorithm: HitBoxAlgorithm,
    ) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize * channels as usize;
        if bytes.len() != expected {
            return Err(TextureError::UnsupportedImageFormat(format!(
                "{width}x{height} with {channels} channels needs {expected} bytes, got {}",
                bytes.len()
            )));
        }
        let mismatch = || TextureError::UnsupportedImageFormat(format!("invalid {channels}-channel buffer"));
        let image = match channels {
            4 => RgbaImage::from_raw(width, height, bytes).ok_or_else(mismatch)?,
            3 => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, bytes).ok_or_else(mismatch)?).into_rgba8(),
            2 => DynamicImage::ImageLumaA8(GrayAlphaImage::from_raw(width, height, bytes).ok_or_else(mismatch)?)
                .into_rgba8(),
            1 => DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, bytes).ok_or_else(mismatch)?).into_rgba8(),
            other => {
                return Err(TextureError::UnsupportedImageFormat(format!(
                    "{other} channels cannot be converted to RGBA8"
                )))
            }
        };
        Ok(Self::new(cache_key, image, algorithm))
    }

    /// Decode an encoded image (PNG) held in memory.
    pub fn from_bytes(name: &str, bytes: &[u8], algorithm: HitBoxAlgorithm) -> Result<Self, TextureError> {
        let image = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
            name: name.to_string(),
            source,
        })?;
        let key = format!("{name}|{}", algorithm.cache_name());
        Ok(Self::from_dynamic(key, image, algorithm))
    }

    pub fn from_file(path: &Path, algorithm: HitBoxAlgorithm) -> Result<Self, TextureError> {
        let bytes = std::fs::read(path).map_err(|source| TextureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&normalize_path(path), &bytes, algorithm)
    }

    /// Fully transparent texture with a bounding-box hit box.
    pub fn empty(name: &str, width: u32, height: u32) -> Self {
        Self::new(name, RgbaImage::new(width, height), HitBoxAlgorithm::BoundingBox)
    }

    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let key = format!("solid:{width}x{height}:{}", color.to_hex());
        Self::new(
            key,
            RgbaImage::from_pixel(width, height, color.into()),
            HitBoxAlgorithm::BoundingBox,
        )
    }

    /// Filled disc of `diameter` pixels on a transparent background.
    pub fn circle(diameter: u32, color: Color) -> Self {
        let radius = diameter as f32 * 0.5;
        let image = RgbaImage::from_fn(diameter, diameter, |x, y| {
            let dx = x as f32 + 0.5 - radius;
            let dy = y as f32 + 0.5 - radius;
            if dx * dx + dy * dy <= radius * radius {
                color.into()
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        Self::new(format!("circle:{diameter}:{}", color.to_hex()), image, HitBoxAlgorithm::Simple)
    }

    /// Replace the computed hit box with explicit points (centred, y-up).
    pub fn with_hit_box(mut self, points: Vec<Vec2>) -> Self {
        if points.len() >= 3 {
            self.hit_box = points;
        }
        self
    }

    pub fn with_options(mut self, options: TextureOptions) -> Self {
        self.options = options;
        self
    }

    fn derive(&self, suffix: &str, image: RgbaImage) -> Self {
        let mut texture = Self::new(
            format!("{}|{suffix}", self.cache_key),
            image,
            self.hit_box_algorithm,
        );
        texture.options = self.options;
        texture
    }

    /// Sub-rectangle in pixel coordinates (origin top-left).
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, TextureError> {
        let (tw, th) = self.image.dimensions();
        let fits = width > 0
            && height > 0
            && x.checked_add(width).is_some_and(|r| r <= tw)
            && y.checked_add(height).is_some_and(|b| b <= th);
        if !fits {
            return Err(TextureError::CropOutOfBounds {
                name: self.cache_key.clone(),
                x,
                y,
                width,
                height,
                tex_width: tw,
                tex_height: th,
            });
        }
        let cropped = image::imageops::crop_imm(&self.image, x, y, width, height).to_image();
        Ok(self.derive(&format!("crop({x},{y},{width},{height})"), cropped))
    }

    pub fn flip_horizontally(&self) -> Self {
        self.derive("flip_h", image::imageops::flip_horizontal(&self.image))
    }

    pub fn flip_vertically(&self) -> Self {
        self.derive("flip_v", image::imageops::flip_vertical(&self.image))
    }

    /// Rotate a quarter turn clockwise.
    pub fn rotate_90(&self) -> Self {
        self.derive("rot90", image::imageops::rotate90(&self.image))
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.image.width() as f32, self.image.height() as f32)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn hit_box(&self) -> &[Vec2] {
        &self.hit_box
    }

    pub fn hit_box_algorithm(&self) -> HitBoxAlgorithm {
        self.hit_box_algorithm
    }

    pub fn options(&self) -> TextureOptions {
        self.options
    }

    pub fn content_hash(&self) -> String {
        content_hash(self.image.as_raw())
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Keyed store of shared textures so repeated loads of one file reuse a
/// single `Arc<Texture>`.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<String, Arc<Texture>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path, algorithm: HitBoxAlgorithm) -> Result<Arc<Texture>, TextureError> {
        let key = format!("{}|{}", normalize_path(path), algorithm.cache_name());
        if let Some(existing) = self.entries.get(&key) {
            return Ok(existing.clone());
        }
        let texture = Arc::new(Texture::from_file(path, algorithm)?);
        self.entries.insert(key, texture.clone());
        Ok(texture)
    }

    /// Insert `texture` unless its key is already cached; returns the cached copy.
    pub fn insert(&mut self, texture: Texture) -> Arc<Texture> {
        self.entries
            .entry(texture.cache_key.clone())
            .or_insert_with(|| Arc::new(texture))
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Texture>> {
        self.entries.get(key).cloned()
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<Texture>> {
        self.entries.remove(key)
    }

    /// Drop textures that nothing outside the cache still references.
    pub fn prune_unused(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, tex| Arc::strong_count(tex) > 1);
        let removed = before - self.entries.len();
        if removed > 0 {
            log::debug!("texture cache pruned {removed} unused textures");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_png_path(hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("pb_texture_test_{}_{}_{}.png", hint, std::process::id(), nanos))
    }

    #[test]
    fn solid_texture_has_bounding_box_and_stable_key() {
        let a = Texture::solid(4, 2, Color::RED);
        let b = Texture::solid(4, 2, Color::RED);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "solid:4x2:ff0000ff");
        assert_eq!(a.hit_box().len(), 4);
        assert_eq!(a.size(), Vec2::new(4.0, 2.0));
    }

    #[test]
    fn from_image_keys_by_content() {
        let a = Texture::from_image(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])), HitBoxAlgorithm::Simple);
        let b = Texture::from_image(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])), HitBoxAlgorithm::Simple);
        let c = Texture::from_image(RgbaImage::from_pixel(2, 2, Rgba([9, 2, 3, 4])), HitBoxAlgorithm::Simple);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
        assert!(a.cache_key().ends_with("|simple"));
    }

    #[test]
    fn from_raw_converts_rgb_and_rejects_bad_channels() {
        let rgb = Texture::from_raw("rgb", 2, 1, 3, vec![255, 0, 0, 0, 255, 0], HitBoxAlgorithm::Simple).unwrap();
        assert_eq!(rgb.image().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));

        let err = Texture::from_raw("bad", 1, 1, 5, vec![0; 5], HitBoxAlgorithm::Simple).unwrap_err();
        assert!(matches!(err, TextureError::UnsupportedImageFormat(_)));

        let err = Texture::from_raw("short", 2, 2, 4, vec![0; 3], HitBoxAlgorithm::Simple).unwrap_err();
        assert!(matches!(err, TextureError::UnsupportedImageFormat(_)));
    }

    #[test]
    fn circle_is_transparent_in_corners() {
        let tex = Texture::circle(16, Color::GREEN);
        assert_eq!(tex.image().get_pixel(0, 0)[3], 0);
        assert_eq!(tex.image().get_pixel(8, 8)[3], 255);
        assert!(tex.hit_box().len() > 4);
    }

    #[test]
    fn derived_textures_get_new_keys_and_leave_source_untouched() {
        let mut img = RgbaImage::new(4, 2);
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let tex = Texture::new("src", img, HitBoxAlgorithm::Simple);

        let flipped = tex.flip_horizontally();
        assert_eq!(flipped.cache_key(), "src|flip_h");
        assert_eq!(flipped.image().get_pixel(3, 0)[3], 255);
        assert_eq!(tex.image().get_pixel(0, 0)[3], 255);

        let rotated = tex.rotate_90();
        assert_eq!((rotated.width(), rotated.height()), (2, 4));

        let cropped = tex.crop(0, 0, 2, 2).unwrap();
        assert_eq!(cropped.cache_key(), "src|crop(0,0,2,2)");
        assert_eq!(cropped.size(), Vec2::new(2.0, 2.0));
    }

    #[test]
    fn crop_out_of_bounds_fails() {
        let tex = Texture::solid(4, 4, Color::WHITE);
        assert!(matches!(
            tex.crop(3, 0, 2, 1),
            Err(TextureError::CropOutOfBounds { .. })
        ));
        assert!(tex.crop(0, 0, 0, 1).is_err());
    }

    #[test]
    fn from_bytes_decodes_png() {
        let img = RgbaImage::from_pixel(3, 5, Rgba([10, 20, 30, 255]));
        let mut encoded = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
            .expect("encode png");
        let tex = Texture::from_bytes("mem", &encoded, HitBoxAlgorithm::BoundingBox).unwrap();
        assert_eq!((tex.width(), tex.height()), (3, 5));
        assert_eq!(tex.cache_key(), "mem|bounding_box");

        let err = Texture::from_bytes("junk", b"not a png", HitBoxAlgorithm::Simple).unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
    }

    #[test]
    fn cache_reuses_loaded_textures_and_prunes_unused() {
        let path = temp_png_path("cache");
        RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255]))
            .save(&path)
            .expect("write temp png");

        let mut cache = TextureCache::new();
        let a = cache.load(&path, HitBoxAlgorithm::Simple).unwrap();
        let b = cache.load(&path, HitBoxAlgorithm::Simple).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let solid = cache.insert(Texture::solid(1, 1, Color::BLACK));
        assert_eq!(cache.len(), 2);
        drop(solid);
        assert_eq!(cache.prune_unused(), 1);
        assert!(cache.get(a.cache_key()).is_some());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = Texture::from_file(Path::new("/definitely/not/here.png"), HitBoxAlgorithm::Simple).unwrap_err();
        assert!(matches!(err, TextureError::Io { .. }));
    }
}
