//! Ordered sprite collection mirrored into one GPU instance buffer.
//!
//! Slot `i` of the instance buffer always belongs to the sprite drawn `i`-th.
//! Mutations only mark slots dirty; `sync` rebuilds the dirty instance records
//! from the current atlas regions and uploads them as coalesced ranges. A
//! change of atlas layout generation marks every slot dirty.
//!
//! Sprites are addressed by `SpriteHandle`s. A handle stays valid while its
//! sprite is in the list, whatever slot the sprite moves to; after removal
//! the handle is rejected as stale.

use std::cell::RefCell;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::Vec2;
use pb_core::{Aabb, Color, FilterMode, SpatialHash, Texture};
use pb_render::{RenderContext, SpriteBatch, SpriteInstance, TextureAtlas};
use serde::{Deserialize, Serialize};

use crate::error::SpriteListError;
use crate::sprite::Sprite;

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// Stable reference to a sprite inside one `SpriteList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpriteHandle {
    list: u64,
    index: u32,
    generation: u32,
}

impl SpriteHandle {
    pub fn list_id(&self) -> u64 {
        self.list
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteListOptions {
    /// Instance buffer capacity before the first growth.
    pub initial_capacity: usize,
    /// Enables the spatial hash with this cell size.
    pub spatial_hash_cell_size: Option<f32>,
    pub filter: FilterMode,
}

impl Default for SpriteListOptions {
    fn default() -> Self {
        Self {
            initial_capacity: 128,
            spatial_hash_cell_size: None,
            filter: FilterMode::Linear,
        }
    }
}

/// What one `sync` uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub dirty_ranges: Vec<Range<usize>>,
    pub slots_written: usize,
    /// The buffer was reallocated and rewritten in full.
    pub full_upload: bool,
}

#[derive(Debug, Clone, Copy)]
struct HandleEntry {
    generation: u32,
    slot: Option<usize>,
}

struct Record {
    handle: SpriteHandle,
    sprite: Sprite,
}

fn coalesce(slots: &BTreeSet<usize>) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for &slot in slots {
        match ranges.last_mut() {
            Some(range) if range.end == slot => range.end += 1,
            _ => ranges.push(slot..slot + 1),
        }
    }
    ranges
}

pub struct SpriteList<C: RenderContext> {
    id: u64,
    context: Rc<C>,
    atlas: Rc<RefCell<TextureAtlas<C>>>,
    records: Vec<Record>,
    instances: Vec<SpriteInstance>,
    handles: Vec<HandleEntry>,
    free_handles: Vec<u32>,
    dirty: BTreeSet<usize>,
    buffer: C::Buffer,
    capacity: usize,
    atlas_generation: Option<u64>,
    spatial_hash: Option<SpatialHash<SpriteHandle>>,
    visible: bool,
    color: Color,
    filter: FilterMode,
}

impl<C: RenderContext> SpriteList<C> {
    pub fn new(context: Rc<C>, atlas: Rc<RefCell<TextureAtlas<C>>>) -> Self {
        Self::with_options(context, atlas, SpriteListOptions::default())
    }

    pub fn with_options(context: Rc<C>, atlas: Rc<RefCell<TextureAtlas<C>>>, options: SpriteListOptions) -> Self {
        let id = NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed);
        let capacity = options.initial_capacity.max(1);
        let buffer = context.create_instance_buffer(capacity, &format!("pb sprite list {id}"));
        Self {
            id,
            context,
            atlas,
            records: Vec::new(),
            instances: Vec::new(),
            handles: Vec::new(),
            free_handles: Vec::new(),
            dirty: BTreeSet::new(),
            buffer,
            capacity,
            atlas_generation: None,
            spatial_hash: options.spatial_hash_cell_size.map(SpatialHash::new),
            visible: true,
            color: Color::WHITE,
            filter: options.filter,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn atlas(&self) -> &Rc<RefCell<TextureAtlas<C>>> {
        &self.atlas
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer(&self) -> &C::Buffer {
        &self.buffer
    }

    /// CPU copy of the instance records, one per slot.
    pub fn instances(&self) -> &[SpriteInstance] {
        &self.instances
    }

    pub fn dirty_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty.iter().copied()
    }

    // Handles

    fn allocate_handle(&mut self, slot: usize) -> SpriteHandle {
        if let Some(index) = self.free_handles.pop() {
            let entry = &mut self.handles[index as usize];
            entry.slot = Some(slot);
            return SpriteHandle {
                list: self.id,
                index,
                generation: entry.generation,
            };
        }
        let index = self.handles.len() as u32;
        self.handles.push(HandleEntry {
            generation: 0,
            slot: Some(slot),
        });
        SpriteHandle {
            list: self.id,
            index,
            generation: 0,
        }
    }

    fn release_handle(&mut self, handle: SpriteHandle) {
        let entry = &mut self.handles[handle.index as usize];
        entry.slot = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free_handles.push(handle.index);
    }

    /// Re-point handles of every record from `start` onward at their slot.
    fn reindex_from(&mut self, start: usize) {
        for (slot, record) in self.records.iter().enumerate().skip(start) {
            self.handles[record.handle.index as usize].slot = Some(slot);
        }
    }

    fn mark_dirty_from(&mut self, start: usize) {
        let _ = self.dirty.split_off(&start);
        self.dirty.extend(start..self.records.len());
    }

    pub fn index_of(&self, handle: SpriteHandle) -> Result<usize, SpriteListError> {
        if handle.list != self.id {
            return Err(SpriteListError::ForeignHandle { handle, list: self.id });
        }
        self.handles
            .get(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.slot)
            .ok_or(SpriteListError::StaleHandle(handle))
    }

    pub fn contains(&self, handle: SpriteHandle) -> bool {
        self.index_of(handle).is_ok()
    }

    pub fn handle_at(&self, index: usize) -> Option<SpriteHandle> {
        self.records.get(index).map(|r| r.handle)
    }

    pub fn get(&self, handle: SpriteHandle) -> Result<&Sprite, SpriteListError> {
        let slot = self.index_of(handle)?;
        Ok(&self.records[slot].sprite)
    }

    pub fn get_at(&self, index: usize) -> Option<&Sprite> {
        self.records.get(index).map(|r| &r.sprite)
    }

    /// Sprites with their handles, in draw order.
    pub fn iter(&self) -> impl Iterator<Item = (SpriteHandle, &Sprite)> + '_ {
        self.records.iter().map(|r| (r.handle, &r.sprite))
    }

    pub fn handles(&self) -> impl Iterator<Item = SpriteHandle> + '_ {
        self.records.iter().map(|r| r.handle)
    }

    // Spatial hash

    pub fn enable_spatial_hashing(&mut self, cell_size: f32) {
        let mut hash = SpatialHash::new(cell_size);
        for record in &self.records {
            hash.insert(record.handle, &record.sprite.aabb());
        }
        self.spatial_hash = Some(hash);
    }

    pub fn disable_spatial_hashing(&mut self) {
        self.spatial_hash = None;
    }

    pub fn spatial_hash(&self) -> Option<&SpatialHash<SpriteHandle>> {
        self.spatial_hash.as_ref()
    }

    fn hash_insert(&mut self, slot: usize) {
        if let Some(hash) = &mut self.spatial_hash {
            let record = &self.records[slot];
            hash.update(record.handle, &record.sprite.aabb());
        }
    }

    fn hash_remove(&mut self, handle: SpriteHandle) {
        if let Some(hash) = &mut self.spatial_hash {
            hash.remove(handle);
        }
    }

    /// Slots whose sprites may overlap `bounds`, ascending.
    pub(crate) fn candidate_slots(&self, bounds: &Aabb) -> Vec<usize> {
        match &self.spatial_hash {
            Some(hash) => {
                let mut slots: Vec<usize> = hash
                    .query_rect(bounds)
                    .into_iter()
                    .filter_map(|h| self.index_of(h).ok())
                    .collect();
                slots.sort_unstable();
                slots
            }
            None => (0..self.records.len()).collect(),
        }
    }

    /// Slots whose sprites may contain `point`, ascending.
    pub(crate) fn candidate_slots_at(&self, point: Vec2) -> Vec<usize> {
        match &self.spatial_hash {
            Some(hash) => {
                let mut slots: Vec<usize> = hash
                    .query_point(point)
                    .into_iter()
                    .filter_map(|h| self.index_of(h).ok())
                    .collect();
                slots.sort_unstable();
                slots
            }
            None => (0..self.records.len()).collect(),
        }
    }

    pub(crate) fn record_at(&self, slot: usize) -> (SpriteHandle, &Sprite) {
        let record = &self.records[slot];
        (record.handle, &record.sprite)
    }

    // Insertion and removal

    /// Append `sprite` at the end of the draw order. Its texture is added to
    /// the atlas first; if that fails the list is unchanged.
    pub fn append(&mut self, sprite: Sprite) -> Result<SpriteHandle, SpriteListError> {
        let len = self.records.len();
        self.insert(len, sprite)
    }

    /// Insert at `index`, shifting later sprites back one slot.
    pub fn insert(&mut self, index: usize, sprite: Sprite) -> Result<SpriteHandle, SpriteListError> {
        let len = self.records.len();
        if index > len {
            return Err(SpriteListError::IndexOutOfBounds { index, len });
        }
        self.atlas.borrow_mut().add(sprite.texture())?;

        let handle = self.allocate_handle(index);
        self.records.insert(index, Record { handle, sprite });
        self.instances.insert(index, SpriteInstance::default());
        if index < len {
            self.reindex_from(index + 1);
        }
        self.mark_dirty_from(index);
        self.hash_insert(index);
        Ok(handle)
    }

    /// Append every sprite, or none of them if a texture cannot be placed.
    pub fn extend(&mut self, sprites: impl IntoIterator<Item = Sprite>) -> Result<Vec<SpriteHandle>, SpriteListError> {
        let sprites: Vec<Sprite> = sprites.into_iter().collect();
        let textures: Vec<Arc<Texture>> = sprites.iter().map(|s| s.texture().clone()).collect();
        self.preload_textures(&textures)?;
        sprites.into_iter().map(|sprite| self.append(sprite)).collect()
    }

    /// Make sure `textures` are resident in the atlas.
    pub fn preload_textures(&mut self, textures: &[Arc<Texture>]) -> Result<(), SpriteListError> {
        self.atlas.borrow_mut().update_textures(textures, true)?;
        Ok(())
    }

    /// Ordered removal: later sprites shift down one slot and are re-sent on
    /// the next `sync`.
    pub fn remove(&mut self, handle: SpriteHandle) -> Result<Sprite, SpriteListError> {
        let slot = self.index_of(handle)?;
        let record = self.records.remove(slot);
        self.instances.remove(slot);
        self.release_handle(handle);
        self.reindex_from(slot);
        self.mark_dirty_from(slot);
        self.hash_remove(handle);
        Ok(record.sprite)
    }

    /// O(1) removal: the last sprite moves into the freed slot.
    pub fn swap_remove(&mut self, handle: SpriteHandle) -> Result<Sprite, SpriteListError> {
        let slot = self.index_of(handle)?;
        let last = self.records.len() - 1;
        let record = self.records.swap_remove(slot);
        self.instances.swap_remove(slot);
        self.release_handle(handle);
        self.dirty.remove(&last);
        if slot < last {
            self.reindex_from_slot(slot);
            self.dirty.insert(slot);
        }
        self.hash_remove(handle);
        Ok(record.sprite)
    }

    fn reindex_from_slot(&mut self, slot: usize) {
        let moved = self.records[slot].handle;
        self.handles[moved.index as usize].slot = Some(slot);
    }

    pub fn pop(&mut self) -> Option<Sprite> {
        let handle = self.records.last()?.handle;
        self.remove(handle).ok()
    }

    pub fn clear(&mut self) {
        let handles: Vec<SpriteHandle> = self.records.iter().map(|r| r.handle).collect();
        for handle in handles {
            self.release_handle(handle);
        }
        self.records.clear();
        self.instances.clear();
        self.dirty.clear();
        if let Some(hash) = &mut self.spatial_hash {
            hash.clear();
        }
    }

    // Reordering

    pub fn swap(&mut self, a: SpriteHandle, b: SpriteHandle) -> Result<(), SpriteListError> {
        let (slot_a, slot_b) = (self.index_of(a)?, self.index_of(b)?);
        if slot_a == slot_b {
            return Ok(());
        }
        self.records.swap(slot_a, slot_b);
        self.instances.swap(slot_a, slot_b);
        self.reindex_from_slot(slot_a);
        self.reindex_from_slot(slot_b);
        self.dirty.insert(slot_a);
        self.dirty.insert(slot_b);
        Ok(())
    }

    pub fn reverse(&mut self) {
        self.records.reverse();
        self.instances.reverse();
        self.reindex_from(0);
        self.mark_dirty_from(0);
    }

    /// Stable sort of the draw order.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&Sprite, &Sprite) -> CmpOrdering) {
        self.records.sort_by(|a, b| compare(&a.sprite, &b.sprite));
        self.reindex_from(0);
        self.mark_dirty_from(0);
    }

    // Mutation

    /// Run `f` on one sprite. The list compares the sprite's render state
    /// before and after and only marks the slot dirty when it changed. A new
    /// texture is added to the atlas; if that fails the old texture is put
    /// back and the error returned.
    pub fn modify<R>(&mut self, handle: SpriteHandle, f: impl FnOnce(&mut Sprite) -> R) -> Result<R, SpriteListError> {
        let slot = self.index_of(handle)?;
        let before = self.records[slot].sprite.render_state();
        let old_texture = self.records[slot].sprite.texture().clone();

        let result = f(&mut self.records[slot].sprite);

        let after = self.records[slot].sprite.render_state();
        if before == after {
            return Ok(result);
        }
        self.dirty.insert(slot);
        self.hash_insert(slot);

        let sprite = &mut self.records[slot].sprite;
        if !Arc::ptr_eq(&old_texture, sprite.texture()) {
            let added = self.atlas.borrow_mut().add(sprite.texture());
            if let Err(err) = added {
                sprite.set_texture(old_texture);
                self.hash_insert(slot);
                return Err(err.into());
            }
        }
        Ok(result)
    }

    pub fn set_position(&mut self, handle: SpriteHandle, position: Vec2) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.set_position(position))
    }

    pub fn move_by(&mut self, handle: SpriteHandle, delta: Vec2) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.move_by(delta))
    }

    pub fn set_angle(&mut self, handle: SpriteHandle, angle: f32) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.set_angle(angle))
    }

    pub fn set_scale(&mut self, handle: SpriteHandle, scale: f32) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.set_scale(scale))
    }

    pub fn set_sprite_color(&mut self, handle: SpriteHandle, color: Color) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.set_color(color))
    }

    pub fn set_sprite_alpha(&mut self, handle: SpriteHandle, alpha: u8) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.set_alpha(alpha))
    }

    pub fn set_sprite_visible(&mut self, handle: SpriteHandle, visible: bool) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.set_visible(visible))
    }

    pub fn set_texture(&mut self, handle: SpriteHandle, texture: Arc<Texture>) -> Result<(), SpriteListError> {
        self.modify(handle, |s| s.set_texture(texture))
    }

    /// Apply velocities. Only sprites that actually moved are marked dirty.
    pub fn update(&mut self) {
        for slot in 0..self.records.len() {
            if self.records[slot].sprite.update() {
                self.dirty.insert(slot);
                self.hash_insert(slot);
            }
        }
    }

    pub fn move_all(&mut self, delta: Vec2) {
        if delta == Vec2::ZERO {
            return;
        }
        for slot in 0..self.records.len() {
            self.records[slot].sprite.move_by(delta);
            self.hash_insert(slot);
        }
        self.mark_dirty_from(0);
    }

    /// Scale every sprite by `factor` and move it away from (or towards) `origin`.
    pub fn rescale(&mut self, origin: Vec2, factor: f32) {
        for slot in 0..self.records.len() {
            let sprite = &mut self.records[slot].sprite;
            let position = origin + (sprite.position() - origin) * factor;
            sprite.set_position(position);
            sprite.set_scale_xy(sprite.scale() * factor);
            self.hash_insert(slot);
        }
        self.mark_dirty_from(0);
    }

    // List-level state, applied at draw time

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn alpha(&self) -> u8 {
        self.color.a
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        self.color.a = alpha;
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn set_filter(&mut self, filter: FilterMode) {
        self.filter = filter;
    }

    // GPU synchronization

    /// Bring the instance buffer up to date with the sprites.
    pub fn sync(&mut self) -> Result<SyncReport, SpriteListError> {
        let atlas_rc = self.atlas.clone();
        let mut atlas = atlas_rc.borrow_mut();

        // Textures can leave the atlas behind the list's back (clear, update_textures);
        // re-adding them may grow the atlas, which dirties every slot again.
        loop {
            let generation = atlas.generation();
            if self.atlas_generation != Some(generation) {
                self.atlas_generation = Some(generation);
                self.dirty.extend(0..self.records.len());
            }
            for &slot in &self.dirty {
                let texture = self.records[slot].sprite.texture();
                if !atlas.has_texture(texture.cache_key()) {
                    atlas.add(texture)?;
                }
            }
            if atlas.generation() == generation {
                break;
            }
        }

        let len = self.records.len();
        let mut full_upload = false;
        if len > self.capacity {
            let mut capacity = self.capacity.max(1);
            while capacity < len {
                capacity *= 2;
            }
            log::debug!(
                "sprite list {} instance buffer grew from {} to {capacity}",
                self.id,
                self.capacity
            );
            self.buffer = self
                .context
                .create_instance_buffer(capacity, &format!("pb sprite list {}", self.id));
            self.capacity = capacity;
            self.dirty.extend(0..len);
            full_upload = true;
        }

        for &slot in &self.dirty {
            let sprite = &self.records[slot].sprite;
            let coords = atlas.coordinates(sprite.texture().cache_key())?;
            self.instances[slot] = sprite.instance(coords);
        }

        let dirty_ranges = coalesce(&self.dirty);
        for range in &dirty_ranges {
            self.context
                .write_instances(&self.buffer, range.start, &self.instances[range.clone()]);
        }
        let slots_written = self.dirty.len();
        self.dirty.clear();

        log::trace!(
            "sprite list {} synced {slots_written} slots in {} ranges",
            self.id,
            dirty_ranges.len()
        );
        Ok(SyncReport {
            dirty_ranges,
            slots_written,
            full_upload,
        })
    }

    /// Sync, then draw every sprite with one instanced call.
    pub fn draw(&mut self, target: &mut C::Target) -> Result<SyncReport, SpriteListError> {
        let report = self.sync()?;
        if !self.visible || self.records.is_empty() {
            return Ok(report);
        }
        let atlas = self.atlas.borrow();
        self.context.draw_instanced(
            target,
            SpriteBatch {
                surface: atlas.surface(),
                instances: &self.buffer,
                count: self.records.len() as u32,
                tint: self.color.to_f32_array(),
                filter: self.filter,
            },
        );
        Ok(report)
    }

    /// Handles of sprites in this list colliding with the sprite behind
    /// `handle`, excluding itself, in draw order.
    pub fn collisions_of(&self, handle: SpriteHandle) -> Result<Vec<SpriteHandle>, SpriteListError> {
        let sprite = self.get(handle)?;
        Ok(crate::collision::check_for_collision_with_list(sprite, self)
            .into_iter()
            .filter(|&h| h != handle)
            .collect())
    }
}
