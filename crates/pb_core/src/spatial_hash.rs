//! Uniform-grid broad phase.
//!
//! Every key is registered in each cell its bounding box touches. Cells are
//! `floor(coord / cell_size)` on both axes, inclusive of the cell holding the
//! box's max corner, so queries may return false positives but never miss a
//! key whose box reaches the queried area.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use glam::Vec2;

use crate::geometry::Aabb;

type Cell = (i32, i32);

/// Keys whose box covers more cells than this are kept out of the grid and
/// returned by every query instead.
const MAX_CELLS_PER_KEY: u64 = 1024;

#[derive(Debug, Clone, PartialEq)]
enum Footprint {
    Cells(Vec<Cell>),
    Oversized,
}

/// Number of cells in the inclusive range `min..=max`, or `None` on overflow.
fn cell_count(min: Cell, max: Cell) -> Option<u64> {
    let width = i64::from(max.0) - i64::from(min.0) + 1;
    let height = i64::from(max.1) - i64::from(min.1) + 1;
    if width <= 0 || height <= 0 {
        return Some(0);
    }
    (width as u64).checked_mul(height as u64)
}

fn in_range(cell: Cell, min: Cell, max: Cell) -> bool {
    (min.0..=max.0).contains(&cell.0) && (min.1..=max.1).contains(&cell.1)
}

#[derive(Debug, Clone)]
pub struct SpatialHash<K> {
    cell_size: f32,
    cells: HashMap<Cell, HashSet<K>>,
    members: HashMap<K, Footprint>,
    oversized: HashSet<K>,
}

impl<K: Copy + Eq + Hash> SpatialHash<K> {
    /// Non-positive or non-finite sizes fall back to 1.0.
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            members: HashMap::new(),
            oversized: HashSet::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn cell_of(&self, point: Vec2) -> Cell {
        (
            (point.x / self.cell_size).floor() as i32,
            (point.y / self.cell_size).floor() as i32,
        )
    }

    fn cell_range(&self, bounds: &Aabb) -> (Cell, Cell) {
        (self.cell_of(bounds.min), self.cell_of(bounds.max))
    }

    fn footprint(&self, bounds: &Aabb) -> Footprint {
        let (min, max) = self.cell_range(bounds);
        match cell_count(min, max) {
            Some(count) if count <= MAX_CELLS_PER_KEY => {
                let mut cells = Vec::with_capacity(count as usize);
                for cx in min.0..=max.0 {
                    for cy in min.1..=max.1 {
                        cells.push((cx, cy));
                    }
                }
                Footprint::Cells(cells)
            }
            _ => Footprint::Oversized,
        }
    }

    /// Register `key` under `bounds`, replacing any previous registration.
    pub fn insert(&mut self, key: K, bounds: &Aabb) {
        self.remove(key);
        let footprint = self.footprint(bounds);
        match &footprint {
            Footprint::Cells(cells) => {
                for cell in cells {
                    self.cells.entry(*cell).or_default().insert(key);
                }
            }
            Footprint::Oversized => {
                self.oversized.insert(key);
            }
        }
        self.members.insert(key, footprint);
    }

    pub fn remove(&mut self, key: K) -> bool {
        let Some(footprint) = self.members.remove(&key) else {
            return false;
        };
        match footprint {
            Footprint::Cells(cells) => {
                for cell in cells {
                    if let Some(bucket) = self.cells.get_mut(&cell) {
                        bucket.remove(&key);
                        if bucket.is_empty() {
                            self.cells.remove(&cell);
                        }
                    }
                }
            }
            Footprint::Oversized => {
                self.oversized.remove(&key);
            }
        }
        true
    }

    /// Move `key` to new bounds. Skips the rebucket when the covered cells
    /// have not changed.
    pub fn update(&mut self, key: K, bounds: &Aabb) {
        if self.members.get(&key) == Some(&self.footprint(bounds)) {
            return;
        }
        self.insert(key, bounds);
    }

    pub fn contains(&self, key: K) -> bool {
        self.members.contains_key(&key)
    }

    /// Candidates sharing the cell that holds `point`.
    pub fn query_point(&self, point: Vec2) -> HashSet<K> {
        let mut found = self.oversized.clone();
        if let Some(bucket) = self.cells.get(&self.cell_of(point)) {
            found.extend(bucket.iter().copied());
        }
        found
    }

    /// Candidates registered in any cell `bounds` touches. Ranges wider than
    /// the occupied grid are answered by scanning the occupied cells.
    pub fn query_rect(&self, bounds: &Aabb) -> HashSet<K> {
        let mut found = self.oversized.clone();
        let (min, max) = self.cell_range(bounds);
        let scan_occupied = cell_count(min, max).map_or(true, |count| count > self.cells.len() as u64);
        if scan_occupied {
            for (cell, bucket) in &self.cells {
                if in_range(*cell, min, max) {
                    found.extend(bucket.iter().copied());
                }
            }
        } else {
            for cx in min.0..=max.0 {
                for cy in min.1..=max.1 {
                    if let Some(bucket) = self.cells.get(&(cx, cy)) {
                        found.extend(bucket.iter().copied());
                    }
                }
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.members.clear();
        self.oversized.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    #[test]
    fn point_query_finds_keys_in_the_same_cell() {
        let mut hash = SpatialHash::new(10.0);
        hash.insert(1u32, &rect(0.0, 0.0, 5.0, 5.0));
        hash.insert(2u32, &rect(50.0, 50.0, 55.0, 55.0));
        assert_eq!(hash.query_point(Vec2::new(3.0, 3.0)), HashSet::from([1]));
        assert!(hash.query_point(Vec2::new(30.0, 30.0)).is_empty());
    }

    #[test]
    fn boxes_spanning_cells_are_found_from_each_cell() {
        let mut hash = SpatialHash::new(10.0);
        hash.insert(7u32, &rect(-5.0, -5.0, 15.0, 5.0));
        for p in [Vec2::new(-1.0, -1.0), Vec2::new(5.0, 2.0), Vec2::new(14.0, 4.0)] {
            assert!(hash.query_point(p).contains(&7), "{p:?}");
        }
    }

    #[test]
    fn max_corner_cell_is_inclusive() {
        let mut hash = SpatialHash::new(10.0);
        hash.insert(3u32, &rect(0.0, 0.0, 10.0, 10.0));
        assert!(hash.query_point(Vec2::new(10.5, 10.5)).contains(&3));
    }

    #[test]
    fn update_moves_and_remove_forgets() {
        let mut hash = SpatialHash::new(8.0);
        hash.insert(1u32, &rect(0.0, 0.0, 1.0, 1.0));
        hash.update(1, &rect(100.0, 100.0, 101.0, 101.0));
        assert!(hash.query_point(Vec2::new(0.5, 0.5)).is_empty());
        assert!(hash.query_point(Vec2::new(100.5, 100.5)).contains(&1));
        assert_eq!(hash.len(), 1);

        assert!(hash.remove(1));
        assert!(!hash.remove(1));
        assert!(hash.is_empty());
        assert!(hash.query_rect(&rect(-1000.0, -1000.0, 1000.0, 1000.0)).is_empty());
    }

    #[test]
    fn rect_query_collects_every_touching_key() {
        let mut hash = SpatialHash::new(16.0);
        for i in 0..10u32 {
            let x = i as f32 * 20.0;
            hash.insert(i, &rect(x, 0.0, x + 4.0, 4.0));
        }
        let found = hash.query_rect(&rect(0.0, 0.0, 45.0, 2.0));
        for key in [0, 1, 2] {
            assert!(found.contains(&key));
        }
        assert!(!found.contains(&9));
    }

    #[test]
    fn huge_query_rect_scans_occupied_cells() {
        let mut hash = SpatialHash::new(1.0);
        hash.insert(1u32, &rect(0.0, 0.0, 1.0, 1.0));
        hash.insert(2u32, &rect(40_000.0, 40_000.0, 40_001.0, 40_001.0));

        let found = hash.query_rect(&rect(-50_000.0, -50_000.0, 50_000.0, 50_000.0));
        assert_eq!(found, HashSet::from([1, 2]));

        let extreme = hash.query_rect(&rect(-f32::MAX, -f32::MAX, f32::MAX, f32::MAX));
        assert_eq!(extreme, HashSet::from([1, 2]));

        let partial = hash.query_rect(&rect(-50_000.0, -50_000.0, 100.0, 100.0));
        assert_eq!(partial, HashSet::from([1]));
    }

    #[test]
    fn oversized_boxes_are_returned_by_every_query() {
        let mut hash = SpatialHash::new(1.0);
        hash.insert(9u32, &rect(-1.0e6, -1.0e6, 1.0e6, 1.0e6));
        hash.insert(1u32, &rect(0.0, 0.0, 1.0, 1.0));
        assert!(hash.query_point(Vec2::new(500.0, -7.0)).contains(&9));
        assert_eq!(hash.query_rect(&rect(0.2, 0.2, 0.4, 0.4)), HashSet::from([1, 9]));

        hash.update(9, &rect(100.0, 100.0, 101.0, 101.0));
        assert!(!hash.query_point(Vec2::new(500.0, -7.0)).contains(&9));
        assert!(hash.query_point(Vec2::new(100.5, 100.5)).contains(&9));

        hash.update(9, &rect(-1.0e6, -1.0e6, 1.0e6, 1.0e6));
        assert!(hash.remove(9));
        assert_eq!(hash.query_point(Vec2::new(0.5, 0.5)), HashSet::from([1]));
        assert_eq!(hash.len(), 1);
    }

    #[test]
    fn invalid_cell_size_falls_back() {
        let hash: SpatialHash<u32> = SpatialHash::new(0.0);
        assert_eq!(hash.cell_size(), 1.0);
    }
}
