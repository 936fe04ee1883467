//! Skyline rectangle packer.
//!
//! The packed area is described by its top contour (the "skyline"): a list of
//! horizontal segments ordered by `x` that together span the full width. Each
//! allocation is placed at the lowest `y` where it fits, then the lowest `x`,
//! which keeps placement deterministic for a given sequence of requests.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("no free space for a {width}x{height} rectangle")]
    Exhausted { width: u32, height: u32 },
    #[error("cannot allocate a zero-sized rectangle ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    x: u32,
    y: u32,
    width: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocator {
    width: u32,
    height: u32,
    skyline: Vec<Segment>,
    used_area: u64,
    allocations: usize,
}

impl Allocator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            skyline: vec![Segment { x: 0, y: 0, width }],
            used_area: 0,
            allocations: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of successful allocations since construction or the last reset.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn used_area(&self) -> u64 {
        self.used_area
    }

    /// Fraction of the area handed out, in `[0, 1]`.
    pub fn occupancy(&self) -> f32 {
        let total = self.width as u64 * self.height as u64;
        if total == 0 {
            return 0.0;
        }
        self.used_area as f32 / total as f32
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.width, self.height);
    }

    /// Reserve a `width × height` rectangle and return its top-left corner.
    /// On failure the allocator is left untouched.
    pub fn alloc(&mut self, width: u32, height: u32) -> Result<(u32, u32), AllocError> {
        if width == 0 || height == 0 {
            return Err(AllocError::ZeroSized { width, height });
        }

        let mut best: Option<(usize, u32, u32)> = None;
        for index in 0..self.skyline.len() {
            let Some(y) = self.fit(index, width, height) else {
                continue;
            };
            let x = self.skyline[index].x;
            let better = match best {
                None => true,
                Some((_, best_x, best_y)) => (y, x) < (best_y, best_x),
            };
            if better {
                best = Some((index, x, y));
            }
        }

        let (index, x, y) = best.ok_or(AllocError::Exhausted { width, height })?;
        self.place(index, x, y, width, height);
        self.used_area += width as u64 * height as u64;
        self.allocations += 1;
        Ok((x, y))
    }

    /// Lowest `y` at which a rectangle starting at segment `index` fits.
    fn fit(&self, index: usize, width: u32, height: u32) -> Option<u32> {
        let x = self.skyline[index].x;
        if x.checked_add(width)? > self.width {
            return None;
        }
        let end = x + width;
        let mut y = 0;
        for segment in &self.skyline[index..] {
            if segment.x >= end {
                break;
            }
            y = y.max(segment.y);
        }
        if y.checked_add(height)? > self.height {
            return None;
        }
        Some(y)
    }

    fn place(&mut self, index: usize, x: u32, y: u32, width: u32, height: u32) {
        let end = x + width;
        self.skyline.insert(
            index,
            Segment {
                x,
                y: y + height,
                width,
            },
        );

        let next = index + 1;
        while next < self.skyline.len() {
            let segment = self.skyline[next];
            if segment.x >= end {
                break;
            }
            let segment_end = segment.x + segment.width;
            if segment_end <= end {
                self.skyline.remove(next);
            } else {
                self.skyline[next] = Segment {
                    x: end,
                    y: segment.y,
                    width: segment_end - end,
                };
                break;
            }
        }

        self.merge();
    }

    fn merge(&mut self) {
        let mut i = 0;
        while i + 1 < self.skyline.len() {
            if self.skyline[i].y == self.skyline[i + 1].y {
                self.skyline[i].width += self.skyline[i + 1].width;
                self.skyline.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn overlaps(a: (u32, u32, u32, u32), b: (u32, u32, u32, u32)) -> bool {
        a.0 < b.0 + b.2 && b.0 < a.0 + a.2 && a.1 < b.1 + b.3 && b.1 < a.1 + a.3
    }

    #[test]
    fn fills_quadrants_bottom_left_first() {
        let mut alloc = Allocator::new(64, 64);
        assert_eq!(alloc.alloc(32, 32), Ok((0, 0)));
        assert_eq!(alloc.alloc(32, 32), Ok((32, 0)));
        assert_eq!(alloc.alloc(32, 32), Ok((0, 32)));
        assert_eq!(alloc.alloc(32, 32), Ok((32, 32)));
        assert_eq!(alloc.occupancy(), 1.0);
        assert_eq!(
            alloc.alloc(1, 1),
            Err(AllocError::Exhausted { width: 1, height: 1 })
        );
    }

    #[test]
    fn prefers_lowest_row_over_leftmost_column() {
        let mut alloc = Allocator::new(100, 100);
        alloc.alloc(40, 50).unwrap();
        alloc.alloc(20, 10).unwrap();
        // Lowest y is 10 at x = 40, ahead of anything at x = 0.
        assert_eq!(alloc.alloc(30, 10), Ok((60, 0)));
        assert_eq!(alloc.alloc(60, 5), Ok((40, 10)));
    }

    #[test]
    fn failure_leaves_state_untouched() {
        let mut alloc = Allocator::new(32, 32);
        alloc.alloc(20, 20).unwrap();
        let before = alloc.clone();
        assert!(alloc.alloc(40, 4).is_err());
        assert!(alloc.alloc(16, 16).is_err());
        assert_eq!(alloc, before);
    }

    #[test]
    fn zero_sized_requests_are_rejected() {
        let mut alloc = Allocator::new(8, 8);
        assert_eq!(alloc.alloc(0, 3), Err(AllocError::ZeroSized { width: 0, height: 3 }));
        assert_eq!(alloc.allocations(), 0);
    }

    #[test]
    fn reset_restores_empty_state() {
        let mut alloc = Allocator::new(16, 16);
        alloc.alloc(16, 16).unwrap();
        alloc.reset();
        assert_eq!(alloc.used_area(), 0);
        assert_eq!(alloc, Allocator::new(16, 16));
        assert_eq!(alloc.alloc(16, 16), Ok((0, 0)));
    }

    #[test]
    fn random_allocations_never_overlap_or_escape() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let mut alloc = Allocator::new(256, 256);
            let mut placed = Vec::new();
            for _ in 0..200 {
                let w = rng.gen_range(1..48);
                let h = rng.gen_range(1..48);
                if let Ok((x, y)) = alloc.alloc(w, h) {
                    let rect = (x, y, w, h);
                    assert!(x + w <= 256 && y + h <= 256);
                    for other in &placed {
                        assert!(!overlaps(rect, *other), "{rect:?} overlaps {other:?}");
                    }
                    placed.push(rect);
                }
            }
            let area: u64 = placed.iter().map(|r| r.2 as u64 * r.3 as u64).sum();
            assert_eq!(alloc.used_area(), area);
        }
    }

    #[test]
    fn same_requests_give_same_layout() {
        let sizes = [(10, 30), (50, 5), (7, 7), (64, 12), (3, 40), (25, 25)];
        let run = || {
            let mut alloc = Allocator::new(80, 80);
            sizes.iter().map(|&(w, h)| alloc.alloc(w, h)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
