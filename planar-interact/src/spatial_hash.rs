//! Uniform-cell spatial hash over entity AABBs, the broad phase for
//! picking, area queries and snap candidate gathering.
//!
//! Unlike a per-frame rebuild grid, this index is persistent: entries are
//! inserted once and updated in place as entities mutate, so a reverse
//! id → cells map is kept for O(1) removal.

use glam::Vec2;
use planar_math::Aabb;
use planar_scene::EntityId;
use rustc_hash::FxHashMap;

/// Default cell size in world units. Tunable, fixed per instance.
pub const DEFAULT_CELL_SIZE: f32 = 50.0;

// Two large odd multipliers; XOR-combined they spread the signed cell
// coordinates over the 64-bit key space.
const CELL_MUL_X: u64 = 0x9e37_79b9_7f4a_7c15;
const CELL_MUL_Y: u64 = 0xc2b2_ae3d_27d4_eb4f;

#[inline]
fn cell_key(cx: i32, cy: i32) -> u64 {
    (cx as u32 as u64).wrapping_mul(CELL_MUL_X) ^ (cy as u32 as u64).wrapping_mul(CELL_MUL_Y)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialGridStats {
    pub entries: usize,
    pub cells: usize,
    pub max_bucket: usize,
}

#[derive(Debug)]
pub struct SpatialHashGrid {
    cell_size: f32,
    inv_cell_size: f32,
    buckets: FxHashMap<u64, Vec<EntityId>>,
    cells_of: FxHashMap<EntityId, Vec<u64>>,
}

impl Default for SpatialHashGrid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl SpatialHashGrid {
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            buckets: FxHashMap::default(),
            cells_of: FxHashMap::default(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    fn cell_coord(&self, v: f32) -> i32 {
        (v * self.inv_cell_size).floor() as i32
    }

    fn cell_range(&self, bounds: &Aabb) -> (i32, i32, i32, i32) {
        (
            self.cell_coord(bounds.min.x),
            self.cell_coord(bounds.min.y),
            self.cell_coord(bounds.max.x),
            self.cell_coord(bounds.max.y),
        )
    }

    /// Rasterize `bounds` into the grid. The caller must not insert an id
    /// that is already present; use `update` for that.
    pub fn insert(&mut self, id: EntityId, bounds: &Aabb) {
        let (x0, y0, x1, y1) = self.cell_range(bounds);
        let mut cells = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                let key = cell_key(cx, cy);
                self.buckets.entry(key).or_default().push(id);
                cells.push(key);
            }
        }
        self.cells_of.insert(id, cells);
    }

    /// Remove every cell entry recorded for `id`. Unknown ids are a no-op.
    pub fn remove(&mut self, id: EntityId) {
        let Some(cells) = self.cells_of.remove(&id) else {
            return;
        };
        for key in cells {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                if let Some(pos) = bucket.iter().position(|&e| e == id) {
                    bucket.swap_remove(pos);
                }
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
    }

    /// Remove-then-insert; atomic in effect.
    pub fn update(&mut self, id: EntityId, bounds: &Aabb) {
        self.remove(id);
        self.insert(id, bounds);
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.cells_of.contains_key(&id)
    }

    /// Append all ids whose cells overlap `bounds` into `out`. Duplicates
    /// are tolerated; callers sort-unique. Returns the number of cells
    /// visited, for diagnostics.
    pub fn query(&self, bounds: &Aabb, out: &mut Vec<EntityId>) -> usize {
        let (x0, y0, x1, y1) = self.cell_range(bounds);
        let mut visited = 0;
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                visited += 1;
                if let Some(bucket) = self.buckets.get(&cell_key(cx, cy)) {
                    out.extend_from_slice(bucket);
                }
            }
        }
        visited
    }

    pub fn query_point(&self, p: Vec2, radius: f32, out: &mut Vec<EntityId>) -> usize {
        let bounds = Aabb::from_center_half_extents(p, Vec2::splat(radius));
        self.query(&bounds, out)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.cells_of.clear();
    }

    pub fn stats(&self) -> SpatialGridStats {
        SpatialGridStats {
            entries: self.cells_of.len(),
            cells: self.buckets.len(),
            max_bucket: self.buckets.values().map(Vec::len).max().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    #[test]
    fn insert_then_query_finds_the_id() {
        let mut grid = SpatialHashGrid::new(50.0);
        grid.insert(1, &aabb(0.0, 0.0, 10.0, 10.0));
        let mut out = Vec::new();
        grid.query(&aabb(5.0, 5.0, 6.0, 6.0), &mut out);
        assert!(out.contains(&1));
    }

    #[test]
    fn query_far_away_finds_nothing() {
        let mut grid = SpatialHashGrid::new(50.0);
        grid.insert(1, &aabb(0.0, 0.0, 10.0, 10.0));
        let mut out = Vec::new();
        grid.query(&aabb(500.0, 500.0, 510.0, 510.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn spanning_entity_lands_in_every_overlapped_cell() {
        let mut grid = SpatialHashGrid::new(50.0);
        grid.insert(1, &aabb(0.0, 0.0, 120.0, 10.0));
        assert!(grid.stats().cells >= 3, "should span at least 3 cells");
        // Query may return duplicates for spanning entities.
        let mut out = Vec::new();
        grid.query(&aabb(0.0, 0.0, 120.0, 10.0), &mut out);
        out.sort_unstable();
        out.dedup();
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn remove_erases_every_trace() {
        let mut grid = SpatialHashGrid::new(50.0);
        grid.insert(1, &aabb(-60.0, -60.0, 60.0, 60.0));
        grid.insert(2, &aabb(0.0, 0.0, 10.0, 10.0));
        grid.remove(1);
        assert!(!grid.contains(1));
        let mut out = Vec::new();
        grid.query(&aabb(-60.0, -60.0, 60.0, 60.0), &mut out);
        assert!(!out.contains(&1));
        assert!(out.contains(&2));
        let stats = grid.stats();
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn update_moves_the_entry() {
        let mut grid = SpatialHashGrid::new(50.0);
        grid.insert(1, &aabb(0.0, 0.0, 10.0, 10.0));
        grid.update(1, &aabb(200.0, 200.0, 210.0, 210.0));
        let mut out = Vec::new();
        grid.query(&aabb(0.0, 0.0, 10.0, 10.0), &mut out);
        assert!(out.is_empty());
        grid.query(&aabb(200.0, 200.0, 210.0, 210.0), &mut out);
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn negative_coordinates_hash_distinctly() {
        let mut grid = SpatialHashGrid::new(50.0);
        grid.insert(1, &aabb(-10.0, -10.0, -5.0, -5.0));
        grid.insert(2, &aabb(5.0, 5.0, 10.0, 10.0));
        let mut out = Vec::new();
        grid.query(&aabb(-10.0, -10.0, -5.0, -5.0), &mut out);
        assert_eq!(out, vec![1]);
    }
}
