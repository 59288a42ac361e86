use glam::Vec2;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::entity::{
    Entity, EntityId, EntityKind, PolylineShape, Shape, DRAFT_ENTITY_ID, MAX_POLYGON_SIDES,
    MIN_POLYGON_SIDES,
};
use crate::layer::{Layer, LayerId, LayerTable};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),
}

/// The authoritative document: entity records keyed by id, the draw order
/// (back to front; the index is the z-index), the shared polyline point
/// pool, and the layer table.
#[derive(Debug, Default)]
pub struct Document {
    entities: FxHashMap<EntityId, Entity>,
    order: Vec<EntityId>,
    points: Vec<Vec2>,
    pub layers: LayerTable,
    next_id: EntityId,
}

impl Document {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            layers: LayerTable::default(),
            ..Default::default()
        }
    }

    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Insert or replace an entity record. New ids append to the draw
    /// order; the phantom draft id never enters the order. Polygon side
    /// counts are clamped to the accepted range here, at the store
    /// boundary.
    pub fn upsert(&mut self, mut entity: Entity) {
        if let Shape::Polygon(p) = &mut entity.shape {
            p.sides = p.sides.clamp(MIN_POLYGON_SIDES, MAX_POLYGON_SIDES);
        }
        let id = entity.id;
        let replaced = self.entities.insert(id, entity).is_some();
        if id != DRAFT_ENTITY_ID {
            // The allocator must never hand out an id that already exists.
            self.next_id = self.next_id.max(id.saturating_add(1));
            if !replaced {
                self.order.push(id);
            }
        }
    }

    /// Remove an entity. Pooled polyline points are left in place until the
    /// next `compact_points`.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let removed = self.entities.remove(&id);
        if removed.is_some() {
            if let Some(pos) = self.order.iter().position(|&e| e == id) {
                self.order.remove(pos);
            }
        }
        removed
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn require(&self, id: EntityId) -> Result<&Entity, SceneError> {
        self.get(id).ok_or(SceneError::UnknownEntity(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Draw order, back to front.
    pub fn order(&self) -> &[EntityId] {
        &self.order
    }

    /// Position in the draw order. Higher draws later, i.e. on top.
    pub fn z_index(&self, id: EntityId) -> Option<u32> {
        self.order.iter().position(|&e| e == id).map(|i| i as u32)
    }

    /// visible ∧ unlocked ∧ on a visible, unlocked layer.
    pub fn is_pickable(&self, id: EntityId) -> bool {
        self.entities
            .get(&id)
            .map_or(false, |e| e.visible && !e.locked && self.layers.usable(e.layer))
    }

    pub fn stroke_width_px(&self, id: EntityId) -> f32 {
        self.entities
            .get(&id)
            .map_or(1.0, |e| e.style.stroke_width_px)
    }

    /// Effective fill, with by-layer deferral resolved.
    pub fn fill_enabled(&self, id: EntityId) -> bool {
        let Some(e) = self.entities.get(&id) else {
            return false;
        };
        if e.style.fill_by_layer {
            self.layers.get(e.layer).map_or(false, |l| l.fill_enabled)
        } else {
            e.style.fill_enabled
        }
    }

    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        self.layers.add(layer)
    }

    // --- polyline point pool ---

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// Append points to the pool and return the owning range.
    pub fn alloc_points(&mut self, pts: &[Vec2]) -> PolylineShape {
        let start = self.points.len() as u32;
        self.points.extend_from_slice(pts);
        PolylineShape {
            start,
            count: pts.len() as u32,
        }
    }

    pub fn polyline_points(&self, range: PolylineShape) -> &[Vec2] {
        let start = range.start as usize;
        let end = (range.start + range.count) as usize;
        &self.points[start..end]
    }

    pub fn polyline_points_mut(&mut self, range: PolylineShape) -> &mut [Vec2] {
        let start = range.start as usize;
        let end = (range.start + range.count) as usize;
        &mut self.points[start..end]
    }

    /// Rebuild the point pool from live polylines, rewriting each range.
    /// Ranges orphaned by deletions are dropped. Call after delete-heavy
    /// commits; never required for correctness between calls.
    pub fn compact_points(&mut self) {
        let mut fresh: Vec<Vec2> = Vec::with_capacity(self.points.len());
        let ids: Vec<EntityId> = self.order.clone();
        for id in ids {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            let Shape::Polyline(range) = entity.shape else {
                continue;
            };
            let start = fresh.len() as u32;
            let src = range.start as usize..(range.start + range.count) as usize;
            fresh.extend_from_slice(&self.points[src]);
            if let Some(Shape::Polyline(r)) = self.entities.get_mut(&id).map(|e| &mut e.shape) {
                r.start = start;
            }
        }
        self.points = fresh;
    }

    // --- digest ---

    /// Stable FNV-1a digest over every record, in draw order. Two
    /// documents with identical content hash identically; any scalar or
    /// point mutation moves the digest.
    pub fn digest(&self) -> u64 {
        let mut h = Fnv::new();
        for &id in &self.order {
            let Some(e) = self.entities.get(&id) else {
                continue;
            };
            h.write_u32(id);
            h.write_u32(e.layer);
            h.write_u32(e.visible as u32 + ((e.locked as u32) << 1));
            hash_style(&mut h, e);
            match &e.shape {
                Shape::Rect(r) => h.write_f32s(&[r.x, r.y, r.w, r.h, r.rot]),
                Shape::Circle(c) => h.write_f32s(&[c.cx, c.cy, c.rx, c.ry, c.rot]),
                Shape::Polygon(p) => {
                    h.write_f32s(&[p.cx, p.cy, p.rx, p.ry, p.rot]);
                    h.write_u32(p.sides);
                }
                Shape::Line(l) => h.write_f32s(&[l.a.x, l.a.y, l.b.x, l.b.y]),
                Shape::Arrow(a) => h.write_f32s(&[a.a.x, a.a.y, a.b.x, a.b.y, a.head_size]),
                Shape::Polyline(range) => {
                    for p in self.polyline_points(*range) {
                        h.write_f32s(&[p.x, p.y]);
                    }
                }
                Shape::Text(t) => {
                    h.write_f32s(&[t.x, t.y, t.rot, t.size]);
                    for b in t.content.bytes() {
                        h.write_u32(b as u32);
                    }
                }
            }
        }
        h.finish()
    }

    /// Kinds currently present, mostly a debugging aid.
    pub fn kind_counts(&self) -> FxHashMap<EntityKind, usize> {
        let mut counts = FxHashMap::default();
        for e in self.entities.values() {
            *counts.entry(e.kind()).or_insert(0) += 1;
        }
        counts
    }
}

fn hash_style(h: &mut Fnv, e: &Entity) {
    h.write_f32s(&e.style.stroke);
    h.write_f32s(&e.style.fill);
    h.write_f32s(&[e.style.stroke_width_px]);
    let bits = e.style.stroke_enabled as u32
        | (e.style.fill_enabled as u32) << 1
        | (e.style.stroke_by_layer as u32) << 2
        | (e.style.fill_by_layer as u32) << 3;
    h.write_u32(bits);
}

struct Fnv(u64);

impl Fnv {
    fn new() -> Self {
        Fnv(0xcbf2_9ce4_8422_2325)
    }

    fn write_u32(&mut self, v: u32) {
        for b in v.to_le_bytes() {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    fn write_f32s(&mut self, vs: &[f32]) {
        for v in vs {
            self.write_u32(v.to_bits());
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}
