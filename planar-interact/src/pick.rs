//! Narrow-phase hit testing. A world-space probe is resolved against every
//! broad-phase candidate into at most one `PickCandidate` per entity, and
//! the best candidate overall wins by sub-target priority, then z-order,
//! then distance.

use bitflags::bitflags;
use glam::Vec2;
use planar_math::{point_segment_distance, rotate_around, ROT_EPS};
use planar_scene::{Document, Entity, EntityId, EntityKind, Shape, TextMeasure};

use crate::bounds::{contains_point, edge_segments, natural_vertices, obb_corners};
use crate::spatial_hash::SpatialHashGrid;

/// Rotate grips sit this many screen pixels diagonally outside each corner.
pub const ROTATE_HANDLE_OFFSET_PX: f32 = 15.0;
/// Hit radius of a rotate grip, screen pixels.
pub const ROTATE_HANDLE_RADIUS_PX: f32 = 10.0;
/// Radii below this never produce a hit.
pub const DEGENERATE_RADIUS: f32 = 1e-6;

bitflags! {
    /// Which sub-targets a pick call considers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PickMask: u32 {
        const BODY = 1 << 0;
        const EDGE = 1 << 1;
        const VERTEX = 1 << 2;
        const HANDLES = 1 << 3;
        const TEXT_CARET = 1 << 4;
    }
}

impl PickMask {
    /// Plain entity picking: no grips, no caret.
    pub fn body_edge_vertex() -> Self {
        PickMask::BODY | PickMask::EDGE | PickMask::VERTEX
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickSubTarget {
    None,
    Body,
    TextBody,
    Edge,
    TextCaret,
    Vertex,
    RotateHandle,
    ResizeHandle,
}

impl PickSubTarget {
    pub fn priority(&self) -> u32 {
        match self {
            PickSubTarget::ResizeHandle => 10,
            PickSubTarget::RotateHandle => 9,
            PickSubTarget::Vertex | PickSubTarget::TextCaret => 8,
            PickSubTarget::Edge => 5,
            PickSubTarget::Body | PickSubTarget::TextBody => 1,
            PickSubTarget::None => 0,
        }
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, PickSubTarget::ResizeHandle | PickSubTarget::RotateHandle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickCandidate {
    pub id: EntityId,
    pub kind: EntityKind,
    pub sub_target: PickSubTarget,
    pub sub_index: i32,
    pub distance: f32,
    pub z_index: u32,
}

impl PickCandidate {
    /// Strict total order: higher sub-target priority, then higher z, then
    /// smaller distance, then smaller id.
    pub fn better_than(&self, other: &PickCandidate) -> bool {
        let (pa, pb) = (self.sub_target.priority(), other.sub_target.priority());
        if pa != pb {
            return pa > pb;
        }
        if self.z_index != other.z_index {
            return self.z_index > other.z_index;
        }
        if self.distance != other.distance {
            return self.distance < other.distance;
        }
        self.id < other.id
    }
}

/// Per-call diagnostics, refreshed on every `pick_ex`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PickStats {
    pub candidates_checked: u32,
    pub cells_queried: u32,
}

/// Resolve a world-space probe. `tolerance` is in world units; handle
/// geometry additionally depends on `view_scale` because grips have a
/// fixed screen-space size.
#[allow(clippy::too_many_arguments)]
pub fn pick_ex(
    doc: &Document,
    grid: &SpatialHashGrid,
    text: &dyn TextMeasure,
    probe: Vec2,
    tolerance: f32,
    view_scale: f32,
    mask: PickMask,
    stats: &mut PickStats,
) -> Option<PickCandidate> {
    *stats = PickStats::default();

    // Rotate grips live outside the entity AABB; widen the broad phase to
    // reach them when handles are in play.
    let mut reach = tolerance;
    if mask.contains(PickMask::HANDLES) {
        reach += (ROTATE_HANDLE_OFFSET_PX + ROTATE_HANDLE_RADIUS_PX) / view_scale;
    }

    let mut ids = Vec::new();
    stats.cells_queried = grid.query_point(probe, reach, &mut ids) as u32;
    ids.sort_unstable();
    ids.dedup();

    let mut best: Option<PickCandidate> = None;
    for id in ids {
        if !doc.is_pickable(id) {
            continue;
        }
        let Some(entity) = doc.get(id) else {
            continue;
        };
        if degenerate(entity) {
            continue;
        }
        let z_index = doc.z_index(id).unwrap_or(0);
        stats.candidates_checked += 1;

        let Some(candidate) =
            candidate_for(doc, entity, text, probe, tolerance, view_scale, mask, z_index)
        else {
            continue;
        };
        // Grips dominate everything else outright.
        if candidate.sub_target.is_handle() {
            return Some(candidate);
        }
        match &best {
            Some(b) if !candidate.better_than(b) => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Plain entity pick: body/edge/vertex only, best id or none.
pub fn pick(
    doc: &Document,
    grid: &SpatialHashGrid,
    text: &dyn TextMeasure,
    probe: Vec2,
    tolerance: f32,
    view_scale: f32,
    stats: &mut PickStats,
) -> Option<EntityId> {
    pick_ex(
        doc,
        grid,
        text,
        probe,
        tolerance,
        view_scale,
        PickMask::body_edge_vertex(),
        stats,
    )
    .map(|c| c.id)
}

fn degenerate(entity: &Entity) -> bool {
    match &entity.shape {
        Shape::Circle(c) => c.rx < DEGENERATE_RADIUS || c.ry < DEGENERATE_RADIUS,
        Shape::Polygon(p) => p.rx < DEGENERATE_RADIUS || p.ry < DEGENERATE_RADIUS,
        _ => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn candidate_for(
    doc: &Document,
    entity: &Entity,
    text: &dyn TextMeasure,
    probe: Vec2,
    tolerance: f32,
    view_scale: f32,
    mask: PickMask,
    z_index: u32,
) -> Option<PickCandidate> {
    let make = |sub_target, sub_index, distance| PickCandidate {
        id: entity.id,
        kind: entity.kind(),
        sub_target,
        sub_index,
        distance,
        z_index,
    };

    if mask.contains(PickMask::HANDLES) {
        if let Some(corners) = obb_corners(entity, text) {
            if let Some((i, d)) = nearest_within(&corners, probe, tolerance) {
                return Some(make(PickSubTarget::ResizeHandle, i as i32, d));
            }
            let center = (corners[0] + corners[2]) * 0.5;
            let offset = ROTATE_HANDLE_OFFSET_PX / view_scale;
            let radius = ROTATE_HANDLE_RADIUS_PX / view_scale;
            for (i, corner) in corners.iter().enumerate() {
                let dir = (*corner - center).normalize_or_zero();
                let grip = *corner + dir * offset;
                let d = probe.distance(grip);
                if d <= radius {
                    return Some(make(PickSubTarget::RotateHandle, i as i32, d));
                }
            }
        }
    }

    if let Shape::Text(t) = &entity.shape {
        // Text resolves by its layout box alone.
        if text.bounds(t).contains(probe) {
            if mask.contains(PickMask::TEXT_CARET) {
                // Caret index is owned by the layout collaborator; the core
                // threads it through opaquely.
                return Some(make(PickSubTarget::TextCaret, 0, 0.0));
            }
            if mask.contains(PickMask::BODY) {
                return Some(make(PickSubTarget::TextBody, -1, 0.0));
            }
        }
        return None;
    }

    let mut best: Option<PickCandidate> = None;
    let mut merge = |candidate: PickCandidate| match &best {
        Some(b) if !candidate.better_than(b) => {}
        _ => best = Some(candidate),
    };

    if mask.contains(PickMask::VERTEX) {
        let mut verts = Vec::new();
        natural_vertices(doc, entity, text, &mut verts);
        if let Some((i, d)) = nearest_within(&verts, probe, tolerance) {
            merge(make(PickSubTarget::Vertex, i as i32, d));
        }
    }

    if mask.contains(PickMask::EDGE) {
        let pad = doc.stroke_width_px(entity.id) / (2.0 * view_scale);
        if let Some((i, d)) = edge_distance(doc, entity, text, probe) {
            if d <= tolerance + pad {
                merge(make(PickSubTarget::Edge, i, d));
            }
        }
    }

    if mask.contains(PickMask::BODY)
        && doc.fill_enabled(entity.id)
        && contains_point(entity, text, probe)
    {
        merge(make(PickSubTarget::Body, -1, 0.0));
    }

    best
}

fn nearest_within(points: &[Vec2], probe: Vec2, tolerance: f32) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, p) in points.iter().enumerate() {
        let d = probe.distance(*p);
        if d <= tolerance && best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best
}

/// Distance to the nearest edge, with the owning segment index. Rects use
/// interior distance when the probe is inside the OBB; ellipses use the
/// analytic contour distance.
fn edge_distance(
    doc: &Document,
    entity: &Entity,
    text: &dyn TextMeasure,
    probe: Vec2,
) -> Option<(i32, f32)> {
    match &entity.shape {
        Shape::Rect(r) => {
            let center = r.center();
            let local = rotate_around(probe, center, -r.rot) - center;
            let (hw, hh) = (r.w * 0.5, r.h * 0.5);
            if local.x.abs() <= hw && local.y.abs() <= hh {
                // Inside: distance to each of the four edges, S/E/N/W.
                let d = [hh + local.y, hw - local.x, hh - local.y, hw + local.x];
                let (i, dist) = d
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, v)| (i, *v))?;
                Some((i as i32, dist))
            } else {
                segment_edge_distance(doc, entity, text, probe)
            }
        }
        Shape::Circle(c) => {
            let center = c.center();
            let local = rotate_around(probe, center, -c.rot) - center;
            let q = Vec2::new(local.x / c.rx, local.y / c.ry);
            let len = q.length();
            if len < ROT_EPS {
                return Some((0, c.rx.min(c.ry)));
            }
            // Contour point along the probe direction in normalized space.
            let contour = local / len;
            Some((0, probe_distance(local, contour)))
        }
        _ => segment_edge_distance(doc, entity, text, probe),
    }
}

fn probe_distance(local: Vec2, contour: Vec2) -> f32 {
    (local - contour).length()
}

fn segment_edge_distance(
    doc: &Document,
    entity: &Entity,
    text: &dyn TextMeasure,
    probe: Vec2,
) -> Option<(i32, f32)> {
    let mut segments = Vec::new();
    edge_segments(doc, entity, text, &mut segments);
    let mut best: Option<(i32, f32)> = None;
    for (i, (a, b)) in segments.iter().enumerate() {
        let d = point_segment_distance(probe, *a, *b);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i as i32, d));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::entity_aabb;
    use planar_scene::{CircleShape, GlyphBoxMeasure, LineShape, RectShape, Style};

    struct Fixture {
        doc: Document,
        grid: SpatialHashGrid,
        text: GlyphBoxMeasure,
        stats: PickStats,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                doc: Document::new(),
                grid: SpatialHashGrid::default(),
                text: GlyphBoxMeasure::default(),
                stats: PickStats::default(),
            }
        }

        fn add(&mut self, mut entity: Entity) {
            entity.id = if entity.id == 0 { self.doc.allocate_id() } else { entity.id };
            let id = entity.id;
            self.doc.upsert(entity);
            let aabb = entity_aabb(&self.doc, self.doc.get(id).unwrap(), &self.text);
            self.grid.insert(id, &aabb);
        }

        fn pick_at(&mut self, x: f32, y: f32, mask: PickMask) -> Option<PickCandidate> {
            pick_ex(
                &self.doc,
                &self.grid,
                &self.text,
                Vec2::new(x, y),
                3.0,
                1.0,
                mask,
                &mut self.stats,
            )
        }
    }

    fn rect(id: EntityId, x: f32, y: f32, w: f32, h: f32) -> Entity {
        Entity::new(
            id,
            Shape::Rect(RectShape {
                x,
                y,
                w,
                h,
                rot: 0.0,
            }),
        )
    }

    #[test]
    fn corner_prefers_resize_handle_over_vertex_over_edge() {
        let mut f = Fixture::new();
        f.add(rect(1, 0.0, 0.0, 20.0, 20.0));

        let all = PickMask::all();
        let hit = f.pick_at(0.0, 0.0, all).unwrap();
        assert_eq!(hit.sub_target, PickSubTarget::ResizeHandle);
        assert_eq!(hit.sub_index, 3, "top-left corner grip");

        let no_handles = PickMask::body_edge_vertex();
        let hit = f.pick_at(0.0, 0.0, no_handles).unwrap();
        assert_eq!(hit.sub_target, PickSubTarget::Vertex);

        let edges_only = PickMask::EDGE;
        let hit = f.pick_at(0.0, 0.0, edges_only).unwrap();
        assert_eq!(hit.sub_target, PickSubTarget::Edge);
    }

    #[test]
    fn rotate_handle_sits_outside_the_corner() {
        let mut f = Fixture::new();
        f.add(rect(1, 0.0, 0.0, 20.0, 20.0));
        // TR corner is (20, 0); the grip is ~10.6px out along the diagonal.
        let grip = Vec2::new(20.0, 0.0)
            + (Vec2::new(20.0, 0.0) - Vec2::new(10.0, -10.0)).normalize() * 15.0;
        let hit = f.pick_at(grip.x, grip.y, PickMask::all()).unwrap();
        assert_eq!(hit.sub_target, PickSubTarget::RotateHandle);
        assert_eq!(hit.sub_index, 2);
    }

    #[test]
    fn body_needs_effective_fill() {
        let mut f = Fixture::new();
        let mut e = rect(1, 0.0, 0.0, 20.0, 20.0);
        e.style = Style {
            fill_enabled: false,
            ..Style::default()
        };
        f.add(e);
        assert!(f.pick_at(10.0, -10.0, PickMask::BODY).is_none());

        f.doc.get_mut(1).unwrap().style.fill_enabled = true;
        let hit = f.pick_at(10.0, -10.0, PickMask::BODY).unwrap();
        assert_eq!(hit.sub_target, PickSubTarget::Body);
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn z_order_breaks_body_ties() {
        let mut f = Fixture::new();
        for id in [1, 2] {
            let mut e = rect(id, 0.0, 0.0, 20.0, 20.0);
            e.style.fill_enabled = true;
            f.add(e);
        }
        let hit = f.pick_at(10.0, -10.0, PickMask::BODY).unwrap();
        assert_eq!(hit.id, 2, "later draw order wins");
    }

    #[test]
    fn stroke_width_widens_edge_tolerance() {
        let mut f = Fixture::new();
        let mut e = Entity::new(
            1,
            Shape::Line(LineShape {
                a: Vec2::ZERO,
                b: Vec2::new(100.0, 0.0),
            }),
        );
        e.style.stroke_width_px = 12.0;
        f.add(e);
        // 8 units off the line: outside the 3.0 tolerance, inside 3 + 12/2.
        let hit = f.pick_at(50.0, 8.0, PickMask::EDGE);
        assert!(hit.is_some());
        assert!(f.pick_at(50.0, 10.0, PickMask::EDGE).is_none());
    }

    #[test]
    fn ellipse_edge_distance_is_analytic() {
        let mut f = Fixture::new();
        f.add(Entity::new(
            1,
            Shape::Circle(CircleShape {
                cx: 0.0,
                cy: 0.0,
                rx: 10.0,
                ry: 10.0,
                rot: 0.0,
            }),
        ));
        let hit = f.pick_at(12.0, 0.0, PickMask::EDGE).unwrap();
        assert_eq!(hit.sub_target, PickSubTarget::Edge);
        assert!((hit.distance - 2.0).abs() < 1e-4);
        assert!(f.pick_at(20.0, 0.0, PickMask::EDGE).is_none());
    }

    #[test]
    fn degenerate_radii_never_hit() {
        let mut f = Fixture::new();
        f.add(Entity::new(
            1,
            Shape::Circle(CircleShape {
                cx: 0.0,
                cy: 0.0,
                rx: 1e-7,
                ry: 10.0,
                rot: 0.0,
            }),
        ));
        assert!(f.pick_at(0.0, 0.0, PickMask::all()).is_none());
    }

    #[test]
    fn hidden_and_locked_entities_are_skipped() {
        let mut f = Fixture::new();
        let mut e = rect(1, 0.0, 0.0, 20.0, 20.0);
        e.style.fill_enabled = true;
        f.add(e);
        f.doc.get_mut(1).unwrap().visible = false;
        assert!(f.pick_at(10.0, -10.0, PickMask::all()).is_none());
    }

    #[test]
    fn stats_track_narrow_phase_work() {
        let mut f = Fixture::new();
        f.add(rect(1, 0.0, 0.0, 20.0, 20.0));
        f.add(rect(2, 100.0, 0.0, 20.0, 20.0));
        f.pick_at(10.0, -10.0, PickMask::body_edge_vertex());
        assert!(f.stats.cells_queried > 0);
        assert_eq!(f.stats.candidates_checked, 1);
    }
}
