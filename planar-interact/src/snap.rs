//! Object and grid snapping. Given a moving group's base AABB and a
//! proposed delta, each axis is independently nudged toward the best
//! nearby alignment: AABB edges, centers, natural endpoints, and edge
//! midpoints of stationary entities. The winning alignments come back as
//! viewport-spanning guides plus up to two snap hit markers.

use glam::Vec2;
use planar_math::Aabb;
use planar_scene::{Document, EntityId, TextMeasure};
use serde::{Deserialize, Serialize};

use crate::bounds::{edge_segments, entity_aabb, natural_vertices};
use crate::config::{SnapOptions, ViewParams};
use crate::spatial_hash::SpatialHashGrid;

/// Hits snapped to the same point on both axes collapse into one marker
/// below this separation.
const HIT_MERGE_EPS: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapKind {
    Endpoint,
    Midpoint,
    Center,
    Nearest,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapHit {
    pub kind: SnapKind,
    pub pos: Vec2,
}

/// A straight visual guide in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapGuide {
    pub a: Vec2,
    pub b: Vec2,
}

#[derive(Debug, Clone)]
pub struct SnapQuery<'a> {
    /// Ids being dragged; excluded as snap sources.
    pub moving: &'a [EntityId],
    /// The group's pre-move AABB.
    pub base: Aabb,
    pub dx: f32,
    pub dy: f32,
    /// Axis participation; axis lock disables the orthogonal axis.
    pub snap_x: bool,
    pub snap_y: bool,
    pub view: ViewParams,
    /// Ctrl/Meta held: object snap off for this frame.
    pub suppress_object: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SnapResult {
    pub dx: f32,
    pub dy: f32,
    pub snapped_x: bool,
    pub snapped_y: bool,
    pub hits: Vec<SnapHit>,
    pub guides: Vec<SnapGuide>,
}

#[derive(Debug, Clone, Copy)]
struct AxisBest {
    delta: f32,
    value: f32,
    source: Option<Vec2>,
    kind: SnapKind,
}

/// Round to the nearest grid multiple.
pub fn grid_round(v: f32, size: f32) -> f32 {
    (v / size).round() * size
}

pub fn grid_snap_point(p: Vec2, size: f32) -> Vec2 {
    Vec2::new(grid_round(p.x, size), grid_round(p.y, size))
}

/// Resolve object snap for one frame. When nothing snaps, the input deltas
/// come back unchanged with no guides.
pub fn resolve(
    doc: &Document,
    grid: &SpatialHashGrid,
    text: &dyn TextMeasure,
    opts: &SnapOptions,
    query: &SnapQuery<'_>,
) -> SnapResult {
    let mut result = SnapResult {
        dx: query.dx,
        dy: query.dy,
        ..SnapResult::default()
    };
    if !opts.enabled || query.suppress_object || (!query.snap_x && !query.snap_y) {
        return result;
    }

    let tolerance = opts.tolerance_px / query.view.scale;
    let moved = query.base.translated(Vec2::new(query.dx, query.dy));

    let mut ids = Vec::new();
    grid.query(&moved.expanded(tolerance), &mut ids);
    ids.sort_unstable();
    ids.dedup();

    let mut targets_x = vec![moved.min.x, moved.max.x];
    let mut targets_y = vec![moved.min.y, moved.max.y];
    if opts.center_enabled {
        targets_x.push(moved.center().x);
        targets_y.push(moved.center().y);
    }

    let mut best_x: Option<AxisBest> = None;
    let mut best_y: Option<AxisBest> = None;
    let mut scratch: Vec<Vec2> = Vec::new();

    for id in ids {
        if query.moving.contains(&id) || !doc.is_pickable(id) {
            continue;
        }
        let Some(entity) = doc.get(id) else {
            continue;
        };
        let aabb = entity_aabb(doc, entity, text);

        if opts.nearest_enabled {
            for value in [aabb.min.x, aabb.max.x] {
                consider(&mut best_x, &targets_x, value, None, SnapKind::Nearest, tolerance);
            }
            for value in [aabb.min.y, aabb.max.y] {
                consider(&mut best_y, &targets_y, value, None, SnapKind::Nearest, tolerance);
            }
        }
        if opts.center_enabled {
            consider_point(&mut best_x, &mut best_y, &targets_x, &targets_y, aabb.center(), SnapKind::Center, tolerance);
        }
        if opts.endpoint_enabled {
            scratch.clear();
            natural_vertices(doc, entity, text, &mut scratch);
            for i in 0..scratch.len() {
                let p = scratch[i];
                consider_point(&mut best_x, &mut best_y, &targets_x, &targets_y, p, SnapKind::Endpoint, tolerance);
            }
        }
        if opts.midpoint_enabled {
            let mut segments = Vec::new();
            edge_segments(doc, entity, text, &mut segments);
            for (a, b) in segments {
                let mid = (a + b) * 0.5;
                consider_point(&mut best_x, &mut best_y, &targets_x, &targets_y, mid, SnapKind::Midpoint, tolerance);
            }
        }
    }

    if !query.snap_x {
        best_x = None;
    }
    if !query.snap_y {
        best_y = None;
    }

    let world = query.view.world_bounds();
    if let Some(best) = best_x {
        result.dx += best.delta;
        result.snapped_x = true;
        result.guides.push(SnapGuide {
            a: Vec2::new(best.value, world.min.y),
            b: Vec2::new(best.value, world.max.y),
        });
        if let Some(pos) = best.source {
            result.hits.push(SnapHit { kind: best.kind, pos });
        }
    }
    if let Some(best) = best_y {
        result.dy += best.delta;
        result.snapped_y = true;
        result.guides.push(SnapGuide {
            a: Vec2::new(world.min.x, best.value),
            b: Vec2::new(world.max.x, best.value),
        });
        if let Some(pos) = best.source {
            let duplicate = result
                .hits
                .first()
                .map_or(false, |h| h.pos.distance(pos) < HIT_MERGE_EPS);
            if !duplicate {
                result.hits.push(SnapHit { kind: best.kind, pos });
            }
        }
    }
    result
}

fn consider(
    best: &mut Option<AxisBest>,
    targets: &[f32],
    value: f32,
    source: Option<Vec2>,
    kind: SnapKind,
    tolerance: f32,
) {
    for &target in targets {
        let delta = value - target;
        if delta.abs() <= tolerance && best.map_or(true, |b| delta.abs() < b.delta.abs()) {
            *best = Some(AxisBest {
                delta,
                value,
                source,
                kind,
            });
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn consider_point(
    best_x: &mut Option<AxisBest>,
    best_y: &mut Option<AxisBest>,
    targets_x: &[f32],
    targets_y: &[f32],
    p: Vec2,
    kind: SnapKind,
    tolerance: f32,
) {
    consider(best_x, targets_x, p.x, Some(p), kind, tolerance);
    consider(best_y, targets_y, p.y, Some(p), kind, tolerance);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::entity_aabb;
    use planar_scene::{Entity, GlyphBoxMeasure, RectShape, Shape};

    fn view() -> ViewParams {
        ViewParams::new(0.0, 0.0, 1.0, 800.0, 600.0)
    }

    fn rect_doc() -> (Document, SpatialHashGrid, GlyphBoxMeasure) {
        let mut doc = Document::new();
        let mut grid = SpatialHashGrid::default();
        let text = GlyphBoxMeasure::default();
        for (id, x) in [(1u32, 0.0f32), (2, 30.0)] {
            doc.upsert(Entity::new(
                id,
                Shape::Rect(RectShape {
                    x,
                    y: 0.0,
                    w: 10.0,
                    h: 10.0,
                    rot: 0.0,
                }),
            ));
            let aabb = entity_aabb(&doc, doc.get(id).unwrap(), &text);
            grid.insert(id, &aabb);
        }
        (doc, grid, text)
    }

    fn opts(tolerance_px: f32) -> SnapOptions {
        SnapOptions {
            tolerance_px,
            grid_enabled: false,
            ..SnapOptions::default()
        }
    }

    #[test]
    fn moved_edge_snaps_to_neighbor_edge() {
        let (doc, grid, text) = rect_doc();
        let base = entity_aabb(&doc, doc.get(1).unwrap(), &text);
        let q = SnapQuery {
            moving: &[1],
            base,
            dx: 19.0,
            dy: 0.0,
            snap_x: true,
            snap_y: true,
            view: view(),
            suppress_object: false,
        };
        let r = resolve(&doc, &grid, &text, &opts(5.0), &q);
        // Right edge 29 pulls onto id=2's left edge at 30.
        assert!(r.snapped_x);
        assert!((r.dx - 20.0).abs() < 1e-5);
        let vertical = r
            .guides
            .iter()
            .find(|g| (g.a.x - g.b.x).abs() < 1e-6)
            .expect("vertical guide");
        assert!((vertical.a.x - 30.0).abs() < 1e-5);
    }

    #[test]
    fn out_of_tolerance_leaves_delta_unchanged() {
        let (doc, grid, text) = rect_doc();
        let base = entity_aabb(&doc, doc.get(1).unwrap(), &text);
        let q = SnapQuery {
            moving: &[1],
            base,
            dx: 12.0,
            dy: 0.0,
            snap_x: true,
            snap_y: true,
            view: view(),
            suppress_object: false,
        };
        let r = resolve(&doc, &grid, &text, &opts(5.0), &q);
        assert!(!r.snapped_x);
        assert_eq!(r.dx, 12.0);
        assert!(r.guides.is_empty());
    }

    #[test]
    fn suppression_flag_disables_object_snap() {
        let (doc, grid, text) = rect_doc();
        let base = entity_aabb(&doc, doc.get(1).unwrap(), &text);
        let q = SnapQuery {
            moving: &[1],
            base,
            dx: 19.0,
            dy: 0.0,
            snap_x: true,
            snap_y: true,
            view: view(),
            suppress_object: true,
        };
        let r = resolve(&doc, &grid, &text, &opts(5.0), &q);
        assert!(!r.snapped_x);
        assert_eq!(r.dx, 19.0);
    }

    #[test]
    fn endpoint_snap_emits_a_hit_marker() {
        let (doc, grid, text) = rect_doc();
        let base = entity_aabb(&doc, doc.get(1).unwrap(), &text);
        // Aim both axes at id=2's near corner (30, -10).
        let q = SnapQuery {
            moving: &[1],
            base,
            dx: 19.5,
            dy: 0.3,
            snap_x: true,
            snap_y: true,
            view: view(),
            suppress_object: false,
        };
        let mut options = opts(5.0);
        options.nearest_enabled = false;
        options.center_enabled = false;
        options.midpoint_enabled = false;
        let r = resolve(&doc, &grid, &text, &options, &q);
        assert!(r.snapped_x && r.snapped_y);
        // Both axes resolved to the same corner: one merged hit.
        assert_eq!(r.hits.len(), 1);
        assert_eq!(r.hits[0].kind, SnapKind::Endpoint);
        assert!(r.hits[0].pos.distance(Vec2::new(30.0, -10.0)) < 1e-4);
    }

    #[test]
    fn axis_lock_disables_one_axis() {
        let (doc, grid, text) = rect_doc();
        let base = entity_aabb(&doc, doc.get(1).unwrap(), &text);
        let q = SnapQuery {
            moving: &[1],
            base,
            dx: 19.0,
            dy: 0.0,
            snap_x: false,
            snap_y: true,
            view: view(),
            suppress_object: false,
        };
        let r = resolve(&doc, &grid, &text, &opts(5.0), &q);
        assert!(!r.snapped_x);
        assert_eq!(r.dx, 19.0);
    }

    #[test]
    fn grid_round_is_exact_on_multiples() {
        assert_eq!(grid_round(19.0, 10.0), 20.0);
        assert_eq!(grid_round(-7.4, 5.0), -5.0);
        assert_eq!(grid_snap_point(Vec2::new(12.0, -13.0), 5.0), Vec2::new(10.0, -15.0));
    }
}
