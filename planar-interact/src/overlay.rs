//! Overlay meta producers: world-space outline, grip and snap-visual
//! primitives for the front-end, published as a primitive descriptor array
//! over one flat `f32` buffer. Offsets are in floats, counts in points.

use glam::Vec2;
use planar_scene::{Document, EntityId, Shape, TextMeasure};

use crate::bounds::{natural_vertices, obb_corners};
use crate::snap::{SnapGuide, SnapHit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OverlayKind {
    /// Closed polyline.
    Polygon = 0,
    /// Open strip of two or more points.
    Segment = 1,
    Point = 2,
}

/// Wire-stable descriptor into the flat data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPrimitive {
    pub kind: u16,
    pub offset: u32,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct OverlayBuffer {
    pub prims: Vec<OverlayPrimitive>,
    pub data: Vec<f32>,
}

impl OverlayBuffer {
    pub fn clear(&mut self) {
        self.prims.clear();
        self.data.clear();
    }

    pub fn push(&mut self, kind: OverlayKind, points: &[Vec2]) {
        if points.is_empty() {
            return;
        }
        let offset = self.data.len() as u32;
        for p in points {
            self.data.push(p.x);
            self.data.push(p.y);
        }
        self.prims.push(OverlayPrimitive {
            kind: kind as u16,
            offset,
            count: points.len() as u32,
        });
    }
}

/// One outline primitive per selected entity: the rotated OBB for rects,
/// the true contour for polygons (ellipses fall back to their OBB), the
/// point strip for linear kinds, the layout box for text.
pub fn selection_outline(
    doc: &Document,
    text: &dyn TextMeasure,
    selection: &[EntityId],
    out: &mut OverlayBuffer,
) {
    out.clear();
    let mut scratch = Vec::new();
    for &id in selection {
        let Some(entity) = doc.get(id) else {
            continue;
        };
        match &entity.shape {
            Shape::Rect(_) | Shape::Circle(_) | Shape::Text(_) => {
                if let Some(corners) = obb_corners(entity, text) {
                    out.push(OverlayKind::Polygon, &corners);
                }
            }
            Shape::Polygon(p) => {
                scratch.clear();
                for i in 0..p.sides {
                    scratch.push(p.vertex(i));
                }
                out.push(OverlayKind::Polygon, &scratch);
            }
            Shape::Line(l) => out.push(OverlayKind::Segment, &[l.a, l.b]),
            Shape::Arrow(a) => out.push(OverlayKind::Segment, &[a.a, a.b]),
            Shape::Polyline(range) => {
                out.push(OverlayKind::Segment, doc.polyline_points(*range));
            }
        }
    }
}

/// One grip primitive per selected entity, enumerating the vertex grips in
/// the order picking assigns sub indices. Kinds without natural vertices
/// (circle, text) expose their OBB corners instead.
pub fn selection_handles(
    doc: &Document,
    text: &dyn TextMeasure,
    selection: &[EntityId],
    out: &mut OverlayBuffer,
) {
    out.clear();
    let mut grips = Vec::new();
    for &id in selection {
        let Some(entity) = doc.get(id) else {
            continue;
        };
        grips.clear();
        natural_vertices(doc, entity, text, &mut grips);
        if grips.is_empty() {
            if let Some(corners) = obb_corners(entity, text) {
                grips.extend_from_slice(&corners);
            }
        }
        out.push(OverlayKind::Point, &grips);
    }
}

/// Current snap guides and hit markers.
pub fn snap_overlay(guides: &[SnapGuide], hits: &[SnapHit], out: &mut OverlayBuffer) {
    out.clear();
    for guide in guides {
        out.push(OverlayKind::Segment, &[guide.a, guide.b]);
    }
    let positions: Vec<Vec2> = hits.iter().map(|h| h.pos).collect();
    out.push(OverlayKind::Point, &positions);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snap::SnapKind;
    use planar_scene::{Entity, GlyphBoxMeasure, LineShape, PolygonShape, RectShape};

    #[test]
    fn buffer_layout_is_offset_consistent() {
        let mut out = OverlayBuffer::default();
        out.push(OverlayKind::Polygon, &[Vec2::ZERO, Vec2::X, Vec2::Y]);
        out.push(OverlayKind::Point, &[Vec2::new(5.0, 6.0)]);
        assert_eq!(out.prims.len(), 2);
        assert_eq!(out.prims[0].offset, 0);
        assert_eq!(out.prims[0].count, 3);
        assert_eq!(out.prims[1].offset, 6);
        assert_eq!(out.prims[1].count, 1);
        assert_eq!(out.data.len(), 8);
        assert_eq!(out.data[6], 5.0);
    }

    #[test]
    fn outline_emits_one_primitive_per_selected_entity() {
        let mut doc = Document::new();
        let text = GlyphBoxMeasure::default();
        doc.upsert(Entity::new(
            1,
            Shape::Rect(RectShape {
                x: 0.0,
                y: 0.0,
                w: 10.0,
                h: 10.0,
                rot: 0.0,
            }),
        ));
        doc.upsert(Entity::new(
            2,
            Shape::Polygon(PolygonShape {
                cx: 50.0,
                cy: 0.0,
                rx: 5.0,
                ry: 5.0,
                rot: 0.0,
                sides: 5,
            }),
        ));
        let mut out = OverlayBuffer::default();
        selection_outline(&doc, &text, &[1, 2], &mut out);
        assert_eq!(out.prims.len(), 2);
        assert_eq!(out.prims[0].count, 4);
        assert_eq!(out.prims[1].count, 5);
        assert_eq!(out.prims[1].kind, OverlayKind::Polygon as u16);
    }

    #[test]
    fn handles_enumerate_vertex_grips_in_pick_order() {
        let mut doc = Document::new();
        let text = GlyphBoxMeasure::default();
        doc.upsert(Entity::new(
            1,
            Shape::Line(LineShape {
                a: Vec2::ZERO,
                b: Vec2::new(10.0, 0.0),
            }),
        ));
        let mut out = OverlayBuffer::default();
        selection_handles(&doc, &text, &[1], &mut out);
        assert_eq!(out.prims.len(), 1);
        assert_eq!(out.prims[0].kind, OverlayKind::Point as u16);
        assert_eq!(out.prims[0].count, 2);
        assert_eq!(&out.data[..2], &[0.0, 0.0]);
        assert_eq!(&out.data[2..4], &[10.0, 0.0]);
    }

    #[test]
    fn snap_overlay_carries_guides_then_hits() {
        let guides = [SnapGuide {
            a: Vec2::new(30.0, -100.0),
            b: Vec2::new(30.0, 100.0),
        }];
        let hits = [SnapHit {
            kind: SnapKind::Endpoint,
            pos: Vec2::new(30.0, 0.0),
        }];
        let mut out = OverlayBuffer::default();
        snap_overlay(&guides, &hits, &mut out);
        assert_eq!(out.prims.len(), 2);
        assert_eq!(out.prims[0].kind, OverlayKind::Segment as u16);
        assert_eq!(out.prims[1].kind, OverlayKind::Point as u16);
    }
}
