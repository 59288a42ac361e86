//! Per-kind world-space geometry derivation: conservative AABBs for the
//! spatial index, OBB corners and side midpoints for grips, natural
//! vertices and edge segments for picking and snapping, containment tests
//! for body hits.

use glam::Vec2;
use planar_math::{ellipse_extent, rotate_around, Aabb, ROT_EPS};
use planar_scene::{Document, Entity, Shape, TextMeasure};

/// Conservative AABB for any entity. Guaranteed to contain the true
/// (possibly rotated) extent.
pub fn entity_aabb(doc: &Document, entity: &Entity, text: &dyn TextMeasure) -> Aabb {
    match &entity.shape {
        Shape::Rect(r) => {
            let center = r.center();
            if r.rot.abs() < ROT_EPS {
                Aabb::from_center_half_extents(center, Vec2::new(r.w * 0.5, r.h * 0.5))
            } else {
                // Half-diagonal radius covers the OBB under any rotation.
                let radius = 0.5 * (r.w * r.w + r.h * r.h).sqrt();
                Aabb::from_center_half_extents(center, Vec2::splat(radius))
            }
        }
        Shape::Circle(c) => {
            Aabb::from_center_half_extents(c.center(), ellipse_extent(c.rx, c.ry, c.rot))
        }
        // Tight envelope of the circumscribed ellipse.
        Shape::Polygon(p) => {
            Aabb::from_center_half_extents(p.center(), ellipse_extent(p.rx, p.ry, p.rot))
        }
        Shape::Line(l) => Aabb::from_points(&[l.a, l.b]),
        Shape::Arrow(a) => Aabb::from_points(&[a.a, a.b]).expanded(a.head_size),
        Shape::Polyline(range) => Aabb::from_points(doc.polyline_points(*range)),
        Shape::Text(t) => text.bounds(t),
    }
}

/// OBB corners in world space, ordered `0=BL, 1=BR, 2=TR, 3=TL` in the
/// entity's Y-up local frame. Linear kinds have no OBB and return `None`.
pub fn obb_corners(entity: &Entity, text: &dyn TextMeasure) -> Option<[Vec2; 4]> {
    let (center, half, rot) = match &entity.shape {
        Shape::Rect(r) => (r.center(), Vec2::new(r.w * 0.5, r.h * 0.5), r.rot),
        Shape::Circle(c) => (c.center(), Vec2::new(c.rx, c.ry), c.rot),
        Shape::Polygon(p) => (p.center(), Vec2::new(p.rx, p.ry), p.rot),
        Shape::Text(t) => {
            let b = text.bounds(t);
            (b.center(), b.half_extents(), 0.0)
        }
        _ => return None,
    };
    Some(corners_of(center, half, rot))
}

pub fn corners_of(center: Vec2, half: Vec2, rot: f32) -> [Vec2; 4] {
    let local = [
        Vec2::new(-half.x, -half.y),
        Vec2::new(half.x, -half.y),
        Vec2::new(half.x, half.y),
        Vec2::new(-half.x, half.y),
    ];
    local.map(|o| rotate_around(center + o, center, rot))
}

/// Side midpoints of an OBB, ordered `0=S, 1=E, 2=N, 3=W` to match the
/// side-resize sub indices. Opposite side of `i` is `(i+2)%4`.
pub fn side_midpoints(corners: &[Vec2; 4]) -> [Vec2; 4] {
    [
        (corners[0] + corners[1]) * 0.5,
        (corners[1] + corners[2]) * 0.5,
        (corners[2] + corners[3]) * 0.5,
        (corners[3] + corners[0]) * 0.5,
    ]
}

/// Natural vertices in sub-index order: rect corners, line/arrow endpoints,
/// every polyline point, the N polygon vertices. Circles and text have
/// none.
pub fn natural_vertices(doc: &Document, entity: &Entity, text: &dyn TextMeasure, out: &mut Vec<Vec2>) {
    match &entity.shape {
        Shape::Rect(_) => {
            if let Some(corners) = obb_corners(entity, text) {
                out.extend_from_slice(&corners);
            }
        }
        Shape::Polygon(p) => {
            for i in 0..p.sides {
                out.push(p.vertex(i));
            }
        }
        Shape::Line(l) => out.extend_from_slice(&[l.a, l.b]),
        Shape::Arrow(a) => out.extend_from_slice(&[a.a, a.b]),
        Shape::Polyline(range) => out.extend_from_slice(doc.polyline_points(*range)),
        Shape::Circle(_) | Shape::Text(_) => {}
    }
}

/// Edge segments in sub-index order. The elliptical contour of a circle is
/// not a segment list; picking handles it analytically.
pub fn edge_segments(
    doc: &Document,
    entity: &Entity,
    text: &dyn TextMeasure,
    out: &mut Vec<(Vec2, Vec2)>,
) {
    match &entity.shape {
        Shape::Rect(_) => {
            if let Some(c) = obb_corners(entity, text) {
                out.extend_from_slice(&[(c[0], c[1]), (c[1], c[2]), (c[2], c[3]), (c[3], c[0])]);
            }
        }
        Shape::Polygon(p) => {
            for i in 0..p.sides {
                out.push((p.vertex(i), p.vertex((i + 1) % p.sides)));
            }
        }
        Shape::Line(l) => out.push((l.a, l.b)),
        Shape::Arrow(a) => out.push((a.a, a.b)),
        Shape::Polyline(range) => {
            let pts = doc.polyline_points(*range);
            for pair in pts.windows(2) {
                out.push((pair[0], pair[1]));
            }
        }
        Shape::Circle(_) | Shape::Text(_) => {}
    }
}

/// True containment test used for body hits. Open kinds (line, polyline,
/// arrow) have no interior.
pub fn contains_point(entity: &Entity, text: &dyn TextMeasure, p: Vec2) -> bool {
    match &entity.shape {
        Shape::Rect(r) => {
            let local = rotate_around(p, r.center(), -r.rot) - r.center();
            local.x.abs() <= r.w * 0.5 && local.y.abs() <= r.h * 0.5
        }
        Shape::Circle(c) => {
            if c.rx < ROT_EPS || c.ry < ROT_EPS {
                return false;
            }
            let local = rotate_around(p, c.center(), -c.rot) - c.center();
            let nx = local.x / c.rx;
            let ny = local.y / c.ry;
            nx * nx + ny * ny <= 1.0
        }
        Shape::Polygon(poly) => {
            let mut verts = Vec::with_capacity(poly.sides as usize);
            for i in 0..poly.sides {
                verts.push(poly.vertex(i));
            }
            point_in_polygon(p, &verts)
        }
        Shape::Text(t) => text.bounds(t).contains(p),
        Shape::Line(_) | Shape::Arrow(_) | Shape::Polyline(_) => false,
    }
}

/// Even-odd ray cast.
fn point_in_polygon(p: Vec2, verts: &[Vec2]) -> bool {
    let mut inside = false;
    let n = verts.len();
    let mut j = n - 1;
    for i in 0..n {
        let a = verts[i];
        let b = verts[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use planar_scene::{CircleShape, GlyphBoxMeasure, LineShape, PolygonShape, RectShape};
    use std::f32::consts::FRAC_PI_4;

    fn measure() -> GlyphBoxMeasure {
        GlyphBoxMeasure::default()
    }

    fn rect_entity(x: f32, y: f32, w: f32, h: f32, rot: f32) -> Entity {
        Entity::new(1, Shape::Rect(RectShape { x, y, w, h, rot }))
    }

    #[test]
    fn unrotated_rect_aabb_is_tight() {
        let doc = Document::new();
        let e = rect_entity(0.0, 0.0, 10.0, 4.0, 0.0);
        let b = entity_aabb(&doc, &e, &measure());
        assert_eq!(b.min, Vec2::new(0.0, -4.0));
        assert_eq!(b.max, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn rotated_rect_aabb_covers_the_obb() {
        let doc = Document::new();
        let e = rect_entity(0.0, 0.0, 10.0, 4.0, FRAC_PI_4);
        let b = entity_aabb(&doc, &e, &measure());
        for corner in obb_corners(&e, &measure()).unwrap() {
            assert!(b.contains(corner), "AABB must contain corner {corner:?}");
        }
    }

    #[test]
    fn rotated_ellipse_aabb_is_exact() {
        let doc = Document::new();
        let e = Entity::new(
            1,
            Shape::Circle(CircleShape {
                cx: 0.0,
                cy: 0.0,
                rx: 4.0,
                ry: 2.0,
                rot: std::f32::consts::FRAC_PI_2,
            }),
        );
        let b = entity_aabb(&doc, &e, &measure());
        assert_relative_eq!(b.max.x, 2.0, epsilon = 1e-4);
        assert_relative_eq!(b.max.y, 4.0, epsilon = 1e-4);
    }

    #[test]
    fn arrow_aabb_widens_by_head_size() {
        let doc = Document::new();
        let e = Entity::new(
            1,
            Shape::Arrow(planar_scene::ArrowShape {
                a: Vec2::ZERO,
                b: Vec2::new(10.0, 0.0),
                head_size: 3.0,
            }),
        );
        let b = entity_aabb(&doc, &e, &measure());
        assert_eq!(b.min, Vec2::new(-3.0, -3.0));
        assert_eq!(b.max, Vec2::new(13.0, 3.0));
    }

    #[test]
    fn corner_order_is_bl_br_tr_tl() {
        let e = rect_entity(0.0, 0.0, 10.0, 4.0, 0.0);
        let c = obb_corners(&e, &measure()).unwrap();
        assert_eq!(c[0], Vec2::new(0.0, -4.0));
        assert_eq!(c[1], Vec2::new(10.0, -4.0));
        assert_eq!(c[2], Vec2::new(10.0, 0.0));
        assert_eq!(c[3], Vec2::new(0.0, 0.0));
    }

    #[test]
    fn rect_contains_respects_rotation() {
        let e = rect_entity(-5.0, 1.0, 10.0, 2.0, FRAC_PI_4);
        // Point on the long axis after rotation.
        let p = rotate_around(Vec2::new(4.0, 0.0), Vec2::ZERO, FRAC_PI_4);
        assert!(contains_point(&e, &measure(), p));
        assert!(!contains_point(&e, &measure(), Vec2::new(4.0, 0.0)));
    }

    #[test]
    fn polygon_containment_via_ray_cast() {
        let e = Entity::new(
            1,
            Shape::Polygon(PolygonShape {
                cx: 0.0,
                cy: 0.0,
                rx: 5.0,
                ry: 5.0,
                rot: 0.0,
                sides: 6,
            }),
        );
        assert!(contains_point(&e, &measure(), Vec2::ZERO));
        assert!(!contains_point(&e, &measure(), Vec2::new(6.0, 0.0)));
    }

    #[test]
    fn line_has_no_interior() {
        let e = Entity::new(
            1,
            Shape::Line(LineShape {
                a: Vec2::ZERO,
                b: Vec2::new(10.0, 0.0),
            }),
        );
        assert!(!contains_point(&e, &measure(), Vec2::new(5.0, 0.0)));
    }
}
