//! 2D geometry kit shared by the scene and interaction crates.
//!
//! World coordinates are `f32`, Y-up. Angles are radians unless a function
//! name says degrees.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Rotations below this magnitude are treated as zero and skip the trig.
pub const ROT_EPS: f32 = 1e-6;

/// Axis-aligned bounding box in world coordinates.
///
/// `NULL` (all zero) denotes absence; every other value must satisfy
/// `min.x <= max.x && min.y <= max.y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub const NULL: Aabb = Aabb {
        min: Vec2::ZERO,
        max: Vec2::ZERO,
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec2, half: Vec2) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Envelope of an arbitrary point set. Returns `NULL` for an empty set.
    pub fn from_points(points: &[Vec2]) -> Self {
        let mut iter = points.iter();
        let Some(first) = iter.next() else {
            return Self::NULL;
        };
        let mut min = *first;
        let mut max = *first;
        for p in iter {
            min = min.min(*p);
            max = max.max(*p);
        }
        Self { min, max }
    }

    pub fn is_null(&self) -> bool {
        self.min == Vec2::ZERO && self.max == Vec2::ZERO
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Union that treats `NULL` as the identity element.
    pub fn union(&self, other: &Aabb) -> Aabb {
        if self.is_null() {
            return *other;
        }
        if other.is_null() {
            return *self;
        }
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec2::splat(margin),
            max: self.max + Vec2::splat(margin),
        }
    }

    pub fn translated(&self, delta: Vec2) -> Aabb {
        Aabb {
            min: self.min + delta,
            max: self.max + delta,
        }
    }
}

/// Rotate `p` around `pivot` by `angle` radians (counter-clockwise, Y-up).
pub fn rotate_around(p: Vec2, pivot: Vec2, angle: f32) -> Vec2 {
    if angle.abs() < ROT_EPS {
        return p;
    }
    let (s, c) = angle.sin_cos();
    let d = p - pivot;
    Vec2::new(d.x * c - d.y * s, d.x * s + d.y * c) + pivot
}

/// Closest point to `p` on segment `ab`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < ROT_EPS * ROT_EPS {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    p.distance(closest_point_on_segment(p, a, b))
}

/// Normalize an angle in degrees into `(-180, 180]`.
pub fn normalize_deg(mut deg: f32) -> f32 {
    deg %= 360.0;
    if deg <= -180.0 {
        deg += 360.0;
    } else if deg > 180.0 {
        deg -= 360.0;
    }
    deg
}

/// Continuous-angle step: given the previous raw delta and the new raw
/// delta (both degrees), return the new delta adjusted by ±360 so that the
/// jump between the two never exceeds 180°. A naive atan2 difference loses
/// rotations that cross the ±180° seam.
pub fn unwrap_delta_deg(prev: f32, mut next: f32) -> f32 {
    while next - prev > 180.0 {
        next -= 360.0;
    }
    while next - prev < -180.0 {
        next += 360.0;
    }
    next
}

/// Snap a vector's direction to the nearest multiple of `step_deg`,
/// preserving magnitude. A zero vector is returned unchanged.
pub fn snap_direction_deg(v: Vec2, step_deg: f32) -> Vec2 {
    let len = v.length();
    if len < ROT_EPS {
        return v;
    }
    let ang = v.y.atan2(v.x).to_degrees();
    let snapped = (ang / step_deg).round() * step_deg;
    let rad = snapped.to_radians();
    Vec2::new(rad.cos(), rad.sin()) * len
}

/// Tight half-extents of the AABB of an ellipse with radii `(rx, ry)`
/// rotated by `rot` radians: `ex = sqrt((rx cos)^2 + (ry sin)^2)` and
/// symmetrically for `ey`.
pub fn ellipse_extent(rx: f32, ry: f32, rot: f32) -> Vec2 {
    if rot.abs() < ROT_EPS {
        return Vec2::new(rx, ry);
    }
    let (s, c) = rot.sin_cos();
    let ex = ((rx * c) * (rx * c) + (ry * s) * (ry * s)).sqrt();
    let ey = ((rx * s) * (rx * s) + (ry * c) * (ry * c)).sqrt();
    Vec2::new(ex, ey)
}

/// Vertex `i` of a regular polygon with `sides` vertices inscribed in the
/// ellipse `(rx, ry)` centered at `center`, rotated by `rot`. Base angle is
/// `-π/2` so vertex 0 sits at the bottom of an unrotated polygon.
pub fn polygon_vertex(center: Vec2, rx: f32, ry: f32, rot: f32, i: u32, sides: u32) -> Vec2 {
    let step = std::f32::consts::TAU / sides as f32;
    let ang = -std::f32::consts::FRAC_PI_2 + step * i as f32;
    let local = Vec2::new(rx * ang.cos(), ry * ang.sin());
    if rot.abs() < ROT_EPS {
        return center + local;
    }
    let (s, c) = rot.sin_cos();
    center + Vec2::new(local.x * c - local.y * s, local.x * s + local.y * c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn union_treats_null_as_identity() {
        let a = Aabb::new(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        assert_eq!(Aabb::NULL.union(&a), a);
        assert_eq!(a.union(&Aabb::NULL), a);
        let b = Aabb::new(Vec2::new(-1.0, 0.0), Vec2::new(2.0, 5.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec2::new(-1.0, 0.0));
        assert_eq!(u.max, Vec2::new(3.0, 5.0));
    }

    #[test]
    fn rotate_around_quarter_turn() {
        let p = rotate_around(Vec2::new(2.0, 1.0), Vec2::new(1.0, 1.0), FRAC_PI_2);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn rotate_around_near_zero_skips_trig() {
        let p = Vec2::new(3.5, -2.25);
        assert_eq!(rotate_around(p, Vec2::ZERO, 1e-8), p);
    }

    #[test]
    fn segment_distance_interior_and_endpoint() {
        let a = Vec2::ZERO;
        let b = Vec2::new(10.0, 0.0);
        assert_relative_eq!(point_segment_distance(Vec2::new(5.0, 3.0), a, b), 3.0);
        assert_relative_eq!(
            point_segment_distance(Vec2::new(-3.0, 4.0), a, b),
            5.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn unwrap_crossing_the_seam() {
        // 170° -> raw -175° is a +15° step, not a -345° jump.
        let next = unwrap_delta_deg(170.0, -175.0);
        assert_relative_eq!(next, 185.0);
        let next = unwrap_delta_deg(-170.0, 175.0);
        assert_relative_eq!(next, -185.0);
    }

    #[test]
    fn snap_direction_45_keeps_magnitude() {
        let v = snap_direction_deg(Vec2::new(10.0, 6.0), 45.0);
        let mag = Vec2::new(10.0, 6.0).length();
        assert_relative_eq!(v.length(), mag, epsilon = 1e-5);
        assert_relative_eq!(v.x, mag * (PI / 4.0).cos(), epsilon = 1e-4);
        assert_relative_eq!(v.y, mag * (PI / 4.0).sin(), epsilon = 1e-4);
    }

    #[test]
    fn ellipse_extent_axis_aligned_and_rotated() {
        assert_eq!(ellipse_extent(4.0, 2.0, 0.0), Vec2::new(4.0, 2.0));
        let e = ellipse_extent(4.0, 2.0, FRAC_PI_2);
        assert_relative_eq!(e.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(e.y, 4.0, epsilon = 1e-5);
    }

    #[test]
    fn polygon_vertex_zero_is_bottom() {
        let v = polygon_vertex(Vec2::new(1.0, 1.0), 2.0, 3.0, 0.0, 0, 4);
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(v.y, -2.0, epsilon = 1e-5);
    }
}
