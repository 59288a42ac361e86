use glam::Vec2;
use planar_math::{rotate_around, Aabb};

use crate::entity::TextShape;

/// Text layout collaborator. The interaction core only ever needs the
/// world-space bounds of a text record; shaping, caret mapping and glyph
/// runs stay outside this workspace.
pub trait TextMeasure {
    fn bounds(&self, text: &TextShape) -> Aabb;
}

/// Box-estimate measure: every glyph is `size * glyph_aspect` wide and
/// `size` tall. Good enough for hit-testing and tests; a real shaping
/// engine replaces this at integration time.
#[derive(Debug, Clone, Copy)]
pub struct GlyphBoxMeasure {
    pub glyph_aspect: f32,
}

impl Default for GlyphBoxMeasure {
    fn default() -> Self {
        Self { glyph_aspect: 0.6 }
    }
}

impl TextMeasure for GlyphBoxMeasure {
    fn bounds(&self, text: &TextShape) -> Aabb {
        let w = text.content.chars().count() as f32 * text.size * self.glyph_aspect;
        let h = text.size;
        let anchor = Vec2::new(text.x, text.y);
        let corners = [
            anchor,
            anchor + Vec2::new(w, 0.0),
            anchor + Vec2::new(w, -h),
            anchor + Vec2::new(0.0, -h),
        ];
        if text.rot.abs() < planar_math::ROT_EPS {
            return Aabb::from_points(&corners);
        }
        let center = anchor + Vec2::new(w * 0.5, -h * 0.5);
        let rotated: Vec<Vec2> = corners
            .iter()
            .map(|&c| rotate_around(c, center, text.rot))
            .collect();
        Aabb::from_points(&rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_measure_spans_below_the_anchor() {
        let measure = GlyphBoxMeasure::default();
        let text = TextShape {
            x: 10.0,
            y: 5.0,
            rot: 0.0,
            content: "ab".into(),
            size: 10.0,
        };
        let b = measure.bounds(&text);
        assert_eq!(b.min, Vec2::new(10.0, -5.0));
        assert_eq!(b.max, Vec2::new(22.0, 5.0));
    }

    #[test]
    fn rotated_bounds_still_contain_the_center() {
        let measure = GlyphBoxMeasure::default();
        let text = TextShape {
            x: 0.0,
            y: 0.0,
            rot: 0.7,
            content: "hello".into(),
            size: 12.0,
        };
        let b = measure.bounds(&text);
        assert!(b.contains(b.center()));
        assert!(b.size().x > 0.0 && b.size().y > 0.0);
    }
}
