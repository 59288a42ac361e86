use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::layer::LayerId;

/// Opaque entity identifier.
pub type EntityId = u32;

/// Reserved id for the drafting phantom. Never allocated to a real entity.
pub const DRAFT_ENTITY_ID: EntityId = u32::MAX;

/// Polygon side counts accepted by the store.
pub const MIN_POLYGON_SIDES: u32 = 3;
pub const MAX_POLYGON_SIDES: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Rect,
    Circle,
    Polygon,
    Line,
    Polyline,
    Arrow,
    Text,
}

/// Rectangle. `(x, y)` is the top-left corner in screen orientation: the
/// rect spans `x..x+w` horizontally and `y-h..y` vertically in the Y-up
/// world. `rot` is radians about the center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectShape {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub rot: f32,
}

impl RectShape {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w * 0.5, self.y - self.h * 0.5)
    }

    pub fn set_center(&mut self, c: Vec2) {
        self.x = c.x - self.w * 0.5;
        self.y = c.y + self.h * 0.5;
    }
}

/// Axis-aligned ellipse with rotation. A circle is `rx == ry`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleShape {
    pub cx: f32,
    pub cy: f32,
    pub rx: f32,
    pub ry: f32,
    pub rot: f32,
}

impl CircleShape {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.cx, self.cy)
    }
}

/// Regular polygon on its circumscribed ellipse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolygonShape {
    pub cx: f32,
    pub cy: f32,
    pub rx: f32,
    pub ry: f32,
    pub rot: f32,
    pub sides: u32,
}

impl PolygonShape {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.cx, self.cy)
    }

    pub fn vertex(&self, i: u32) -> Vec2 {
        planar_math::polygon_vertex(self.center(), self.rx, self.ry, self.rot, i, self.sides)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineShape {
    pub a: Vec2,
    pub b: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrowShape {
    pub a: Vec2,
    pub b: Vec2,
    pub head_size: f32,
}

/// Range into the document's shared point pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolylineShape {
    pub start: u32,
    pub count: u32,
}

/// Text record. `(x, y)` anchors the top-left of the layout box; bounds
/// come from the `TextMeasure` collaborator, never from this record alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextShape {
    pub x: f32,
    pub y: f32,
    pub rot: f32,
    pub content: String,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Rect(RectShape),
    Circle(CircleShape),
    Polygon(PolygonShape),
    Line(LineShape),
    Polyline(PolylineShape),
    Arrow(ArrowShape),
    Text(TextShape),
}

impl Shape {
    pub fn kind(&self) -> EntityKind {
        match self {
            Shape::Rect(_) => EntityKind::Rect,
            Shape::Circle(_) => EntityKind::Circle,
            Shape::Polygon(_) => EntityKind::Polygon,
            Shape::Line(_) => EntityKind::Line,
            Shape::Polyline(_) => EntityKind::Polyline,
            Shape::Arrow(_) => EntityKind::Arrow,
            Shape::Text(_) => EntityKind::Text,
        }
    }
}

/// Per-entity style. `stroke_width_px` is in screen pixels; the `*_by_layer`
/// flags defer the corresponding attribute to the entity's layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub stroke: [f32; 4],
    pub stroke_enabled: bool,
    pub stroke_width_px: f32,
    pub fill: [f32; 4],
    pub fill_enabled: bool,
    pub stroke_by_layer: bool,
    pub fill_by_layer: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stroke: [0.0, 0.0, 0.0, 1.0],
            stroke_enabled: true,
            stroke_width_px: 1.0,
            fill: [1.0, 1.0, 1.0, 1.0],
            fill_enabled: false,
            stroke_by_layer: false,
            fill_by_layer: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub shape: Shape,
    pub style: Style,
    pub layer: LayerId,
    pub visible: bool,
    pub locked: bool,
}

impl Entity {
    pub fn new(id: EntityId, shape: Shape) -> Self {
        Self {
            id,
            shape,
            style: Style::default(),
            layer: 0,
            visible: true,
            locked: false,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.shape.kind()
    }
}
