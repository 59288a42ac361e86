//! Shape drafting through a phantom entity. The phantom lives under the
//! reserved id, is rebuilt in place on every pointer update, and is
//! replaced by a freshly allocated real entity on commit.

use glam::Vec2;
use planar_math::{snap_direction_deg, Aabb};
use planar_scene::{
    ArrowShape, CircleShape, Entity, EntityId, EntityKind, History, HistoryChange, LayerId,
    LineShape, PolygonShape, RectShape, Shape, Style, DRAFT_ENTITY_ID, MIN_POLYGON_SIDES,
};
use tracing::debug;

use crate::config::Modifiers;
use crate::mutator::DocMutator;
use crate::transform::MIN_EXTENT;

/// Everything `begin_draft` needs to know about the shape being created.
#[derive(Debug, Clone)]
pub struct DraftPayload {
    pub kind: EntityKind,
    pub style: Style,
    pub layer: LayerId,
    /// Polygon only.
    pub sides: u32,
    /// Arrow only.
    pub head_size: f32,
}

impl Default for DraftPayload {
    fn default() -> Self {
        Self {
            kind: EntityKind::Rect,
            style: Style::default(),
            layer: 0,
            sides: 6,
            head_size: 4.0,
        }
    }
}

/// Live readout for the dimension overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DraftDimensions {
    pub width: f32,
    pub height: f32,
    pub center: Vec2,
    pub length: f32,
    pub segment_length: f32,
    pub angle_deg: f32,
}

#[derive(Debug, Default)]
pub struct DraftSession {
    active: bool,
    kind: Option<EntityKind>,
    start: Vec2,
    current: Vec2,
    /// Committed polyline points, cursor excluded.
    points: Vec<Vec2>,
    payload: Option<DraftPayload>,
}

impl DraftSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.kind
    }

    /// Create the phantom at `world`. Rejected while drafting is already in
    /// progress, for text (not a drafted kind), and for polygons with too
    /// few sides.
    pub fn begin(&mut self, m: &mut DocMutator<'_>, payload: DraftPayload, world: Vec2) -> bool {
        if self.active || payload.kind == EntityKind::Text {
            return false;
        }
        if payload.kind == EntityKind::Polygon && payload.sides < MIN_POLYGON_SIDES {
            return false;
        }

        self.kind = Some(payload.kind);
        self.start = world;
        self.current = world;
        self.points.clear();

        let shape = match payload.kind {
            EntityKind::Polyline => {
                self.points.push(world);
                // Committed points plus one live cursor slot.
                Shape::Polyline(m.doc.alloc_points(&[world, world]))
            }
            _ => self.shape_from_span(&payload, world),
        };
        let mut phantom = Entity::new(DRAFT_ENTITY_ID, shape);
        phantom.style = payload.style;
        phantom.layer = payload.layer;
        // Locked so the phantom never participates in picking or snapping.
        phantom.locked = true;
        m.doc.upsert(phantom);

        self.payload = Some(payload);
        self.active = true;
        debug!(kind = ?self.kind, "draft begin");
        true
    }

    /// Move the live cursor and rebuild the phantom.
    pub fn update(&mut self, m: &mut DocMutator<'_>, world: Vec2, modifiers: Modifiers) {
        if !self.active {
            return;
        }
        let Some(payload) = self.payload.clone() else {
            return;
        };
        let shift = modifiers.contains(Modifiers::SHIFT);

        self.current = match payload.kind {
            EntityKind::Rect | EntityKind::Circle | EntityKind::Polygon if shift => {
                // Square constraint: equal spans, direction kept.
                let d = world - self.start;
                let side = d.x.abs().max(d.y.abs());
                self.start
                    + Vec2::new(
                        side.copysign(if d.x == 0.0 { 1.0 } else { d.x }),
                        side.copysign(if d.y == 0.0 { 1.0 } else { d.y }),
                    )
            }
            EntityKind::Line | EntityKind::Arrow if shift => {
                self.start + snap_direction_deg(world - self.start, 45.0)
            }
            EntityKind::Polyline if shift => {
                let last = *self.points.last().unwrap_or(&self.start);
                last + snap_direction_deg(world - last, 45.0)
            }
            _ => world,
        };

        match payload.kind {
            EntityKind::Polyline => {
                let range = match m.doc.get(DRAFT_ENTITY_ID).map(|e| &e.shape) {
                    Some(Shape::Polyline(r)) => *r,
                    _ => return,
                };
                let slot = range.count as usize - 1;
                m.doc.polyline_points_mut(range)[slot] = self.current;
            }
            _ => {
                let shape = self.shape_from_span(&payload, self.current);
                if let Some(entity) = m.doc.get_mut(DRAFT_ENTITY_ID) {
                    entity.shape = shape;
                }
            }
        }
    }

    /// Commit the live cursor as a polyline point and grow the phantom.
    pub fn append_point(&mut self, m: &mut DocMutator<'_>, world: Vec2, modifiers: Modifiers) {
        if !self.active || self.kind != Some(EntityKind::Polyline) {
            return;
        }
        let last = *self.points.last().unwrap_or(&self.start);
        let p = if modifiers.contains(Modifiers::SHIFT) {
            last + snap_direction_deg(world - last, 45.0)
        } else {
            world
        };
        self.points.push(p);
        self.current = p;

        // Re-pool the grown list; the orphaned range is compacted away when
        // the draft ends.
        let mut pooled = self.points.clone();
        pooled.push(self.current);
        let range = m.doc.alloc_points(&pooled);
        if let Some(entity) = m.doc.get_mut(DRAFT_ENTITY_ID) {
            entity.shape = Shape::Polyline(range);
        }
    }

    /// Replace the phantom with a real entity. Degenerate drafts are
    /// dropped silently and `None` comes back.
    pub fn commit(&mut self, m: &mut DocMutator<'_>) -> Option<EntityId> {
        if !self.active {
            return None;
        }
        let payload = self.payload.clone()?;
        let kind = self.kind?;

        let span = (self.current - self.start).abs();
        let degenerate = match kind {
            EntityKind::Rect | EntityKind::Circle | EntityKind::Polygon => {
                span.x < MIN_EXTENT || span.y < MIN_EXTENT
            }
            EntityKind::Line | EntityKind::Arrow => {
                self.current.distance(self.start) < MIN_EXTENT
            }
            EntityKind::Polyline => self.points.len() < 2,
            _ => true,
        };
        if degenerate {
            debug!(kind = ?kind, "draft dropped as degenerate");
            self.discard(m);
            return None;
        }

        let shape = match kind {
            EntityKind::Polyline => Shape::Polyline(m.doc.alloc_points(&self.points)),
            _ => self.shape_from_span(&payload, self.current),
        };
        let id = m.doc.allocate_id();
        let mut entity = Entity::new(id, shape);
        entity.style = payload.style;
        entity.layer = payload.layer;
        m.doc.upsert(entity);
        m.refresh_index(id);

        let opened = m.history.begin_transaction();
        let after = History::capture_snapshot(m.doc, id);
        m.history.record(HistoryChange {
            id,
            before: None,
            after,
        });
        if opened {
            m.history.commit_transaction("draft");
        }

        debug!(kind = ?kind, id, "draft commit");
        self.discard(m);
        Some(id)
    }

    /// Remove the phantom without committing anything.
    pub fn cancel(&mut self, m: &mut DocMutator<'_>) {
        if !self.active {
            return;
        }
        debug!(kind = ?self.kind, "draft cancel");
        self.discard(m);
    }

    fn discard(&mut self, m: &mut DocMutator<'_>) {
        let pooled = matches!(
            m.doc.get(DRAFT_ENTITY_ID).map(|e| e.kind()),
            Some(EntityKind::Polyline)
        );
        m.doc.remove(DRAFT_ENTITY_ID);
        m.grid.remove(DRAFT_ENTITY_ID);
        if pooled {
            m.doc.compact_points();
        }
        *self = Self::default();
    }

    /// Width/height/center plus the linear readouts for line-like kinds.
    pub fn dimensions(&self) -> DraftDimensions {
        if !self.active {
            return DraftDimensions::default();
        }
        let kind = match self.kind {
            Some(kind) => kind,
            None => return DraftDimensions::default(),
        };
        match kind {
            EntityKind::Line | EntityKind::Arrow => {
                let v = self.current - self.start;
                DraftDimensions {
                    width: v.x.abs(),
                    height: v.y.abs(),
                    center: (self.start + self.current) * 0.5,
                    length: v.length(),
                    segment_length: v.length(),
                    angle_deg: v.y.atan2(v.x).to_degrees(),
                }
            }
            EntityKind::Polyline => {
                let mut all = self.points.clone();
                all.push(self.current);
                let bbox = Aabb::from_points(&all);
                let mut length = 0.0;
                for pair in all.windows(2) {
                    length += pair[0].distance(pair[1]);
                }
                let last = *self.points.last().unwrap_or(&self.start);
                let seg = self.current - last;
                DraftDimensions {
                    width: bbox.size().x,
                    height: bbox.size().y,
                    center: bbox.center(),
                    length,
                    segment_length: seg.length(),
                    angle_deg: seg.y.atan2(seg.x).to_degrees(),
                }
            }
            _ => {
                let v = self.current - self.start;
                DraftDimensions {
                    width: v.x.abs(),
                    height: v.y.abs(),
                    center: (self.start + self.current) * 0.5,
                    ..DraftDimensions::default()
                }
            }
        }
    }

    fn shape_from_span(&self, payload: &DraftPayload, current: Vec2) -> Shape {
        let (start, d) = (self.start, current - self.start);
        match payload.kind {
            EntityKind::Rect => Shape::Rect(RectShape {
                x: start.x.min(current.x),
                y: start.y.max(current.y),
                w: d.x.abs(),
                h: d.y.abs(),
                rot: 0.0,
            }),
            EntityKind::Circle => {
                let center = (start + current) * 0.5;
                Shape::Circle(CircleShape {
                    cx: center.x,
                    cy: center.y,
                    rx: d.x.abs() * 0.5,
                    ry: d.y.abs() * 0.5,
                    rot: 0.0,
                })
            }
            EntityKind::Polygon => {
                let center = (start + current) * 0.5;
                Shape::Polygon(PolygonShape {
                    cx: center.x,
                    cy: center.y,
                    rx: d.x.abs() * 0.5,
                    ry: d.y.abs() * 0.5,
                    rot: 0.0,
                    sides: payload.sides,
                })
            }
            EntityKind::Arrow => Shape::Arrow(ArrowShape {
                a: start,
                b: current,
                head_size: payload.head_size,
            }),
            // Line is the fallthrough; polyline never reaches here.
            _ => Shape::Line(LineShape {
                a: start,
                b: current,
            }),
        }
    }
}
