//! The transform session state machine: begin → update* → commit/cancel
//! over Move, Resize, SideResize, Rotate, VertexDrag and EdgeDrag.
//!
//! Every update re-derives the affected entities from the begin-time
//! snapshots, so updates are idempotent and cancel restores the exact
//! pre-gesture state. Commit emits compact op-code rows and folds the
//! whole gesture into a single history entry.

use glam::Vec2;
use planar_math::{rotate_around, snap_direction_deg, unwrap_delta_deg, Aabb};
use planar_scene::{EntityId, EntitySnapshot, History, HistoryChange, Shape};
use tracing::{debug, trace};

use crate::bounds::entity_aabb;
use crate::config::{InteractionConfig, Modifiers, ViewParams};
use crate::mutator::DocMutator;
use crate::snap::{self, SnapGuide, SnapHit, SnapQuery};

/// Extents never collapse below this.
pub const MIN_EXTENT: f32 = 1e-3;
/// Group scale factors are clamped to at least this magnitude.
pub const MIN_GROUP_SCALE: f32 = 1e-4;

pub const OP_MOVE: u32 = 1;
pub const OP_VERTEX_SET: u32 = 2;
pub const OP_RESIZE: u32 = 3;
pub const OP_ROTATE: u32 = 4;
pub const OP_SIDE_RESIZE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Move,
    VertexDrag,
    EdgeDrag,
    Resize,
    Rotate,
    SideResize,
}

impl TransformMode {
    fn label(&self) -> &'static str {
        match self {
            TransformMode::Move => "move",
            TransformMode::VertexDrag => "vertex-drag",
            TransformMode::EdgeDrag => "edge-drag",
            TransformMode::Resize => "resize",
            TransformMode::Rotate => "rotate",
            TransformMode::SideResize => "side-resize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisLock {
    #[default]
    None,
    X,
    Y,
}

/// Pre-transform state of one session entity.
#[derive(Debug, Clone)]
pub struct TransformSnapshot {
    pub id: EntityId,
    pub shape: Shape,
    pub points: Option<Vec<Vec2>>,
}

/// Read-only session status for the front-end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub active: bool,
    pub mode: TransformMode,
    pub rotation_delta_deg: f32,
    pub pivot: Vec2,
}

/// Snap visuals produced during update, owned by the caller.
#[derive(Debug, Clone, Default)]
pub struct SnapFeedback {
    pub guides: Vec<SnapGuide>,
    pub hits: Vec<SnapHit>,
}

impl SnapFeedback {
    pub fn clear(&mut self) {
        self.guides.clear();
        self.hits.clear();
    }
}

/// Commit result rows: parallel arrays, four payload floats per row.
#[derive(Debug, Default)]
pub struct CommitBuffers {
    pub ids: Vec<u32>,
    pub ops: Vec<u32>,
    pub payloads: Vec<f32>,
}

impl CommitBuffers {
    pub fn clear(&mut self) {
        self.ids.clear();
        self.ops.clear();
        self.payloads.clear();
    }

    pub fn push(&mut self, id: EntityId, op: u32, payload: [f32; 4]) {
        self.ids.push(id);
        self.ops.push(op);
        self.payloads.extend_from_slice(&payload);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug)]
pub struct TransformSession {
    active: bool,
    mode: TransformMode,
    specific_id: Option<EntityId>,
    sub_index: i32,
    modifiers: Modifiers,
    start_screen: Vec2,
    start_world: Vec2,
    engaged: bool,
    duplicated: bool,
    original_ids: Vec<EntityId>,
    ids: Vec<EntityId>,
    base: Aabb,
    // Resize / SideResize.
    anchor_local: Vec2,
    anchor_world: Vec2,
    base_dims: Vec2,
    entity_rot: f32,
    // Rotate.
    pivot: Vec2,
    start_angle_deg: f32,
    last_delta_deg: f32,
    accum_delta_deg: f32,
    axis_lock: AxisLock,
    applied_delta: Vec2,
    last_sig: (Vec2, Modifiers),
    has_applied: bool,
    snapshots: Vec<TransformSnapshot>,
    opened_txn: bool,
}

impl Default for TransformSession {
    fn default() -> Self {
        Self {
            active: false,
            mode: TransformMode::Move,
            specific_id: None,
            sub_index: -1,
            modifiers: Modifiers::empty(),
            start_screen: Vec2::ZERO,
            start_world: Vec2::ZERO,
            engaged: false,
            duplicated: false,
            original_ids: Vec::new(),
            ids: Vec::new(),
            base: Aabb::NULL,
            anchor_local: Vec2::ZERO,
            anchor_world: Vec2::ZERO,
            base_dims: Vec2::ONE,
            entity_rot: 0.0,
            pivot: Vec2::ZERO,
            start_angle_deg: 0.0,
            last_delta_deg: 0.0,
            accum_delta_deg: 0.0,
            axis_lock: AxisLock::None,
            applied_delta: Vec2::ZERO,
            last_sig: (Vec2::ZERO, Modifiers::empty()),
            has_applied: false,
            snapshots: Vec::new(),
            opened_txn: false,
        }
    }
}

impl TransformSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn duplicated(&self) -> bool {
        self.duplicated
    }

    pub fn original_ids(&self) -> &[EntityId] {
        &self.original_ids
    }

    pub fn state(&self) -> TransformState {
        TransformState {
            active: self.active,
            mode: self.mode,
            rotation_delta_deg: self.accum_delta_deg,
            pivot: self.pivot,
        }
    }

    /// Start a gesture. Returns false (and stays inactive) when a session
    /// is already running or no usable entity remains after filtering.
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        &mut self,
        m: &mut DocMutator<'_>,
        ids: &[EntityId],
        mode: TransformMode,
        specific_id: Option<EntityId>,
        sub_index: i32,
        screen: Vec2,
        view: &ViewParams,
        modifiers: Modifiers,
    ) -> bool {
        if self.active {
            trace!("begin rejected: session already active");
            return false;
        }

        let targeted: Vec<EntityId> = match (mode, specific_id) {
            (
                TransformMode::VertexDrag | TransformMode::EdgeDrag | TransformMode::SideResize,
                Some(id),
            ) => vec![id],
            _ => {
                let mut seen = Vec::new();
                for &id in ids {
                    if !seen.contains(&id) {
                        seen.push(id);
                    }
                }
                seen
            }
        };
        let mut active_ids: Vec<EntityId> = targeted
            .into_iter()
            .filter(|&id| m.doc.is_pickable(id))
            .collect();
        if active_ids.is_empty() {
            return false;
        }

        *self = Self::default();
        self.mode = mode;
        self.specific_id = specific_id;
        self.sub_index = sub_index;
        self.modifiers = modifiers;
        self.start_screen = screen;
        self.start_world = view.screen_to_world(screen);

        // Alt-move duplicates the group and drags the copies.
        if mode == TransformMode::Move && modifiers.contains(Modifiers::ALT) {
            self.original_ids = active_ids.clone();
            active_ids = duplicate_entities(m, &active_ids);
            self.duplicated = true;
        }

        for &id in &active_ids {
            let Some(entity) = m.doc.get(id) else {
                continue;
            };
            let points = match entity.shape {
                Shape::Polyline(range) => Some(m.doc.polyline_points(range).to_vec()),
                _ => None,
            };
            self.snapshots.push(TransformSnapshot {
                id,
                shape: entity.shape.clone(),
                points,
            });
        }
        if self.snapshots.is_empty() {
            *self = Self::default();
            return false;
        }
        self.ids = active_ids;

        let mut base = Aabb::NULL;
        for &id in &self.ids {
            if let Some(entity) = m.doc.get(id) {
                base = base.union(&entity_aabb(m.doc, entity, m.text));
            }
        }
        if base.is_null() {
            base = Aabb::from_center_half_extents(self.start_world, Vec2::ZERO);
        }
        self.base = base;

        match mode {
            TransformMode::Resize => self.setup_resize(),
            TransformMode::SideResize => self.setup_side_resize(),
            TransformMode::Rotate => {
                self.pivot = base.center();
                let v = self.start_world - self.pivot;
                self.start_angle_deg = v.y.atan2(v.x).to_degrees();
            }
            _ => {}
        }

        self.opened_txn = m.history.begin_transaction();
        self.active = true;
        debug!(
            mode = mode.label(),
            entities = self.ids.len(),
            duplicated = self.duplicated,
            "transform begin"
        );
        true
    }

    fn single_obb(&self) -> Option<(Vec2, Vec2, f32)> {
        if self.snapshots.len() != 1 {
            return None;
        }
        match &self.snapshots[0].shape {
            Shape::Rect(r) => Some((r.center(), Vec2::new(r.w * 0.5, r.h * 0.5), r.rot)),
            Shape::Circle(c) => Some((c.center(), Vec2::new(c.rx, c.ry), c.rot)),
            Shape::Polygon(p) => Some((p.center(), Vec2::new(p.rx, p.ry), p.rot)),
            _ => None,
        }
    }

    fn setup_resize(&mut self) {
        let handle = self.sub_index.clamp(0, 3) as usize;
        if let Some((center, half, rot)) = self.single_obb() {
            let offsets = corner_offsets(half);
            self.anchor_local = offsets[(handle + 2) % 4];
            self.anchor_world = center + rotate_vec(self.anchor_local, rot);
            self.base_dims = half * 2.0;
            self.entity_rot = rot;
        } else {
            // Group: anchor at the base-AABB corner opposite the one
            // nearest the gesture start.
            let corners = aabb_corners(&self.base);
            let grabbed = nearest_index(&corners, self.start_world);
            self.anchor_world = corners[(grabbed + 2) % 4];
            self.base_dims = self.base.size().max(Vec2::splat(MIN_EXTENT));
        }
    }

    fn setup_side_resize(&mut self) {
        let side = self.sub_index.clamp(0, 3) as usize;
        if let Some((center, half, rot)) = self.single_obb() {
            let offsets = side_offsets(half);
            self.anchor_local = offsets[(side + 2) % 4];
            self.anchor_world = center + rotate_vec(self.anchor_local, rot);
            self.base_dims = half * 2.0;
            self.entity_rot = rot;
        } else {
            let corners = aabb_corners(&self.base);
            let mids = [
                (corners[0] + corners[1]) * 0.5,
                (corners[1] + corners[2]) * 0.5,
                (corners[2] + corners[3]) * 0.5,
                (corners[3] + corners[0]) * 0.5,
            ];
            self.anchor_world = mids[(side + 2) % 4];
            self.base_dims = self.base.size().max(Vec2::splat(MIN_EXTENT));
        }
    }

    /// Stream one pointer update into the session. Returns true when at
    /// least one entity actually mutated this frame.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        m: &mut DocMutator<'_>,
        screen: Vec2,
        view: &ViewParams,
        modifiers: Modifiers,
        config: &InteractionConfig,
        feedback: &mut SnapFeedback,
    ) -> bool {
        if !self.active {
            return false;
        }
        self.modifiers = modifiers;
        feedback.clear();

        if !self.engaged {
            if self.start_screen.distance(screen) < config.drag_threshold_px {
                return false;
            }
            self.engaged = true;
        }

        let mut cursor = view.screen_to_world(screen);
        let mut delta = cursor - self.start_world;

        // Shift-move axis lock. Entering needs a clear dominant axis and a
        // minimum screen travel; switching an established lock needs a
        // stronger ratio.
        if self.mode == TransformMode::Move && modifiers.contains(Modifiers::SHIFT) {
            if self.start_screen.distance(screen) >= config.axis_lock_min_px {
                let (ax, ay) = (delta.x.abs(), delta.y.abs());
                self.axis_lock = match self.axis_lock {
                    AxisLock::None => {
                        if ax > ay * config.axis_lock_enter_ratio {
                            AxisLock::X
                        } else if ay > ax * config.axis_lock_enter_ratio {
                            AxisLock::Y
                        } else {
                            AxisLock::None
                        }
                    }
                    AxisLock::X => {
                        if ay > ax * config.axis_lock_switch_ratio {
                            AxisLock::Y
                        } else {
                            AxisLock::X
                        }
                    }
                    AxisLock::Y => {
                        if ax > ay * config.axis_lock_switch_ratio {
                            AxisLock::X
                        } else {
                            AxisLock::Y
                        }
                    }
                };
            }
        } else {
            self.axis_lock = AxisLock::None;
        }
        let (mut snap_x, mut snap_y) = (true, true);
        match self.axis_lock {
            AxisLock::X => {
                delta.y = 0.0;
                snap_y = false;
            }
            AxisLock::Y => {
                delta.x = 0.0;
                snap_x = false;
            }
            AxisLock::None => {}
        }

        // Grid snap, before object snap.
        let opts = &config.snap;
        if opts.enabled && opts.grid_enabled && opts.grid_size > 0.0 {
            match self.mode {
                TransformMode::Move | TransformMode::EdgeDrag => {
                    if snap_x {
                        delta.x = snap::grid_round(self.base.min.x + delta.x, opts.grid_size)
                            - self.base.min.x;
                    }
                    if snap_y {
                        delta.y = snap::grid_round(self.base.min.y + delta.y, opts.grid_size)
                            - self.base.min.y;
                    }
                }
                _ => cursor = snap::grid_snap_point(cursor, opts.grid_size),
            }
        }

        // Object snap applies to translation gestures only.
        if matches!(self.mode, TransformMode::Move | TransformMode::EdgeDrag) {
            let query = SnapQuery {
                moving: &self.ids,
                base: self.base,
                dx: delta.x,
                dy: delta.y,
                snap_x,
                snap_y,
                view: *view,
                suppress_object: modifiers.suppress_object_snap(),
            };
            let result = snap::resolve(m.doc, m.grid, m.text, opts, &query);
            delta = Vec2::new(result.dx, result.dy);
            feedback.guides = result.guides;
            feedback.hits = result.hits;
        }

        let sig = match self.mode {
            TransformMode::Move | TransformMode::EdgeDrag => (delta, modifiers),
            _ => (cursor, modifiers),
        };
        if self.has_applied && sig == self.last_sig {
            return false;
        }
        if !self.has_applied {
            let identity = match self.mode {
                TransformMode::Move | TransformMode::EdgeDrag => delta == Vec2::ZERO,
                _ => cursor == self.start_world,
            };
            if identity {
                return false;
            }
        }
        self.last_sig = sig;
        self.has_applied = true;

        match self.mode {
            TransformMode::Move | TransformMode::EdgeDrag => self.apply_move(m, delta),
            TransformMode::Resize => self.apply_resize(m, cursor, modifiers),
            TransformMode::SideResize => self.apply_side_resize(m, cursor, modifiers),
            TransformMode::Rotate => self.apply_rotate(m, cursor),
            TransformMode::VertexDrag => self.apply_vertex_drag(m, cursor, modifiers),
        }
        true
    }

    fn apply_move(&mut self, m: &mut DocMutator<'_>, delta: Vec2) {
        self.applied_delta = delta;
        for snapshot in &self.snapshots {
            translate_from_snapshot(m, snapshot, delta);
            m.refresh_index(snapshot.id);
        }
    }

    fn apply_resize(&mut self, m: &mut DocMutator<'_>, cursor: Vec2, modifiers: Modifiers) {
        let shift = modifiers.contains(Modifiers::SHIFT);
        let alt = modifiers.contains(Modifiers::ALT);

        if let Some((center0, _half, rot)) = self.single_obb() {
            let anchor = if alt { center0 } else { self.anchor_world };
            let probe = rotate_vec(cursor - anchor, -rot);
            // From a corner anchor the probe spans the full box; from the
            // center it spans half of it.
            let mut dims = if alt { probe.abs() * 2.0 } else { probe.abs() };
            if shift {
                let bw = self.base_dims.x.max(MIN_EXTENT);
                let bh = self.base_dims.y.max(MIN_EXTENT);
                let scale = (dims.x / bw).max(dims.y / bh);
                dims = Vec2::new(bw * scale, bh * scale);
            }
            if uniform_locked(&self.snapshots[0].shape, alt) {
                let r = dims.x.max(dims.y);
                dims = Vec2::splat(r);
            }
            dims = dims.max(Vec2::splat(MIN_EXTENT));
            let center = if alt {
                center0
            } else {
                let signed = Vec2::new(
                    dims.x.copysign(if probe.x == 0.0 { 1.0 } else { probe.x }),
                    dims.y.copysign(if probe.y == 0.0 { 1.0 } else { probe.y }),
                );
                anchor + rotate_vec(signed * 0.5, rot)
            };
            let snapshot = &self.snapshots[0];
            write_obb(m, snapshot.id, center, dims);
            m.refresh_index(snapshot.id);
            return;
        }

        let anchor = if alt { self.base.center() } else { self.anchor_world };
        let v0 = self.start_world - anchor;
        let v1 = cursor - anchor;
        let mut sx = safe_scale(v1.x, v0.x);
        let mut sy = safe_scale(v1.y, v0.y);
        if shift {
            let s = sx.abs().max(sy.abs());
            sx = s.copysign(sx);
            sy = s.copysign(sy);
        }
        for snapshot in &self.snapshots {
            scale_from_snapshot(m, snapshot, anchor, sx, sy, alt);
            m.refresh_index(snapshot.id);
        }
    }

    fn apply_side_resize(&mut self, m: &mut DocMutator<'_>, cursor: Vec2, modifiers: Modifiers) {
        let alt = modifiers.contains(Modifiers::ALT);
        let side = self.sub_index.clamp(0, 3) as usize;
        let vertical = side % 2 == 0;

        if let Some((center0, _half, rot)) = self.single_obb() {
            let anchor = if alt { center0 } else { self.anchor_world };
            let probe = rotate_vec(cursor - anchor, -rot);
            let mut extent = if vertical { probe.y.abs() } else { probe.x.abs() };
            if alt {
                extent *= 2.0;
            }
            extent = extent.max(MIN_EXTENT);
            let dims = if vertical {
                Vec2::new(self.base_dims.x, extent)
            } else {
                Vec2::new(extent, self.base_dims.y)
            };
            let center = if alt {
                center0
            } else {
                let along = if vertical {
                    Vec2::new(0.0, (extent * 0.5).copysign(if probe.y == 0.0 { 1.0 } else { probe.y }))
                } else {
                    Vec2::new((extent * 0.5).copysign(if probe.x == 0.0 { 1.0 } else { probe.x }), 0.0)
                };
                anchor + rotate_vec(along, rot)
            };
            let snapshot = &self.snapshots[0];
            write_obb(m, snapshot.id, center, dims);
            m.refresh_index(snapshot.id);
            return;
        }

        let anchor = if alt { self.base.center() } else { self.anchor_world };
        let v0 = self.start_world - anchor;
        let v1 = cursor - anchor;
        let (sx, sy) = if vertical {
            (1.0, safe_scale(v1.y, v0.y))
        } else {
            (safe_scale(v1.x, v0.x), 1.0)
        };
        for snapshot in &self.snapshots {
            scale_from_snapshot(m, snapshot, anchor, sx, sy, alt);
            m.refresh_index(snapshot.id);
        }
    }

    fn apply_rotate(&mut self, m: &mut DocMutator<'_>, cursor: Vec2) {
        let v = cursor - self.pivot;
        let raw = v.y.atan2(v.x).to_degrees() - self.start_angle_deg;
        let delta = unwrap_delta_deg(self.last_delta_deg, raw);
        self.last_delta_deg = delta;
        self.accum_delta_deg = delta;
        let rad = delta.to_radians();

        for snapshot in &self.snapshots {
            rotate_from_snapshot(m, snapshot, self.pivot, rad);
            m.refresh_index(snapshot.id);
        }
    }

    fn apply_vertex_drag(&mut self, m: &mut DocMutator<'_>, cursor: Vec2, modifiers: Modifiers) {
        let shift = modifiers.contains(Modifiers::SHIFT);
        let Some(snapshot) = self.snapshots.first() else {
            return;
        };
        let idx = self.sub_index.max(0) as usize;

        let (anchor, original) = match (&snapshot.shape, &snapshot.points) {
            (Shape::Line(l), _) => {
                if idx > 1 {
                    return;
                }
                (if idx == 0 { l.b } else { l.a }, if idx == 0 { l.a } else { l.b })
            }
            (Shape::Arrow(a), _) => {
                if idx > 1 {
                    return;
                }
                (if idx == 0 { a.b } else { a.a }, if idx == 0 { a.a } else { a.b })
            }
            (Shape::Polyline(_), Some(points)) => {
                if idx >= points.len() {
                    return;
                }
                let anchor = if idx > 0 {
                    points[idx - 1]
                } else if points.len() > 1 {
                    points[1]
                } else {
                    cursor
                };
                (anchor, points[idx])
            }
            _ => return,
        };

        let mut target = cursor;
        if shift {
            target = anchor + snap_direction_deg(cursor - anchor, 45.0);
        }
        // Never collapse the segment onto its anchor.
        let v = target - anchor;
        if v.length() < MIN_EXTENT {
            let dir = (original - anchor).normalize_or_zero();
            let dir = if dir == Vec2::ZERO { Vec2::X } else { dir };
            target = anchor + dir * MIN_EXTENT;
        }

        let id = snapshot.id;
        let Some(entity) = m.doc.get_mut(id) else {
            return;
        };
        let mut pool_write = None;
        match &mut entity.shape {
            Shape::Line(l) => {
                if idx == 0 {
                    l.a = target;
                } else {
                    l.b = target;
                }
            }
            Shape::Arrow(a) => {
                if idx == 0 {
                    a.a = target;
                } else {
                    a.b = target;
                }
            }
            Shape::Polyline(range) => pool_write = Some(*range),
            _ => return,
        }
        if let Some(range) = pool_write {
            if (idx as u32) < range.count {
                m.doc.polyline_points_mut(range)[idx] = target;
            }
        }
        m.refresh_index(id);
    }

    /// Finalize the gesture: emit op-code rows, fold the diff into one
    /// history entry (unless an outer transaction was already open), and
    /// reset. Returns true when at least one row was written.
    pub fn commit(&mut self, m: &mut DocMutator<'_>, out: &mut CommitBuffers) -> bool {
        if !self.active {
            return false;
        }
        out.clear();

        let mut order: Vec<usize> = (0..self.snapshots.len()).collect();
        order.sort_by_key(|&i| self.snapshots[i].id);

        let mut any_change = false;
        for i in order {
            let snapshot = &self.snapshots[i];
            let id = snapshot.id;
            let Some(entity) = m.doc.get(id) else {
                continue; // deleted externally mid-gesture
            };
            let current_points = match entity.shape {
                Shape::Polyline(range) => Some(m.doc.polyline_points(range).to_vec()),
                _ => None,
            };
            let mutated = entity.shape != snapshot.shape
                || current_points != snapshot.points
                || self.duplicated;
            if !mutated {
                continue;
            }
            any_change = true;

            self.emit_ops(out, snapshot, &entity.shape, current_points.as_deref());

            let before = if self.duplicated {
                None
            } else {
                let mut pre = entity.clone();
                pre.shape = snapshot.shape.clone();
                Some(EntitySnapshot {
                    entity: pre,
                    points: snapshot.points.clone(),
                })
            };
            let after = History::capture_snapshot(m.doc, id);
            m.history.record(HistoryChange { id, before, after });
        }

        if self.opened_txn {
            m.history.commit_transaction(self.mode.label());
        }
        debug!(
            mode = self.mode.label(),
            rows = out.len(),
            "transform commit"
        );
        *self = Self::default();
        any_change
    }

    fn emit_ops(
        &self,
        out: &mut CommitBuffers,
        snapshot: &TransformSnapshot,
        current: &Shape,
        current_points: Option<&[Vec2]>,
    ) {
        let id = snapshot.id;
        match self.mode {
            TransformMode::Move | TransformMode::EdgeDrag => {
                out.push(id, OP_MOVE, [self.applied_delta.x, self.applied_delta.y, 0.0, 0.0]);
            }
            TransformMode::VertexDrag => {
                let idx = self.sub_index.max(0);
                let p = match current {
                    Shape::Line(l) => {
                        if idx == 0 {
                            l.a
                        } else {
                            l.b
                        }
                    }
                    Shape::Arrow(a) => {
                        if idx == 0 {
                            a.a
                        } else {
                            a.b
                        }
                    }
                    Shape::Polyline(_) => match current_points {
                        Some(points) if (idx as usize) < points.len() => points[idx as usize],
                        _ => return,
                    },
                    _ => return,
                };
                out.push(id, OP_VERTEX_SET, [p.x, p.y, idx as f32, 0.0]);
            }
            TransformMode::Resize | TransformMode::SideResize => {
                let op = if self.mode == TransformMode::Resize {
                    OP_RESIZE
                } else {
                    OP_SIDE_RESIZE
                };
                match current {
                    Shape::Rect(r) => out.push(id, op, [r.x, r.y, r.w, r.h]),
                    Shape::Circle(c) => out.push(id, op, [c.cx, c.cy, c.rx, c.ry]),
                    Shape::Polygon(p) => out.push(id, op, [p.cx, p.cy, p.rx, p.ry]),
                    // Linear kinds scale per point; emit the exact points.
                    Shape::Line(l) => {
                        out.push(id, OP_VERTEX_SET, [l.a.x, l.a.y, 0.0, 0.0]);
                        out.push(id, OP_VERTEX_SET, [l.b.x, l.b.y, 1.0, 0.0]);
                    }
                    Shape::Arrow(a) => {
                        out.push(id, OP_VERTEX_SET, [a.a.x, a.a.y, 0.0, 0.0]);
                        out.push(id, OP_VERTEX_SET, [a.b.x, a.b.y, 1.0, 0.0]);
                    }
                    Shape::Polyline(_) => {
                        if let Some(points) = current_points {
                            for (i, p) in points.iter().enumerate() {
                                out.push(id, OP_VERTEX_SET, [p.x, p.y, i as f32, 0.0]);
                            }
                        }
                    }
                    Shape::Text(t) => out.push(id, OP_MOVE, [
                        t.x - text_x(&snapshot.shape),
                        t.y - text_y(&snapshot.shape),
                        0.0,
                        0.0,
                    ]),
                }
            }
            TransformMode::Rotate => {
                out.push(
                    id,
                    OP_ROTATE,
                    [self.pivot.x, self.pivot.y, self.accum_delta_deg, 0.0],
                );
            }
        }
    }

    /// Restore every snapshot in reverse order and drop the gesture. No
    /// history entry is produced; Alt-duplicates are deleted outright.
    pub fn cancel(&mut self, m: &mut DocMutator<'_>) -> bool {
        if !self.active {
            return false;
        }
        for snapshot in self.snapshots.iter().rev() {
            if self.duplicated {
                m.doc.remove(snapshot.id);
                m.grid.remove(snapshot.id);
                continue;
            }
            let Some(entity) = m.doc.get_mut(snapshot.id) else {
                continue;
            };
            let mut pool_restore = None;
            match (&snapshot.shape, &mut entity.shape) {
                (Shape::Polyline(_), Shape::Polyline(range)) => pool_restore = Some(*range),
                (restored, live) => *live = restored.clone(),
            }
            if let (Some(range), Some(points)) = (pool_restore, &snapshot.points) {
                if range.count as usize == points.len() {
                    m.doc.polyline_points_mut(range).copy_from_slice(points);
                }
            }
            m.refresh_index(snapshot.id);
        }
        if self.opened_txn {
            m.history.abort_transaction();
        }
        debug!(mode = self.mode.label(), "transform cancel");
        *self = Self::default();
        true
    }
}

fn text_x(shape: &Shape) -> f32 {
    match shape {
        Shape::Text(t) => t.x,
        _ => 0.0,
    }
}

fn text_y(shape: &Shape) -> f32 {
    match shape {
        Shape::Text(t) => t.y,
        _ => 0.0,
    }
}

fn rotate_vec(v: Vec2, angle: f32) -> Vec2 {
    rotate_around(v, Vec2::ZERO, angle)
}

/// Local corner offsets in BL/BR/TR/TL order.
fn corner_offsets(half: Vec2) -> [Vec2; 4] {
    [
        Vec2::new(-half.x, -half.y),
        Vec2::new(half.x, -half.y),
        Vec2::new(half.x, half.y),
        Vec2::new(-half.x, half.y),
    ]
}

/// Local side-midpoint offsets in S/E/N/W order.
fn side_offsets(half: Vec2) -> [Vec2; 4] {
    [
        Vec2::new(0.0, -half.y),
        Vec2::new(half.x, 0.0),
        Vec2::new(0.0, half.y),
        Vec2::new(-half.x, 0.0),
    ]
}

fn aabb_corners(aabb: &Aabb) -> [Vec2; 4] {
    [
        Vec2::new(aabb.min.x, aabb.min.y),
        Vec2::new(aabb.max.x, aabb.min.y),
        Vec2::new(aabb.max.x, aabb.max.y),
        Vec2::new(aabb.min.x, aabb.max.y),
    ]
}

fn nearest_index(points: &[Vec2; 4], p: Vec2) -> usize {
    let mut best = 0;
    let mut best_d = f32::MAX;
    for (i, c) in points.iter().enumerate() {
        let d = c.distance_squared(p);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

fn safe_scale(num: f32, den: f32) -> f32 {
    if den.abs() < MIN_GROUP_SCALE {
        return 1.0;
    }
    let s = num / den;
    if s.abs() < MIN_GROUP_SCALE {
        MIN_GROUP_SCALE.copysign(s)
    } else {
        s
    }
}

/// True circles stay uniform while resizing unless Alt frees them.
fn uniform_locked(shape: &Shape, alt: bool) -> bool {
    match shape {
        Shape::Circle(c) => !alt && (c.rx - c.ry).abs() < 1e-6,
        _ => false,
    }
}

fn duplicate_entities(m: &mut DocMutator<'_>, ids: &[EntityId]) -> Vec<EntityId> {
    let mut duplicates = Vec::with_capacity(ids.len());
    for &id in ids {
        let Some(entity) = m.doc.get(id) else {
            continue;
        };
        let mut copy = entity.clone();
        copy.id = m.doc.allocate_id();
        if let Shape::Polyline(range) = copy.shape {
            let points = m.doc.polyline_points(range).to_vec();
            copy.shape = Shape::Polyline(m.doc.alloc_points(&points));
        }
        let new_id = copy.id;
        m.doc.upsert(copy);
        m.refresh_index(new_id);
        duplicates.push(new_id);
    }
    duplicates
}

fn translate_from_snapshot(m: &mut DocMutator<'_>, snapshot: &TransformSnapshot, d: Vec2) {
    let Some(entity) = m.doc.get_mut(snapshot.id) else {
        return;
    };
    let mut polyline_range = None;
    match (&snapshot.shape, &mut entity.shape) {
        (Shape::Rect(s), Shape::Rect(r)) => {
            r.x = s.x + d.x;
            r.y = s.y + d.y;
        }
        (Shape::Circle(s), Shape::Circle(c)) => {
            c.cx = s.cx + d.x;
            c.cy = s.cy + d.y;
        }
        (Shape::Polygon(s), Shape::Polygon(p)) => {
            p.cx = s.cx + d.x;
            p.cy = s.cy + d.y;
        }
        (Shape::Line(s), Shape::Line(l)) => {
            l.a = s.a + d;
            l.b = s.b + d;
        }
        (Shape::Arrow(s), Shape::Arrow(a)) => {
            a.a = s.a + d;
            a.b = s.b + d;
        }
        (Shape::Text(s), Shape::Text(t)) => {
            t.x = s.x + d.x;
            t.y = s.y + d.y;
        }
        (Shape::Polyline(_), Shape::Polyline(range)) => polyline_range = Some(*range),
        _ => {}
    }
    if let (Some(range), Some(points)) = (polyline_range, &snapshot.points) {
        let dst = m.doc.polyline_points_mut(range);
        for (dst_p, src_p) in dst.iter_mut().zip(points.iter()) {
            *dst_p = *src_p + d;
        }
    }
}

/// Write center + full dims into an OBB-carrying shape, preserving rot.
fn write_obb(m: &mut DocMutator<'_>, id: EntityId, center: Vec2, dims: Vec2) {
    let Some(entity) = m.doc.get_mut(id) else {
        return;
    };
    match &mut entity.shape {
        Shape::Rect(r) => {
            r.w = dims.x;
            r.h = dims.y;
            r.set_center(center);
        }
        Shape::Circle(c) => {
            c.cx = center.x;
            c.cy = center.y;
            c.rx = dims.x * 0.5;
            c.ry = dims.y * 0.5;
        }
        Shape::Polygon(p) => {
            p.cx = center.x;
            p.cy = center.y;
            p.rx = dims.x * 0.5;
            p.ry = dims.y * 0.5;
        }
        _ => {}
    }
}

fn scale_from_snapshot(
    m: &mut DocMutator<'_>,
    snapshot: &TransformSnapshot,
    anchor: Vec2,
    sx: f32,
    sy: f32,
    alt: bool,
) {
    let scale_point = |p: Vec2| Vec2::new(anchor.x + (p.x - anchor.x) * sx, anchor.y + (p.y - anchor.y) * sy);
    let Some(entity) = m.doc.get_mut(snapshot.id) else {
        return;
    };
    let mut polyline_range = None;
    match (&snapshot.shape, &mut entity.shape) {
        (Shape::Rect(s), Shape::Rect(r)) => {
            let center = scale_point(s.center());
            r.w = (s.w * sx.abs()).max(MIN_EXTENT);
            r.h = (s.h * sy.abs()).max(MIN_EXTENT);
            r.set_center(center);
        }
        (Shape::Circle(s), Shape::Circle(c)) => {
            let center = scale_point(s.center());
            c.cx = center.x;
            c.cy = center.y;
            if !alt && (s.rx - s.ry).abs() < 1e-6 {
                let u = sx.abs().max(sy.abs());
                let r = (s.rx * u).max(MIN_EXTENT * 0.5);
                c.rx = r;
                c.ry = r;
            } else {
                c.rx = (s.rx * sx.abs()).max(MIN_EXTENT * 0.5);
                c.ry = (s.ry * sy.abs()).max(MIN_EXTENT * 0.5);
            }
        }
        (Shape::Polygon(s), Shape::Polygon(p)) => {
            let center = scale_point(s.center());
            p.cx = center.x;
            p.cy = center.y;
            p.rx = (s.rx * sx.abs()).max(MIN_EXTENT * 0.5);
            p.ry = (s.ry * sy.abs()).max(MIN_EXTENT * 0.5);
        }
        (Shape::Line(s), Shape::Line(l)) => {
            l.a = scale_point(s.a);
            l.b = scale_point(s.b);
        }
        (Shape::Arrow(s), Shape::Arrow(a)) => {
            a.a = scale_point(s.a);
            a.b = scale_point(s.b);
        }
        (Shape::Text(s), Shape::Text(t)) => {
            // Position scales with the group; glyph size is left alone.
            let p = scale_point(Vec2::new(s.x, s.y));
            t.x = p.x;
            t.y = p.y;
        }
        (Shape::Polyline(_), Shape::Polyline(range)) => polyline_range = Some(*range),
        _ => {}
    }
    if let (Some(range), Some(points)) = (polyline_range, &snapshot.points) {
        let dst = m.doc.polyline_points_mut(range);
        for (dst_p, src_p) in dst.iter_mut().zip(points.iter()) {
            *dst_p = scale_point(*src_p);
        }
    }
}

fn rotate_from_snapshot(
    m: &mut DocMutator<'_>,
    snapshot: &TransformSnapshot,
    pivot: Vec2,
    rad: f32,
) {
    let Some(entity) = m.doc.get_mut(snapshot.id) else {
        return;
    };
    let mut polyline_range = None;
    match (&snapshot.shape, &mut entity.shape) {
        (Shape::Rect(s), Shape::Rect(r)) => {
            let center = rotate_around(s.center(), pivot, rad);
            r.rot = s.rot + rad;
            r.w = s.w;
            r.h = s.h;
            r.set_center(center);
        }
        (Shape::Circle(s), Shape::Circle(c)) => {
            let center = rotate_around(s.center(), pivot, rad);
            c.cx = center.x;
            c.cy = center.y;
            c.rot = s.rot + rad;
        }
        (Shape::Polygon(s), Shape::Polygon(p)) => {
            let center = rotate_around(s.center(), pivot, rad);
            p.cx = center.x;
            p.cy = center.y;
            p.rot = s.rot + rad;
        }
        (Shape::Line(s), Shape::Line(l)) => {
            l.a = rotate_around(s.a, pivot, rad);
            l.b = rotate_around(s.b, pivot, rad);
        }
        (Shape::Arrow(s), Shape::Arrow(a)) => {
            a.a = rotate_around(s.a, pivot, rad);
            a.b = rotate_around(s.b, pivot, rad);
        }
        (Shape::Text(s), Shape::Text(t)) => {
            let p = rotate_around(Vec2::new(s.x, s.y), pivot, rad);
            t.x = p.x;
            t.y = p.y;
            t.rot = s.rot + rad;
        }
        (Shape::Polyline(_), Shape::Polyline(range)) => polyline_range = Some(*range),
        _ => {}
    }
    if let (Some(range), Some(points)) = (polyline_range, &snapshot.points) {
        let dst = m.doc.polyline_points_mut(range);
        for (dst_p, src_p) in dst.iter_mut().zip(points.iter()) {
            *dst_p = rotate_around(*src_p, pivot, rad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_buffers_keep_rows_parallel() {
        let mut out = CommitBuffers::default();
        out.push(1, OP_MOVE, [50.0, 0.0, 0.0, 0.0]);
        out.push(2, OP_ROTATE, [5.0, 5.0, 90.0, 0.0]);
        assert_eq!(out.ids.len(), out.ops.len());
        assert_eq!(out.payloads.len(), out.ids.len() * 4);
        out.clear();
        assert!(out.is_empty());
    }

    #[test]
    fn safe_scale_guards_degenerate_axes() {
        assert_eq!(safe_scale(10.0, 0.0), 1.0);
        assert_eq!(safe_scale(0.0, 10.0), MIN_GROUP_SCALE);
        assert_eq!(safe_scale(-20.0, 10.0), -2.0);
    }

    #[test]
    fn corner_and_side_offsets_are_opposed_pairwise() {
        let half = Vec2::new(3.0, 2.0);
        let corners = corner_offsets(half);
        let sides = side_offsets(half);
        for i in 0..4 {
            assert_eq!(corners[i], -corners[(i + 2) % 4]);
            assert_eq!(sides[i], -sides[(i + 2) % 4]);
        }
    }
}
