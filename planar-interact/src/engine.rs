//! The interaction facade. Owns the document, the spatial index, the
//! history log and both session kinds; converts screen-space input events
//! to world space; and publishes result buffers, overlay meta and the
//! generation counter external consumers key on.

use glam::Vec2;
use planar_math::Aabb;
use planar_scene::{
    Document, Entity, EntityId, GlyphBoxMeasure, History, HistoryChange, HistoryEntry, Layer,
    LayerId, Shape, TextMeasure,
};
use tracing::{debug, error};

use crate::bounds::entity_aabb;
use crate::config::{InteractionConfig, Modifiers, ViewParams};
use crate::draft::{DraftDimensions, DraftPayload, DraftSession};
use crate::mutator::DocMutator;
use crate::overlay::{self, OverlayBuffer};
use crate::pick::{self, PickCandidate, PickMask, PickStats};
use crate::snap::{SnapGuide, SnapHit};
use crate::spatial_hash::SpatialHashGrid;
use crate::transform::{
    CommitBuffers, SnapFeedback, TransformMode, TransformSession, TransformState,
};

pub struct InteractionEngine {
    config: InteractionConfig,
    doc: Document,
    grid: SpatialHashGrid,
    history: History,
    text: Box<dyn TextMeasure>,
    session: TransformSession,
    draft: DraftSession,
    selection: Vec<EntityId>,
    generation: u64,
    selection_generation: u64,
    feedback: SnapFeedback,
    commit: CommitBuffers,
    pick_stats: PickStats,
    outline_meta: OverlayBuffer,
    handle_meta: OverlayBuffer,
    snap_meta: OverlayBuffer,
    overlay_built_at: (u64, u64),
    history_failed: bool,
}

impl Default for InteractionEngine {
    fn default() -> Self {
        Self::new(InteractionConfig::default())
    }
}

impl InteractionEngine {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            grid: SpatialHashGrid::new(config.grid_cell_size),
            config,
            doc: Document::new(),
            history: History::new(),
            text: Box::new(GlyphBoxMeasure::default()),
            session: TransformSession::new(),
            draft: DraftSession::new(),
            selection: Vec::new(),
            generation: 0,
            selection_generation: 0,
            feedback: SnapFeedback::default(),
            commit: CommitBuffers::default(),
            pick_stats: PickStats::default(),
            outline_meta: OverlayBuffer::default(),
            handle_meta: OverlayBuffer::default(),
            snap_meta: OverlayBuffer::default(),
            overlay_built_at: (u64::MAX, u64::MAX),
            history_failed: false,
        }
    }

    /// Swap in a real text layout collaborator. Re-indexes existing text
    /// entities against the new bounds.
    pub fn set_text_measure(&mut self, text: Box<dyn TextMeasure>) {
        self.text = text;
        let ids: Vec<EntityId> = self.doc.order().to_vec();
        for id in ids {
            self.refresh_index(id);
        }
        self.generation += 1;
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut InteractionConfig {
        &mut self.config
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Coherence token: strictly increases on any mutation visible to
    /// overlay and render consumers.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selection_generation(&self) -> u64 {
        self.selection_generation
    }

    /// Raised when the history log refused a push after the document was
    /// already mutated. A logic error in release; asserts in debug.
    pub fn history_failed(&self) -> bool {
        self.history_failed
    }

    // --- document pass-throughs (keep the index coherent) ---

    pub fn allocate_id(&mut self) -> EntityId {
        self.doc.allocate_id()
    }

    /// Insert or replace an entity, record it in history, refresh the
    /// index. Ids of 0 get a fresh allocation.
    pub fn upsert_entity(&mut self, mut entity: Entity) -> EntityId {
        if entity.id == 0 {
            entity.id = self.doc.allocate_id();
        }
        let id = entity.id;
        let before = History::capture_snapshot(&self.doc, id);
        self.doc.upsert(entity);
        let after = History::capture_snapshot(&self.doc, id);
        self.record_change(HistoryChange { id, before, after }, "upsert");
        self.refresh_index(id);
        self.generation += 1;
        id
    }

    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let before = History::capture_snapshot(&self.doc, id);
        if before.is_none() {
            return false;
        }
        self.doc.remove(id);
        self.grid.remove(id);
        self.record_change(
            HistoryChange {
                id,
                before,
                after: None,
            },
            "delete",
        );
        self.selection.retain(|&s| s != id);
        self.generation += 1;
        true
    }

    /// Allocate pool points and insert a polyline entity in one step.
    pub fn add_polyline(&mut self, points: &[Vec2]) -> EntityId {
        let range = self.doc.alloc_points(points);
        let id = self.doc.allocate_id();
        self.upsert_entity(Entity::new(id, Shape::Polyline(range)))
    }

    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        self.doc.add_layer(layer)
    }

    pub fn set_layer_visible(&mut self, layer: LayerId, visible: bool) {
        if let Some(l) = self.doc.layers.get_mut(layer) {
            l.visible = visible;
            self.generation += 1;
        }
    }

    pub fn set_layer_locked(&mut self, layer: LayerId, locked: bool) {
        if let Some(l) = self.doc.layers.get_mut(layer) {
            l.locked = locked;
            self.generation += 1;
        }
    }

    // --- selection ---

    pub fn set_selection(&mut self, ids: &[EntityId]) {
        self.selection.clear();
        for &id in ids {
            if self.doc.contains(id) && !self.selection.contains(&id) {
                self.selection.push(id);
            }
        }
        self.selection_generation += 1;
    }

    pub fn selection(&self) -> &[EntityId] {
        &self.selection
    }

    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.selection_generation += 1;
        }
    }

    // --- picking / queries ---

    /// Default mask for interactive picking: grips only make sense with a
    /// live selection.
    pub fn default_pick_mask(&self) -> PickMask {
        if self.selection.is_empty() {
            PickMask::body_edge_vertex()
        } else {
            PickMask::body_edge_vertex() | PickMask::HANDLES
        }
    }

    /// World-space probe, pixel tolerance. Returns the best entity id.
    pub fn pick(&mut self, x: f32, y: f32, tolerance_px: f32, view_scale: f32) -> Option<EntityId> {
        pick::pick(
            &self.doc,
            &self.grid,
            self.text.as_ref(),
            Vec2::new(x, y),
            tolerance_px / view_scale,
            view_scale,
            &mut self.pick_stats,
        )
    }

    pub fn pick_ex(
        &mut self,
        x: f32,
        y: f32,
        tolerance_px: f32,
        view_scale: f32,
        mask: PickMask,
    ) -> Option<PickCandidate> {
        pick::pick_ex(
            &self.doc,
            &self.grid,
            self.text.as_ref(),
            Vec2::new(x, y),
            tolerance_px / view_scale,
            view_scale,
            mask,
            &mut self.pick_stats,
        )
    }

    pub fn pick_stats(&self) -> PickStats {
        self.pick_stats
    }

    /// Pickable entities whose AABB intersects the rect, z-order first
    /// (topmost), then id.
    pub fn query_area(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Vec<EntityId> {
        let bounds = Aabb::new(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y));
        let mut ids = Vec::new();
        self.grid.query(&bounds, &mut ids);
        ids.sort_unstable();
        ids.dedup();
        ids.retain(|&id| {
            if !self.doc.is_pickable(id) {
                return false;
            }
            match self.doc.get(id) {
                Some(entity) => {
                    entity_aabb(&self.doc, entity, self.text.as_ref()).intersects(&bounds)
                }
                None => false,
            }
        });
        ids.sort_by(|&a, &b| {
            let za = self.doc.z_index(a).unwrap_or(0);
            let zb = self.doc.z_index(b).unwrap_or(0);
            zb.cmp(&za).then(a.cmp(&b))
        });
        ids
    }

    // --- transform session ---

    #[allow(clippy::too_many_arguments)]
    pub fn begin_transform(
        &mut self,
        ids: &[EntityId],
        mode: TransformMode,
        specific_id: Option<EntityId>,
        sub_index: i32,
        screen_x: f32,
        screen_y: f32,
        view: &ViewParams,
        modifiers: Modifiers,
    ) -> bool {
        if self.draft.active() || self.session.active() {
            return false;
        }
        // Group gestures act on the selection; explicit ids win for Move.
        let resolved: Vec<EntityId> = match mode {
            TransformMode::Resize | TransformMode::Rotate => {
                if self.selection.is_empty() {
                    ids.to_vec()
                } else {
                    self.selection.clone()
                }
            }
            TransformMode::Move if ids.is_empty() => self.selection.clone(),
            _ => ids.to_vec(),
        };
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        let ok = self.session.begin(
            &mut m,
            &resolved,
            mode,
            specific_id,
            sub_index,
            Vec2::new(screen_x, screen_y),
            view,
            modifiers,
        );
        if ok && self.session.duplicated() {
            self.selection = self.session.ids().to_vec();
            self.selection_generation += 1;
            self.generation += 1;
        }
        ok
    }

    pub fn update_transform(
        &mut self,
        screen_x: f32,
        screen_y: f32,
        view: &ViewParams,
        modifiers: Modifiers,
    ) -> bool {
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        let changed = self.session.update(
            &mut m,
            Vec2::new(screen_x, screen_y),
            view,
            modifiers,
            &self.config,
            &mut self.feedback,
        );
        if changed {
            self.generation += 1;
        }
        changed
    }

    /// Finalize the gesture into the result buffers and one history entry.
    pub fn commit_transform(&mut self) -> bool {
        if !self.session.active() {
            return false;
        }
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        let any = self.session.commit(&mut m, &mut self.commit);
        self.feedback.clear();
        self.generation += 1;
        any
    }

    pub fn cancel_transform(&mut self) -> bool {
        if !self.session.active() {
            return false;
        }
        let restore_selection = if self.session.duplicated() {
            Some(self.session.original_ids().to_vec())
        } else {
            None
        };
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        let cancelled = self.session.cancel(&mut m);
        if let Some(original) = restore_selection {
            self.set_selection(&original);
        }
        self.feedback.clear();
        self.generation += 1;
        cancelled
    }

    pub fn transform_state(&self) -> TransformState {
        self.session.state()
    }

    // --- draft session ---

    pub fn begin_draft(
        &mut self,
        payload: DraftPayload,
        screen_x: f32,
        screen_y: f32,
        view: &ViewParams,
    ) -> bool {
        if self.session.active() || self.draft.active() {
            return false;
        }
        let world = view.screen_to_world(Vec2::new(screen_x, screen_y));
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        let ok = self.draft.begin(&mut m, payload, world);
        if ok {
            self.generation += 1;
        }
        ok
    }

    pub fn update_draft(
        &mut self,
        screen_x: f32,
        screen_y: f32,
        view: &ViewParams,
        modifiers: Modifiers,
    ) {
        if !self.draft.active() {
            return;
        }
        let world = view.screen_to_world(Vec2::new(screen_x, screen_y));
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        self.draft.update(&mut m, world, modifiers);
        self.generation += 1;
    }

    pub fn append_draft_point(
        &mut self,
        screen_x: f32,
        screen_y: f32,
        view: &ViewParams,
        modifiers: Modifiers,
    ) {
        if !self.draft.active() {
            return;
        }
        let world = view.screen_to_world(Vec2::new(screen_x, screen_y));
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        self.draft.append_point(&mut m, world, modifiers);
        self.generation += 1;
    }

    /// Returns the committed entity's fresh id, or `None` for degenerate
    /// drafts.
    pub fn commit_draft(&mut self) -> Option<EntityId> {
        if !self.draft.active() {
            return None;
        }
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        let id = self.draft.commit(&mut m);
        self.generation += 1;
        id
    }

    pub fn cancel_draft(&mut self) {
        if !self.draft.active() {
            return;
        }
        let mut m = DocMutator::new(
            &mut self.doc,
            &mut self.grid,
            self.text.as_ref(),
            &mut self.history,
        );
        self.draft.cancel(&mut m);
        self.generation += 1;
    }

    pub fn draft_active(&self) -> bool {
        self.draft.active()
    }

    pub fn draft_dimensions(&self) -> DraftDimensions {
        self.draft.dimensions()
    }

    // --- result buffers / snap visuals ---

    pub fn commit_result_ids(&self) -> &[u32] {
        &self.commit.ids
    }

    pub fn commit_result_op_codes(&self) -> &[u32] {
        &self.commit.ops
    }

    pub fn commit_result_payloads(&self) -> &[f32] {
        &self.commit.payloads
    }

    pub fn snap_guides(&self) -> &[SnapGuide] {
        &self.feedback.guides
    }

    pub fn snap_hits(&self) -> &[SnapHit] {
        &self.feedback.hits
    }

    // --- undo / redo ---

    pub fn undo(&mut self) -> bool {
        let Some(touched) = self.history.undo(&mut self.doc) else {
            return false;
        };
        for id in touched {
            self.refresh_index(id);
        }
        self.prune_selection();
        self.generation += 1;
        debug!("undo applied");
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(touched) = self.history.redo(&mut self.doc) else {
            return false;
        };
        for id in touched {
            self.refresh_index(id);
        }
        self.prune_selection();
        self.generation += 1;
        debug!("redo applied");
        true
    }

    // --- overlay meta ---

    pub fn selection_outline_meta(&mut self) -> &OverlayBuffer {
        self.rebuild_overlays();
        &self.outline_meta
    }

    pub fn selection_handle_meta(&mut self) -> &OverlayBuffer {
        self.rebuild_overlays();
        &self.handle_meta
    }

    pub fn snap_overlay_meta(&mut self) -> &OverlayBuffer {
        self.rebuild_overlays();
        &self.snap_meta
    }

    fn rebuild_overlays(&mut self) {
        let key = (self.generation, self.selection_generation);
        if self.overlay_built_at == key {
            return;
        }
        overlay::selection_outline(
            &self.doc,
            self.text.as_ref(),
            &self.selection,
            &mut self.outline_meta,
        );
        overlay::selection_handles(
            &self.doc,
            self.text.as_ref(),
            &self.selection,
            &mut self.handle_meta,
        );
        overlay::snap_overlay(&self.feedback.guides, &self.feedback.hits, &mut self.snap_meta);
        self.overlay_built_at = key;
    }

    // --- internals ---

    fn refresh_index(&mut self, id: EntityId) {
        match self.doc.get(id) {
            Some(entity) => {
                let aabb = entity_aabb(&self.doc, entity, self.text.as_ref());
                self.grid.update(id, &aabb);
            }
            None => self.grid.remove(id),
        }
    }

    fn prune_selection(&mut self) {
        let before = self.selection.len();
        let doc = &self.doc;
        self.selection.retain(|&id| doc.contains(id));
        if self.selection.len() != before {
            self.selection_generation += 1;
        }
    }

    fn record_change(&mut self, change: HistoryChange, label: &str) {
        if self.history.transaction_open() {
            self.history.record(change);
            return;
        }
        let entry = HistoryEntry {
            label: label.to_string(),
            changes: vec![change],
        };
        if let Err(err) = self.history.push_entry(entry) {
            // The document is already mutated; surface instead of rolling
            // back.
            self.history_failed = true;
            error!(error = %err, "history push refused");
            debug_assert!(false, "history push refused: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar_scene::RectShape;

    fn rect_entity(id: EntityId, x: f32, y: f32, w: f32, h: f32) -> Entity {
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
    fn upsert_makes_entities_pickable_through_the_index() {
        let mut engine = InteractionEngine::default();
        let id = engine.upsert_entity(rect_entity(0, 0.0, 0.0, 10.0, 10.0));
        let hit = engine.pick(0.0, 0.0, 3.0, 1.0);
        assert_eq!(hit, Some(id));
    }

    #[test]
    fn query_area_orders_topmost_first() {
        let mut engine = InteractionEngine::default();
        let a = engine.upsert_entity(rect_entity(0, 0.0, 0.0, 10.0, 10.0));
        let b = engine.upsert_entity(rect_entity(0, 2.0, -2.0, 10.0, 10.0));
        let c = engine.upsert_entity(rect_entity(0, 100.0, 0.0, 10.0, 10.0));
        let ids = engine.query_area(-1.0, -20.0, 20.0, 1.0);
        assert_eq!(ids, vec![b, a]);
        assert!(!ids.contains(&c));
    }

    #[test]
    fn remove_entity_clears_index_and_selection() {
        let mut engine = InteractionEngine::default();
        let id = engine.upsert_entity(rect_entity(0, 0.0, 0.0, 10.0, 10.0));
        engine.set_selection(&[id]);
        assert!(engine.remove_entity(id));
        assert!(engine.selection().is_empty());
        assert!(engine.pick(5.0, -5.0, 3.0, 1.0).is_none());
    }

    #[test]
    fn undo_redo_round_trips_creation() {
        let mut engine = InteractionEngine::default();
        let id = engine.upsert_entity(rect_entity(0, 0.0, 0.0, 10.0, 10.0));
        assert!(engine.undo());
        assert!(engine.document().get(id).is_none());
        assert!(engine.pick(5.0, -5.0, 3.0, 1.0).is_none());
        assert!(engine.redo());
        assert_eq!(engine.pick(5.0, -5.0, 3.0, 1.0), Some(id));
    }

    #[test]
    fn generation_moves_with_every_visible_mutation() {
        let mut engine = InteractionEngine::default();
        let g0 = engine.generation();
        let id = engine.upsert_entity(rect_entity(0, 0.0, 0.0, 10.0, 10.0));
        assert!(engine.generation() > g0);
        let g1 = engine.generation();
        engine.remove_entity(id);
        assert!(engine.generation() > g1);
    }

    #[test]
    fn layer_lock_hides_entities_from_picking() {
        let mut engine = InteractionEngine::default();
        let id = engine.upsert_entity(rect_entity(0, 0.0, 0.0, 10.0, 10.0));
        engine.set_layer_locked(0, true);
        assert!(engine.pick(5.0, -5.0, 3.0, 1.0).is_none());
        engine.set_layer_locked(0, false);
        assert_eq!(engine.pick(5.0, -5.0, 3.0, 1.0), Some(id));
    }
}
