use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::document::Document;
use crate::entity::{Entity, EntityId, Shape};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("an entry cannot be pushed while a transaction is open")]
    TransactionOpen,
}

/// Full pre- or post-state of one entity: the record itself plus an owned
/// copy of its pooled points for polylines. Sufficient to restore the
/// entity on undo and to diff for commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: Entity,
    pub points: Option<Vec<Vec2>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryChange {
    pub id: EntityId,
    /// `None` means the entity did not exist before (creation).
    pub before: Option<EntitySnapshot>,
    /// `None` means the entity no longer exists after (deletion).
    pub after: Option<EntitySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub label: String,
    /// Sorted by id for determinism.
    pub changes: Vec<HistoryChange>,
}

/// Undo/redo log. A transaction coalesces every change of one gesture into
/// a single entry; while suppressed, committed entries are dropped.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    txn: Option<Vec<HistoryChange>>,
    suppressed: bool,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_open(&self) -> bool {
        self.txn.is_some()
    }

    /// Open a transaction. Returns false when one is already open, in which
    /// case the caller must not commit it either.
    pub fn begin_transaction(&mut self) -> bool {
        if self.txn.is_some() {
            return false;
        }
        self.txn = Some(Vec::new());
        true
    }

    /// Record a change into the open transaction, or as an immediate
    /// single-change entry when none is open.
    pub fn record(&mut self, change: HistoryChange) {
        match &mut self.txn {
            Some(changes) => changes.push(change),
            None => {
                let _ = self.push_entry(HistoryEntry {
                    label: String::new(),
                    changes: vec![change],
                });
            }
        }
    }

    /// Close the open transaction into one entry. Empty transactions leave
    /// no trace.
    pub fn commit_transaction(&mut self, label: &str) {
        let Some(mut changes) = self.txn.take() else {
            return;
        };
        if changes.is_empty() {
            return;
        }
        changes.sort_by_key(|c| c.id);
        let _ = self.push_entry(HistoryEntry {
            label: label.to_string(),
            changes,
        });
    }

    /// Discard the open transaction without recording anything.
    pub fn abort_transaction(&mut self) {
        self.txn = None;
    }

    pub fn push_entry(&mut self, entry: HistoryEntry) -> Result<(), HistoryError> {
        if self.txn.is_some() {
            return Err(HistoryError::TransactionOpen);
        }
        if self.suppressed {
            return Ok(());
        }
        self.undo.push(entry);
        self.redo.clear();
        Ok(())
    }

    pub fn set_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
    }

    pub fn suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Capture the current state of `id`, or `None` if it does not exist.
    pub fn capture_snapshot(doc: &Document, id: EntityId) -> Option<EntitySnapshot> {
        let entity = doc.get(id)?.clone();
        let points = match entity.shape {
            Shape::Polyline(range) => Some(doc.polyline_points(range).to_vec()),
            _ => None,
        };
        Some(EntitySnapshot { entity, points })
    }

    /// Write a snapshot back into the document. Polyline points are written
    /// into the entity's existing pool range when the length still matches;
    /// otherwise a fresh range is allocated.
    pub fn apply_snapshot(doc: &mut Document, snapshot: &EntitySnapshot) {
        let mut entity = snapshot.entity.clone();
        if let (Shape::Polyline(_), Some(points)) = (&entity.shape, &snapshot.points) {
            let reusable = match doc.get(entity.id).map(|e| &e.shape) {
                Some(Shape::Polyline(cur)) if cur.count as usize == points.len() => Some(*cur),
                _ => None,
            };
            let range = match reusable {
                Some(range) => {
                    doc.polyline_points_mut(range).copy_from_slice(points);
                    range
                }
                None => doc.alloc_points(points),
            };
            entity.shape = Shape::Polyline(range);
        }
        doc.upsert(entity);
    }

    /// Apply the top undo entry. Returns the touched ids so the caller can
    /// re-sync derived state (spatial index, overlays).
    pub fn undo(&mut self, doc: &mut Document) -> Option<Vec<EntityId>> {
        let entry = self.undo.pop()?;
        debug!(label = %entry.label, changes = entry.changes.len(), "undo");
        let mut touched = Vec::with_capacity(entry.changes.len());
        for change in entry.changes.iter().rev() {
            touched.push(change.id);
            match &change.before {
                Some(snapshot) => Self::apply_snapshot(doc, snapshot),
                None => {
                    doc.remove(change.id);
                }
            }
        }
        self.redo.push(entry);
        Some(touched)
    }

    pub fn redo(&mut self, doc: &mut Document) -> Option<Vec<EntityId>> {
        let entry = self.redo.pop()?;
        debug!(label = %entry.label, changes = entry.changes.len(), "redo");
        let mut touched = Vec::with_capacity(entry.changes.len());
        for change in &entry.changes {
            touched.push(change.id);
            match &change.after {
                Some(snapshot) => Self::apply_snapshot(doc, snapshot),
                None => {
                    doc.remove(change.id);
                }
            }
        }
        self.undo.push(entry);
        Some(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RectShape;

    fn rect(id: EntityId, x: f32) -> Entity {
        Entity::new(
            id,
            Shape::Rect(RectShape {
                x,
                y: 0.0,
                w: 10.0,
                h: 10.0,
                rot: 0.0,
            }),
        )
    }

    #[test]
    fn transaction_coalesces_into_one_entry() {
        let mut doc = Document::new();
        let mut history = History::new();
        doc.upsert(rect(1, 0.0));
        doc.upsert(rect(2, 20.0));

        assert!(history.begin_transaction());
        for id in [1u32, 2] {
            let before = History::capture_snapshot(&doc, id);
            if let Shape::Rect(r) = &mut doc.get_mut(id).unwrap().shape {
                r.x += 5.0;
            }
            let after = History::capture_snapshot(&doc, id);
            history.record(HistoryChange { id, before, after });
        }
        history.commit_transaction("move");
        assert_eq!(history.undo_depth(), 1);

        let touched = history.undo(&mut doc).unwrap();
        assert_eq!(touched.len(), 2);
        match doc.get(1).unwrap().shape {
            Shape::Rect(r) => assert_eq!(r.x, 0.0),
            _ => unreachable!(),
        }
        history.redo(&mut doc);
        match doc.get(2).unwrap().shape {
            Shape::Rect(r) => assert_eq!(r.x, 25.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn undo_of_creation_removes_the_entity() {
        let mut doc = Document::new();
        let mut history = History::new();
        doc.upsert(rect(7, 0.0));
        let after = History::capture_snapshot(&doc, 7);
        history.record(HistoryChange {
            id: 7,
            before: None,
            after,
        });
        history.undo(&mut doc);
        assert!(!doc.contains(7));
        history.redo(&mut doc);
        assert!(doc.contains(7));
    }

    #[test]
    fn push_refused_while_transaction_open() {
        let mut history = History::new();
        history.begin_transaction();
        let err = history.push_entry(HistoryEntry {
            label: "x".into(),
            changes: vec![],
        });
        assert_eq!(err, Err(HistoryError::TransactionOpen));
    }

    #[test]
    fn suppressed_entries_leave_no_trace() {
        let mut doc = Document::new();
        let mut history = History::new();
        doc.upsert(rect(1, 0.0));
        history.set_suppressed(true);
        let snap = History::capture_snapshot(&doc, 1);
        history.record(HistoryChange {
            id: 1,
            before: snap.clone(),
            after: snap,
        });
        assert_eq!(history.undo_depth(), 0);
    }

    #[test]
    fn snapshots_round_trip_through_serde() {
        let mut doc = Document::new();
        let range = doc.alloc_points(&[Vec2::ZERO, Vec2::new(3.0, 4.0)]);
        doc.upsert(Entity::new(9, Shape::Polyline(range)));
        let snapshot = History::capture_snapshot(&doc, 9).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: EntitySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn polyline_snapshot_restores_points_in_place() {
        let mut doc = Document::new();
        let mut history = History::new();
        let range = doc.alloc_points(&[Vec2::ZERO, Vec2::new(10.0, 0.0)]);
        doc.upsert(Entity::new(3, Shape::Polyline(range)));

        let before = History::capture_snapshot(&doc, 3);
        doc.polyline_points_mut(range)[1] = Vec2::new(10.0, 10.0);
        let after = History::capture_snapshot(&doc, 3);
        history.record(HistoryChange {
            id: 3,
            before,
            after,
        });

        history.undo(&mut doc);
        assert_eq!(doc.polyline_points(range)[1], Vec2::new(10.0, 0.0));
        history.redo(&mut doc);
        assert_eq!(doc.polyline_points(range)[1], Vec2::new(10.0, 10.0));
    }
}
