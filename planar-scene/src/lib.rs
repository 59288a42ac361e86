//! Authoritative 2D CAD document: entity records with styles and layers,
//! the shared polyline point pool, draw order, and the undo/redo history.
//!
//! The interaction crate mutates this store only through its public
//! surface; everything here is synchronous and single-threaded.

pub mod document;
pub mod entity;
pub mod history;
pub mod layer;
pub mod text;

pub use document::{Document, SceneError};
pub use entity::{
    ArrowShape, CircleShape, Entity, EntityId, EntityKind, LineShape, PolygonShape, PolylineShape,
    RectShape, Shape, Style, TextShape, DRAFT_ENTITY_ID, MAX_POLYGON_SIDES, MIN_POLYGON_SIDES,
};
pub use history::{EntitySnapshot, History, HistoryChange, HistoryEntry, HistoryError};
pub use layer::{Layer, LayerId, LayerTable};
pub use text::{GlyphBoxMeasure, TextMeasure};
