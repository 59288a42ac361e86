//! Interaction core for a 2D CAD document: spatial hit-test index, pick
//! resolution, object/grid snapping, transform and draft sessions, and
//! overlay meta for the selection.
//!
//! Everything is synchronous and single-threaded. External consumers key
//! coherence on the engine's generation counter: sample it before and
//! after reading, and retry when it moved.

pub mod bounds;
pub mod config;
pub mod draft;
pub mod engine;
pub mod mutator;
pub mod overlay;
pub mod pick;
pub mod snap;
pub mod spatial_hash;
pub mod transform;

pub use config::{InteractionConfig, Modifiers, SnapOptions, ViewParams};
pub use draft::{DraftDimensions, DraftPayload, DraftSession};
pub use engine::InteractionEngine;
pub use mutator::DocMutator;
pub use overlay::{OverlayBuffer, OverlayKind, OverlayPrimitive};
pub use pick::{PickCandidate, PickMask, PickStats, PickSubTarget};
pub use snap::{SnapGuide, SnapHit, SnapKind};
pub use spatial_hash::{SpatialGridStats, SpatialHashGrid, DEFAULT_CELL_SIZE};
pub use transform::{
    CommitBuffers, SnapFeedback, TransformMode, TransformSession, TransformState, OP_MOVE,
    OP_RESIZE, OP_ROTATE, OP_SIDE_RESIZE, OP_VERTEX_SET,
};
