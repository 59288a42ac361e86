//! The narrow document-mutation capability handed to sessions. Bundling
//! the store, the spatial index, the text measure and the history log into
//! one borrow keeps the session free of back-references into the engine
//! and unit-testable against bare parts.

use planar_scene::{Document, EntityId, History, TextMeasure};

use crate::bounds::entity_aabb;
use crate::spatial_hash::SpatialHashGrid;

pub struct DocMutator<'a> {
    pub doc: &'a mut Document,
    pub grid: &'a mut SpatialHashGrid,
    pub text: &'a dyn TextMeasure,
    pub history: &'a mut History,
}

impl<'a> DocMutator<'a> {
    pub fn new(
        doc: &'a mut Document,
        grid: &'a mut SpatialHashGrid,
        text: &'a dyn TextMeasure,
        history: &'a mut History,
    ) -> Self {
        Self {
            doc,
            grid,
            text,
            history,
        }
    }

    /// Recompute the entity's AABB and refresh its grid entry. Unknown ids
    /// fall out of the index.
    pub fn refresh_index(&mut self, id: EntityId) {
        match self.doc.get(id) {
            Some(entity) => {
                let aabb = entity_aabb(self.doc, entity, self.text);
                self.grid.update(id, &aabb);
            }
            None => self.grid.remove(id),
        }
    }
}
