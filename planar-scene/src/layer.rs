use serde::{Deserialize, Serialize};

pub type LayerId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub stroke: [f32; 4],
    pub fill: [f32; 4],
    pub fill_enabled: bool,
}

impl Layer {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            locked: false,
            stroke: [0.0, 0.0, 0.0, 1.0],
            fill: [1.0, 1.0, 1.0, 1.0],
            fill_enabled: false,
        }
    }
}

/// Layer table. Layer 0 always exists and cannot be removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerTable {
    layers: Vec<Layer>,
}

impl Default for LayerTable {
    fn default() -> Self {
        Self {
            layers: vec![Layer::named("0")],
        }
    }
}

impl LayerTable {
    pub fn add(&mut self, layer: Layer) -> LayerId {
        self.layers.push(layer);
        (self.layers.len() - 1) as LayerId
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id as usize)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(id as usize)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Unknown layers count as hidden, so entities on them never pick.
    pub fn usable(&self, id: LayerId) -> bool {
        self.get(id).map_or(false, |l| l.visible && !l.locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_layer_zero() {
        let t = LayerTable::default();
        assert_eq!(t.len(), 1);
        assert!(t.usable(0));
        assert!(!t.usable(7));
    }

    #[test]
    fn hidden_or_locked_layers_are_not_usable() {
        let mut t = LayerTable::default();
        let id = t.add(Layer::named("construction"));
        assert!(t.usable(id));
        t.get_mut(id).unwrap().visible = false;
        assert!(!t.usable(id));
        t.get_mut(id).unwrap().visible = true;
        t.get_mut(id).unwrap().locked = true;
        assert!(!t.usable(id));
    }
}
