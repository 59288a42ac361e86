use bitflags::bitflags;
use glam::Vec2;
use planar_math::Aabb;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Keyboard modifier bitmask carried on every input event.
    ///
    /// Ctrl/Meta suppress object snap for the frame; Shift enables the
    /// 45°/aspect/axis-lock constraints; Alt enables symmetric resize and
    /// duplicate-on-move.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const META = 1 << 3;
    }
}

impl Modifiers {
    pub fn suppress_object_snap(&self) -> bool {
        self.intersects(Modifiers::CTRL | Modifiers::META)
    }
}

/// Viewport parameters accompanying every input event. Screen coordinates
/// are pixel space, Y-down; the world is Y-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewParams {
    pub fn new(x: f32, y: f32, scale: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            scale,
            width,
            height,
        }
    }

    /// `(sx, sy) ↦ ((sx − viewX)/scale, −(sy − viewY)/scale)`.
    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        Vec2::new(
            (screen.x - self.x) / self.scale,
            -(screen.y - self.y) / self.scale,
        )
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        Vec2::new(
            world.x * self.scale + self.x,
            -world.y * self.scale + self.y,
        )
    }

    /// Pixel distances divided by scale give world distances.
    pub fn px_to_world(&self, px: f32) -> f32 {
        px / self.scale
    }

    /// The viewport rectangle in world coordinates.
    pub fn world_bounds(&self) -> Aabb {
        let a = self.screen_to_world(Vec2::ZERO);
        let b = self.screen_to_world(Vec2::new(self.width, self.height));
        Aabb::new(a.min(b), a.max(b))
    }
}

/// Object- and grid-snap configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapOptions {
    pub enabled: bool,
    pub endpoint_enabled: bool,
    pub midpoint_enabled: bool,
    pub center_enabled: bool,
    pub nearest_enabled: bool,
    pub grid_enabled: bool,
    pub grid_size: f32,
    pub tolerance_px: f32,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint_enabled: true,
            midpoint_enabled: true,
            center_enabled: true,
            nearest_enabled: true,
            grid_enabled: false,
            grid_size: 10.0,
            tolerance_px: 8.0,
        }
    }
}

/// Tunables for the whole interaction core. Defaults match the shipped
/// behavior; everything here is fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub snap: SnapOptions,
    /// Gestures shorter than this (screen px) never mutate anything.
    pub drag_threshold_px: f32,
    /// Spatial grid cell size in world units.
    pub grid_cell_size: f32,
    /// |major|/|minor| ratio at which Shift-move locks to an axis.
    pub axis_lock_enter_ratio: f32,
    /// Stronger ratio required to switch an established lock.
    pub axis_lock_switch_ratio: f32,
    /// Minimum screen-space drag before a lock can engage.
    pub axis_lock_min_px: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            snap: SnapOptions::default(),
            drag_threshold_px: 3.0,
            grid_cell_size: 50.0,
            axis_lock_enter_ratio: 1.25,
            axis_lock_switch_ratio: 1.75,
            axis_lock_min_px: 4.0,
        }
    }
}
