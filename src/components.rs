use std::collections::HashSet;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::arcs::Ballistics;
use crate::geometry::Bounds;

/// A scene object the agent can stand on. The name is stable and unique
/// enough to label the links generated from it.
#[derive(Component, Clone)]
pub struct Platform {
    pub name: String,
    pub layer: u32,
}

impl Platform {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer: 1,
        }
    }

    pub fn with_layer(name: impl Into<String>, layer: u32) -> Self {
        Self {
            name: name.into(),
            layer,
        }
    }
}

/// Free-form labels used by the scene filter.
#[derive(Component, Clone, Default)]
pub struct Tags(pub HashSet<String>);

/// Axis-aligned collision box dimensions.
#[derive(Component, Clone, Copy)]
pub struct Collider {
    pub width: f32,
    pub height: f32,
}

/// Sub-tile precision position (world units, box center).
#[derive(Component, Clone, Copy, Default)]
pub struct GamePosition {
    pub x: f32,
    pub y: f32,
}

/// Whether the entity is on the ground, as decided by the host controller.
#[derive(Component, Clone, Copy, Default)]
pub struct Grounded(pub bool);

/// The platform directly beneath the character, as decided by the host
/// controller's ground probe.
#[derive(Component, Clone, Copy, Default)]
pub struct StandingOn(pub Option<Entity>);

/// The engine's only output: a directional input for the host to feed to
/// its character controller. Zero means stand still.
#[derive(Component, Clone, Copy, Default)]
pub struct SteerOutput(pub Vec2);

/// The character being steered.
#[derive(Component, Default)]
pub struct NavAgent;

/// The character being chased.
#[derive(Component, Default)]
pub struct ChaseTarget;

/// Tuning for graph maintenance and scene filtering.
#[derive(Resource, Clone, Serialize, Deserialize)]
pub struct NavConfig {
    /// Ground segment target length, in multiples of the agent width.
    /// Clamped to `[1, 10]`.
    pub segment_width_multiplier: f32,
    /// Minimum game-time seconds between maintenance ticks.
    pub graph_update_interval: f32,
    /// Rebuild the whole graph every tick instead of diffing.
    pub full_graph_rebuild: bool,
    pub layer_mask: u32,
    /// When set, only platforms carrying this tag are considered.
    pub tag_filter: Option<String>,
    pub rtree_max_entries: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub ballistics: Ballistics,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            segment_width_multiplier: 5.0,
            graph_update_interval: 0.25,
            full_graph_rebuild: false,
            layer_mask: u32::MAX,
            tag_filter: None,
            rtree_max_entries: crate::rtree::DEFAULT_MAX_ENTRIES,
            read_timeout_ms: 10,
            write_timeout_ms: 20,
            ballistics: Ballistics::default(),
        }
    }
}

impl NavConfig {
    pub fn segment_multiplier(&self) -> f32 {
        self.segment_width_multiplier.clamp(1.0, 10.0)
    }
}

/// World-space box of a positioned collider.
pub fn collider_bounds(position: &GamePosition, collider: &Collider) -> Bounds {
    Bounds::from_center(
        Vec2::new(position.x, position.y),
        Vec2::new(collider.width, collider.height),
    )
}
