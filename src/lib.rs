//! Dynamic platform-graph navigation for 2D platformer agents.
//!
//! The engine watches a scene of axis-aligned platforms, keeps a traversal
//! graph of walkable segments connected by jump and fall arcs, and steers an
//! agent along the shortest route to a moving target. Platforms may appear,
//! move, or vanish between ticks; maintenance is diff-based and the graph is
//! queried concurrently by overlays through timed reader/writer locks.
//!
//! Add [`ChasePlugin`] to a Bevy app, tag platforms with [`Platform`] +
//! [`Collider`] + [`GamePosition`], tag the two characters with [`NavAgent`]
//! and [`ChaseTarget`], and read the agent's [`SteerOutput`] each frame.
//! The pure core ([`Navigator`] and below) has no scheduling dependencies
//! and can be driven directly by a host with its own loop.

pub mod arcs;
pub mod astar;
pub mod chase;
pub mod components;
pub mod debug;
pub mod geometry;
pub mod graph;
pub mod heap;
pub mod locks;
pub mod navigator;
pub mod rtree;
pub mod stats;

pub use arcs::{ArcProfile, Ballistics};
pub use astar::RouteStep;
pub use chase::{ChasePlugin, GroundProbePlugin, NavState};
pub use components::{
    collider_bounds, ChaseTarget, Collider, GamePosition, Grounded, NavAgent, NavConfig,
    Platform, StandingOn, SteerOutput, Tags,
};
pub use debug::{NavOverlayConfig, NavOverlayPlugin};
pub use geometry::{point_key, Anchor, Axis, Bounds, Direction, PointKey, Segment};
pub use graph::{LinkAction, LinkFlow, LinkKey, NavGraph, NavLink};
pub use navigator::{
    top_face, BodyState, MaintenanceInput, MaintenanceReport, Navigator, ScenePlatform,
    SurfaceRef,
};
pub use rtree::RTree;
pub use stats::NavStats;
