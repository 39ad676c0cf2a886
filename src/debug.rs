use bevy::prelude::*;

use crate::chase::NavState;
use crate::geometry::Bounds;
use crate::graph::{LinkAction, LinkKey};

/// Toggles for the navigation gizmo overlay.
#[derive(Resource, Clone, serde::Serialize, serde::Deserialize)]
pub struct NavOverlayConfig {
    pub show: bool,
    pub show_surfaces: bool,
    pub show_nodes: bool,
}

impl Default for NavOverlayConfig {
    fn default() -> Self {
        Self {
            show: false,
            show_surfaces: true,
            show_nodes: true,
        }
    }
}

/// Draws the traversal graph, the active trace, and the surface index as
/// gizmos. Reads go through the same timed locks as everything else, so a
/// busy tick simply skips a frame of overlay.
pub struct NavOverlayPlugin;

impl Plugin for NavOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(NavOverlayConfig::default())
            .add_systems(Update, draw_overlay);
    }
}

fn draw_overlay(config: Res<NavOverlayConfig>, state: Res<NavState>, mut gizmos: Gizmos) {
    if !config.show {
        return;
    }
    let trace: Vec<LinkKey> = state.navigator.trace().iter().map(|s| s.link).collect();
    state.navigator.with_graph(|graph| {
        for (key, link) in graph.links() {
            let color = if trace.contains(&key) {
                Color::srgb(1.0, 0.9, 0.2)
            } else if link.action.allows_any(LinkAction::TRAVERSING) {
                Color::srgb(0.2, 0.9, 0.4)
            } else if link.action.allows_all(LinkAction::JUMPING) {
                Color::srgb(0.3, 0.5, 1.0)
            } else {
                Color::srgb(0.9, 0.4, 0.9)
            };
            gizmos.line_2d(link.segment.start, link.segment.end, color);
        }
        if config.show_nodes {
            for (_, node) in graph.nodes() {
                let size = Vec2::splat(0.12);
                gizmos.line_2d(
                    node.position - size,
                    node.position + size,
                    Color::srgba(0.95, 0.95, 0.95, 0.9),
                );
            }
        }
    });
    if config.show_surfaces {
        state.navigator.with_surfaces(|surfaces| {
            for (bounds, _) in surfaces.node_bounds() {
                draw_bounds(&mut gizmos, &bounds, Color::srgba(0.9, 0.6, 0.2, 0.5));
            }
        });
    }
}

fn draw_bounds(gizmos: &mut Gizmos, bounds: &Bounds, color: Color) {
    let bl = bounds.min;
    let br = Vec2::new(bounds.max.x, bounds.min.y);
    let tr = bounds.max;
    let tl = Vec2::new(bounds.min.x, bounds.max.y);
    gizmos.line_2d(bl, br, color);
    gizmos.line_2d(br, tr, color);
    gizmos.line_2d(tr, tl, color);
    gizmos.line_2d(tl, bl, color);
}
