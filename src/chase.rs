use std::time::{Duration, Instant};

use bevy::prelude::*;

use crate::arcs::ArcProfile;
use crate::components::{
    collider_bounds, ChaseTarget, Collider, GamePosition, Grounded, NavAgent, NavConfig,
    Platform, StandingOn, SteerOutput, Tags,
};
use crate::navigator::{BodyState, MaintenanceInput, Navigator, ScenePlatform};
use crate::stats::NavStats;

/// How close a character's feet must be to a platform top to count as
/// standing on it, in world units.
const GROUND_TOLERANCE: f32 = 0.5;

/// Drives a [`NavAgent`] toward the [`ChaseTarget`]: graph maintenance and
/// route planning on the fixed step, steering output every frame.
pub struct ChasePlugin;

impl Plugin for ChasePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<NavConfig>()
            .init_resource::<NavStats>()
            .init_resource::<NavState>()
            .add_systems(FixedUpdate, update_navigation)
            .add_systems(Update, steer_agents);
    }
}

/// Optional stand-in for a host character controller: resolves
/// [`StandingOn`] and [`Grounded`] with a simple vertical probe. Hosts with
/// a real raycast controller should write those components themselves and
/// skip this plugin.
pub struct GroundProbePlugin;

impl Plugin for GroundProbePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedPreUpdate, probe_standing);
    }
}

/// The navigator behind a resource handle so overlays and host systems can
/// share it.
#[derive(Resource)]
pub struct NavState {
    pub navigator: Navigator,
    interval_timer: f32,
    configured: bool,
}

impl Default for NavState {
    fn default() -> Self {
        Self {
            navigator: Navigator::new(),
            interval_timer: 0.0,
            configured: false,
        }
    }
}

impl NavState {
    fn apply_config(&mut self, config: &NavConfig) {
        if self.configured {
            return;
        }
        self.navigator = Navigator::with_settings(
            config.rtree_max_entries,
            Duration::from_millis(config.read_timeout_ms),
            Duration::from_millis(config.write_timeout_ms),
        );
        self.configured = true;
    }
}

type PlatformQueryItem<'a> = (
    Entity,
    &'a Platform,
    &'a GamePosition,
    &'a Collider,
    Option<&'a Tags>,
);

type AgentQueryItem<'a> = (
    &'a GamePosition,
    &'a Collider,
    &'a StandingOn,
    &'a Grounded,
);

fn update_navigation(
    time: Res<Time<Fixed>>,
    config: Res<NavConfig>,
    mut state: ResMut<NavState>,
    mut stats: ResMut<NavStats>,
    platforms: Query<PlatformQueryItem<'_>>,
    agents: Query<AgentQueryItem<'_>, (With<NavAgent>, Without<ChaseTarget>)>,
    targets: Query<
        (&GamePosition, &Collider, &StandingOn),
        (With<ChaseTarget>, Without<NavAgent>),
    >,
) {
    state.apply_config(&config);
    state.interval_timer += time.delta_secs();
    if state.interval_timer < config.graph_update_interval {
        return;
    }
    state.interval_timer = 0.0;

    let Some((agent_pos, agent_collider, agent_standing, agent_grounded)) =
        agents.iter().next()
    else {
        return;
    };
    let Some((target_pos, target_collider, target_standing)) = targets.iter().next() else {
        return;
    };

    let scene: Vec<ScenePlatform> = platforms
        .iter()
        .filter(|(_, platform, _, _, tags)| passes_scene_filter(platform, *tags, &config))
        .map(|(entity, platform, position, collider, _)| ScenePlatform {
            entity,
            name: platform.name.clone(),
            bounds: collider_bounds(position, collider),
        })
        .collect();

    if config.full_graph_rebuild {
        state.navigator.request_rebuild();
    }

    let arcs = ArcProfile::sample(
        Vec2::new(agent_collider.width, agent_collider.height),
        &config.ballistics,
    );
    let started = Instant::now();
    let report = state.navigator.maintain(&MaintenanceInput {
        scene: &scene,
        agent_width: agent_collider.width,
        segment_multiplier: config.segment_multiplier(),
        arcs: &arcs,
    });

    let agent = BodyState {
        bounds: collider_bounds(agent_pos, agent_collider),
        standing: agent_standing.0,
        grounded: agent_grounded.0,
    };
    let target = BodyState {
        bounds: collider_bounds(target_pos, target_collider),
        standing: target_standing.0,
        grounded: true,
    };
    state.navigator.plan(&agent, &target);

    stats.last_maintenance_ms = started.elapsed().as_secs_f32() * 1000.0;
    if let Some(report) = report {
        stats.link_count = report.link_count;
        stats.node_count = report.node_count;
        stats.surface_entries = report.surface_entries;
        stats.last_removed = report.removed;
        stats.last_refreshed = report.refreshed;
        stats.last_connectors = report.connectors;
    }
    stats.rebuild_count = state.navigator.rebuild_count();
    stats.refresh_count = state.navigator.refresh_count();
    stats.graph_lock_timeouts = state.navigator.graph_lock_timeouts();
    stats.surface_lock_timeouts = state.navigator.surface_lock_timeouts();
    stats.trace_len = state.navigator.trace().len();
}

fn steer_agents(
    state: Res<NavState>,
    mut agents: Query<
        (
            &GamePosition,
            &Collider,
            &StandingOn,
            &Grounded,
            &mut SteerOutput,
        ),
        With<NavAgent>,
    >,
) {
    for (position, collider, standing, grounded, mut output) in agents.iter_mut() {
        let body = BodyState {
            bounds: collider_bounds(position, collider),
            standing: standing.0,
            grounded: grounded.0,
        };
        output.0 = state.navigator.steer(&body);
    }
}

/// Scene enumeration filter: the platform's layer must intersect the mask,
/// and when a tag filter is set the platform must carry that tag.
fn passes_scene_filter(platform: &Platform, tags: Option<&Tags>, config: &NavConfig) -> bool {
    if platform.layer & config.layer_mask == 0 {
        return false;
    }
    match (&config.tag_filter, tags) {
        (Some(tag), Some(tags)) => tags.0.contains(tag),
        (Some(_), None) => false,
        (None, _) => true,
    }
}

type ProbeQueryItem<'a> = (
    &'a GamePosition,
    &'a Collider,
    &'a mut StandingOn,
    Option<&'a mut Grounded>,
);

fn probe_standing(
    platforms: Query<(Entity, &GamePosition, &Collider), With<Platform>>,
    mut characters: Query<ProbeQueryItem<'_>, Or<(With<NavAgent>, With<ChaseTarget>)>>,
) {
    for (position, collider, mut standing, grounded) in characters.iter_mut() {
        let feet = position.y - collider.height * 0.5;
        let mut best: Option<(Entity, f32)> = None;
        for (entity, platform_pos, platform_collider) in platforms.iter() {
            let bounds = collider_bounds(platform_pos, platform_collider);
            if position.x < bounds.left() || position.x > bounds.right() {
                continue;
            }
            let gap = (feet - bounds.top()).abs();
            if gap > GROUND_TOLERANCE {
                continue;
            }
            if best.is_none_or(|(_, current)| gap < current) {
                best = Some((entity, gap));
            }
        }
        standing.0 = best.map(|(entity, _)| entity);
        if let Some(mut grounded) = grounded {
            grounded.0 = standing.0.is_some();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tags: &[&str]) -> Tags {
        Tags(tags.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn layer_mask_gates_platforms() {
        let config = NavConfig {
            layer_mask: 0b0010,
            ..NavConfig::default()
        };
        let on = Platform::with_layer("on", 0b0010);
        let off = Platform::with_layer("off", 0b0100);
        let both = Platform::with_layer("both", 0b0110);
        assert!(passes_scene_filter(&on, None, &config));
        assert!(!passes_scene_filter(&off, None, &config));
        assert!(passes_scene_filter(&both, None, &config));
    }

    #[test]
    fn tag_filter_requires_the_tag() {
        let config = NavConfig {
            tag_filter: Some("walkable".to_string()),
            ..NavConfig::default()
        };
        let platform = Platform::new("p");
        assert!(passes_scene_filter(
            &platform,
            Some(&tagged(&["walkable", "stone"])),
            &config
        ));
        assert!(!passes_scene_filter(
            &platform,
            Some(&tagged(&["lava"])),
            &config
        ));
        assert!(!passes_scene_filter(&platform, None, &config));
        // no filter set: tags are irrelevant
        assert!(passes_scene_filter(
            &platform,
            Some(&tagged(&["lava"])),
            &NavConfig::default()
        ));
    }

    #[test]
    fn nav_state_configures_its_navigator_lazily() {
        let mut state = NavState::default();
        assert!(!state.configured);
        let config = NavConfig {
            rtree_max_entries: 8,
            read_timeout_ms: 5,
            write_timeout_ms: 9,
            ..NavConfig::default()
        };
        state.apply_config(&config);
        assert!(state.configured);
    }
}
