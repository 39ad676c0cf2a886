use std::collections::HashMap;
use std::time::Duration;

use bevy::log::warn;
use bevy::prelude::{Entity, Vec2};

use crate::arcs::ArcProfile;
use crate::astar::{self, RouteStep};
use crate::geometry::{point_key, segment_key, Axis, Bounds, Direction, Segment};
use crate::graph::{LinkAction, LinkFlow, LinkKey, NavGraph, NavLink};
use crate::locks::TimedLock;
use crate::rtree::RTree;

/// Padding applied to indexed surface boxes so coincident edges still
/// register as overlapping under the strict intersection test.
const SURFACE_INFLATION: f32 = 0.01;

/// Cap on how many parts a single top face may split into.
const MAX_FACE_SEGMENTS: usize = 100;

/// Snapshot of one scene platform, taken at the start of a maintenance tick.
#[derive(Clone, Debug)]
pub struct ScenePlatform {
    pub entity: Entity,
    pub name: String,
    pub bounds: Bounds,
}

/// Position snapshot of a character the engine steers toward or from.
#[derive(Clone, Copy, Debug)]
pub struct BodyState {
    pub bounds: Bounds,
    pub standing: Option<Entity>,
    pub grounded: bool,
}

/// Payload indexed per top-face sub-segment.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceRef {
    pub platform: Entity,
    pub segment: Segment,
}

/// Everything one maintenance tick needs, snapshotted up front.
pub struct MaintenanceInput<'a> {
    pub scene: &'a [ScenePlatform],
    pub agent_width: f32,
    pub segment_multiplier: f32,
    pub arcs: &'a ArcProfile,
}

/// What a maintenance tick did, for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct MaintenanceReport {
    pub rebuilt: bool,
    pub removed: usize,
    pub refreshed: usize,
    pub connectors: usize,
    pub link_count: usize,
    pub node_count: usize,
    pub surface_entries: usize,
    pub consistent: bool,
}

/// Upper face of a platform's box when it is the long side; vertical walls
/// have no walkable top.
pub fn top_face(bounds: &Bounds) -> Option<Segment> {
    if bounds.width() < bounds.height() {
        return None;
    }
    Segment::new(
        Vec2::new(bounds.left(), bounds.top()),
        Vec2::new(bounds.right(), bounds.top()),
    )
}

/// Owns the guarded traversal graph and surface index, the current trace,
/// and the rebuild decision. Pure with respect to the host engine: scene
/// and character state come in as snapshots, steering goes out as a vector.
pub struct Navigator {
    graph: TimedLock<NavGraph>,
    surfaces: TimedLock<RTree<SurfaceRef>>,
    trace: Vec<RouteStep>,
    full_rebuild: bool,
    rebuild_count: u64,
    refresh_count: u64,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            graph: TimedLock::new("traversal graph", NavGraph::new()),
            surfaces: TimedLock::new("surface index", RTree::new()),
            trace: Vec::new(),
            full_rebuild: false,
            rebuild_count: 0,
            refresh_count: 0,
        }
    }

    pub fn with_settings(
        rtree_max_entries: usize,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            graph: TimedLock::with_timeouts(
                "traversal graph",
                NavGraph::new(),
                read_timeout,
                write_timeout,
            ),
            surfaces: TimedLock::with_timeouts(
                "surface index",
                RTree::with_max_entries(rtree_max_entries),
                read_timeout,
                write_timeout,
            ),
            trace: Vec::new(),
            full_rebuild: false,
            rebuild_count: 0,
            refresh_count: 0,
        }
    }

    /// Force the next maintenance tick to reconstruct from scratch.
    pub fn request_rebuild(&mut self) {
        self.full_rebuild = true;
    }

    pub fn trace(&self) -> &[RouteStep] {
        &self.trace
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    pub fn graph_lock_timeouts(&self) -> u64 {
        self.graph.timeout_count()
    }

    pub fn surface_lock_timeouts(&self) -> u64 {
        self.surfaces.timeout_count()
    }

    /// Read access for overlays and tests; `None` when the lock is busy.
    pub fn with_graph<R>(&self, f: impl FnOnce(&NavGraph) -> R) -> Option<R> {
        self.graph.read(f)
    }

    pub fn with_surfaces<R>(&self, f: impl FnOnce(&RTree<SurfaceRef>) -> R) -> Option<R> {
        self.surfaces.read(f)
    }

    /// Run one maintenance tick: a full rebuild when the graph is empty or
    /// one was requested, a diff-based refresh otherwise. Returns `None`
    /// when a lock could not be taken; nothing changes in that case.
    pub fn maintain(&mut self, input: &MaintenanceInput<'_>) -> Option<MaintenanceReport> {
        let wants_rebuild = self.full_rebuild || self.graph.read(|g| g.is_empty())?;
        let report = self
            .graph
            .write(|graph| {
                self.surfaces.write(|surfaces| {
                    if wants_rebuild {
                        rebuild_all(graph, surfaces, input)
                    } else {
                        refresh(graph, surfaces, input)
                    }
                })
            })
            .flatten()?;
        self.full_rebuild = false;
        if wants_rebuild {
            self.rebuild_count += 1;
        } else {
            self.refresh_count += 1;
        }
        if !report.consistent {
            warn!("traversal graph failed its structural audit, scheduling a full rebuild");
            self.full_rebuild = true;
        }
        Some(report)
    }

    /// Re-solve the route between the platforms under the agent and the
    /// target. Keeps the previous trace when either platform is unknown or
    /// cannot be resolved to a segment; replaces it (possibly with an empty
    /// route) when the solve runs.
    pub fn plan(&mut self, agent: &BodyState, target: &BodyState) {
        let (Some(agent_platform), Some(target_platform)) = (agent.standing, target.standing)
        else {
            return;
        };
        let solved = self.graph.read(|graph| {
            let origin = graph.find_object_links(agent_platform, &agent.bounds)?;
            let destination = graph.find_object_links(target_platform, &target.bounds)?;
            Some(astar::solve(graph, origin, destination))
        });
        if let Some(Some(route)) = solved {
            self.trace = route;
        }
    }

    /// Directional input for the current frame: walk toward the next trace
    /// segment while grounded on a platform the trace passes over, stand
    /// still otherwise.
    pub fn steer(&self, agent: &BodyState) -> Vec2 {
        if !agent.grounded || self.trace.is_empty() {
            return Vec2::ZERO;
        }
        let Some(standing) = agent.standing else {
            return Vec2::ZERO;
        };
        let Some(index) = self
            .trace
            .iter()
            .position(|step| step.platform == standing)
        else {
            return Vec2::ZERO;
        };
        if index + 1 >= self.trace.len() {
            return Vec2::ZERO;
        }
        let current_key = self.trace[index].link;
        let next_key = self.trace[index + 1].link;
        self.graph
            .read(|graph| {
                let (Some(current), Some(next)) =
                    (graph.link(current_key), graph.link(next_key))
                else {
                    return Vec2::ZERO;
                };
                let toward_left = next.segment.distance(current.left_point());
                let toward_right = next.segment.distance(current.right_point());
                if toward_left < toward_right {
                    Vec2::new(-1.0, 0.0)
                } else {
                    Vec2::new(1.0, 0.0)
                }
            })
            .unwrap_or(Vec2::ZERO)
    }
}

fn segment_target(input: &MaintenanceInput<'_>) -> f32 {
    input.agent_width * input.segment_multiplier.clamp(1.0, 10.0)
}

/// Re-index every current top-face sub-segment from scratch.
fn rebuild_rtree(
    surfaces: &mut RTree<SurfaceRef>,
    scene: &[ScenePlatform],
    target_length: f32,
) {
    surfaces.clear();
    for platform in scene {
        let Some(face) = top_face(&platform.bounds) else {
            continue;
        };
        for part in face.split(target_length, MAX_FACE_SEGMENTS) {
            surfaces.insert(
                segment_key(&part),
                part.bounds().inflate(SURFACE_INFLATION, SURFACE_INFLATION),
                SurfaceRef {
                    platform: platform.entity,
                    segment: part,
                },
            );
        }
    }
}

/// Record a platform and add one ground link per top-face sub-segment.
fn insert_platform(
    graph: &mut NavGraph,
    platform: &ScenePlatform,
    target_length: f32,
) -> Vec<LinkKey> {
    graph.record_object(platform.entity, &platform.name, platform.bounds);
    let Some(face) = top_face(&platform.bounds) else {
        return Vec::new();
    };
    face.split(target_length, MAX_FACE_SEGMENTS)
        .into_iter()
        .enumerate()
        .map(|(index, part)| {
            graph.add(
                NavLink::new(
                    format!("{} walk {}", platform.name, index),
                    part,
                    LinkAction::TRAVERSING,
                    LinkFlow::ALL,
                ),
                platform.entity,
            )
        })
        .collect()
}

fn make_report(
    rebuilt: bool,
    removed: usize,
    refreshed: usize,
    connectors: usize,
    graph: &NavGraph,
    surfaces: &RTree<SurfaceRef>,
) -> MaintenanceReport {
    MaintenanceReport {
        rebuilt,
        removed,
        refreshed,
        connectors,
        link_count: graph.len(),
        node_count: graph.node_count(),
        surface_entries: surfaces.len(),
        consistent: graph.check_consistency(),
    }
}

fn rebuild_all(
    graph: &mut NavGraph,
    surfaces: &mut RTree<SurfaceRef>,
    input: &MaintenanceInput<'_>,
) -> MaintenanceReport {
    let target_length = segment_target(input);
    graph.clear();
    rebuild_rtree(surfaces, input.scene, target_length);
    let mut refreshed = Vec::new();
    for platform in input.scene {
        refreshed.extend(insert_platform(graph, platform, target_length));
    }
    let connectors = generate_connectors(graph, surfaces, &refreshed, input);
    make_report(true, 0, refreshed.len(), connectors, graph, surfaces)
}

fn refresh(
    graph: &mut NavGraph,
    surfaces: &mut RTree<SurfaceRef>,
    input: &MaintenanceInput<'_>,
) -> MaintenanceReport {
    let target_length = segment_target(input);
    rebuild_rtree(surfaces, input.scene, target_length);

    // Diff against the platforms recorded last tick: gone or resized means
    // stale, unknown or resized means rebuild fresh.
    let current: HashMap<Entity, &ScenePlatform> =
        input.scene.iter().map(|p| (p.entity, p)).collect();
    let mut stale: Vec<Entity> = Vec::new();
    for (entity, object) in graph.objects() {
        match current.get(&entity) {
            None => stale.push(entity),
            Some(p) if p.bounds != object.bounds => stale.push(entity),
            _ => {}
        }
    }
    let fresh_platforms: Vec<&ScenePlatform> = input
        .scene
        .iter()
        .filter(|p| match graph.object(p.entity) {
            None => true,
            Some(object) => object.bounds != p.bounds,
        })
        .collect();

    let mut removed = 0;
    for entity in &stale {
        removed += graph.remove_object(*entity, true, !LinkAction::TRAVERSING);
    }
    let mut refreshed: Vec<LinkKey> = Vec::new();
    for platform in fresh_platforms {
        refreshed.extend(insert_platform(graph, platform, target_length));
    }

    // Pull platforms within arc range of the rebuilt segments into the
    // pass, so links toward and from unchanged neighbors regenerate.
    let mut affected: Vec<Entity> = Vec::new();
    for key in refreshed.clone() {
        let Some(segment) = graph.link(key).map(|l| l.segment) else {
            continue;
        };
        for rect in connector_query_rects(&segment, input) {
            for item in surfaces.find(&rect) {
                if !affected.contains(&item.payload.platform) {
                    affected.push(item.payload.platform);
                }
            }
        }
    }
    for entity in affected {
        if let Some(object) = graph.object(entity) {
            for key in &object.links {
                if !refreshed.contains(key) {
                    refreshed.push(*key);
                }
            }
        }
    }

    let connectors = generate_connectors(graph, surfaces, &refreshed, input);
    make_report(false, removed, refreshed.len(), connectors, graph, surfaces)
}

/// The four rectangles in which a segment's endpoints can produce or
/// receive connectors: jump envelopes launched just off each end, fall
/// envelopes dropped from each end.
fn connector_query_rects(segment: &Segment, input: &MaintenanceInput<'_>) -> [Bounds; 4] {
    let left = segment.left_point();
    let right = segment.right_point();
    let jump_left_launch = left + Vec2::new(-input.agent_width, 0.0);
    let jump_right_launch = right + Vec2::new(input.agent_width, 0.0);
    [
        input.arcs.jump_bounds(Direction::Left).translate(jump_left_launch),
        input
            .arcs
            .jump_bounds(Direction::Right)
            .translate(jump_right_launch),
        input.arcs.fall_bounds(Direction::Left).translate(left),
        input.arcs.fall_bounds(Direction::Right).translate(right),
    ]
}

/// Run the jump and fall linkers in both directions for every ground
/// segment in `keys` that can be walked both ways.
fn generate_connectors(
    graph: &mut NavGraph,
    surfaces: &RTree<SurfaceRef>,
    keys: &[LinkKey],
    input: &MaintenanceInput<'_>,
) -> usize {
    let sources: Vec<LinkKey> = keys
        .iter()
        .copied()
        .filter(|key| {
            graph.link(*key).is_some_and(|l| {
                l.action.allows_all(LinkAction::WALKING) && l.flow.allows_all(LinkFlow::ALL)
            })
        })
        .collect();
    let mut added = 0;
    for source in sources {
        for direction in [Direction::Left, Direction::Right] {
            added += link_jumps(graph, surfaces, source, direction, input);
            added += link_falls(graph, surfaces, source, direction, input);
        }
    }
    added
}

/// Connect a segment end to every platform the jump arc can clear in the
/// given direction. The arc is launched with the agent standing just past
/// the edge; the connector itself runs from the edge node so routes chain
/// through it.
fn link_jumps(
    graph: &mut NavGraph,
    surfaces: &RTree<SurfaceRef>,
    source: LinkKey,
    direction: Direction,
    input: &MaintenanceInput<'_>,
) -> usize {
    let Some((segment, owner)) = graph
        .link(source)
        .map(|l| l.segment)
        .zip(graph.owner_of(source))
    else {
        return 0;
    };
    let owner_name = graph
        .object(owner)
        .map(|o| o.name.clone())
        .unwrap_or_default();
    let anchor = match direction {
        Direction::Left => segment.left_point(),
        Direction::Right => segment.right_point(),
    };
    let launch = anchor + Vec2::new(direction.sign() * input.agent_width, 0.0);
    let launch_body = input.arcs.body_at(launch);
    let query = input.arcs.jump_bounds(direction).translate(launch);

    let mut platforms: Vec<Entity> = Vec::new();
    for item in surfaces.find(&query) {
        let candidate = item.payload.platform;
        if candidate != owner && !platforms.contains(&candidate) {
            platforms.push(candidate);
        }
    }

    let mut added = 0;
    for platform in platforms {
        let candidates: Vec<Segment> = ground_segments(graph, platform);
        for candidate in candidates {
            // A surface strictly below the launch is the fall linker's job.
            if launch_body.is_above_segment(&candidate) {
                continue;
            }
            let reachable = input.arcs.jump_samples(direction).iter().any(|sample| {
                let swept = sample.translate(launch);
                swept.is_above_segment(&candidate)
                    && swept.overlaps_segment_on_axis(&candidate, Axis::Horizontal)
            });
            if !reachable {
                continue;
            }
            let landing = nearest_endpoint(&candidate, launch);
            if point_key(anchor) == point_key(landing) {
                continue;
            }
            let Some(connector) = Segment::new(anchor, landing) else {
                continue;
            };
            let link = NavLink::new(
                format!("{} jump {}", owner_name, direction.label()),
                connector,
                LinkAction::JUMPING,
                LinkFlow::START_TO_END,
            );
            if !graph.contains_link(link.key(), LinkAction::empty()) {
                graph.add(link, owner);
                added += 1;
            }
        }
    }
    added
}

/// Connect a segment end to the platform the agent reaches by walking off
/// it. Candidate platforms are tried nearest first and only the first
/// reachable one produces a link per direction.
fn link_falls(
    graph: &mut NavGraph,
    surfaces: &RTree<SurfaceRef>,
    source: LinkKey,
    direction: Direction,
    input: &MaintenanceInput<'_>,
) -> usize {
    let Some((segment, owner)) = graph
        .link(source)
        .map(|l| l.segment)
        .zip(graph.owner_of(source))
    else {
        return 0;
    };
    let owner_name = graph
        .object(owner)
        .map(|o| o.name.clone())
        .unwrap_or_default();
    let anchor = match direction {
        Direction::Left => segment.left_point(),
        Direction::Right => segment.right_point(),
    };
    let launch_body = input.arcs.body_at(anchor);
    let query = input.arcs.fall_bounds(direction).translate(anchor);

    let mut platforms: Vec<(Entity, f32)> = Vec::new();
    for item in surfaces.find(&query) {
        let candidate = item.payload.platform;
        if candidate == owner || platforms.iter().any(|(e, _)| *e == candidate) {
            continue;
        }
        let Some(object) = graph.object(candidate) else {
            continue;
        };
        platforms.push((candidate, object.bounds.center().distance(anchor)));
    }
    platforms.sort_by(|a, b| a.1.total_cmp(&b.1));

    for (platform, _) in platforms {
        let candidates: Vec<Segment> = ground_segments(graph, platform);
        for candidate in candidates {
            // Falls only land on surfaces below the edge.
            if !launch_body.is_above_segment(&candidate) {
                continue;
            }
            let reachable = input.arcs.fall_samples(direction).iter().any(|sample| {
                let swept = sample.translate(anchor);
                swept.is_above_segment(&candidate)
                    && swept.overlaps_segment_on_axis(&candidate, Axis::Horizontal)
            });
            if !reachable {
                continue;
            }
            // Land on the endpoint that lies back under the edge: falling
            // off to the right means the near end is to the left.
            let correct_side = |p: Vec2| match direction {
                Direction::Left => p.x >= anchor.x,
                Direction::Right => p.x <= anchor.x,
            };
            let near = nearest_endpoint(&candidate, anchor);
            let far = if near == candidate.start {
                candidate.end
            } else {
                candidate.start
            };
            let landing = if correct_side(near) {
                near
            } else if correct_side(far) {
                far
            } else {
                continue;
            };
            if point_key(anchor) == point_key(landing) {
                continue;
            }
            let Some(connector) = Segment::new(anchor, landing) else {
                continue;
            };
            let link = NavLink::new(
                format!("{} fall {}", owner_name, direction.label()),
                connector,
                LinkAction::FALLING,
                LinkFlow::START_TO_END,
            );
            if !graph.contains_link(link.key(), LinkAction::empty()) {
                graph.add(link, owner);
                return 1;
            }
            return 0;
        }
    }
    0
}

fn ground_segments(graph: &NavGraph, platform: Entity) -> Vec<Segment> {
    graph
        .object(platform)
        .map(|object| {
            object
                .links
                .iter()
                .filter_map(|k| graph.link(*k))
                .filter(|l| l.action.allows_any(LinkAction::TRAVERSING))
                .map(|l| l.segment)
                .collect()
        })
        .unwrap_or_default()
}

fn nearest_endpoint(segment: &Segment, to: Vec2) -> Vec2 {
    if to.distance_squared(segment.start) <= to.distance_squared(segment.end) {
        segment.start
    } else {
        segment.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arcs::Ballistics;

    fn test_arcs() -> ArcProfile {
        ArcProfile::sample(
            Vec2::new(1.0, 1.0),
            &Ballistics {
                gravity: 10.0,
                jump_velocity: 5.0,
                run_speed: 4.0,
                max_fall_speed: 50.0,
                sample_count: 25,
                sample_interval: 0.05,
                jump_scale: 0.98,
            },
        )
    }

    fn platform(id: u32, name: &str, min: (f32, f32), max: (f32, f32)) -> ScenePlatform {
        ScenePlatform {
            entity: Entity::from_raw(id),
            name: name.to_string(),
            bounds: Bounds::new(Vec2::new(min.0, min.1), Vec2::new(max.0, max.1)),
        }
    }

    fn standing(x: f32, foot_y: f32, on: Option<Entity>) -> BodyState {
        BodyState {
            bounds: Bounds::new(
                Vec2::new(x - 0.5, foot_y),
                Vec2::new(x + 0.5, foot_y + 1.0),
            ),
            standing: on,
            grounded: true,
        }
    }

    fn run_tick(
        nav: &mut Navigator,
        scene: &[ScenePlatform],
        arcs: &ArcProfile,
    ) -> MaintenanceReport {
        nav.maintain(&MaintenanceInput {
            scene,
            agent_width: 1.0,
            segment_multiplier: 5.0,
            arcs,
        })
        .expect("locks are uncontended in tests")
    }

    fn link_keys(nav: &Navigator) -> Vec<u64> {
        let mut keys: Vec<u64> = nav
            .with_graph(|g| g.links().map(|(k, _)| k.0).collect())
            .unwrap();
        keys.sort_unstable();
        keys
    }

    fn node_keys(nav: &Navigator) -> Vec<u64> {
        let mut keys: Vec<u64> = nav
            .with_graph(|g| g.nodes().map(|(k, _)| k.0).collect())
            .unwrap();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn top_face_requires_a_long_horizontal_side() {
        let floor = Bounds::new(Vec2::ZERO, Vec2::new(10.0, 1.0));
        let face = top_face(&floor).unwrap();
        assert_eq!(face.start, Vec2::new(0.0, 1.0));
        assert_eq!(face.end, Vec2::new(10.0, 1.0));
        let wall = Bounds::new(Vec2::ZERO, Vec2::new(1.0, 10.0));
        assert!(top_face(&wall).is_none());
    }

    #[test]
    fn chases_across_a_jumpable_gap() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (12.0, 0.0), (22.0, 1.0)),
        ];
        let mut nav = Navigator::new();
        let report = run_tick(&mut nav, &scene, &arcs);
        assert!(report.rebuilt);
        assert!(report.consistent);
        assert!(report.connectors > 0, "the gap is jumpable");

        let agent = standing(1.0, 1.0, Some(Entity::from_raw(1)));
        let target = standing(20.0, 1.0, Some(Entity::from_raw(2)));
        nav.plan(&agent, &target);
        let trace = nav.trace().to_vec();
        assert!(!trace.is_empty());
        assert!(trace.iter().any(|s| s.platform == Entity::from_raw(2)));
        let crosses_jump = nav
            .with_graph(|g| {
                trace
                    .iter()
                    .any(|s| g.link(s.link).is_some_and(|l| {
                        l.action.allows_all(LinkAction::JUMPING)
                    }))
            })
            .unwrap();
        assert!(crosses_jump, "route should use the jump connector");
        assert_eq!(nav.steer(&agent), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn emits_zero_when_the_gap_is_too_wide() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (20.0, 0.0), (30.0, 1.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);

        let agent = standing(1.0, 1.0, Some(Entity::from_raw(1)));
        let target = standing(25.0, 1.0, Some(Entity::from_raw(2)));
        nav.plan(&agent, &target);
        assert!(nav.trace().is_empty());
        assert_eq!(nav.steer(&agent), Vec2::ZERO);
    }

    #[test]
    fn drops_to_a_platform_below() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "upper", (0.0, 10.0), (10.0, 11.0)),
            platform(2, "lower", (0.0, 0.0), (20.0, 1.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);

        let falls: Vec<(Vec2, Vec2, LinkFlow)> = nav
            .with_graph(|g| {
                g.links()
                    .filter(|(_, l)| l.action.allows_all(LinkAction::FALLING))
                    .map(|(_, l)| (l.segment.start, l.segment.end, l.flow))
                    .collect()
            })
            .unwrap();
        assert!(falls.iter().any(|(start, end, flow)| {
            *start == Vec2::new(10.0, 11.0)
                && *end == Vec2::new(10.0, 1.0)
                && flow.allows_all(LinkFlow::START_TO_END)
                && !flow.allows_any(LinkFlow::END_TO_START)
        }));

        // The mirrored drop off the left edge links as well.
        assert!(falls.iter().any(|(start, end, _)| {
            *start == Vec2::new(0.0, 11.0) && *end == Vec2::new(0.0, 1.0)
        }));

        let agent = standing(9.0, 11.0, Some(Entity::from_raw(1)));
        let target = standing(15.0, 1.0, Some(Entity::from_raw(2)));
        nav.plan(&agent, &target);
        assert!(!nav.trace().is_empty());
        assert_eq!(nav.steer(&agent), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn nearer_platform_wins_the_fall() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "upper", (0.0, 10.0), (10.0, 11.0)),
            platform(2, "near", (0.0, 0.0), (10.0, 1.0)),
            platform(3, "far", (0.0, -5.0), (10.0, -4.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);

        let upper_falls: Vec<Vec2> = nav
            .with_graph(|g| {
                g.links()
                    .filter(|(_, l)| l.action.allows_all(LinkAction::FALLING))
                    .filter(|(_, l)| l.segment.start == Vec2::new(10.0, 11.0))
                    .map(|(_, l)| l.segment.end)
                    .collect()
            })
            .unwrap();
        assert!(upper_falls.iter().all(|end| end.y == 1.0));
        assert!(!upper_falls.is_empty());
    }

    #[test]
    fn refresh_relinks_after_a_platform_moves() {
        let arcs = test_arcs();
        let mut scene = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (12.0, 0.0), (22.0, 1.0)),
        ];
        let mut nav = Navigator::new();
        let first = run_tick(&mut nav, &scene, &arcs);
        assert!(first.rebuilt);
        let had_jump = nav
            .with_graph(|g| {
                g.links()
                    .any(|(_, l)| l.action.allows_all(LinkAction::JUMPING))
            })
            .unwrap();
        assert!(had_jump);

        // The far platform moves out of jump reach between ticks.
        scene[1].bounds = Bounds::new(Vec2::new(30.0, 0.0), Vec2::new(40.0, 1.0));
        let second = run_tick(&mut nav, &scene, &arcs);
        assert!(!second.rebuilt);
        assert!(second.removed > 0);

        let jumps_left: usize = nav
            .with_graph(|g| {
                g.links()
                    .filter(|(_, l)| l.action.allows_all(LinkAction::JUMPING))
                    .count()
            })
            .unwrap();
        assert_eq!(jumps_left, 0, "stale connectors must not survive the move");
        let p2 = nav
            .with_graph(|g| g.object(Entity::from_raw(2)).map(|o| o.bounds))
            .unwrap()
            .unwrap();
        assert_eq!(p2, scene[1].bounds);
    }

    #[test]
    fn rebuild_twice_is_identical() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (12.0, 0.0), (22.0, 1.0)),
            platform(3, "upper", (4.0, 6.0), (16.0, 7.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);
        let links_before = link_keys(&nav);
        let nodes_before = node_keys(&nav);
        nav.request_rebuild();
        let report = run_tick(&mut nav, &scene, &arcs);
        assert!(report.rebuilt);
        assert_eq!(link_keys(&nav), links_before);
        assert_eq!(node_keys(&nav), nodes_before);
    }

    #[test]
    fn refresh_converges_to_a_rebuild() {
        let arcs = test_arcs();
        let initial = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (12.0, 0.0), (22.0, 1.0)),
        ];
        // p2 disappears, p3 appears in its place under a new handle.
        let changed = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(3, "p3", (12.0, 0.0), (22.0, 1.0)),
        ];
        let mut incremental = Navigator::new();
        run_tick(&mut incremental, &initial, &arcs);
        let report = run_tick(&mut incremental, &changed, &arcs);
        assert!(!report.rebuilt);

        let mut fresh = Navigator::new();
        run_tick(&mut fresh, &changed, &arcs);

        assert_eq!(link_keys(&incremental), link_keys(&fresh));
        assert_eq!(node_keys(&incremental), node_keys(&fresh));
    }

    #[test]
    fn keeps_previous_trace_when_resolution_fails() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (12.0, 0.0), (22.0, 1.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);
        let agent = standing(1.0, 1.0, Some(Entity::from_raw(1)));
        let target = standing(20.0, 1.0, Some(Entity::from_raw(2)));
        nav.plan(&agent, &target);
        let trace = nav.trace().to_vec();
        assert!(!trace.is_empty());

        // Airborne characters resolve no platform; the trace must survive.
        let airborne = BodyState {
            standing: None,
            ..agent
        };
        nav.plan(&airborne, &target);
        assert_eq!(nav.trace(), trace.as_slice());

        // An unknown platform handle also leaves the trace alone.
        let lost = standing(1.0, 1.0, Some(Entity::from_raw(99)));
        nav.plan(&lost, &target);
        assert_eq!(nav.trace(), trace.as_slice());
    }

    #[test]
    fn steering_needs_ground_under_the_agent() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (12.0, 0.0), (22.0, 1.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);
        let agent = standing(1.0, 1.0, Some(Entity::from_raw(1)));
        let target = standing(20.0, 1.0, Some(Entity::from_raw(2)));
        nav.plan(&agent, &target);

        let airborne = BodyState {
            grounded: false,
            ..agent
        };
        assert_eq!(nav.steer(&airborne), Vec2::ZERO);
        let off_trace = standing(1.0, 1.0, Some(Entity::from_raw(42)));
        assert_eq!(nav.steer(&off_trace), Vec2::ZERO);
    }

    #[test]
    fn steering_turns_around_for_a_target_behind() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "p1", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "p2", (12.0, 0.0), (22.0, 1.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);
        let agent = standing(20.0, 1.0, Some(Entity::from_raw(2)));
        let target = standing(1.0, 1.0, Some(Entity::from_raw(1)));
        nav.plan(&agent, &target);
        assert!(!nav.trace().is_empty());
        assert_eq!(nav.steer(&agent), Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn vertical_walls_contribute_no_segments() {
        let arcs = test_arcs();
        let scene = vec![
            platform(1, "floor", (0.0, 0.0), (10.0, 1.0)),
            platform(2, "wall", (10.0, 0.0), (11.0, 8.0)),
        ];
        let mut nav = Navigator::new();
        let report = run_tick(&mut nav, &scene, &arcs);
        // Only the floor splits into ground links.
        let wall_links = nav
            .with_graph(|g| g.object(Entity::from_raw(2)).map(|o| o.links.len()))
            .unwrap();
        assert_eq!(wall_links, Some(0));
        assert!(report.consistent);
    }

    #[test]
    fn climbs_a_staircase_of_platforms() {
        let arcs = test_arcs();
        // Three steps, each within jump reach of the previous one.
        let scene = vec![
            platform(1, "step0", (0.0, 0.0), (8.0, 1.0)),
            platform(2, "step1", (9.0, 1.0), (17.0, 2.0)),
            platform(3, "step2", (18.0, 2.0), (26.0, 3.0)),
        ];
        let mut nav = Navigator::new();
        run_tick(&mut nav, &scene, &arcs);

        let agent = standing(1.0, 1.0, Some(Entity::from_raw(1)));
        let target = standing(25.0, 3.0, Some(Entity::from_raw(3)));
        nav.plan(&agent, &target);
        let trace = nav.trace().to_vec();
        assert!(!trace.is_empty());
        // The route climbs through the middle step to the top.
        assert!(trace.iter().any(|s| s.platform == Entity::from_raw(2)));
        assert_eq!(trace.last().unwrap().platform, Entity::from_raw(3));
        assert_eq!(nav.steer(&agent), Vec2::new(1.0, 0.0));

        // Falls land on the endpoint under the drop edge, and none of these
        // steps reaches back under its neighbor, so there is no way down.
        nav.plan(&target, &agent);
        assert!(nav.trace().is_empty());
        assert_eq!(nav.steer(&target), Vec2::ZERO);
    }

    #[test]
    fn requesting_a_rebuild_forces_one() {
        let arcs = test_arcs();
        let scene = vec![platform(1, "p1", (0.0, 0.0), (10.0, 1.0))];
        let mut nav = Navigator::new();
        assert!(run_tick(&mut nav, &scene, &arcs).rebuilt);
        assert!(!run_tick(&mut nav, &scene, &arcs).rebuilt);
        nav.request_rebuild();
        assert!(run_tick(&mut nav, &scene, &arcs).rebuilt);
        assert_eq!(nav.rebuild_count(), 2);
        assert_eq!(nav.refresh_count(), 1);
    }
}
