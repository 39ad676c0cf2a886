use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use bevy::prelude::{Entity, Vec2};

use crate::geometry::{point_key, Axis, Bounds, PointKey, Segment};

bitflags::bitflags! {
    /// Movement semantics a link supports.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LinkAction: u32 {
        const STANDING = 1 << 0;
        const CROUCHING = 1 << 1;
        const CRAWLING = 1 << 2;
        const WALKING = 1 << 3;
        const RUNNING = 1 << 4;
        const JUMPING = 1 << 5;
        const FALLING = 1 << 6;
        /// Ground locomotion: everything an agent can do while standing on
        /// the segment.
        const TRAVERSING = Self::STANDING.bits()
            | Self::CROUCHING.bits()
            | Self::CRAWLING.bits()
            | Self::WALKING.bits()
            | Self::RUNNING.bits();
    }
}

impl LinkAction {
    pub fn allows_all(self, mask: LinkAction) -> bool {
        self.contains(mask)
    }

    pub fn allows_any(self, mask: LinkAction) -> bool {
        self.intersects(mask)
    }
}

bitflags::bitflags! {
    /// Which side a link may be entered from during a solve.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LinkFlow: u8 {
        const START_TO_END = 1 << 0;
        const END_TO_START = 1 << 1;
        const ALL = Self::START_TO_END.bits() | Self::END_TO_START.bits();
    }
}

impl LinkFlow {
    pub fn allows_all(self, mask: LinkFlow) -> bool {
        self.contains(mask)
    }

    pub fn allows_any(self, mask: LinkFlow) -> bool {
        self.intersects(mask)
    }
}

/// Identity of a link: a hash of its name and canonical endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey(pub u64);

/// A graph vertex: a shared endpoint where links meet.
#[derive(Clone, Debug)]
pub struct NavNode {
    pub name: String,
    pub position: Vec2,
    /// Keys of every link touching this node.
    pub links: Vec<LinkKey>,
}

/// A locomotion segment between two nodes.
#[derive(Clone, Debug)]
pub struct NavLink {
    pub name: String,
    pub segment: Segment,
    pub action: LinkAction,
    pub flow: LinkFlow,
    pub velocity: f32,
    start: PointKey,
    end: PointKey,
}

impl NavLink {
    pub fn new(
        name: impl Into<String>,
        segment: Segment,
        action: LinkAction,
        flow: LinkFlow,
    ) -> Self {
        Self {
            name: name.into(),
            segment,
            action,
            flow,
            velocity: 1.0,
            start: point_key(segment.start),
            end: point_key(segment.end),
        }
    }

    pub fn key(&self) -> LinkKey {
        let mut hasher = DefaultHasher::new();
        let s = self.segment.start;
        let e = self.segment.end;
        format!(
            "{} : [({:.2}, {:.2}),({:.2}, {:.2})]",
            self.name, s.x, s.y, e.x, e.y
        )
        .hash(&mut hasher);
        LinkKey(hasher.finish())
    }

    pub fn start_key(&self) -> PointKey {
        self.start
    }

    pub fn end_key(&self) -> PointKey {
        self.end
    }

    pub fn touches(&self, node: PointKey) -> bool {
        self.start == node || self.end == node
    }

    pub fn left_point(&self) -> Vec2 {
        self.segment.left_point()
    }

    pub fn right_point(&self) -> Vec2 {
        self.segment.right_point()
    }

    pub fn left_key(&self) -> PointKey {
        point_key(self.left_point())
    }

    pub fn right_key(&self) -> PointKey {
        point_key(self.right_point())
    }

    pub fn allows_action(&self, mask: LinkAction) -> bool {
        self.action.allows_all(mask)
    }

    pub fn allows_flow(&self, mask: LinkFlow) -> bool {
        self.flow.allows_all(mask)
    }
}

/// Per-platform bookkeeping: the bounding rectangle as last observed and
/// the links generated for it, used by the diff-based refresh.
#[derive(Clone, Debug)]
pub struct ObjectLinks {
    pub name: String,
    pub bounds: Bounds,
    pub links: Vec<LinkKey>,
}

/// The traversal graph: nodes keyed by position, links keyed by identity,
/// and the platform bookkeeping maps. Adjacency is stored as key lists on
/// both sides, so neither nodes nor links own each other.
#[derive(Default)]
pub struct NavGraph {
    nodes: HashMap<PointKey, NavNode>,
    links: HashMap<LinkKey, NavLink>,
    owners: HashMap<LinkKey, Entity>,
    objects: HashMap<Entity, ObjectLinks>,
}

impl NavGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.owners.clear();
        self.objects.clear();
    }

    /// Register (or refresh) a platform's observed bounds, keeping its links.
    pub fn record_object(&mut self, owner: Entity, name: &str, bounds: Bounds) {
        self.objects
            .entry(owner)
            .and_modify(|o| {
                o.name = name.to_string();
                o.bounds = bounds;
            })
            .or_insert_with(|| ObjectLinks {
                name: name.to_string(),
                bounds,
                links: Vec::new(),
            });
    }

    /// Insert a link, merging its endpoints with existing nodes by position
    /// key. Re-adding an identical link is a no-op.
    pub fn add(&mut self, link: NavLink, owner: Entity) -> LinkKey {
        let key = link.key();
        for (node_key, position) in [
            (link.start_key(), link.segment.start),
            (link.end_key(), link.segment.end),
        ] {
            let node = self.nodes.entry(node_key).or_insert_with(|| NavNode {
                name: format!("node ({:.2}, {:.2})", position.x, position.y),
                position,
                links: Vec::new(),
            });
            if !node.links.contains(&key) {
                node.links.push(key);
            }
        }
        self.links.entry(key).or_insert(link);
        self.owners.insert(key, owner);
        let entry = self.objects.entry(owner).or_insert_with(|| ObjectLinks {
            name: String::new(),
            bounds: Bounds::new(Vec2::ZERO, Vec2::ZERO),
            links: Vec::new(),
        });
        if !entry.links.contains(&key) {
            entry.links.push(key);
        }
        key
    }

    /// Detach and drop a link. With `remove_connected`, any link sharing an
    /// endpoint whose action intersects `connected_mask` is dropped too.
    /// Endpoint nodes left without links are deleted.
    pub fn remove(
        &mut self,
        key: LinkKey,
        remove_connected: bool,
        connected_mask: LinkAction,
    ) -> bool {
        let Some(link) = self.links.remove(&key) else {
            return false;
        };
        let mut cascade: Vec<LinkKey> = Vec::new();
        for node_key in [link.start_key(), link.end_key()] {
            let mut orphaned = false;
            if let Some(node) = self.nodes.get_mut(&node_key) {
                node.links.retain(|k| *k != key);
                if remove_connected {
                    for adjacent in &node.links {
                        let matches = self
                            .links
                            .get(adjacent)
                            .is_some_and(|l| l.action.allows_any(connected_mask));
                        if matches && !cascade.contains(adjacent) {
                            cascade.push(*adjacent);
                        }
                    }
                }
                orphaned = node.links.is_empty();
            }
            if orphaned {
                self.nodes.remove(&node_key);
            }
        }
        if let Some(owner) = self.owners.remove(&key) {
            let mut drop_entry = false;
            if let Some(entry) = self.objects.get_mut(&owner) {
                entry.links.retain(|k| *k != key);
                drop_entry = entry.links.is_empty();
            }
            if drop_entry {
                self.objects.remove(&owner);
            }
        }
        for connected in cascade {
            self.remove(connected, false, LinkAction::empty());
        }
        true
    }

    /// Drop every link recorded for a platform, then its bookkeeping entry.
    pub fn remove_object(
        &mut self,
        owner: Entity,
        remove_connected: bool,
        connected_mask: LinkAction,
    ) -> usize {
        let keys = self
            .objects
            .get(&owner)
            .map(|o| o.links.clone())
            .unwrap_or_default();
        let mut removed = 0;
        for key in keys {
            if self.remove(key, remove_connected, connected_mask) {
                removed += 1;
            }
        }
        self.objects.remove(&owner);
        removed
    }

    pub fn contains_link(&self, key: LinkKey, mask: LinkAction) -> bool {
        self.links
            .get(&key)
            .is_some_and(|l| l.action.allows_all(mask))
    }

    pub fn contains_node(&self, key: PointKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn link(&self, key: LinkKey) -> Option<&NavLink> {
        self.links.get(&key)
    }

    pub fn node(&self, key: PointKey) -> Option<&NavNode> {
        self.nodes.get(&key)
    }

    pub fn owner_of(&self, key: LinkKey) -> Option<Entity> {
        self.owners.get(&key).copied()
    }

    pub fn object(&self, owner: Entity) -> Option<&ObjectLinks> {
        self.objects.get(&owner)
    }

    pub fn objects(&self) -> impl Iterator<Item = (Entity, &ObjectLinks)> {
        self.objects.iter().map(|(e, o)| (*e, o))
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkKey, &NavLink)> {
        self.links.iter().map(|(k, l)| (*k, l))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (PointKey, &NavNode)> {
        self.nodes.iter().map(|(k, n)| (*k, n))
    }

    /// Links sharing an endpoint with `key`, excluding `key` itself.
    pub fn adjacent_links(&self, key: LinkKey) -> Vec<LinkKey> {
        let Some(link) = self.links.get(&key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for node_key in [link.start_key(), link.end_key()] {
            if let Some(node) = self.nodes.get(&node_key) {
                for adjacent in &node.links {
                    if *adjacent != key && !out.contains(adjacent) {
                        out.push(*adjacent);
                    }
                }
            }
        }
        out
    }

    /// Pick the platform's ground segment that best represents `other`'s
    /// position: the only one, or among those overlapping `other`
    /// horizontally, the one nearest its bottom center.
    pub fn find_object_links(&self, platform: Entity, other: &Bounds) -> Option<LinkKey> {
        let entry = self.objects.get(&platform)?;
        let ground: Vec<(LinkKey, &NavLink)> = entry
            .links
            .iter()
            .filter_map(|k| self.links.get(k).map(|l| (*k, l)))
            .filter(|(_, l)| l.action.allows_any(LinkAction::TRAVERSING))
            .collect();
        match ground.len() {
            0 => None,
            1 => Some(ground[0].0),
            _ => {
                let overlapping: Vec<&(LinkKey, &NavLink)> = ground
                    .iter()
                    .filter(|(_, l)| other.overlaps_segment_on_axis(&l.segment, Axis::Horizontal))
                    .collect();
                let anchor = other.bottom_center();
                match overlapping.len() {
                    0 => None,
                    1 => Some(overlapping[0].0),
                    _ => overlapping
                        .iter()
                        .min_by(|a, b| {
                            a.1.segment
                                .distance(anchor)
                                .total_cmp(&b.1.segment.distance(anchor))
                        })
                        .map(|(k, _)| *k),
                }
            }
        }
    }

    /// Link whose segment is nearest to `point`.
    pub fn find_closest_link(&self, point: Vec2) -> Option<LinkKey> {
        self.links
            .iter()
            .min_by(|a, b| {
                a.1.segment
                    .distance(point)
                    .total_cmp(&b.1.segment.distance(point))
            })
            .map(|(k, _)| *k)
    }

    /// Shortest route between two links, honoring flow direction. See
    /// [`crate::astar::solve`].
    pub fn route(
        &self,
        origin: LinkKey,
        destination: LinkKey,
    ) -> Vec<crate::astar::RouteStep> {
        crate::astar::solve(self, origin, destination)
    }

    /// Structural audit: every link is listed by both endpoint nodes, every
    /// node lists only live links that touch it, and the platform maps agree
    /// with the link table.
    pub fn check_consistency(&self) -> bool {
        for (key, link) in &self.links {
            for node_key in [link.start_key(), link.end_key()] {
                let Some(node) = self.nodes.get(&node_key) else {
                    return false;
                };
                if !node.links.contains(key) {
                    return false;
                }
            }
            if !self.owners.contains_key(key) {
                return false;
            }
        }
        for (node_key, node) in &self.nodes {
            if node.links.is_empty() {
                return false;
            }
            for key in &node.links {
                let Some(link) = self.links.get(key) else {
                    return false;
                };
                if !link.touches(*node_key) {
                    return false;
                }
            }
        }
        for (owner, entry) in &self.objects {
            for key in &entry.links {
                if self.owners.get(key) != Some(owner) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_link(name: &str, x0: f32, x1: f32, y: f32) -> NavLink {
        let seg = Segment::new(Vec2::new(x0, y), Vec2::new(x1, y)).unwrap();
        NavLink::new(name, seg, LinkAction::TRAVERSING, LinkFlow::ALL)
    }

    fn jump_link(name: &str, from: Vec2, to: Vec2) -> NavLink {
        let seg = Segment::new(from, to).unwrap();
        NavLink::new(name, seg, LinkAction::JUMPING, LinkFlow::START_TO_END)
    }

    #[test]
    fn add_merges_shared_endpoints_into_one_node() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        let a = graph.add(ground_link("p walk 0", 0.0, 5.0, 1.0), owner);
        let b = graph.add(ground_link("p walk 1", 5.0, 10.0, 1.0), owner);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.node_count(), 3);
        let shared = point_key(Vec2::new(5.0, 1.0));
        let node = graph.node(shared).unwrap();
        assert!(node.links.contains(&a));
        assert!(node.links.contains(&b));
        assert!(graph.check_consistency());
    }

    #[test]
    fn re_adding_a_link_is_a_no_op() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        graph.add(ground_link("p walk 0", 0.0, 5.0, 1.0), owner);
        graph.add(ground_link("p walk 0", 0.0, 5.0, 1.0), owner);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.object(owner).unwrap().links.len(), 1);
    }

    #[test]
    fn remove_deletes_orphaned_nodes() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        let a = graph.add(ground_link("p walk 0", 0.0, 5.0, 1.0), owner);
        graph.add(ground_link("p walk 1", 5.0, 10.0, 1.0), owner);
        assert!(graph.remove(a, false, LinkAction::empty()));
        assert_eq!(graph.len(), 1);
        // (0,1) was only used by the removed link; (5,1) survives.
        assert!(!graph.contains_node(point_key(Vec2::new(0.0, 1.0))));
        assert!(graph.contains_node(point_key(Vec2::new(5.0, 1.0))));
        assert!(graph.check_consistency());
        assert!(!graph.remove(a, false, LinkAction::empty()));
    }

    #[test]
    fn remove_cascades_through_matching_neighbors() {
        let mut graph = NavGraph::new();
        let p1 = Entity::from_raw(1);
        let p2 = Entity::from_raw(2);
        let walk = graph.add(ground_link("p1 walk 0", 0.0, 5.0, 1.0), p1);
        let other = graph.add(ground_link("p2 walk 0", 5.0, 9.0, 1.0), p2);
        let jump = graph.add(
            jump_link("p1 jump right", Vec2::new(5.0, 1.0), Vec2::new(8.0, 4.0)),
            p1,
        );
        // Cascade on everything that is not ground locomotion: the jump
        // goes, the neighboring walk stays.
        assert!(graph.remove(walk, true, !LinkAction::TRAVERSING));
        assert!(!graph.contains_link(jump, LinkAction::empty()));
        assert!(graph.contains_link(other, LinkAction::TRAVERSING));
        assert!(graph.check_consistency());
    }

    #[test]
    fn remove_object_clears_bookkeeping() {
        let mut graph = NavGraph::new();
        let p1 = Entity::from_raw(1);
        graph.record_object(p1, "p1", Bounds::new(Vec2::ZERO, Vec2::new(10.0, 1.0)));
        graph.add(ground_link("p1 walk 0", 0.0, 5.0, 1.0), p1);
        graph.add(ground_link("p1 walk 1", 5.0, 10.0, 1.0), p1);
        assert_eq!(graph.remove_object(p1, true, !LinkAction::TRAVERSING), 2);
        assert!(graph.is_empty());
        assert_eq!(graph.node_count(), 0);
        assert!(graph.object(p1).is_none());
    }

    #[test]
    fn contains_link_checks_the_action_mask() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        let key = graph.add(ground_link("p walk 0", 0.0, 5.0, 1.0), owner);
        assert!(graph.contains_link(key, LinkAction::WALKING));
        assert!(graph.contains_link(key, LinkAction::TRAVERSING));
        assert!(!graph.contains_link(key, LinkAction::JUMPING));
    }

    #[test]
    fn find_object_links_prefers_overlap_then_distance() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        graph.record_object(owner, "p", Bounds::new(Vec2::ZERO, Vec2::new(20.0, 1.0)));
        let first = graph.add(ground_link("p walk 0", 0.0, 10.0, 1.0), owner);
        let second = graph.add(ground_link("p walk 1", 10.0, 20.0, 1.0), owner);
        let standing_left = Bounds::new(Vec2::new(2.0, 1.0), Vec2::new(3.0, 3.0));
        assert_eq!(graph.find_object_links(owner, &standing_left), Some(first));
        let standing_right = Bounds::new(Vec2::new(14.0, 1.0), Vec2::new(15.0, 3.0));
        assert_eq!(graph.find_object_links(owner, &standing_right), Some(second));
        let far_off = Bounds::new(Vec2::new(40.0, 1.0), Vec2::new(41.0, 3.0));
        assert_eq!(graph.find_object_links(owner, &far_off), None);
    }

    #[test]
    fn find_object_links_single_edge_skips_overlap_test() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        let only = graph.add(ground_link("p walk 0", 0.0, 4.0, 1.0), owner);
        let far_off = Bounds::new(Vec2::new(40.0, 1.0), Vec2::new(41.0, 3.0));
        assert_eq!(graph.find_object_links(owner, &far_off), Some(only));
    }

    #[test]
    fn find_closest_link_picks_nearest_segment() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        let low = graph.add(ground_link("p walk 0", 0.0, 10.0, 1.0), owner);
        let high = graph.add(ground_link("q walk 0", 0.0, 10.0, 8.0), owner);
        assert_eq!(graph.find_closest_link(Vec2::new(5.0, 2.0)), Some(low));
        assert_eq!(graph.find_closest_link(Vec2::new(5.0, 7.5)), Some(high));
    }

    #[test]
    fn clear_empties_everything() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        graph.add(ground_link("p walk 0", 0.0, 5.0, 1.0), owner);
        graph.clear();
        assert!(graph.is_empty());
        assert_eq!(graph.node_count(), 0);
        assert!(graph.object(owner).is_none());
    }

    #[test]
    fn link_identity_depends_on_name_and_endpoints() {
        let a = ground_link("p walk 0", 0.0, 5.0, 1.0);
        let b = ground_link("p walk 0", 0.0, 5.0, 1.0);
        let c = ground_link("p walk 1", 0.0, 5.0, 1.0);
        let d = ground_link("p walk 0", 0.0, 6.0, 1.0);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_ne!(a.key(), d.key());
    }

    #[test]
    fn adjacent_links_share_an_endpoint() {
        let mut graph = NavGraph::new();
        let owner = Entity::from_raw(1);
        let a = graph.add(ground_link("p walk 0", 0.0, 5.0, 1.0), owner);
        let b = graph.add(ground_link("p walk 1", 5.0, 10.0, 1.0), owner);
        let c = graph.add(ground_link("p walk 2", 10.0, 15.0, 1.0), owner);
        let far = graph.add(ground_link("q walk 0", 40.0, 45.0, 1.0), owner);
        let neighbors = graph.adjacent_links(b);
        assert!(neighbors.contains(&a));
        assert!(neighbors.contains(&c));
        assert!(!neighbors.contains(&b));
        assert!(!neighbors.contains(&far));
        assert_eq!(graph.route(a, c).len(), 3);
        assert!(graph.route(a, far).is_empty());
    }

    #[test]
    fn left_and_right_follow_x_order() {
        let seg = Segment::new(Vec2::new(9.0, 1.0), Vec2::new(2.0, 1.0)).unwrap();
        let link = NavLink::new("p walk 0", seg, LinkAction::TRAVERSING, LinkFlow::ALL);
        assert_eq!(link.left_point(), Vec2::new(2.0, 1.0));
        assert_eq!(link.right_point(), Vec2::new(9.0, 1.0));
    }
}
