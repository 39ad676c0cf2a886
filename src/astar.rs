use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use bevy::prelude::Entity;

use crate::graph::{LinkFlow, LinkKey, NavGraph, NavLink};
use crate::heap::MinHeap;

/// One step of a solved route: the link to traverse and the platform it was
/// generated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteStep {
    pub link: LinkKey,
    pub platform: Entity,
}

/// Open-set entry ordered by estimated total cost, ties by insertion order.
struct OpenEntry {
    score: f32,
    seq: u64,
    link: LinkKey,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Shortest path between two links, walking shared endpoints.
///
/// Search state is per-link: scores and predecessors live in solver-owned
/// tables that start fresh on every call. The returned steps run from
/// `origin` to `destination` inclusive; an unreachable destination yields an
/// empty route.
pub fn solve(graph: &NavGraph, origin: LinkKey, destination: LinkKey) -> Vec<RouteStep> {
    if graph.link(origin).is_none() || graph.link(destination).is_none() {
        return Vec::new();
    }

    let mut g_score: HashMap<LinkKey, f32> = HashMap::new();
    let mut predecessor: HashMap<LinkKey, LinkKey> = HashMap::new();
    let mut open = MinHeap::new();
    let mut queued: HashSet<LinkKey> = HashSet::new();
    let mut seq = 0u64;

    g_score.insert(origin, 0.0);
    open.push(OpenEntry {
        score: heuristic(graph, origin, destination),
        seq,
        link: origin,
    });
    queued.insert(origin);

    while let Some(current) = open.pop() {
        queued.remove(&current.link);
        if current.link == destination {
            return reconstruct(graph, &predecessor, origin, destination);
        }
        let Some(current_link) = graph.link(current.link) else {
            continue;
        };
        let current_g = g_score.get(&current.link).copied().unwrap_or(f32::INFINITY);

        for neighbor_key in graph.adjacent_links(current.link) {
            let Some(neighbor) = graph.link(neighbor_key) else {
                continue;
            };
            let candidate = current_g + entry_cost(neighbor, current_link);
            let known = g_score.get(&neighbor_key).copied().unwrap_or(f32::INFINITY);
            if candidate < known {
                predecessor.insert(neighbor_key, current.link);
                g_score.insert(neighbor_key, candidate);
                if queued.insert(neighbor_key) {
                    seq += 1;
                    open.push(OpenEntry {
                        score: candidate + heuristic(graph, neighbor_key, destination),
                        seq,
                        link: neighbor_key,
                    });
                }
            }
        }
    }

    Vec::new()
}

/// Euclidean distance between segment midpoints; admissible for a geometric
/// graph and consistent because midpoints never move during a solve.
fn heuristic(graph: &NavGraph, from: LinkKey, to: LinkKey) -> f32 {
    match (graph.link(from), graph.link(to)) {
        (Some(a), Some(b)) => a.segment.midpoint().distance(b.segment.midpoint()),
        _ => 0.0,
    }
}

/// Cost of stepping onto `link` from `from`: the link's length, infinite
/// when the shared endpoint enters against the allowed flow.
fn entry_cost(link: &NavLink, from: &NavLink) -> f32 {
    let mut cost = link.segment.length();
    let via_start =
        link.start_key() == from.start_key() || link.start_key() == from.end_key();
    let via_end = link.end_key() == from.start_key() || link.end_key() == from.end_key();
    if via_start && !link.flow.allows_all(LinkFlow::START_TO_END) {
        cost += f32::INFINITY;
    }
    if via_end && !link.flow.allows_all(LinkFlow::END_TO_START) {
        cost += f32::INFINITY;
    }
    cost
}

fn reconstruct(
    graph: &NavGraph,
    predecessor: &HashMap<LinkKey, LinkKey>,
    origin: LinkKey,
    destination: LinkKey,
) -> Vec<RouteStep> {
    let mut keys = vec![destination];
    let mut current = destination;
    while current != origin {
        let Some(prev) = predecessor.get(&current) else {
            break;
        };
        keys.push(*prev);
        current = *prev;
    }
    keys.reverse();
    keys.into_iter()
        .map(|link| RouteStep {
            link,
            platform: graph.owner_of(link).unwrap_or(Entity::PLACEHOLDER),
        })
        .collect()
}
