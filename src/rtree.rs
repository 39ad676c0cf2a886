use bevy::prelude::Vec2;

use crate::geometry::{Axis, Bounds};

/// Default node capacity. Nodes split once they exceed this.
pub const DEFAULT_MAX_ENTRIES: usize = 5;

/// An entry stored in a leaf: a stable key, the indexed rectangle, and the
/// caller's payload.
#[derive(Clone, Debug)]
pub struct SpatialItem<T> {
    pub key: u64,
    pub bounds: Bounds,
    pub payload: T,
}

#[derive(Clone, Debug)]
enum NodeKind<T> {
    Leaf(Vec<SpatialItem<T>>),
    Branch(Vec<Node<T>>),
}

#[derive(Clone, Debug)]
struct Node<T> {
    bounds: Option<Bounds>,
    kind: NodeKind<T>,
}

impl<T> Node<T> {
    fn empty_leaf() -> Self {
        Self {
            bounds: None,
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    fn leaf(items: Vec<SpatialItem<T>>) -> Self {
        let bounds = union_of(items.iter().map(|i| i.bounds));
        Self {
            bounds,
            kind: NodeKind::Leaf(items),
        }
    }

    fn branch(children: Vec<Node<T>>) -> Self {
        let bounds = union_of(children.iter().filter_map(|c| c.bounds));
        Self {
            bounds,
            kind: NodeKind::Branch(children),
        }
    }

    fn recompute_bounds(&mut self) {
        self.bounds = match &self.kind {
            NodeKind::Leaf(items) => union_of(items.iter().map(|i| i.bounds)),
            NodeKind::Branch(children) => union_of(children.iter().filter_map(|c| c.bounds)),
        };
    }

    fn entry_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(items) => items.len(),
            NodeKind::Branch(children) => children.len(),
        }
    }
}

fn union_of(bounds: impl Iterator<Item = Bounds>) -> Option<Bounds> {
    bounds.reduce(|acc, b| acc.merge(&b))
}

/// Rectangle R-tree with Guttman quadratic node splitting.
///
/// Leaves hold keyed rectangles, branches hold child nodes; every node keeps
/// the union bounding rectangle of its entries so range queries only descend
/// into intersecting subtrees.
pub struct RTree<T> {
    root: Node<T>,
    max_entries: usize,
    min_entries: usize,
    len: usize,
}

impl<T> RTree<T> {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// `max_entries` is clamped to at least 3; the minimum fill is
    /// `max(2, 0.4 * max)`.
    pub fn with_max_entries(max_entries: usize) -> Self {
        let max_entries = max_entries.max(3);
        let min_entries = ((max_entries as f32 * 0.4) as usize).max(2);
        Self {
            root: Node::empty_leaf(),
            max_entries,
            min_entries,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn clear(&mut self) {
        self.root = Node::empty_leaf();
        self.len = 0;
    }

    pub fn depth(&self) -> usize {
        fn depth_of<T>(node: &Node<T>) -> usize {
            match &node.kind {
                NodeKind::Leaf(_) => 1,
                NodeKind::Branch(children) => {
                    1 + children.iter().map(depth_of).max().unwrap_or(0)
                }
            }
        }
        depth_of(&self.root)
    }

    pub fn insert(&mut self, key: u64, bounds: Bounds, payload: T) {
        let item = SpatialItem {
            key,
            bounds,
            payload,
        };
        if let Some((a, b)) =
            Self::insert_into(&mut self.root, item, self.max_entries, self.min_entries)
        {
            // Root split grows the tree taller.
            self.root = Node::branch(vec![a, b]);
        }
        self.len += 1;
    }

    fn insert_into(
        node: &mut Node<T>,
        item: SpatialItem<T>,
        max: usize,
        min: usize,
    ) -> Option<(Node<T>, Node<T>)> {
        let split = match &mut node.kind {
            NodeKind::Leaf(items) => {
                items.push(item);
                if items.len() > max {
                    let entries = std::mem::take(items);
                    let (a, b) = split_entries(entries, |i| i.bounds, max, min);
                    Some((Node::leaf(a), Node::leaf(b)))
                } else {
                    None
                }
            }
            NodeKind::Branch(children) => {
                let idx = choose_child(children, &item.bounds);
                if let Some((a, b)) = Self::insert_into(&mut children[idx], item, max, min) {
                    // A non-root split grows the parent wider.
                    children[idx] = a;
                    children.insert(idx + 1, b);
                }
                if children.len() > max {
                    let entries = std::mem::take(children);
                    let (a, b) = split_entries(
                        entries,
                        |c: &Node<T>| {
                            c.bounds
                                .unwrap_or_else(|| Bounds::new(Vec2::ZERO, Vec2::ZERO))
                        },
                        max,
                        min,
                    );
                    Some((Node::branch(a), Node::branch(b)))
                } else {
                    None
                }
            }
        };
        if split.is_none() {
            node.recompute_bounds();
        }
        split
    }

    /// All items whose rectangle intersects `query`.
    pub fn find(&self, query: &Bounds) -> Vec<&SpatialItem<T>> {
        fn collect<'a, T>(
            node: &'a Node<T>,
            query: &Bounds,
            out: &mut Vec<&'a SpatialItem<T>>,
        ) {
            match &node.kind {
                NodeKind::Leaf(items) => {
                    for item in items {
                        if item.bounds.intersects(query) {
                            out.push(item);
                        }
                    }
                }
                NodeKind::Branch(children) => {
                    for child in children {
                        if child.bounds.is_some_and(|b| b.intersects(query)) {
                            collect(child, query, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.root, query, &mut out);
        out
    }

    /// Bounding rectangles of every node with its depth, for overlays.
    pub fn node_bounds(&self) -> Vec<(Bounds, usize)> {
        fn walk<T>(node: &Node<T>, depth: usize, out: &mut Vec<(Bounds, usize)>) {
            if let Some(b) = node.bounds {
                out.push((b, depth));
            }
            if let NodeKind::Branch(children) = &node.kind {
                for child in children {
                    walk(child, depth + 1, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, 0, &mut out);
        out
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        fn check<T>(node: &Node<T>, is_root: bool, max: usize, min: usize) {
            let count = node.entry_count();
            if is_root {
                assert!(count <= max, "root over capacity: {count}");
            } else {
                assert!(
                    (min..=max).contains(&count),
                    "fan-out {count} outside [{min}, {max}]"
                );
            }
            match &node.kind {
                NodeKind::Leaf(items) => {
                    let expected = union_of(items.iter().map(|i| i.bounds));
                    assert_eq!(node.bounds, expected, "leaf bounds stale");
                }
                NodeKind::Branch(children) => {
                    let expected = union_of(children.iter().filter_map(|c| c.bounds));
                    assert_eq!(node.bounds, expected, "branch bounds stale");
                    for child in children {
                        check(child, false, max, min);
                    }
                }
            }
        }
        check(&self.root, true, self.max_entries, self.min_entries);
    }
}

impl<T> Default for RTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry chosen for descent: least enlargement, ties broken by smaller area.
fn choose_child<T>(children: &[Node<T>], rect: &Bounds) -> usize {
    let mut best = 0usize;
    let mut best_enlargement = f32::INFINITY;
    let mut best_area = f32::INFINITY;
    for (idx, child) in children.iter().enumerate() {
        let Some(bounds) = child.bounds else { continue };
        let enlargement = bounds.merge_enlargement(rect);
        let area = bounds.area();
        if enlargement < best_enlargement
            || (enlargement == best_enlargement && area < best_area)
        {
            best = idx;
            best_enlargement = enlargement;
            best_area = area;
        }
    }
    best
}

/// Guttman quadratic split over an over-full entry list.
///
/// Seeds are the pair with the greatest normalized separation on either
/// axis; the rest are distributed one at a time to the side needing the
/// smaller enlargement, unless a side must take the whole remainder to
/// reach the minimum fill.
fn split_entries<E>(
    mut entries: Vec<E>,
    bounds_of: impl Fn(&E) -> Bounds,
    max: usize,
    min: usize,
) -> (Vec<E>, Vec<E>) {
    let (seed_a, seed_b) = pick_seeds(&entries, &bounds_of);
    // Remove the higher index first so the lower one stays valid.
    let removed_high = entries.remove(seed_a.max(seed_b));
    let removed_low = entries.remove(seed_a.min(seed_b));
    let (entry_a, entry_b) = if seed_a > seed_b {
        (removed_high, removed_low)
    } else {
        (removed_low, removed_high)
    };

    let mut bounds_a = bounds_of(&entry_a);
    let mut bounds_b = bounds_of(&entry_b);
    let mut group_a = vec![entry_a];
    let mut group_b = vec![entry_b];

    while let Some(next) = {
        if entries.is_empty() {
            None
        } else if group_a.len() + entries.len() == min {
            // Remainder exactly fills A to the minimum.
            group_a.extend(entries.drain(..));
            None
        } else if group_b.len() + entries.len() == min {
            group_b.extend(entries.drain(..));
            None
        } else {
            // Most decided entry first: the one whose enlargement cost
            // differs most between the two sides.
            let (idx, _) = entries
                .iter()
                .enumerate()
                .map(|(idx, e)| {
                    let b = bounds_of(e);
                    let diff =
                        (bounds_a.merge_enlargement(&b) - bounds_b.merge_enlargement(&b)).abs();
                    (idx, diff)
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap();
            Some(entries.remove(idx))
        }
    } {
        let b = bounds_of(&next);
        let enlargement_a = bounds_a.merge_enlargement(&b);
        let enlargement_b = bounds_b.merge_enlargement(&b);
        let take_a = if enlargement_a != enlargement_b {
            enlargement_a < enlargement_b
        } else if bounds_a.area() != bounds_b.area() {
            bounds_a.area() < bounds_b.area()
        } else {
            group_a.len() <= group_b.len() && group_a.len() < max
        };
        if take_a {
            bounds_a = bounds_a.merge(&b);
            group_a.push(next);
        } else {
            bounds_b = bounds_b.merge(&b);
            group_b.push(next);
        }
    }

    (group_a, group_b)
}

/// Seed pair with the greatest normalized separation across both axes:
/// the entry with the highest low coordinate against the entry with the
/// lowest high coordinate, scaled by the total extent (zero extent counts
/// as zero separation).
fn pick_seeds<E>(entries: &[E], bounds_of: &impl Fn(&E) -> Bounds) -> (usize, usize) {
    let mut best_separation = f32::NEG_INFINITY;
    let mut best_pair = (0usize, 1usize);
    for axis in [Axis::Horizontal, Axis::Vertical] {
        let mut extent_min = f32::INFINITY;
        let mut extent_max = f32::NEG_INFINITY;
        let mut highest_low = (f32::NEG_INFINITY, 0usize);
        let mut lowest_high = (f32::INFINITY, 0usize);
        for (idx, entry) in entries.iter().enumerate() {
            let b = bounds_of(entry);
            let low = b.axis_min(axis);
            let high = b.axis_max(axis);
            extent_min = extent_min.min(low);
            extent_max = extent_max.max(high);
            if low > highest_low.0 {
                highest_low = (low, idx);
            }
            if high < lowest_high.0 {
                lowest_high = (high, idx);
            }
        }
        let extent = extent_max - extent_min;
        let separation = if extent <= 0.0 {
            0.0
        } else {
            (highest_low.0 - lowest_high.0) / extent
        };
        if separation > best_separation {
            best_separation = separation;
            best_pair = (highest_low.1, lowest_high.1);
        }
    }
    if best_pair.0 == best_pair.1 {
        // All entries coincide on both axes; any distinct pair seeds.
        best_pair.1 = if best_pair.0 == 0 { 1 } else { 0 };
    }
    best_pair
}
