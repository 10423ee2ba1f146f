use std::cmp::Ordering;

use tinyvec::{ArrayVec, TinyVec};

use crate::bounds::{sq_dist2, Aabb2};
use crate::coord::CoordNum;
use crate::error::{PointIndexError, Result};

/// Tuning parameters for a [`QuadTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadTreeOptions {
    /// Leaf capacity before a subdivision is attempted.
    pub max_items_per_node: usize,
    /// Maximum subdivision depth; leaves at this depth grow without splitting.
    pub max_depth: usize,
    /// Item count above which the flat list converts into the tree. The
    /// conversion happens once and never reverts. Zero starts in tree mode.
    pub spatial_threshold: usize,
}

impl Default for QuadTreeOptions {
    fn default() -> Self {
        Self {
            max_items_per_node: 8,
            max_depth: 8,
            spatial_threshold: 5000,
        }
    }
}

/// A 2-D point index with fixed root bounds and quadrant subdivision.
///
/// Items are positioned by the function supplied at construction; the
/// function must return the same coordinates for an item for as long as the
/// item is stored. Below [`QuadTreeOptions::spatial_threshold`] items are
/// kept in a flat list and scanned linearly; the first insert that crosses
/// the threshold converts every entry into the tree in one pass.
pub struct QuadTree<N: CoordNum, T, F: Fn(&T) -> [N; 2]> {
    bounds: Aabb2<N>,
    position: F,
    opts: QuadTreeOptions,
    store: Store<N, T>,
    len: usize,
}

enum Store<N, T> {
    Linear(Vec<T>),
    Spatial(Vec<Node<N, T>>),
}

/// Nodes live in a flat arena and refer to their children by index. A node
/// is a leaf until `children` is set; subdivision never merges back.
struct Node<N, T> {
    bounds: Aabb2<N>,
    depth: usize,
    children: Option<[usize; 4]>,
    items: Vec<T>,
}

impl<N: CoordNum, T> Node<N, T> {
    fn leaf(bounds: Aabb2<N>, depth: usize) -> Self {
        Self {
            bounds,
            depth,
            children: None,
            items: Vec::new(),
        }
    }
}

impl<N: CoordNum, T, F: Fn(&T) -> [N; 2]> QuadTree<N, T, F> {
    /// Create a tree over `bounds` with default options.
    pub fn new(bounds: Aabb2<N>, position: F) -> Result<Self> {
        Self::with_options(bounds, position, QuadTreeOptions::default())
    }

    /// Create a tree over `bounds` with explicit options.
    pub fn with_options(bounds: Aabb2<N>, position: F, opts: QuadTreeOptions) -> Result<Self> {
        if bounds.is_empty() {
            return Err(PointIndexError::InvalidConfig(format!(
                "quadtree bounds cover no area: {:?}",
                bounds
            )));
        }
        if opts.max_items_per_node == 0 || opts.max_depth == 0 {
            return Err(PointIndexError::InvalidConfig(
                "max_items_per_node and max_depth must be positive".to_string(),
            ));
        }
        let store = initial_store(bounds, &opts);
        Ok(Self {
            bounds,
            position,
            opts,
            store,
            len: 0,
        })
    }

    /// The root bounds fixed at construction.
    pub fn bounds(&self) -> Aabb2<N> {
        self.bounds
    }

    /// The number of stored items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an item at the position derived by the position function.
    ///
    /// Returns [`PointIndexError::OutOfBounds`] when the position falls
    /// outside the fixed root bounds.
    pub fn insert(&mut self, item: T) -> Result<()> {
        let p = (self.position)(&item);
        if !self.bounds.contains(p) {
            return Err(PointIndexError::OutOfBounds(format!(
                "point {:?} outside quadtree bounds {:?}",
                p, self.bounds
            )));
        }
        match &mut self.store {
            Store::Linear(items) => {
                items.push(item);
                self.len += 1;
                if self.len > self.opts.spatial_threshold {
                    self.convert_to_spatial();
                }
            }
            Store::Spatial(nodes) => {
                insert_at(nodes, p, item, &self.position, &self.opts);
                self.len += 1;
            }
        }
        Ok(())
    }

    /// One-time, one-directional bulk conversion out of linear mode.
    fn convert_to_spatial(&mut self) {
        let items = match &mut self.store {
            Store::Linear(items) => std::mem::take(items),
            Store::Spatial(_) => return,
        };
        let mut nodes = vec![Node::leaf(self.bounds, 0)];
        for item in items {
            let p = (self.position)(&item);
            insert_at(&mut nodes, p, item, &self.position, &self.opts);
        }
        self.store = Store::Spatial(nodes);
    }

    /// Remove one stored item equal to `item`.
    ///
    /// Returns `false` when no such item is stored; absence is not an error.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let removed = match &mut self.store {
            Store::Linear(items) => match items.iter().position(|e| e == item) {
                Some(i) => {
                    items.swap_remove(i);
                    true
                }
                None => false,
            },
            Store::Spatial(nodes) => {
                let p = (self.position)(item);
                self.bounds.contains(p) && remove_at(nodes, p, item)
            }
        };
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Collect the items whose positions fall inside `region` (half-open).
    pub fn query(&self, region: Aabb2<N>) -> Vec<&T> {
        let mut out = Vec::new();
        self.query_with(region, |item| out.push(item));
        out
    }

    /// Like [`Self::query`], but clears and fills a caller-owned buffer
    /// instead of allocating a fresh one.
    pub fn query_into<'a>(&'a self, region: Aabb2<N>, out: &mut Vec<&'a T>) {
        out.clear();
        self.query_with(region, |item| out.push(item));
    }

    /// Invoke `visit` for every item whose position falls inside `region`.
    pub fn query_with<'a>(&'a self, region: Aabb2<N>, mut visit: impl FnMut(&'a T)) {
        match &self.store {
            Store::Linear(items) => {
                for item in items {
                    if region.contains((self.position)(item)) {
                        visit(item);
                    }
                }
            }
            Store::Spatial(nodes) => {
                let mut stack: TinyVec<[usize; 32]> = TinyVec::new();
                stack.push(0);
                while let Some(idx) = stack.pop() {
                    let node = &nodes[idx];
                    if !region.intersects(&node.bounds) {
                        continue;
                    }
                    if let Some(children) = node.children {
                        for child in children {
                            stack.push(child);
                        }
                    } else {
                        for item in &node.items {
                            if region.contains((self.position)(item)) {
                                visit(item);
                            }
                        }
                    }
                }
            }
        }
    }

    /// The stored item closest to `target` by squared Euclidean distance.
    ///
    /// Returns [`PointIndexError::EmptyIndex`] when nothing is stored.
    pub fn find_nearest(&self, target: [N; 2]) -> Result<&T> {
        let best = match &self.store {
            Store::Linear(items) => {
                let mut best: Option<(N, &T)> = None;
                for item in items {
                    relax(&mut best, sq_dist2((self.position)(item), target), item);
                }
                best
            }
            Store::Spatial(nodes) => {
                let mut best = None;
                nearest_at(nodes, 0, target, &self.position, &mut best);
                best
            }
        };
        best.map(|(_, item)| item).ok_or(PointIndexError::EmptyIndex)
    }

    /// Drop every item and return to the initial (linear, unless the
    /// threshold is zero) empty state.
    pub fn clear(&mut self) {
        self.store = initial_store(self.bounds, &self.opts);
        self.len = 0;
    }
}

fn initial_store<N: CoordNum, T>(bounds: Aabb2<N>, opts: &QuadTreeOptions) -> Store<N, T> {
    if opts.spatial_threshold == 0 {
        Store::Spatial(vec![Node::leaf(bounds, 0)])
    } else {
        Store::Linear(Vec::new())
    }
}

#[inline]
fn relax<'a, N: CoordNum, T>(best: &mut Option<(N, &'a T)>, dist: N, item: &'a T) {
    if best.map_or(true, |(bd, _)| dist < bd) {
        *best = Some((dist, item));
    }
}

fn insert_at<N: CoordNum, T, F: Fn(&T) -> [N; 2]>(
    nodes: &mut Vec<Node<N, T>>,
    p: [N; 2],
    item: T,
    position: &F,
    opts: &QuadTreeOptions,
) {
    let mut idx = 0;
    loop {
        match nodes[idx].children {
            Some(children) => idx = children[nodes[idx].bounds.quadrant_of(p)],
            None => {
                nodes[idx].items.push(item);
                split(nodes, idx, position, opts);
                return;
            }
        }
    }
}

/// Split a leaf that exceeds capacity, redistributing its items into four
/// quadrant children. Recurses in case every item lands in the same child.
fn split<N: CoordNum, T, F: Fn(&T) -> [N; 2]>(
    nodes: &mut Vec<Node<N, T>>,
    idx: usize,
    position: &F,
    opts: &QuadTreeOptions,
) {
    if nodes[idx].items.len() <= opts.max_items_per_node || nodes[idx].depth >= opts.max_depth {
        return;
    }
    let bounds = nodes[idx].bounds;
    let depth = nodes[idx].depth;
    let first = nodes.len();
    for i in 0..4 {
        nodes.push(Node::leaf(bounds.quadrant(i), depth + 1));
    }
    let children = [first, first + 1, first + 2, first + 3];
    let items = std::mem::take(&mut nodes[idx].items);
    nodes[idx].children = Some(children);
    for item in items {
        let q = bounds.quadrant_of(position(&item));
        nodes[children[q]].items.push(item);
    }
    for child in children {
        split(nodes, child, position, opts);
    }
}

fn remove_at<N: CoordNum, T: PartialEq>(nodes: &mut [Node<N, T>], p: [N; 2], item: &T) -> bool {
    let mut idx = 0;
    loop {
        match nodes[idx].children {
            Some(children) => idx = children[nodes[idx].bounds.quadrant_of(p)],
            None => {
                let items = &mut nodes[idx].items;
                return match items.iter().position(|e| e == item) {
                    Some(i) => {
                        items.swap_remove(i);
                        true
                    }
                    None => false,
                };
            }
        }
    }
}

/// Branch-and-bound nearest descent. Children are visited ordered by their
/// squared box distance to the target; the walk stops as soon as the running
/// best beats the next box distance.
fn nearest_at<'a, N: CoordNum, T, F: Fn(&T) -> [N; 2]>(
    nodes: &'a [Node<N, T>],
    idx: usize,
    target: [N; 2],
    position: &F,
    best: &mut Option<(N, &'a T)>,
) {
    let node = &nodes[idx];
    match node.children {
        Some(children) => {
            let mut order: ArrayVec<[(N, usize); 4]> = ArrayVec::new();
            for &child in &children {
                order.push((nodes[child].bounds.sq_dist(target), child));
            }
            order.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            for (box_dist, child) in order {
                if let Some((best_dist, _)) = *best {
                    if best_dist < box_dist {
                        break;
                    }
                }
                nearest_at(nodes, child, target, position, best);
            }
        }
        None => {
            for item in &node.items {
                relax(best, sq_dist2(position(item), target), item);
            }
        }
    }
}
