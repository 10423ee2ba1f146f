use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

#[cfg(feature = "rayon")]
use rayon::slice::ParallelSliceMut;

use crate::coord::CoordNum;
use crate::error::{PointIndexError, Result};
use crate::kdtree::metric::{Metric, SquaredEuclidean};

/// Item count the tree must exceed before the rebalance heuristic fires.
const REBALANCE_MIN_LEN: usize = 1000;
/// Height slack over the theoretical optimum tolerated before rebuilding.
const REBALANCE_HEIGHT_FACTOR: f64 = 2.5;
/// Existing size below which a bulk insert never triggers a full rebuild.
const REBUILD_MIN_LEN: usize = 128;

struct KdNode<T> {
    item: T,
    left: Option<Box<KdNode<T>>>,
    right: Option<Box<KdNode<T>>>,
}

/// A k-dimensional tree with alternating-dimension splits.
///
/// At depth `d` the tree splits on dimension `d % K`: the left subtree holds
/// strictly smaller coordinates on that dimension, the right subtree
/// greater-or-equal ones. Incremental inserts do not rebalance, so
/// adversarial insertion order can degrade to linear depth; a best-effort
/// heuristic rebuilds the tree when it detects gross imbalance at
/// power-of-two sizes (see [`KdTree::insert`]), and [`KdTree::build`]
/// produces a near-optimal tree from a batch directly.
pub struct KdTree<N: CoordNum, T, F: Fn(&T) -> [N; K], M: Metric<N, K>, const K: usize> {
    position: F,
    metric: M,
    root: Option<Box<KdNode<T>>>,
    len: usize,
    _coord: PhantomData<N>,
}

impl<N, T, F, const K: usize> KdTree<N, T, F, SquaredEuclidean, K>
where
    N: CoordNum,
    F: Fn(&T) -> [N; K],
{
    /// Create an empty tree with the default squared-Euclidean metric.
    pub fn new(position: F) -> Result<Self> {
        Self::with_metric(position, SquaredEuclidean)
    }

    /// Bulk-build a balanced tree from a batch, with the default metric.
    pub fn build(position: F, items: Vec<T>) -> Result<Self> {
        Self::build_with_metric(position, SquaredEuclidean, items)
    }
}

impl<N, T, F, M, const K: usize> KdTree<N, T, F, M, K>
where
    N: CoordNum,
    F: Fn(&T) -> [N; K],
    M: Metric<N, K>,
{
    /// Create an empty tree with an explicit distance metric.
    pub fn with_metric(position: F, metric: M) -> Result<Self> {
        if K == 0 {
            return Err(PointIndexError::InvalidConfig(
                "dimension count must be positive".to_string(),
            ));
        }
        Ok(Self {
            position,
            metric,
            root: None,
            len: 0,
            _coord: PhantomData,
        })
    }

    /// Bulk-build a balanced tree from a batch with an explicit metric.
    ///
    /// Each level sorts its range on the split dimension and takes the
    /// median as the node, yielding a height close to `ceil(log2 n)`.
    pub fn build_with_metric(position: F, metric: M, items: Vec<T>) -> Result<Self> {
        let mut tree = Self::with_metric(position, metric)?;
        tree.rebuild(items);
        Ok(tree)
    }

    /// The number of stored items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of nodes on the longest root-to-leaf path, measured by a
    /// full traversal.
    pub fn height(&self) -> usize {
        height(&self.root)
    }

    /// Insert one item by plain descent, without rebalancing the path.
    ///
    /// When the new size exceeds 1000 and is an exact power of two, the
    /// height is measured; a tree taller than 2.5x the optimum is snapshot
    /// and rebuilt through the bulk path. This keeps the check amortized
    /// while bounding how bad a degenerate insertion order can get.
    pub fn insert(&mut self, item: T) {
        let p = (self.position)(&item);
        insert_at(&mut self.root, 0, &p, item, &self.position);
        self.len += 1;
        self.maybe_rebalance();
    }

    /// Insert a batch, choosing between incremental inserts and a full
    /// rebuild from the union by size: a batch larger than half of an
    /// already non-trivial tree rebuilds, anything else descends item by
    /// item.
    pub fn insert_many(&mut self, items: Vec<T>) {
        if self.is_empty() {
            self.rebuild(items);
        } else if self.len >= REBUILD_MIN_LEN && items.len() > self.len / 2 {
            let mut all = Vec::with_capacity(self.len + items.len());
            collect_into(self.root.take(), &mut all);
            all.extend(items);
            self.rebuild(all);
        } else {
            for item in items {
                self.insert(item);
            }
        }
    }

    /// Drop every item.
    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    fn maybe_rebalance(&mut self) {
        if self.len <= REBALANCE_MIN_LEN || !self.len.is_power_of_two() {
            return;
        }
        let optimal = (self.len as f64).log2();
        if (self.height() as f64) > REBALANCE_HEIGHT_FACTOR * optimal {
            let mut items = Vec::with_capacity(self.len);
            collect_into(self.root.take(), &mut items);
            self.rebuild(items);
        }
    }

    /// Replace the contents with a balanced bulk build of `items`.
    fn rebuild(&mut self, items: Vec<T>) {
        self.len = items.len();
        self.root = build_subtree(items, 0, &self.position);
    }

    /// The stored item closest to `target` under the tree's metric.
    ///
    /// Returns [`PointIndexError::EmptyIndex`] when nothing is stored.
    pub fn find_nearest(&self, target: [N; K]) -> Result<&T> {
        let mut best: Option<(N, &T)> = None;
        if let Some(root) = &self.root {
            nearest_at(root, 0, &target, &self.position, &self.metric, &mut best);
        }
        best.map(|(_, item)| item).ok_or(PointIndexError::EmptyIndex)
    }

    /// The `k` stored items closest to `target`, ascending by distance.
    ///
    /// Returns fewer than `k` items when the tree holds fewer; an empty
    /// vector for `k == 0` or an empty tree.
    pub fn find_nearest_k(&self, target: [N; K], k: usize) -> Vec<&T> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap: BinaryHeap<Candidate<N, &T>> = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = &self.root {
            nearest_k_at(
                root,
                0,
                &target,
                k,
                &self.position,
                &self.metric,
                &mut heap,
            );
        }
        heap.into_sorted_vec().into_iter().map(|c| c.item).collect()
    }

    /// Collect the items within `radius` of `target`, where `radius` is in
    /// the metric's units (squared for the default metric).
    pub fn find_within_radius(&self, target: [N; K], radius: N) -> Vec<&T> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            radius_at(
                root,
                0,
                &target,
                radius,
                &self.position,
                &self.metric,
                &mut out,
            );
        }
        out
    }

    /// Collect the items inside the axis-aligned hyper-rectangle
    /// `[min, max]` (inclusive on every dimension).
    ///
    /// Descent is pruned on the current split dimension's bound only; the
    /// remaining dimensions are checked per reported item.
    pub fn find_in_range(&self, min: [N; K], max: [N; K]) -> Vec<&T> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            range_at(root, 0, &min, &max, &self.position, &mut out);
        }
        out
    }
}

/// A heap entry ordered by distance alone.
struct Candidate<N, I> {
    dist: N,
    item: I,
}

impl<N: CoordNum, I> PartialEq for Candidate<N, I> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl<N: CoordNum, I> Eq for Candidate<N, I> {}

impl<N: CoordNum, I> PartialOrd for Candidate<N, I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<N: CoordNum, I> Ord for Candidate<N, I> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
    }
}

fn height<T>(node: &Option<Box<KdNode<T>>>) -> usize {
    match node {
        None => 0,
        Some(n) => 1 + height(&n.left).max(height(&n.right)),
    }
}

/// Move every item of the subtree into `out`, consuming the nodes.
fn collect_into<T>(node: Option<Box<KdNode<T>>>, out: &mut Vec<T>) {
    if let Some(n) = node {
        out.push(n.item);
        collect_into(n.left, out);
        collect_into(n.right, out);
    }
}

fn insert_at<N: CoordNum, T, F: Fn(&T) -> [N; K], const K: usize>(
    node: &mut Option<Box<KdNode<T>>>,
    depth: usize,
    p: &[N; K],
    item: T,
    position: &F,
) {
    match node {
        None => {
            *node = Some(Box::new(KdNode {
                item,
                left: None,
                right: None,
            }));
        }
        Some(n) => {
            let dim = depth % K;
            let c = position(&n.item);
            if p[dim] < c[dim] {
                insert_at(&mut n.left, depth + 1, p, item, position);
            } else {
                insert_at(&mut n.right, depth + 1, p, item, position);
            }
        }
    }
}

/// Sort `items` on one dimension via a scalar key column, then apply the
/// permutation. Sorting keys instead of items keeps extraction calls linear
/// and lets the hot sort parallelize without requiring `T: Send`.
fn sort_by_dim<N: CoordNum, T, F: Fn(&T) -> [N; K], const K: usize>(
    items: &mut Vec<T>,
    position: &F,
    dim: usize,
) {
    let mut keyed: Vec<(N, usize)> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (position(item)[dim], i))
        .collect();

    #[cfg(feature = "rayon")]
    keyed.par_sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    #[cfg(not(feature = "rayon"))]
    keyed.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut slots: Vec<Option<T>> = items.drain(..).map(Some).collect();
    for &(_, i) in &keyed {
        if let Some(item) = slots[i].take() {
            items.push(item);
        }
    }
}

/// Build a subtree by sorting the whole range on the split dimension and
/// taking the median as the node. Equal keys are forced right so the left
/// branch stays strictly smaller.
fn build_subtree<N: CoordNum, T, F: Fn(&T) -> [N; K], const K: usize>(
    mut items: Vec<T>,
    depth: usize,
    position: &F,
) -> Option<Box<KdNode<T>>> {
    if items.is_empty() {
        return None;
    }
    let dim = depth % K;
    sort_by_dim(&mut items, position, dim);

    let mut mid = items.len() / 2;
    while mid > 0 && position(&items[mid - 1])[dim] == position(&items[mid])[dim] {
        mid -= 1;
    }

    let right = build_subtree(items.split_off(mid + 1), depth + 1, position);
    let item = items.pop();
    let left = build_subtree(items, depth + 1, position);
    item.map(|item| Box::new(KdNode { item, left, right }))
}

fn nearest_at<'a, N, T, F, M, const K: usize>(
    node: &'a KdNode<T>,
    depth: usize,
    target: &[N; K],
    position: &F,
    metric: &M,
    best: &mut Option<(N, &'a T)>,
) where
    N: CoordNum,
    F: Fn(&T) -> [N; K],
    M: Metric<N, K>,
{
    let c = position(&node.item);
    let d = metric.distance(&c, target);
    if best.map_or(true, |(bd, _)| d < bd) {
        *best = Some((d, &node.item));
    }

    let dim = depth % K;
    let (near, far) = if target[dim] < c[dim] {
        (&node.left, &node.right)
    } else {
        (&node.right, &node.left)
    };
    if let Some(n) = near {
        nearest_at(n, depth + 1, target, position, metric, best);
    }
    if let Some(f) = far {
        // Visit the far half only if the splitting hyperplane is closer
        // than the current best.
        let mut wall = *target;
        wall[dim] = c[dim];
        let wall_dist = metric.distance(&wall, target);
        if best.map_or(true, |(bd, _)| wall_dist < bd) {
            nearest_at(f, depth + 1, target, position, metric, best);
        }
    }
}

fn nearest_k_at<'a, N, T, F, M, const K: usize>(
    node: &'a KdNode<T>,
    depth: usize,
    target: &[N; K],
    k: usize,
    position: &F,
    metric: &M,
    heap: &mut BinaryHeap<Candidate<N, &'a T>>,
) where
    N: CoordNum,
    F: Fn(&T) -> [N; K],
    M: Metric<N, K>,
{
    let c = position(&node.item);
    let d = metric.distance(&c, target);
    if heap.len() < k {
        heap.push(Candidate {
            dist: d,
            item: &node.item,
        });
    } else if heap.peek().map_or(false, |worst| d < worst.dist) {
        heap.pop();
        heap.push(Candidate {
            dist: d,
            item: &node.item,
        });
    }

    let dim = depth % K;
    let (near, far) = if target[dim] < c[dim] {
        (&node.left, &node.right)
    } else {
        (&node.right, &node.left)
    };
    if let Some(n) = near {
        nearest_k_at(n, depth + 1, target, k, position, metric, heap);
    }
    if let Some(f) = far {
        let mut wall = *target;
        wall[dim] = c[dim];
        let wall_dist = metric.distance(&wall, target);
        let bound = if heap.len() < k {
            N::infinity()
        } else {
            heap.peek().map_or(N::infinity(), |worst| worst.dist)
        };
        if wall_dist < bound {
            nearest_k_at(f, depth + 1, target, k, position, metric, heap);
        }
    }
}

fn radius_at<'a, N, T, F, M, const K: usize>(
    node: &'a KdNode<T>,
    depth: usize,
    target: &[N; K],
    radius: N,
    position: &F,
    metric: &M,
    out: &mut Vec<&'a T>,
) where
    N: CoordNum,
    F: Fn(&T) -> [N; K],
    M: Metric<N, K>,
{
    let c = position(&node.item);
    if metric.distance(&c, target) <= radius {
        out.push(&node.item);
    }

    let dim = depth % K;
    let (near, far) = if target[dim] < c[dim] {
        (&node.left, &node.right)
    } else {
        (&node.right, &node.left)
    };
    if let Some(n) = near {
        radius_at(n, depth + 1, target, radius, position, metric, out);
    }
    if let Some(f) = far {
        let mut wall = *target;
        wall[dim] = c[dim];
        if metric.distance(&wall, target) <= radius {
            radius_at(f, depth + 1, target, radius, position, metric, out);
        }
    }
}

/// Hyper-rectangle query. The recursion is pruned using only the current
/// split dimension's bound; full containment is checked per reported item.
fn range_at<'a, N, T, F, const K: usize>(
    node: &'a KdNode<T>,
    depth: usize,
    min: &[N; K],
    max: &[N; K],
    position: &F,
    out: &mut Vec<&'a T>,
) where
    N: CoordNum,
    F: Fn(&T) -> [N; K],
{
    let c = position(&node.item);
    if (0..K).all(|i| c[i] >= min[i] && c[i] <= max[i]) {
        out.push(&node.item);
    }

    let dim = depth % K;
    if min[dim] < c[dim] {
        if let Some(n) = &node.left {
            range_at(n, depth + 1, min, max, position, out);
        }
    }
    if max[dim] >= c[dim] {
        if let Some(n) = &node.right {
            range_at(n, depth + 1, min, max, position, out);
        }
    }
}
