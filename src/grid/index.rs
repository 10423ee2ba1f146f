use std::collections::{HashMap, HashSet};

use num_traits::ToPrimitive;

use crate::bounds::{sq_dist2, Aabb2};
use crate::coord::CoordNum;
use crate::error::{PointIndexError, Result};

const DEFAULT_SPATIAL_THRESHOLD: usize = 5000;

/// Pack two integer cell coordinates into one key: high 32 bits are the x
/// cell, low 32 bits the y cell.
#[inline]
fn pack(cx: i32, cy: i32) -> u64 {
    ((cx as u32 as u64) << 32) | (cy as u32 as u64)
}

/// The integer cell a coordinate falls into. Coordinates must be finite.
#[inline]
fn cell_coord<N: CoordNum>(v: N, cell_size: N) -> i32 {
    debug_assert!(v.is_finite());
    (v / cell_size).floor().to_i32().unwrap_or(0)
}

/// Invoke `f` with the key of every cell the box overlaps.
fn each_cell<N: CoordNum>(region: Aabb2<N>, cell_size: N, mut f: impl FnMut(u64)) {
    let min_cx = cell_coord(region.min_x, cell_size);
    let max_cx = cell_coord(region.max_x, cell_size);
    let min_cy = cell_coord(region.min_y, cell_size);
    let max_cy = cell_coord(region.max_y, cell_size);
    for cy in min_cy..=max_cy {
        for cx in min_cx..=max_cx {
            f(pack(cx, cy));
        }
    }
}

/// Per-cell population statistics over the populated cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridStats {
    /// Number of cells holding at least one reference.
    pub populated_cells: usize,
    /// Mean references per populated cell.
    pub mean: f64,
    /// Largest bucket size.
    pub max: usize,
    /// Median bucket size (average of the two middle buckets when even).
    pub median: f64,
}

/// An entry slot. Point items derive their cell from the position function;
/// extended items carry the rectangle they were inserted with and are
/// referenced from every covered cell.
struct Entry<N, T> {
    extent: Option<Aabb2<N>>,
    item: T,
}

/// A uniform spatial hash grid with a fixed cell size.
///
/// Cells are a sparse map from a packed 64-bit key to a bucket of entry
/// slots, created on first insert and deleted when their bucket empties.
/// Below the spatial threshold the grid skips the cell map entirely and
/// scans a flat slot list; crossing the threshold converts once and never
/// reverts.
pub struct UniformGrid<N: CoordNum, T, F: Fn(&T) -> [N; 2]> {
    cell_size: N,
    spatial_threshold: usize,
    position: F,
    slots: Vec<Option<Entry<N, T>>>,
    free: Vec<usize>,
    /// `Some` once in spatial mode.
    cells: Option<HashMap<u64, Vec<usize>>>,
    len: usize,
    extent_count: usize,
}

impl<N: CoordNum, T, F: Fn(&T) -> [N; 2]> UniformGrid<N, T, F> {
    /// Create a grid with the given cell size and the default threshold.
    pub fn new(cell_size: N, position: F) -> Result<Self> {
        Self::with_threshold(cell_size, DEFAULT_SPATIAL_THRESHOLD, position)
    }

    /// Create a grid with an explicit linear-to-spatial threshold. Zero
    /// starts in spatial mode.
    pub fn with_threshold(cell_size: N, spatial_threshold: usize, position: F) -> Result<Self> {
        if !(cell_size > N::zero()) {
            return Err(PointIndexError::InvalidConfig(format!(
                "cell_size must be positive, got {:?}",
                cell_size
            )));
        }
        Ok(Self {
            cell_size,
            spatial_threshold,
            position,
            slots: Vec::new(),
            free: Vec::new(),
            cells: (spatial_threshold == 0).then(HashMap::new),
            len: 0,
            extent_count: 0,
        })
    }

    /// The cell size fixed at construction.
    pub fn cell_size(&self) -> N {
        self.cell_size
    }

    /// The number of stored items (an extended item counts once however
    /// many cells it covers).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the grid holds no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn key_of(&self, p: [N; 2]) -> u64 {
        pack(
            cell_coord(p[0], self.cell_size),
            cell_coord(p[1], self.cell_size),
        )
    }

    fn alloc_slot(&mut self, entry: Entry<N, T>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        }
    }

    /// Insert a point item into the single cell its position falls in.
    /// O(1) amortized.
    pub fn insert(&mut self, item: T) {
        let key = self.key_of((self.position)(&item));
        let idx = self.alloc_slot(Entry { extent: None, item });
        if let Some(cells) = &mut self.cells {
            cells.entry(key).or_default().push(idx);
        }
        self.len += 1;
        self.maybe_convert();
    }

    /// Insert an extended item: a reference is stored in every cell the
    /// rectangle overlaps.
    pub fn insert_bounds(&mut self, bounds: Aabb2<N>, item: T) {
        let idx = self.alloc_slot(Entry {
            extent: Some(bounds),
            item,
        });
        if let Some(cells) = &mut self.cells {
            each_cell(bounds, self.cell_size, |key| {
                cells.entry(key).or_default().push(idx);
            });
        }
        self.len += 1;
        self.extent_count += 1;
        self.maybe_convert();
    }

    /// One-time, one-directional bulk conversion out of linear mode.
    fn maybe_convert(&mut self) {
        if self.cells.is_none() && self.len > self.spatial_threshold {
            self.cells = Some(self.group_cells());
        }
    }

    /// Group every live slot by the cells it occupies.
    fn group_cells(&self) -> HashMap<u64, Vec<usize>> {
        let mut cells: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = slot {
                match entry.extent {
                    None => {
                        let key = self.key_of((self.position)(&entry.item));
                        cells.entry(key).or_default().push(idx);
                    }
                    Some(extent) => each_cell(extent, self.cell_size, |key| {
                        cells.entry(key).or_default().push(idx);
                    }),
                }
            }
        }
        cells
    }

    /// Remove one point item equal to `item` from its cell.
    ///
    /// Returns `false` when no such item is stored. The cell entry is
    /// deleted outright once its bucket empties, so removed regions do not
    /// accumulate empty cells.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let matches = |entry: &Entry<N, T>| entry.extent.is_none() && entry.item == *item;
        match &mut self.cells {
            None => {
                let found = self
                    .slots
                    .iter()
                    .position(|slot| slot.as_ref().map_or(false, matches));
                match found {
                    Some(idx) => {
                        self.release_slot(idx);
                        true
                    }
                    None => false,
                }
            }
            Some(cells) => {
                let p = (self.position)(item);
                let key = pack(
                    cell_coord(p[0], self.cell_size),
                    cell_coord(p[1], self.cell_size),
                );
                let Some(bucket) = cells.get_mut(&key) else {
                    return false;
                };
                let found = bucket.iter().position(|&idx| {
                    self.slots[idx].as_ref().map_or(false, matches)
                });
                match found {
                    Some(pos) => {
                        let idx = bucket.swap_remove(pos);
                        if bucket.is_empty() {
                            cells.remove(&key);
                        }
                        self.release_slot(idx);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Remove one extended item inserted with exactly `bounds`.
    ///
    /// Every covered cell drops its reference; emptied cells are deleted.
    pub fn remove_bounds(&mut self, bounds: Aabb2<N>, item: &T) -> bool
    where
        T: PartialEq,
    {
        let found = self.slots.iter().position(|slot| {
            slot.as_ref()
                .map_or(false, |e| e.extent == Some(bounds) && e.item == *item)
        });
        let Some(idx) = found else {
            return false;
        };
        if let Some(cells) = &mut self.cells {
            let cell_size = self.cell_size;
            each_cell(bounds, cell_size, |key| {
                if let Some(bucket) = cells.get_mut(&key) {
                    if let Some(pos) = bucket.iter().position(|&i| i == idx) {
                        bucket.swap_remove(pos);
                        if bucket.is_empty() {
                            cells.remove(&key);
                        }
                    }
                }
            });
        }
        self.extent_count -= 1;
        self.release_slot(idx);
        true
    }

    fn release_slot(&mut self, idx: usize) {
        self.slots[idx] = None;
        self.free.push(idx);
        self.len -= 1;
    }

    /// Collect the items overlapping `region`: point items inside it
    /// (half-open), extended items whose rectangle intersects it. Each item
    /// is reported once.
    pub fn objects_in_rectangle(&self, region: Aabb2<N>) -> Vec<&T> {
        let mut out = Vec::new();
        self.objects_in_rectangle_with(region, |item| out.push(item));
        out
    }

    /// Like [`Self::objects_in_rectangle`], but clears and fills a
    /// caller-owned buffer.
    pub fn objects_in_rectangle_into<'a>(&'a self, region: Aabb2<N>, out: &mut Vec<&'a T>) {
        out.clear();
        self.objects_in_rectangle_with(region, |item| out.push(item));
    }

    /// Invoke `visit` for every item overlapping `region`.
    pub fn objects_in_rectangle_with<'a>(&'a self, region: Aabb2<N>, visit: impl FnMut(&'a T)) {
        self.visit_cells(region, visit, |entry| match entry.extent {
            None => region.contains((self.position)(&entry.item)),
            Some(extent) => region.intersects(&extent),
        });
    }

    /// Collect the items within `radius` of `center`; extended items match
    /// when their rectangle's closest point is within the radius.
    pub fn objects_in_radius(&self, center: [N; 2], radius: N) -> Vec<&T> {
        let mut out = Vec::new();
        self.objects_in_radius_with(center, radius, |item| out.push(item));
        out
    }

    /// Like [`Self::objects_in_radius`], but clears and fills a caller-owned
    /// buffer.
    pub fn objects_in_radius_into<'a>(&'a self, center: [N; 2], radius: N, out: &mut Vec<&'a T>) {
        out.clear();
        self.objects_in_radius_with(center, radius, |item| out.push(item));
    }

    /// Invoke `visit` for every item within `radius` of `center`.
    pub fn objects_in_radius_with<'a>(
        &'a self,
        center: [N; 2],
        radius: N,
        visit: impl FnMut(&'a T),
    ) {
        let covering = Aabb2::new(
            center[0] - radius,
            center[1] - radius,
            center[0] + radius,
            center[1] + radius,
        );
        let r2 = radius * radius;
        self.visit_cells(covering, visit, |entry| match entry.extent {
            None => sq_dist2((self.position)(&entry.item), center) <= r2,
            Some(extent) => extent.sq_dist(center) <= r2,
        });
    }

    /// Iterate the covering cells of `region` (or every slot in linear
    /// mode), applying the exact geometric `filter` and deduplicating
    /// multi-cell entries.
    fn visit_cells<'a>(
        &'a self,
        region: Aabb2<N>,
        mut visit: impl FnMut(&'a T),
        filter: impl Fn(&Entry<N, T>) -> bool,
    ) {
        match &self.cells {
            None => {
                for slot in &self.slots {
                    if let Some(entry) = slot {
                        if filter(entry) {
                            visit(&entry.item);
                        }
                    }
                }
            }
            Some(cells) => {
                // Point entries occupy exactly one cell; the seen set is
                // only needed while extended entries exist.
                let mut seen: HashSet<usize> = HashSet::new();
                let dedup = self.extent_count > 0;
                each_cell(region, self.cell_size, |key| {
                    if let Some(bucket) = cells.get(&key) {
                        for &idx in bucket {
                            if dedup && !seen.insert(idx) {
                                continue;
                            }
                            if let Some(entry) = &self.slots[idx] {
                                if filter(entry) {
                                    visit(&entry.item);
                                }
                            }
                        }
                    }
                });
            }
        }
    }

    /// Every pairwise combination of items sharing a cell, as collision
    /// candidates. Exact resolution is the caller's responsibility, and a
    /// pair of extended items sharing several cells appears once per shared
    /// cell.
    pub fn potential_collisions(&self) -> Vec<(&T, &T)> {
        let mut out = Vec::new();
        match &self.cells {
            Some(cells) => self.pair_buckets(cells.values(), &mut out),
            None => {
                let cells = self.group_cells();
                self.pair_buckets(cells.values(), &mut out);
            }
        }
        out
    }

    fn pair_buckets<'a, 'b>(
        &'a self,
        buckets: impl Iterator<Item = &'b Vec<usize>>,
        out: &mut Vec<(&'a T, &'a T)>,
    ) {
        for bucket in buckets {
            for i in 0..bucket.len() {
                for j in i + 1..bucket.len() {
                    if let (Some(a), Some(b)) = (&self.slots[bucket[i]], &self.slots[bucket[j]]) {
                        out.push((&a.item, &b.item));
                    }
                }
            }
        }
    }

    /// Population statistics over the populated cells, via a full scan.
    pub fn cell_stats(&self) -> GridStats {
        let counts: Vec<usize> = match &self.cells {
            Some(cells) => cells.values().map(Vec::len).collect(),
            None => self.group_cells().values().map(Vec::len).collect(),
        };
        stats_of(counts)
    }

    /// Drop every item and return to the initial (linear, unless the
    /// threshold is zero) empty state.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.cells = (self.spatial_threshold == 0).then(HashMap::new);
        self.len = 0;
        self.extent_count = 0;
    }
}

fn stats_of(mut counts: Vec<usize>) -> GridStats {
    if counts.is_empty() {
        return GridStats {
            populated_cells: 0,
            mean: 0.0,
            max: 0,
            median: 0.0,
        };
    }
    counts.sort_unstable();
    let cells = counts.len();
    let total: usize = counts.iter().sum();
    let median = if cells % 2 == 1 {
        counts[cells / 2] as f64
    } else {
        (counts[cells / 2 - 1] + counts[cells / 2]) as f64 / 2.0
    };
    GridStats {
        populated_cells: cells,
        mean: total as f64 / cells as f64,
        max: counts[cells - 1],
        median,
    }
}
