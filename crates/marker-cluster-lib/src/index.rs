//! Static k-d tree spatial index for rectangle and radius queries
//!
//! The tree is bulk loaded once per point set: entries live in one flat array
//! that is recursively partitioned around the median on alternating axes
//! (latitude first). Queries walk the implicit tree with an explicit stack and
//! never allocate nodes. The index stores only coordinates and ordinals, so it is
//! independent of the point payload type and can be shared between threads.

use crate::{Boundary, PointSet};
use rayon::prelude::*;
use smallvec::SmallVec;

/// Default maximum number of entries in a leaf
pub const DEFAULT_NODE_SIZE: usize = 64;

/// Partitions smaller than this are sorted on the current thread
const PARALLEL_SORT_THRESHOLD: usize = 16_384;

/// Axis 0 is latitude, axis 1 is longitude
const LAT: usize = 0;

/// One indexed point: its ordinal in the point set and its `[lat, lng]`
#[derive(Debug, Clone, Copy)]
struct Entry {
    ordinal: usize,
    coord: [f64; 2],
}

/// Pending subtree on the query stack: inclusive `[left, right]` range and split axis
type Frame = (usize, usize, usize);

/// Immutable spatial index over the ordinals of a [`PointSet`]
///
/// Both queries return ordinals in ascending order, so callers iterate points
/// in point-set order regardless of the tree layout.
#[derive(Debug, Clone)]
pub struct PointIndex {
    /// Entries in k-d order
    entries: Vec<Entry>,
    /// Maximum leaf size used when partitioning
    node_size: usize,
    /// Version of the point set this index was built from
    version: u64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PointIndex {
    /// Build an index over all points of the set
    ///
    /// # Arguments
    /// * `points` - The point set to index; ordinals refer to its order
    /// * `node_size` - Maximum leaf size (clamped to at least 1)
    pub fn build<M: Sync>(points: &PointSet<M>, node_size: usize) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");

        let node_size = node_size.max(1);

        let mut entries: Vec<Entry> = points
            .points()
            .par_iter()
            .enumerate()
            .map(|(ordinal, point)| Entry {
                ordinal,
                coord: [point.location.lat, point.location.lng],
            })
            .collect();

        sort_kd(&mut entries, node_size, LAT);

        tracing::debug!(
            points = entries.len(),
            node_size,
            version = points.version(),
            "Built point index"
        );

        Self {
            entries,
            node_size,
            version: points.version(),
        }
    }

    /// Number of indexed points
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Version of the point set the index was built from
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// All ordinals whose point lies inside the closed rectangle, ascending
    pub fn range_rectangle(&self, boundary: &Boundary) -> Vec<usize> {
        let min = [boundary.min_lat(), boundary.min_lng()];
        let max = [boundary.max_lat(), boundary.max_lng()];
        let inside = |c: &[f64; 2]| c[0] >= min[0] && c[0] <= max[0] && c[1] >= min[1] && c[1] <= max[1];

        let mut results = Vec::new();
        self.walk(
            |frame_axis, c| (min[frame_axis] <= c[frame_axis], max[frame_axis] >= c[frame_axis]),
            |entry| {
                if inside(&entry.coord) {
                    results.push(entry.ordinal);
                }
            },
        );

        results.sort_unstable();
        results
    }

    /// All ordinals within planar Euclidean distance `radius` of `(lat, lng)`, ascending
    ///
    /// Distance is measured on raw degree coordinates. A negative or NaN radius
    /// matches nothing; a zero radius matches only coincident points.
    pub fn range_radius(&self, lat: f64, lng: f64, radius: f64) -> Vec<usize> {
        // Negated so NaN falls through to the empty result
        if !(radius >= 0.0) {
            return Vec::new();
        }

        let center = [lat, lng];
        let radius_sq = radius * radius;

        let mut results = Vec::new();
        self.walk(
            |axis, c| (center[axis] - radius <= c[axis], center[axis] + radius >= c[axis]),
            |entry| {
                if squared_distance(&entry.coord, &center) <= radius_sq {
                    results.push(entry.ordinal);
                }
            },
        );

        results.sort_unstable();
        results
    }

    /// Depth-first traversal of the implicit tree
    ///
    /// `descend(axis, split)` tells whether the lower and upper halves around a
    /// split coordinate can contain matches; `visit` is called for every entry
    /// that is reached (leaf members and split points).
    fn walk<D, V>(&self, descend: D, mut visit: V)
    where
        D: Fn(usize, &[f64; 2]) -> (bool, bool),
        V: FnMut(&Entry),
    {
        if self.entries.is_empty() {
            return;
        }

        let mut stack: SmallVec<[Frame; 64]> = SmallVec::new();
        stack.push((0, self.entries.len() - 1, LAT));

        while let Some((left, right, axis)) = stack.pop() {
            // Leaf: scan linearly
            if right - left <= self.node_size {
                self.entries[left..=right].iter().for_each(&mut visit);
                continue;
            }

            let mid = left + (right - left) / 2;
            let split = &self.entries[mid];
            visit(split);

            let (go_lower, go_upper) = descend(axis, &split.coord);
            let next_axis = 1 - axis;
            if go_lower {
                stack.push((left, mid - 1, next_axis));
            }
            if go_upper {
                stack.push((mid + 1, right, next_axis));
            }
        }
    }
}

/// Recursively partition entries so every subtree's median sits in its middle slot
///
/// Mirrors the traversal in [`PointIndex::walk`]: a range of `len` entries is a
/// leaf when `len - 1 <= node_size`, otherwise its split is at `(len - 1) / 2`.
fn sort_kd(entries: &mut [Entry], node_size: usize, axis: usize) {
    let len = entries.len();
    if len == 0 || len - 1 <= node_size {
        return;
    }

    let mid = (len - 1) / 2;
    entries.select_nth_unstable_by(mid, |a, b| a.coord[axis].total_cmp(&b.coord[axis]));

    let (lower, rest) = entries.split_at_mut(mid);
    let upper = &mut rest[1..];
    let next_axis = 1 - axis;

    if len >= PARALLEL_SORT_THRESHOLD {
        rayon::join(
            || sort_kd(lower, node_size, next_axis),
            || sort_kd(upper, node_size, next_axis),
        );
    } else {
        sort_kd(lower, node_size, next_axis);
        sort_kd(upper, node_size, next_axis);
    }
}

#[inline(always)]
fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let d_lat = a[0] - b[0];
    let d_lng = a[1] - b[1];
    d_lat * d_lat + d_lng * d_lng
}
