//! Greedy viewport clustering
//!
//! Clustering is a single pass over the in-bounds points in ascending ordinal
//! order. Each point not yet claimed seeds a marker and claims every unclaimed
//! point within the cluster radius, including points just outside the viewport.
//! The result depends on the visiting order; that order is fixed (point-set
//! order) so the output is reproducible.

use crate::{Boundary, LatLng, Point, PointIndex, PointSet};
use geo::{Centroid, MultiPoint};
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A synthetic marker standing in for several nearby points
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Cluster<M = ()> {
    /// `"{lat}-{lng}-{first member id}"` of the centroid
    pub id: String,
    /// Arithmetic mean of member coordinates
    pub location: LatLng,
    /// Members in ascending ordinal order
    pub members: Vec<Point<M>>,
}

impl<M> Cluster<M> {
    /// Build a cluster from its members
    ///
    /// The id is derived from the centroid and the first member so that an
    /// identical cluster gets an identical id across recomputations.
    pub fn from_members(members: Vec<Point<M>>) -> Self {
        debug_assert!(!members.is_empty(), "cluster without members");

        let multi: MultiPoint<f64> = members
            .iter()
            .map(|p| geo::Point::from(geo::Coord::from(p.location)))
            .collect();
        let location = multi
            .centroid()
            .map(|c| LatLng::from(c.0))
            .unwrap_or_default();

        let first_id = members.first().map(|p| p.id.as_str()).unwrap_or_default();
        let id = format!("{}-{}-{}", location.lat, location.lng, first_id);

        Self {
            id,
            location,
            members,
        }
    }
}

/// A marker the map should draw
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum VisibleMarker<M = ()> {
    /// A point with no unclaimed neighbor, drawn as itself
    Singleton(Point<M>),
    Cluster(Cluster<M>),
}

impl<M> VisibleMarker<M> {
    pub fn id(&self) -> &str {
        match self {
            Self::Singleton(point) => &point.id,
            Self::Cluster(cluster) => &cluster.id,
        }
    }

    pub fn location(&self) -> LatLng {
        match self {
            Self::Singleton(point) => point.location,
            Self::Cluster(cluster) => cluster.location,
        }
    }

    #[inline]
    pub fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster(_))
    }

    /// The points this marker represents
    pub fn members(&self) -> &[Point<M>] {
        match self {
            Self::Singleton(point) => std::slice::from_ref(point),
            Self::Cluster(cluster) => &cluster.members,
        }
    }

    /// Number of points represented
    pub fn len(&self) -> usize {
        self.members().len()
    }
}

/// Convert a pixel radius into degrees for the given viewport
///
/// The visible longitude span is treated as uniformly scaled across the pixel
/// width and the same scale is applied to latitude. This is only accurate near
/// the equator and for narrow viewports.
#[inline]
pub fn marker_radius(radius_in_pixels: f64, map_pixel_width: u32, boundary: &Boundary) -> f64 {
    radius_in_pixels / f64::from(map_pixel_width) * boundary.lng_span()
}

/// Counters describing one clustering pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClusterStats {
    /// Points inside the boundary
    pub in_bounds: usize,
    /// Markers emitted
    pub markers: usize,
    /// Markers that are clusters
    pub clusters: usize,
    /// Members of the largest cluster
    pub largest_cluster: usize,
    /// Points outside the boundary claimed by an in-bounds seed
    pub claimed_outside: usize,
    /// Degree radius used for neighbor queries
    pub radius_degrees: f64,
}

/// Memoization key: the four inputs a clustering result depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterKey {
    pub index_version: u64,
    pub boundary: Option<Boundary>,
    pub map_pixel_width: u32,
    pub radius_in_pixels: f64,
}

/// Computes visible markers and remembers the last result
///
/// Inputs are compared by value; when none changed since the previous call the
/// previous `Arc` is returned without recomputation.
#[derive(Debug)]
pub struct ClusterEngine<M = ()> {
    last: Option<(ClusterKey, Arc<[VisibleMarker<M>]>)>,
    last_stats: ClusterStats,
}

impl<M> Default for ClusterEngine<M> {
    fn default() -> Self {
        Self {
            last: None,
            last_stats: ClusterStats::default(),
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<M: Clone> ClusterEngine<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible markers for the given viewport
    ///
    /// # Arguments
    /// * `points` - The point set `index` was built from; any other set yields no markers
    /// * `index` - Spatial index over `points`
    /// * `boundary` - Current viewport, `None` before the first one is known
    /// * `map_pixel_width` - Width of the map in pixels; zero yields no markers
    /// * `radius_in_pixels` - Merge distance on screen
    pub fn compute(
        &mut self,
        points: &PointSet<M>,
        index: &PointIndex,
        boundary: Option<Boundary>,
        map_pixel_width: u32,
        radius_in_pixels: f64,
    ) -> Arc<[VisibleMarker<M>]> {
        if points.version() != index.version() || points.len() != index.len() {
            tracing::warn!(
                points_version = points.version(),
                index_version = index.version(),
                "Index was not built from this point set, no markers computed"
            );
            self.last = None;
            self.last_stats = ClusterStats::default();
            return Arc::from(Vec::new());
        }

        let key = ClusterKey {
            index_version: index.version(),
            boundary,
            map_pixel_width,
            radius_in_pixels,
        };

        if let Some((last_key, markers)) = &self.last {
            if *last_key == key {
                tracing::trace!("Cluster inputs unchanged, reusing markers");
                return markers.clone();
            }
        }

        let (markers, stats) = match boundary {
            Some(boundary) if map_pixel_width > 0 => {
                cluster_markers(points, index, &boundary, map_pixel_width, radius_in_pixels)
            }
            _ => (Vec::new(), ClusterStats::default()),
        };

        tracing::debug!(
            in_bounds = stats.in_bounds,
            markers = stats.markers,
            clusters = stats.clusters,
            largest_cluster = stats.largest_cluster,
            claimed_outside = stats.claimed_outside,
            radius_degrees = stats.radius_degrees,
            "Clustered visible markers"
        );

        let markers: Arc<[VisibleMarker<M>]> = markers.into();
        self.last = Some((key, markers.clone()));
        self.last_stats = stats;
        markers
    }

    /// Key of the last computed result
    pub fn last_key(&self) -> Option<ClusterKey> {
        self.last.as_ref().map(|(key, _)| *key)
    }

    /// Statistics of the last computed result
    pub fn last_stats(&self) -> ClusterStats {
        self.last_stats
    }

    /// Forget the memoized result so the next call recomputes
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

/// One greedy clustering pass, without memoization
fn cluster_markers<M: Clone>(
    points: &PointSet<M>,
    index: &PointIndex,
    boundary: &Boundary,
    map_pixel_width: u32,
    radius_in_pixels: f64,
) -> (Vec<VisibleMarker<M>>, ClusterStats) {
    #[cfg(feature = "profiling")]
    profiling::scope!("cluster::cluster_markers");

    let in_bounds = index.range_rectangle(boundary);
    let radius = marker_radius(radius_in_pixels, map_pixel_width, boundary);

    let mut stats = ClusterStats {
        in_bounds: in_bounds.len(),
        radius_degrees: radius,
        ..ClusterStats::default()
    };

    // Ids are unique within a point set, so ordinals identify processed points
    let mut processed: HashSet<usize> = HashSet::with_capacity(in_bounds.len());
    let mut markers = Vec::new();

    for &seed in &in_bounds {
        if processed.contains(&seed) {
            continue;
        }
        let Some(seed_point) = points.get(seed) else {
            continue;
        };

        let mut claimed: Vec<usize> = index
            .range_radius(seed_point.lat(), seed_point.lng(), radius)
            .into_iter()
            .filter(|i| !processed.contains(i))
            .collect();
        // A non-finite radius finds no neighbors; the seed still claims itself
        if claimed.is_empty() {
            claimed.push(seed);
        }

        processed.extend(claimed.iter().copied());
        processed.insert(seed);

        let members: Vec<Point<M>> = claimed
            .iter()
            .filter_map(|&i| points.get(i).cloned())
            .collect();
        stats.claimed_outside += members
            .iter()
            .filter(|p| !boundary.contains(p.location))
            .count();

        let marker = if members.len() == 1 {
            VisibleMarker::Singleton(members.into_iter().next().unwrap_or_else(|| seed_point.clone()))
        } else {
            stats.clusters += 1;
            stats.largest_cluster = stats.largest_cluster.max(members.len());
            VisibleMarker::Cluster(Cluster::from_members(members))
        };
        markers.push(marker);
    }

    stats.markers = markers.len();
    (markers, stats)
}
