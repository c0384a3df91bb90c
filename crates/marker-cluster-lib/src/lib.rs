//! Marker Cluster Library - Viewport clustering for large marker sets
//!
//! This library decides which markers a map should draw for the current viewport.
//! Nearby points are merged into synthetic cluster markers so the number of drawn
//! markers stays bounded no matter how many points are loaded.
//!
//! # Architecture
//!
//! - **[`PointSet`]**: Immutable, versioned input points
//! - **[`PointIndex`]**: Static k-d tree answering rectangle and radius queries
//! - **[`ViewportTracker`]**: Debounces raw viewport events into revisioned boundaries
//! - **[`ClusterEngine`]**: Greedy single-pass clustering with memoization
//! - **[`MarkerLayer`]**: High-level manager wiring the pieces together
//!
//! # Performance Characteristics
//!
//! - **Build Time**: O(N log N), bulk loaded, parallel across subtrees
//! - **Query Time**: O(√N + K) per rectangle or radius query, K = results
//! - **Clustering**: one radius query per emitted marker
//!
//! # Example
//!
//! ```
//! use marker_cluster_lib::{Config, LatLng, MarkerLayer, Point, PointSet, ViewportEvent, ViewportSize};
//! use std::time::{Duration, Instant};
//!
//! # fn main() -> marker_cluster_lib::Result<()> {
//! let points = PointSet::new(vec![
//!     Point::new("a", 0.0, 0.0),
//!     Point::new("b", 0.0, 0.0001),
//!     Point::new("c", 10.0, 10.0),
//! ])?;
//!
//! let mut layer = MarkerLayer::new(Config::default());
//! layer.set_points(points);
//!
//! let now = Instant::now();
//! layer.on_viewport_changed(
//!     &ViewportEvent::new(LatLng::new(-1.0, -1.0), LatLng::new(1.0, 1.0), ViewportSize::new(1000, 700)),
//!     now,
//! );
//! layer.poll(now + Duration::from_millis(1000));
//!
//! assert_eq!(layer.visible_markers().len(), 1);
//! # Ok(())
//! # }
//! ```

mod boundary;
mod cluster;
mod index;
mod layer;
mod point;
mod tracker;

// Public API exports
pub use boundary::{Boundary, ViewportEvent, ViewportSize};
pub use cluster::{Cluster, ClusterEngine, ClusterKey, ClusterStats, VisibleMarker, marker_radius};
pub use index::{DEFAULT_NODE_SIZE, PointIndex};
pub use layer::{Config, LayerInfo, MarkerLayer, MarkerListener};
pub use point::{LatLng, Point, PointSet};
pub use tracker::{Publication, REVISION_MODULUS, Revision, ViewportState, ViewportTracker};

/// Error types for the clustering core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterError {
    #[error("Invalid boundary: min {min} > max {max} on {axis} axis")]
    InvalidBoundary {
        axis: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Duplicate point id: {id}")]
    DuplicateId { id: String },

    #[error("Non-finite coordinate for point {id}")]
    NonFiniteCoordinate { id: String },
}

pub type Result<T> = std::result::Result<T, ClusterError>;
