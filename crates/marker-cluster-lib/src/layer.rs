//! MarkerLayer - Top-level manager for points, index, viewport and clustering
//!
//! This module provides the high-level API a map integration talks to: replace
//! the point set, forward viewport/draw/drag notifications, and read back the
//! markers to render. Listeners can subscribe to boundary and marker changes
//! instead of polling.

use crate::{
    ClusterEngine, DEFAULT_NODE_SIZE, PointIndex, PointSet, ViewportEvent, ViewportState,
    ViewportTracker, VisibleMarker,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the marker layer
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// On-screen distance below which markers merge into a cluster.
    /// Default: 100 pixels
    pub radius_in_pixels: f64,
    /// Quiet time required before a viewport change is published.
    /// Default: 1000 ms
    pub debounce: Duration,
    /// Maximum leaf size of the spatial index.
    /// Default: 64
    pub node_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radius_in_pixels: 100.0,
            debounce: Duration::from_millis(1000),
            node_size: DEFAULT_NODE_SIZE,
        }
    }
}

/// Observer for layer changes
///
/// Both callbacks default to doing nothing.
pub trait MarkerListener<M> {
    /// Called once per published boundary revision
    fn on_bounds_change(&mut self, _state: &ViewportState) {}

    /// Called whenever a recomputation produced a new marker list
    fn on_visible_markers_change(&mut self, _markers: &[VisibleMarker<M>]) {}
}

/// Information about the layer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerInfo {
    /// Number of loaded points
    pub point_count: usize,
    /// Version of the point set the index was built from
    pub index_version: u64,
    /// Number of markers currently visible
    pub visible_count: usize,
    /// Current boundary revision
    pub revision: u64,
}

/// Top-level manager for a clustered marker layer
pub struct MarkerLayer<M = ()> {
    config: Config,
    points: PointSet<M>,
    /// Always built from `points`; the two are replaced together
    index: Arc<PointIndex>,
    tracker: ViewportTracker,
    engine: ClusterEngine<M>,
    visible: Arc<[VisibleMarker<M>]>,
    listeners: Vec<Box<dyn MarkerListener<M>>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<M: Clone + Send + Sync> MarkerLayer<M> {
    /// Create an empty layer with the given configuration
    pub fn new(config: Config) -> Self {
        let points = PointSet::empty();
        let index = Arc::new(PointIndex::build(&points, config.node_size));
        Self {
            tracker: ViewportTracker::new(config.debounce),
            config,
            points,
            index,
            engine: ClusterEngine::new(),
            visible: Arc::from(Vec::new()),
            listeners: Vec::new(),
        }
    }

    /// Replace the point set
    ///
    /// The index is rebuilt only if the version differs from the current one.
    /// Returns whether a rebuild happened.
    pub fn set_points(&mut self, points: PointSet<M>) -> bool {
        if points.version() == self.points.version() {
            tracing::trace!(version = points.version(), "Point set unchanged, keeping index");
            return false;
        }

        // Build first, then swap both so no query sees a mismatched pair
        let index = Arc::new(PointIndex::build(&points, self.config.node_size));
        tracing::debug!(
            points = points.len(),
            version = points.version(),
            "Replaced point set"
        );
        self.points = points;
        self.index = index;

        self.refresh();
        true
    }

    /// Forward a raw viewport-change event from the map
    ///
    /// Returns `true` if a publication was scheduled.
    pub fn on_viewport_changed(&mut self, event: &ViewportEvent, now: Instant) -> bool {
        let scheduled = self.tracker.on_viewport_changed(event, now);
        self.poll(now);
        scheduled
    }

    /// Forward a render pass of the map overlay
    pub fn on_draw(&mut self, now: Instant) {
        self.tracker.on_draw(now);
        self.poll(now);
    }

    pub fn on_drag_start(&mut self) {
        self.tracker.on_drag_start();
    }

    /// End of a drag; draws held back during the drag become due
    pub fn on_drag_end(&mut self, now: Instant) {
        self.tracker.on_drag_end();
        self.poll(now);
    }

    /// Publish due viewport updates and recompute markers if needed
    ///
    /// Returns the new viewport state if something was published.
    pub fn poll(&mut self, now: Instant) -> Option<ViewportState> {
        let publication = self.tracker.poll(now);

        if let Some(publication) = &publication {
            if publication.boundary_changed {
                for listener in self.listeners.iter_mut() {
                    listener.on_bounds_change(&publication.state);
                }
            }
        }

        self.refresh();
        publication.map(|p| p.state)
    }

    /// Earliest instant at which [`MarkerLayer::poll`] has work to do
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracker.next_deadline()
    }

    /// Change the cluster radius at runtime
    pub fn set_radius_in_pixels(&mut self, radius_in_pixels: f64) {
        self.config.radius_in_pixels = radius_in_pixels;
        self.refresh();
    }

    /// Register a change listener
    pub fn add_listener(&mut self, listener: Box<dyn MarkerListener<M>>) {
        self.listeners.push(listener);
    }

    /// Markers to render for the published viewport
    #[inline]
    pub fn visible_markers(&self) -> Arc<[VisibleMarker<M>]> {
        self.visible.clone()
    }

    /// Snapshot of the published viewport
    #[inline]
    pub fn viewport_state(&self) -> ViewportState {
        self.tracker.current_state()
    }

    /// Shared handle to the current index
    #[inline]
    pub fn index(&self) -> Arc<PointIndex> {
        self.index.clone()
    }

    #[inline]
    pub fn points(&self) -> &PointSet<M> {
        &self.points
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get layer information
    pub fn info(&self) -> LayerInfo {
        LayerInfo {
            point_count: self.points.len(),
            index_version: self.index.version(),
            visible_count: self.visible.len(),
            revision: self.tracker.current_state().revision.get(),
        }
    }

    /// Run the engine against the published state; memoized on its inputs
    fn refresh(&mut self) {
        let state = self.tracker.current_state();
        let markers = self.engine.compute(
            &self.points,
            &self.index,
            state.boundary,
            state.size.width,
            self.config.radius_in_pixels,
        );

        if Arc::ptr_eq(&markers, &self.visible) {
            return;
        }

        self.visible = markers;
        for listener in self.listeners.iter_mut() {
            listener.on_visible_markers_change(&self.visible);
        }
    }
}
