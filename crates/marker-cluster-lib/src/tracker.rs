//! Debounced viewport tracking
//!
//! Map widgets report viewport changes continuously while the user drags or
//! zooms. The tracker reduces that stream to a published boundary plus a
//! revision counter that only moves once the viewport has been quiet for the
//! debounce window. Time is always passed in by the caller, so the tracker is a
//! plain state machine: feed it events, then call [`ViewportTracker::poll`] when
//! [`ViewportTracker::next_deadline`] has passed.

use crate::{Boundary, ViewportEvent, ViewportSize};
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Revisions wrap at the largest integer an IEEE double represents exactly
pub const REVISION_MODULUS: u64 = (1 << 53) - 1;

/// Change counter for published viewport state
///
/// Only equality is meaningful; the counter wraps at [`REVISION_MODULUS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Revision(u64);

impl Revision {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn next(self) -> Self {
        Self((self.0 + 1) % REVISION_MODULUS)
    }
}

/// Snapshot of the published viewport
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewportState {
    /// `None` until the first viewport is published
    pub boundary: Option<Boundary>,
    pub size: ViewportSize,
    /// Bumped on every published boundary change
    pub revision: Revision,
    /// Bumped on every accepted draw pass
    pub draw_revision: Revision,
}

/// What a call to [`ViewportTracker::poll`] published
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Publication {
    pub state: ViewportState,
    /// A new boundary was published and `revision` moved
    pub boundary_changed: bool,
    /// A draw pass was accepted and `draw_revision` moved
    pub drawn: bool,
}

/// The last viewport reported by the map, published or not
#[derive(Debug, Clone, Copy)]
struct Observed {
    boundary: Boundary,
    size: ViewportSize,
}

/// A boundary waiting for the debounce window to close
#[derive(Debug, Clone, Copy)]
struct PendingBoundary {
    observed: Observed,
    deadline: Instant,
}

/// Debounces raw viewport events into a revisioned boundary
#[derive(Debug, Clone)]
pub struct ViewportTracker {
    debounce: Duration,
    /// Currently published state
    state: ViewportState,
    /// Most recent viewport reported by the map
    latest: Option<Observed>,
    pending_boundary: Option<PendingBoundary>,
    pending_draw: Option<Instant>,
    dragging: bool,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ViewportTracker {
    /// Create a tracker with the given quiescence window
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            state: ViewportState::default(),
            latest: None,
            pending_boundary: None,
            pending_draw: None,
            dragging: false,
        }
    }

    /// Ingest a raw viewport-change event
    ///
    /// Returns `true` if a publication was scheduled. An event whose boundary
    /// equals the published one is dropped, and any pending boundary is
    /// cancelled because the map is back at the published state.
    pub fn on_viewport_changed(&mut self, event: &ViewportEvent, now: Instant) -> bool {
        if !event.is_finite() {
            tracing::warn!(?event, "Ignoring viewport event with non-finite corners");
            return false;
        }

        let observed = Observed {
            boundary: event.boundary(),
            size: event.size,
        };
        self.latest = Some(observed);

        if self.state.boundary == Some(observed.boundary) {
            if self.pending_boundary.take().is_some() {
                tracing::trace!("Viewport returned to published boundary, pending update dropped");
            }
            self.state.size = observed.size;
            return false;
        }

        // Restart the window; the superseded boundary is never published
        self.pending_boundary = Some(PendingBoundary {
            observed,
            deadline: now + self.debounce,
        });
        true
    }

    /// Request a boundary refresh for an external render pass
    ///
    /// Draw requests are debounced with the same window as viewport events but
    /// counted separately in `draw_revision`.
    pub fn on_draw(&mut self, now: Instant) {
        self.pending_draw = Some(now + self.debounce);
    }

    /// Hold back draw publications until [`ViewportTracker::on_drag_end`]
    pub fn on_drag_start(&mut self) {
        self.dragging = true;
    }

    pub fn on_drag_end(&mut self) {
        self.dragging = false;
    }

    #[inline]
    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Whether any publication is scheduled
    pub fn has_pending(&self) -> bool {
        self.pending_boundary.is_some() || self.pending_draw.is_some()
    }

    /// Earliest instant at which [`ViewportTracker::poll`] can publish something
    ///
    /// Draw deadlines are ignored while a drag is in progress.
    pub fn next_deadline(&self) -> Option<Instant> {
        let boundary = self.pending_boundary.map(|p| p.deadline);
        let draw = self.pending_draw.filter(|_| !self.dragging);
        match (boundary, draw) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Publish whatever is due at `now`
    pub fn poll(&mut self, now: Instant) -> Option<Publication> {
        let mut boundary_changed = false;
        let mut drawn = false;

        if let Some(pending) = self.pending_boundary {
            if pending.deadline <= now {
                self.pending_boundary = None;
                self.publish(pending.observed);
                boundary_changed = true;
            }
        }

        if let Some(deadline) = self.pending_draw {
            if deadline <= now && !self.dragging {
                self.pending_draw = None;
                self.state.draw_revision = self.state.draw_revision.next();
                drawn = true;

                if let Some(latest) = self.latest {
                    if self.state.boundary == Some(latest.boundary) {
                        self.state.size = latest.size;
                    } else {
                        // The draw catches up with the map; the event timer is moot
                        self.pending_boundary = None;
                        self.publish(latest);
                        boundary_changed = true;
                    }
                }
            }
        }

        (boundary_changed || drawn).then(|| Publication {
            state: self.state,
            boundary_changed,
            drawn,
        })
    }

    /// Snapshot of the published state
    #[inline]
    pub fn current_state(&self) -> ViewportState {
        self.state
    }

    #[inline]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn publish(&mut self, observed: Observed) {
        self.state.boundary = Some(observed.boundary);
        self.state.size = observed.size;
        self.state.revision = self.state.revision.next();

        tracing::debug!(
            revision = self.state.revision.get(),
            boundary = ?observed.boundary.to_array(),
            width = observed.size.width,
            height = observed.size.height,
            "Published viewport"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LatLng;

    const WINDOW: Duration = Duration::from_millis(1000);

    fn event(min: f64, max: f64) -> ViewportEvent {
        ViewportEvent::new(
            LatLng::new(max, max),
            LatLng::new(min, min),
            ViewportSize::new(1000, 800),
        )
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_revision_wraps() {
        let last = Revision(REVISION_MODULUS - 1);
        assert_eq!(last.next(), Revision::ZERO);
        assert_eq!(Revision::ZERO.next().get(), 1);
    }

    #[test]
    fn test_initial_state() {
        let tracker = ViewportTracker::new(WINDOW);
        let state = tracker.current_state();
        assert!(state.boundary.is_none());
        assert_eq!(state.revision, Revision::ZERO);
        assert!(tracker.next_deadline().is_none());
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_publishes_after_quiet_window() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        assert!(tracker.on_viewport_changed(&event(-1.0, 1.0), start));
        assert_eq!(tracker.next_deadline(), Some(start + WINDOW));

        // Not yet due
        assert!(tracker.poll(start + ms(999)).is_none());
        assert!(tracker.current_state().boundary.is_none());

        let publication = tracker.poll(start + WINDOW).unwrap();
        assert!(publication.boundary_changed);
        assert!(!publication.drawn);
        assert_eq!(publication.state.revision.get(), 1);
        assert_eq!(
            publication.state.boundary,
            Some(Boundary::new(-1.0, -1.0, 1.0, 1.0).unwrap())
        );
        assert_eq!(publication.state.size, ViewportSize::new(1000, 800));
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_debounce_coalesces_to_last_event() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_viewport_changed(&event(-1.0, 1.0), start);
        tracker.on_viewport_changed(&event(-2.0, 2.0), start + ms(300));
        tracker.on_viewport_changed(&event(-3.0, 3.0), start + ms(600));

        // The window restarted with every event
        assert!(tracker.poll(start + ms(1200)).is_none());

        let publication = tracker.poll(start + ms(1600)).unwrap();
        assert_eq!(publication.state.revision.get(), 1);
        assert_eq!(
            publication.state.boundary,
            Some(Boundary::new(-3.0, -3.0, 3.0, 3.0).unwrap())
        );

        // Nothing else is left to publish
        assert!(tracker.poll(start + ms(5000)).is_none());
        assert_eq!(tracker.current_state().revision.get(), 1);
    }

    #[test]
    fn test_equal_boundary_is_suppressed() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_viewport_changed(&event(-1.0, 1.0), start);
        tracker.poll(start + WINDOW).unwrap();

        // Same rectangle with swapped corners is structurally equal
        let swapped = ViewportEvent::new(
            LatLng::new(-1.0, -1.0),
            LatLng::new(1.0, 1.0),
            ViewportSize::new(1000, 800),
        );
        assert!(!tracker.on_viewport_changed(&swapped, start + ms(1500)));
        assert!(tracker.poll(start + ms(5000)).is_none());
        assert_eq!(tracker.current_state().revision.get(), 1);
    }

    #[test]
    fn test_return_to_published_cancels_pending() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_viewport_changed(&event(-1.0, 1.0), start);
        tracker.poll(start + WINDOW).unwrap();

        // Wander off and come back within one window
        assert!(tracker.on_viewport_changed(&event(-2.0, 2.0), start + ms(1100)));
        assert!(!tracker.on_viewport_changed(&event(-1.0, 1.0), start + ms(1200)));

        assert!(tracker.next_deadline().is_none());
        assert!(tracker.poll(start + ms(5000)).is_none());
        assert_eq!(
            tracker.current_state().boundary,
            Some(Boundary::new(-1.0, -1.0, 1.0, 1.0).unwrap())
        );
    }

    #[test]
    fn test_size_change_on_same_boundary() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_viewport_changed(&event(-1.0, 1.0), start);
        tracker.poll(start + WINDOW).unwrap();

        let resized = ViewportEvent::new(
            LatLng::new(1.0, 1.0),
            LatLng::new(-1.0, -1.0),
            ViewportSize::new(500, 400),
        );
        assert!(!tracker.on_viewport_changed(&resized, start + ms(1500)));
        let state = tracker.current_state();
        assert_eq!(state.size, ViewportSize::new(500, 400));
        assert_eq!(state.revision.get(), 1);
    }

    #[test]
    fn test_non_finite_event_ignored() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let bad = ViewportEvent::new(
            LatLng::new(f64::NAN, 0.0),
            LatLng::new(1.0, 1.0),
            ViewportSize::new(1000, 800),
        );
        assert!(!tracker.on_viewport_changed(&bad, Instant::now()));
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_draw_has_independent_counter() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_viewport_changed(&event(-1.0, 1.0), start);
        tracker.poll(start + WINDOW).unwrap();

        // A suppressed event does not stop the draw source
        tracker.on_viewport_changed(&event(-1.0, 1.0), start + ms(1100));
        tracker.on_draw(start + ms(1100));

        let publication = tracker.poll(start + ms(2100)).unwrap();
        assert!(publication.drawn);
        assert!(!publication.boundary_changed);
        assert_eq!(publication.state.draw_revision.get(), 1);
        assert_eq!(publication.state.revision.get(), 1);
    }

    #[test]
    fn test_draws_are_debounced() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        for frame in 0..10 {
            tracker.on_draw(start + ms(frame * 16));
        }
        assert!(tracker.poll(start + ms(1000)).is_none());

        let publication = tracker.poll(start + ms(1144)).unwrap();
        assert_eq!(publication.state.draw_revision.get(), 1);
        // No viewport observed yet, so nothing to publish besides the draw
        assert!(publication.state.boundary.is_none());
    }

    #[test]
    fn test_draw_publishes_latest_boundary() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_draw(start);
        tracker.on_viewport_changed(&event(-1.0, 1.0), start + ms(500));

        // Draw fires first and catches up with the observed viewport
        let publication = tracker.poll(start + WINDOW).unwrap();
        assert!(publication.drawn);
        assert!(publication.boundary_changed);
        assert_eq!(publication.state.revision.get(), 1);
        assert_eq!(publication.state.draw_revision.get(), 1);

        // The event timer was superseded by the draw
        assert!(tracker.next_deadline().is_none());
        assert!(tracker.poll(start + ms(1500)).is_none());
        assert_eq!(tracker.current_state().revision.get(), 1);
    }

    #[test]
    fn test_drag_holds_back_draws() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_drag_start();
        assert!(tracker.is_dragging());
        tracker.on_draw(start);

        assert!(tracker.next_deadline().is_none());
        assert!(tracker.poll(start + ms(3000)).is_none());
        assert!(tracker.has_pending());

        tracker.on_drag_end();
        assert_eq!(tracker.next_deadline(), Some(start + WINDOW));
        let publication = tracker.poll(start + ms(3000)).unwrap();
        assert!(publication.drawn);
    }

    #[test]
    fn test_drag_does_not_hold_viewport_events() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let start = Instant::now();

        tracker.on_drag_start();
        tracker.on_viewport_changed(&event(-1.0, 1.0), start);
        let publication = tracker.poll(start + WINDOW).unwrap();
        assert!(publication.boundary_changed);
    }

    #[test]
    fn test_zero_debounce_publishes_immediately() {
        let mut tracker = ViewportTracker::new(Duration::ZERO);
        let start = Instant::now();

        tracker.on_viewport_changed(&event(-1.0, 1.0), start);
        assert!(tracker.poll(start).is_some());
        assert_eq!(tracker.current_state().revision.get(), 1);
    }

    #[test]
    fn test_revisions_increase_per_publication() {
        let mut tracker = ViewportTracker::new(WINDOW);
        let mut now = Instant::now();

        for step in 1..=5 {
            tracker.on_viewport_changed(&event(-(step as f64), step as f64), now);
            now += WINDOW;
            tracker.poll(now).unwrap();
            assert_eq!(tracker.current_state().revision.get(), step);
        }
    }
}
