//! Replay of recorded viewport events against a marker layer
//!
//! Time is simulated: every event carries an offset in milliseconds and the
//! layer is polled at each deadline that falls between two events, so a replay
//! is deterministic no matter how fast it runs.

use crate::CliError;
use marker_cluster_lib::{
    Boundary, LatLng, MarkerLayer, MarkerListener, Point, PointSet, Revision, ViewportEvent,
    ViewportSize, ViewportState, VisibleMarker,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What happened on the map
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Bounds {
        a: LatLng,
        b: LatLng,
        width: u32,
        height: u32,
    },
    Draw,
    DragStart,
    DragEnd,
}

/// A map event at an offset from the start of the replay
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimedEvent {
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl TimedEvent {
    pub fn bounds(at_ms: u64, a: LatLng, b: LatLng, width: u32, height: u32) -> Self {
        Self {
            at_ms,
            kind: EventKind::Bounds {
                a,
                b,
                width,
                height,
            },
        }
    }
}

/// One published viewport and the markers to render for it
#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    revision: u64,
    draw_revision: u64,
    boundary: Option<Boundary>,
    markers: &'a [VisibleMarker<Value>],
}

/// How snapshots are written
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub final_only: bool,
    pub pretty: bool,
}

/// Logs layer notifications
struct LogListener;

impl MarkerListener<Value> for LogListener {
    fn on_bounds_change(&mut self, state: &ViewportState) {
        tracing::info!(
            revision = state.revision.get(),
            boundary = ?state.boundary.map(|b| b.to_array()),
            width = state.size.width,
            height = state.size.height,
            "Viewport published"
        );
    }

    fn on_visible_markers_change(&mut self, markers: &[VisibleMarker<Value>]) {
        let clusters = markers.iter().filter(|m| m.is_cluster()).count();
        tracing::debug!(markers = markers.len(), clusters, "Visible markers changed");
    }
}

/// Load and validate the markers file
pub fn load_points(path: &Path) -> Result<PointSet<Value>, CliError> {
    let json = read(path)?;
    let points: Vec<Point<Value>> = serde_json::from_str(&json).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(count = points.len(), path = %path.display(), "Loaded points");
    Ok(PointSet::new(points)?)
}

/// Load the events file, ordered by time
pub fn load_events(path: &Path) -> Result<Vec<TimedEvent>, CliError> {
    let json = read(path)?;
    let mut events: Vec<TimedEvent> =
        serde_json::from_str(&json).map_err(|source| CliError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    events.sort_by_key(|event| event.at_ms);
    tracing::info!(count = events.len(), path = %path.display(), "Loaded events");
    Ok(events)
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Drives a layer through a list of events and writes a snapshot per published
/// revision or recomputed marker list
pub struct Replay<W> {
    layer: MarkerLayer<Value>,
    out: W,
    options: OutputOptions,
    start: Instant,
    emitted: Revision,
    emitted_markers: Arc<[VisibleMarker<Value>]>,
    written: usize,
}

impl<W: Write> Replay<W> {
    pub fn new(mut layer: MarkerLayer<Value>, out: W, options: OutputOptions) -> Self {
        layer.add_listener(Box::new(LogListener));
        Self {
            emitted_markers: layer.visible_markers(),
            layer,
            out,
            options,
            start: Instant::now(),
            emitted: Revision::ZERO,
            written: 0,
        }
    }

    /// Replay the events, then let every pending publication fire.
    ///
    /// Returns the number of snapshots written.
    pub fn run(mut self, events: &[TimedEvent]) -> Result<usize, CliError> {
        for event in events {
            let now = self.start + Duration::from_millis(event.at_ms);
            self.advance_to(now)?;
            self.apply(event, now);
            self.emit_if_published()?;
        }

        while let Some(deadline) = self.layer.next_deadline() {
            self.layer.poll(deadline);
            self.emit_if_published()?;
        }

        if self.options.final_only {
            self.write_snapshot()?;
        }

        self.out.flush().map_err(CliError::Output)?;
        tracing::info!(
            snapshots = self.written,
            revision = self.layer.viewport_state().revision.get(),
            "Replay finished"
        );
        Ok(self.written)
    }

    /// Poll every deadline that falls before `now`
    fn advance_to(&mut self, now: Instant) -> Result<(), CliError> {
        while let Some(deadline) = self.layer.next_deadline() {
            if deadline > now {
                break;
            }
            self.layer.poll(deadline);
            self.emit_if_published()?;
        }
        Ok(())
    }

    fn apply(&mut self, event: &TimedEvent, now: Instant) {
        tracing::trace!(at_ms = event.at_ms, kind = ?event.kind, "Replaying event");
        match &event.kind {
            EventKind::Bounds {
                a,
                b,
                width,
                height,
            } => {
                let event = ViewportEvent::new(*a, *b, ViewportSize::new(*width, *height));
                self.layer.on_viewport_changed(&event, now);
            }
            EventKind::Draw => self.layer.on_draw(now),
            EventKind::DragStart => self.layer.on_drag_start(),
            EventKind::DragEnd => self.layer.on_drag_end(now),
        }
    }

    /// Write a snapshot if the boundary was published or the markers were recomputed
    fn emit_if_published(&mut self) -> Result<(), CliError> {
        let revision = self.layer.viewport_state().revision;
        let markers = self.layer.visible_markers();
        if revision == self.emitted && Arc::ptr_eq(&markers, &self.emitted_markers) {
            return Ok(());
        }
        self.emitted = revision;
        self.emitted_markers = markers;
        if self.options.final_only {
            return Ok(());
        }
        self.write_snapshot()
    }

    fn write_snapshot(&mut self) -> Result<(), CliError> {
        let state = self.layer.viewport_state();
        let markers = self.layer.visible_markers();
        let snapshot = Snapshot {
            revision: state.revision.get(),
            draw_revision: state.draw_revision.get(),
            boundary: state.boundary,
            markers: &markers,
        };

        if self.options.pretty {
            serde_json::to_writer_pretty(&mut self.out, &snapshot)
        } else {
            serde_json::to_writer(&mut self.out, &snapshot)
        }
        .map_err(|e| CliError::Output(e.into()))?;
        writeln!(self.out).map_err(CliError::Output)?;

        self.written += 1;
        Ok(())
    }
}
