//! Viewport boundary types
//!
//! A [`Boundary`] is always normalized: it is built from two arbitrary corners by
//! taking the per-axis min and max, because map widgets give no orientation
//! guarantee for the corners they report.

use crate::{ClusterError, LatLng, Result};
use geo::Rect;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Normalized geographic rectangle, `min_lat <= max_lat` and `min_lng <= max_lng`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawBoundary")
)]
pub struct Boundary {
    min_lat: f64,
    min_lng: f64,
    max_lat: f64,
    max_lng: f64,
}

/// Unchecked wire form; deserialized boundaries go through [`Boundary::new`]
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawBoundary {
    min_lat: f64,
    min_lng: f64,
    max_lat: f64,
    max_lng: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBoundary> for Boundary {
    type Error = ClusterError;

    fn try_from(raw: RawBoundary) -> Result<Self> {
        Self::new(raw.min_lat, raw.min_lng, raw.max_lat, raw.max_lng)
    }
}

impl Boundary {
    /// Create a boundary from already ordered extents
    ///
    /// # Errors
    /// `InvalidBoundary` when a minimum exceeds its maximum (or either is NaN).
    pub fn new(min_lat: f64, min_lng: f64, max_lat: f64, max_lng: f64) -> Result<Self> {
        // Written as a negated `<=` so NaN is rejected too
        if !(min_lat <= max_lat) {
            return Err(ClusterError::InvalidBoundary {
                axis: "lat",
                min: min_lat,
                max: max_lat,
            });
        }
        if !(min_lng <= max_lng) {
            return Err(ClusterError::InvalidBoundary {
                axis: "lng",
                min: min_lng,
                max: max_lng,
            });
        }

        Ok(Self {
            min_lat,
            min_lng,
            max_lat,
            max_lng,
        })
    }

    /// Normalize two corners of any orientation into a boundary
    pub fn from_corners(a: LatLng, b: LatLng) -> Self {
        let boundary = Self {
            min_lat: a.lat.min(b.lat),
            min_lng: a.lng.min(b.lng),
            max_lat: a.lat.max(b.lat),
            max_lng: a.lng.max(b.lng),
        };
        debug_assert!(boundary.is_normalized(), "corner normalization failed");
        boundary
    }

    #[inline]
    fn is_normalized(&self) -> bool {
        self.min_lat <= self.max_lat && self.min_lng <= self.max_lng
    }

    #[inline]
    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    #[inline]
    pub fn min_lng(&self) -> f64 {
        self.min_lng
    }

    #[inline]
    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    #[inline]
    pub fn max_lng(&self) -> f64 {
        self.max_lng
    }

    /// Longitude extent in degrees
    #[inline]
    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    /// Latitude extent in degrees
    #[inline]
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Closed containment test
    #[inline]
    pub fn contains(&self, location: LatLng) -> bool {
        location.lat >= self.min_lat
            && location.lat <= self.max_lat
            && location.lng >= self.min_lng
            && location.lng <= self.max_lng
    }

    /// `[min_lat, min_lng, max_lat, max_lng]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lat, self.min_lng, self.max_lat, self.max_lng]
    }

    /// Convert to a `geo` rectangle (x = longitude, y = latitude)
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            LatLng::new(self.min_lat, self.min_lng),
            LatLng::new(self.max_lat, self.max_lng),
        )
    }
}

/// `Rect::new` already orders its corners, so this cannot fail
impl From<Rect<f64>> for Boundary {
    fn from(rect: Rect<f64>) -> Self {
        Self::from_corners(rect.min().into(), rect.max().into())
    }
}

/// Size of the map widget in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A raw viewport-change notification from the map widget
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewportEvent {
    /// One corner of the visible area (any corner)
    pub corner_a: LatLng,
    /// The opposite corner
    pub corner_b: LatLng,
    pub size: ViewportSize,
}

impl ViewportEvent {
    pub fn new(corner_a: LatLng, corner_b: LatLng, size: ViewportSize) -> Self {
        Self {
            corner_a,
            corner_b,
            size,
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.corner_a.is_finite() && self.corner_b.is_finite()
    }

    /// The normalized boundary of this event
    pub fn boundary(&self) -> Boundary {
        Boundary::from_corners(self.corner_a, self.corner_b)
    }
}
