//! Point storage module
//!
//! This module provides the `Point` and `PointSet` types. A point set is the
//! immutable, versioned input the spatial index is built from.

use crate::{ClusterError, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Source of process-unique point set versions
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// A geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// `geo` uses x for longitude and y for latitude
impl From<LatLng> for geo::Coord<f64> {
    fn from(value: LatLng) -> Self {
        geo::Coord {
            x: value.lng,
            y: value.lat,
        }
    }
}

impl From<geo::Coord<f64>> for LatLng {
    fn from(value: geo::Coord<f64>) -> Self {
        Self {
            lat: value.y,
            lng: value.x,
        }
    }
}

/// A single marker to place on the map
///
/// `meta` is an opaque payload carried through clustering untouched.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point<M = ()> {
    pub id: String,
    pub location: LatLng,
    #[cfg_attr(feature = "serde", serde(default))]
    pub meta: M,
}

impl Point {
    /// Create a point without payload
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            location: LatLng::new(lat, lng),
            meta: (),
        }
    }
}

impl<M> Point<M> {
    /// Create a point carrying a payload
    pub fn with_meta(id: impl Into<String>, location: LatLng, meta: M) -> Self {
        Self {
            id: id.into(),
            location,
            meta,
        }
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.location.lat
    }

    #[inline]
    pub fn lng(&self) -> f64 {
        self.location.lng
    }
}

/// An ordered, immutable sequence of points identified by a version token
///
/// Cloning is cheap: the points are shared. Two point sets with the same
/// version are treated as the same data by [`MarkerLayer`](crate::MarkerLayer),
/// which only rebuilds its index when the version changes.
#[derive(Debug)]
pub struct PointSet<M = ()> {
    points: Arc<[Point<M>]>,
    version: u64,
}

impl<M> Clone for PointSet<M> {
    fn clone(&self) -> Self {
        Self {
            points: self.points.clone(),
            version: self.version,
        }
    }
}

impl<M> PointSet<M> {
    /// Create a point set with a fresh, process-unique version
    ///
    /// # Errors
    /// `DuplicateId` if two points share an id, `NonFiniteCoordinate` if a
    /// point has a NaN or infinite coordinate.
    pub fn new(points: Vec<Point<M>>) -> Result<Self>
    where
        M: Sync,
    {
        Self::with_version(points, NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a point set with a caller-supplied version token
    ///
    /// Callers that mix this with [`PointSet::new`] are responsible for not
    /// reusing a version for different data.
    pub fn with_version(points: Vec<Point<M>>, version: u64) -> Result<Self>
    where
        M: Sync,
    {
        Self::validate(&points)?;
        Ok(Self {
            points: points.into(),
            version,
        })
    }

    /// An empty point set with a fresh version
    pub fn empty() -> Self {
        Self {
            points: Arc::from(Vec::new()),
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn validate(points: &[Point<M>]) -> Result<()>
    where
        M: Sync,
    {
        if let Some(bad) = points.par_iter().find_first(|p| !p.location.is_finite()) {
            return Err(ClusterError::NonFiniteCoordinate { id: bad.id.clone() });
        }

        let mut seen = HashSet::with_capacity(points.len());
        for point in points {
            if !seen.insert(point.id.as_str()) {
                return Err(ClusterError::DuplicateId {
                    id: point.id.clone(),
                });
            }
        }

        Ok(())
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[Point<M>] {
        &self.points
    }

    /// Get a point by ordinal
    #[inline]
    pub fn get(&self, ordinal: usize) -> Option<&Point<M>> {
        self.points.get(ordinal)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point<M>> {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_set_creation() {
        let set = PointSet::new(vec![Point::new("a", 1.0, 2.0), Point::new("b", 3.0, 4.0)]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
        assert_eq!(set.get(1).unwrap().id, "b");
        assert_eq!(set.get(1).unwrap().lng(), 4.0);
        assert!(set.get(2).is_none());
    }

    #[test]
    fn test_versions_are_unique() {
        let a = PointSet::new(vec![Point::new("a", 1.0, 2.0)]).unwrap();
        let b = PointSet::new(vec![Point::new("a", 1.0, 2.0)]).unwrap();
        assert_ne!(a.version(), b.version());

        let clone = a.clone();
        assert_eq!(clone.version(), a.version());

        assert_ne!(PointSet::<()>::empty().version(), PointSet::<()>::empty().version());
    }

    #[test]
    fn test_explicit_version() {
        let set = PointSet::with_version(vec![Point::new("a", 1.0, 2.0)], 7).unwrap();
        assert_eq!(set.version(), 7);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = PointSet::new(vec![
            Point::new("a", 1.0, 2.0),
            Point::new("b", 1.0, 2.0),
            Point::new("a", 5.0, 6.0),
        ]);
        assert_eq!(
            result.unwrap_err(),
            ClusterError::DuplicateId { id: "a".into() }
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let result = PointSet::new(vec![
            Point::new("ok", 1.0, 2.0),
            Point::new("nan", f64::NAN, 2.0),
            Point::new("inf", 1.0, f64::INFINITY),
        ]);
        assert_eq!(
            result.unwrap_err(),
            ClusterError::NonFiniteCoordinate { id: "nan".into() }
        );
    }

    #[test]
    fn test_empty_point_set() {
        let set = PointSet::<()>::new(Vec::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn test_meta_payload() {
        let point = Point::with_meta("x", LatLng::new(1.0, 2.0), vec![1u8, 2, 3]);
        assert_eq!(point.meta, vec![1, 2, 3]);
        assert_eq!(point.lat(), 1.0);
    }

    #[test]
    fn test_geo_coord_conversion() {
        let coord: geo::Coord<f64> = LatLng::new(51.5, -0.1).into();
        assert_eq!(coord.x, -0.1);
        assert_eq!(coord.y, 51.5);
        assert_eq!(LatLng::from(coord), LatLng::new(51.5, -0.1));
    }
}
