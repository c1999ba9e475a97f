//! Geographic primitives for drawn areas of interest.
//!
//! Coordinates are stored as (longitude, latitude) to match GeoJSON. All
//! validation happens at construction, so a `Ring` or `Polygon` that exists
//! is always closed and well-formed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum ring length: three distinct vertices plus the closing duplicate.
pub const MIN_RING_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("coordinate ({lng}, {lat}) is not a finite longitude/latitude pair")]
    InvalidCoordinate { lng: f64, lat: f64 },
    #[error("ring needs at least 4 positions, got {0}")]
    RingTooShort(usize),
    #[error("ring is not closed: first and last positions differ")]
    OpenRing,
    #[error("expected GeoJSON type \"Polygon\", got {0:?}")]
    UnexpectedType(String),
    #[error("polygons with holes are not supported ({0} rings)")]
    UnsupportedRings(usize),
}

/// A longitude/latitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    lng: f64,
    lat: f64,
}

impl Point {
    pub fn new(lng: f64, lat: f64) -> Result<Self, GeometryError> {
        let valid = lng.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lng)
            && (-90.0..=90.0).contains(&lat);
        if !valid {
            return Err(GeometryError::InvalidCoordinate { lng, lat });
        }
        Ok(Self { lng, lat })
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }
}

impl TryFrom<(f64, f64)> for Point {
    type Error = GeometryError;

    fn try_from((lng, lat): (f64, f64)) -> Result<Self, Self::Error> {
        Point::new(lng, lat)
    }
}

impl From<Point> for (f64, f64) {
    fn from(point: Point) -> Self {
        (point.lng, point.lat)
    }
}

/// A closed sequence of positions where the last equals the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct Ring {
    positions: Vec<Point>,
}

impl Ring {
    /// Closes an open vertex list by appending a copy of its first vertex.
    pub fn close(vertices: &[Point]) -> Result<Self, GeometryError> {
        let Some(first) = vertices.first() else {
            return Err(GeometryError::RingTooShort(0));
        };
        let mut positions = Vec::with_capacity(vertices.len() + 1);
        positions.extend_from_slice(vertices);
        positions.push(*first);
        Ring::try_from(positions)
    }

    pub fn positions(&self) -> &[Point] {
        &self.positions
    }

    /// The ring's vertices without the closing duplicate.
    pub fn vertices(&self) -> &[Point] {
        &self.positions[..self.positions.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl TryFrom<Vec<Point>> for Ring {
    type Error = GeometryError;

    fn try_from(positions: Vec<Point>) -> Result<Self, Self::Error> {
        if positions.len() < MIN_RING_LEN {
            return Err(GeometryError::RingTooShort(positions.len()));
        }
        if positions.first() != positions.last() {
            return Err(GeometryError::OpenRing);
        }
        Ok(Self { positions })
    }
}

impl From<Ring> for Vec<Point> {
    fn from(ring: Ring) -> Self {
        ring.positions
    }
}

/// A single-ring polygon, serialized as a GeoJSON `Polygon` geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPolygon", into = "GeoJsonPolygon")]
pub struct Polygon {
    exterior: Ring,
}

impl Polygon {
    pub fn new(exterior: Ring) -> Self {
        Self { exterior }
    }

    pub fn exterior(&self) -> &Ring {
        &self.exterior
    }

    /// Axis-aligned bounding box of the exterior ring.
    pub fn bounds(&self) -> Bounds {
        Bounds::enclosing(self.exterior.positions())
            .unwrap_or_else(|| Bounds::point(self.exterior.positions[0]))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoJsonPolygon {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<Vec<Point>>,
}

impl TryFrom<GeoJsonPolygon> for Polygon {
    type Error = GeometryError;

    fn try_from(raw: GeoJsonPolygon) -> Result<Self, Self::Error> {
        if raw.kind != "Polygon" {
            return Err(GeometryError::UnexpectedType(raw.kind));
        }
        let rings = raw.coordinates.len();
        let mut coordinates = raw.coordinates.into_iter();
        match (coordinates.next(), rings) {
            (Some(exterior), 1) => Ok(Polygon::new(Ring::try_from(exterior)?)),
            (None, _) => Err(GeometryError::RingTooShort(0)),
            _ => Err(GeometryError::UnsupportedRings(rings)),
        }
    }
}

impl From<Polygon> for GeoJsonPolygon {
    fn from(polygon: Polygon) -> Self {
        Self {
            kind: "Polygon".to_string(),
            coordinates: vec![polygon.exterior.into()],
        }
    }
}

/// South-west / north-east corners, serialized as `[[lng, lat], [lng, lat]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Point, Point)", into = "(Point, Point)")]
pub struct Bounds {
    pub south_west: Point,
    pub north_east: Point,
}

impl Bounds {
    fn point(point: Point) -> Self {
        Self {
            south_west: point,
            north_east: point,
        }
    }

    /// Smallest bounds containing every point, or `None` for no points.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut min_lng, mut min_lat) = (first.lng, first.lat);
        let (mut max_lng, mut max_lat) = (first.lng, first.lat);
        for point in rest {
            min_lng = min_lng.min(point.lng);
            min_lat = min_lat.min(point.lat);
            max_lng = max_lng.max(point.lng);
            max_lat = max_lat.max(point.lat);
        }
        // Inputs are already validated points, so the extremes are too.
        Some(Self {
            south_west: Point { lng: min_lng, lat: min_lat },
            north_east: Point { lng: max_lng, lat: max_lat },
        })
    }
}

impl From<(Point, Point)> for Bounds {
    fn from((a, b): (Point, Point)) -> Self {
        Bounds::enclosing(&[a, b]).unwrap_or_else(|| Bounds::point(a))
    }
}

impl From<Bounds> for (Point, Point) {
    fn from(bounds: Bounds) -> Self {
        (bounds.south_west, bounds.north_east)
    }
}
