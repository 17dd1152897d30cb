use crate::bbox::BoundingBox;
use crate::coord::Coordinate;
use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};

/// A simple polygon given by its vertices in order.
///
/// The ring is implicitly closed: the last vertex connects back to the first,
/// and a caller-supplied closing vertex equal to the first is dropped.
///
/// # Examples
///
/// ```
/// use geoshard_types::{Coordinate, GeoPolygon};
///
/// let triangle = GeoPolygon::new(vec![
///     Coordinate::new(10.0, 10.0),
///     Coordinate::new(20.0, 10.0),
///     Coordinate::new(15.0, 20.0),
/// ])
/// .unwrap();
/// assert_eq!(triangle.len(), 3);
///
/// assert!(GeoPolygon::new(vec![Coordinate::new(0.0, 0.0)]).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinate>", into = "Vec<Coordinate>")]
pub struct GeoPolygon {
    vertices: Vec<Coordinate>,
}

impl GeoPolygon {
    /// Returns `None` when fewer than three distinct ring vertices remain.
    pub fn new(mut vertices: Vec<Coordinate>) -> Option<Self> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return None;
        }
        Some(Self { vertices })
    }

    /// Polygon covering exactly the given box.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self {
            vertices: bbox.corners().to_vec(),
        }
    }

    pub fn vertices(&self) -> &[Coordinate] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::new(
            self.vertices[0].lat,
            self.vertices[0].lat,
            self.vertices[0].lon,
            self.vertices[0].lon,
        );
        for v in &self.vertices[1..] {
            bbox = bbox.union(&BoundingBox::new(v.lat, v.lat, v.lon, v.lon));
        }
        bbox
    }

    /// Center of the polygon's bounding box, used as the seed for cell expansion.
    pub fn center(&self) -> Coordinate {
        self.bounding_box().center()
    }

    /// Convert to a closed `geo::Polygon` with no interior rings.
    pub fn to_geo(&self) -> Polygon<f64> {
        let ring: LineString<f64> = self
            .vertices
            .iter()
            .map(|c| geo::Coord::from(*c))
            .collect();
        // `Polygon::new` closes the exterior ring.
        Polygon::new(ring, vec![])
    }
}

impl TryFrom<Vec<Coordinate>> for GeoPolygon {
    type Error = String;

    fn try_from(vertices: Vec<Coordinate>) -> Result<Self, Self::Error> {
        let count = vertices.len();
        Self::new(vertices).ok_or_else(|| format!("polygon needs at least 3 vertices, got {count}"))
    }
}

impl From<GeoPolygon> for Vec<Coordinate> {
    fn from(polygon: GeoPolygon) -> Self {
        polygon.vertices
    }
}
