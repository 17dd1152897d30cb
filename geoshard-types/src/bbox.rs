use crate::coord::Coordinate;
use geo::Rect;
use serde::{Deserialize, Serialize};

/// An axis-aligned latitude/longitude rectangle.
///
/// Bounds are inclusive on every side. The constructor orders each pair so
/// that `lat_low <= lat_high` and `lon_low <= lon_high` always hold.
///
/// # Examples
///
/// ```
/// use geoshard_types::{BoundingBox, Coordinate};
///
/// let bbox = BoundingBox::new(40.8, 40.7, -73.9, -74.0);
/// assert_eq!(bbox.lat_low, 40.7);
/// assert_eq!(bbox.lon_high, -73.9);
/// assert!(bbox.contains(&Coordinate::new(40.75, -73.95)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_low: f64,
    pub lat_high: f64,
    pub lon_low: f64,
    pub lon_high: f64,
}

impl BoundingBox {
    pub fn new(lat_a: f64, lat_b: f64, lon_a: f64, lon_b: f64) -> Self {
        Self {
            lat_low: lat_a.min(lat_b),
            lat_high: lat_a.max(lat_b),
            lon_low: lon_a.min(lon_b),
            lon_high: lon_a.max(lon_b),
        }
    }

    /// Smallest box enclosing every coordinate, or `None` for an empty input.
    pub fn from_coordinates<'a, I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first.lat, first.lat, first.lon, first.lon);
        for c in iter {
            bbox.lat_low = bbox.lat_low.min(c.lat);
            bbox.lat_high = bbox.lat_high.max(c.lat);
            bbox.lon_low = bbox.lon_low.min(c.lon);
            bbox.lon_high = bbox.lon_high.max(c.lon);
        }
        Some(bbox)
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.lat_low + self.lat_high) / 2.0,
            (self.lon_low + self.lon_high) / 2.0,
        )
    }

    /// Extent along the longitude axis in degrees.
    pub fn width(&self) -> f64 {
        self.lon_high - self.lon_low
    }

    /// Extent along the latitude axis in degrees.
    pub fn height(&self) -> f64 {
        self.lat_high - self.lat_low
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        c.lat >= self.lat_low
            && c.lat <= self.lat_high
            && c.lon >= self.lon_low
            && c.lon <= self.lon_high
    }

    /// Whether `other` lies entirely inside this box (shared edges allowed).
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.lat_low >= self.lat_low
            && other.lat_high <= self.lat_high
            && other.lon_low >= self.lon_low
            && other.lon_high <= self.lon_high
    }

    /// Whether the two boxes share at least one point.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.lat_low <= other.lat_high
            && other.lat_low <= self.lat_high
            && self.lon_low <= other.lon_high
            && other.lon_low <= self.lon_high
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            lat_low: self.lat_low.min(other.lat_low),
            lat_high: self.lat_high.max(other.lat_high),
            lon_low: self.lon_low.min(other.lon_low),
            lon_high: self.lon_high.max(other.lon_high),
        }
    }

    /// The four corners, counter-clockwise from the south-west corner.
    pub fn corners(&self) -> [Coordinate; 4] {
        [
            Coordinate::new(self.lat_low, self.lon_low),
            Coordinate::new(self.lat_low, self.lon_high),
            Coordinate::new(self.lat_high, self.lon_high),
            Coordinate::new(self.lat_high, self.lon_low),
        ]
    }

    /// Convert to a `geo::Rect` (x = longitude, y = latitude).
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.lon_low, y: self.lat_low },
            geo::coord! { x: self.lon_high, y: self.lat_high },
        )
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().y, rect.max().y, rect.min().x, rect.max().x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_and_extent() {
        let bbox = BoundingBox::new(0.0, 45.0, -45.0, 0.0);
        assert_eq!(bbox.center(), Coordinate::new(22.5, -22.5));
        assert_eq!(bbox.width(), 45.0);
        assert_eq!(bbox.height(), 45.0);
    }

    #[test]
    fn test_intersects_touching_edges() {
        let a = BoundingBox::new(0.0, 10.0, 0.0, 10.0);
        let b = BoundingBox::new(10.0, 20.0, 10.0, 20.0);
        let c = BoundingBox::new(10.5, 20.0, 0.0, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_contains_box() {
        let outer = BoundingBox::new(0.0, 45.0, 0.0, 45.0);
        let inner = BoundingBox::new(10.0, 20.0, 10.0, 20.0);
        assert!(outer.contains_box(&inner));
        assert!(!inner.contains_box(&outer));
    }

    #[test]
    fn test_from_coordinates() {
        let coords = [
            Coordinate::new(10.0, 20.0),
            Coordinate::new(-5.0, 30.0),
            Coordinate::new(2.0, -1.0),
        ];
        let bbox = BoundingBox::from_coordinates(&coords).unwrap();
        assert_eq!(bbox, BoundingBox::new(-5.0, 10.0, -1.0, 30.0));
        assert!(BoundingBox::from_coordinates(&[]).is_none());
    }

    #[test]
    fn test_rect_round_trip() {
        let bbox = BoundingBox::new(40.7, 40.8, -74.0, -73.9);
        assert_eq!(BoundingBox::from(bbox.to_rect()), bbox);
    }
}
