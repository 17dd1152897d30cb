use geo::Point;
use serde::{Deserialize, Serialize};

/// Upper bound of the latitude axis in degrees.
pub const LATITUDE_RANGE: f64 = 90.0;
/// Upper bound of the longitude axis in degrees.
pub const LONGITUDE_RANGE: f64 = 180.0;

/// A geographic position in degrees.
///
/// Construction does not validate the range. Call [`Coordinate::normalized`]
/// to fold out-of-range values back into `[-90, 90]` / `[-180, 180]`.
///
/// # Examples
///
/// ```
/// use geoshard_types::Coordinate;
///
/// let c = Coordinate::new(100.0, 190.0).normalized();
/// assert_eq!(c.lat, -80.0);
/// assert_eq!(c.lon, -170.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Fold latitude and longitude into range by periodic wraparound.
    ///
    /// Latitude wraps with a period of 180 degrees and longitude with a period
    /// of 360 degrees. Values already in range are returned unchanged, so both
    /// `90.0` and `-90.0` survive as-is. Non-finite values are passed through.
    pub fn normalized(self) -> Self {
        Self {
            lat: wrap(self.lat, LATITUDE_RANGE),
            lon: wrap(self.lon, LONGITUDE_RANGE),
        }
    }

    /// Whether both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Convert to a `geo::Point` (x = longitude, y = latitude).
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

impl From<Point<f64>> for Coordinate {
    fn from(point: Point<f64>) -> Self {
        Self::new(point.y(), point.x())
    }
}

impl From<Coordinate> for geo::Coord<f64> {
    fn from(c: Coordinate) -> Self {
        geo::coord! { x: c.lon, y: c.lat }
    }
}

fn wrap(value: f64, range: f64) -> f64 {
    let period = range * 2.0;
    if value > range {
        value - period * ((value - range) / period).ceil()
    } else if value < -range {
        value + period * ((-range - value) / period).ceil()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_untouched() {
        let c = Coordinate::new(90.0, -180.0).normalized();
        assert_eq!(c, Coordinate::new(90.0, -180.0));
    }

    #[test]
    fn test_wraparound() {
        let c = Coordinate::new(270.0, 540.0).normalized();
        assert_eq!(c.lat, 90.0);
        assert_eq!(c.lon, 180.0);

        let c = Coordinate::new(-100.0, -190.0).normalized();
        assert_eq!(c.lat, 80.0);
        assert_eq!(c.lon, 170.0);
    }

    #[test]
    fn test_point_conversion() {
        let c = Coordinate::new(40.7128, -74.0060);
        let p = c.to_point();
        assert_eq!(p.x(), -74.0060);
        assert_eq!(p.y(), 40.7128);
        assert_eq!(Coordinate::from(p), c);
    }
}
