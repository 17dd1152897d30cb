//! # geoshard-types
//!
//! Value types shared by the geoshard indexing and coordination core:
//!
//! - **Coordinates**: `Coordinate` (latitude/longitude with periodic normalization)
//! - **Boxes**: `BoundingBox` (the rectangle a spatial key decodes to)
//! - **Polygons**: `GeoPolygon` (implicitly closed query regions)
//!
//! All types are serializable with Serde and convert into the `geo` crate's
//! geometric primitives, using x = longitude and y = latitude.
//!
//! ## Examples
//!
//! ```rust
//! use geoshard_types::{BoundingBox, Coordinate, GeoPolygon};
//!
//! let la = Coordinate::new(34.0522, -118.2437);
//! let area = GeoPolygon::new(vec![
//!     Coordinate::new(40.70, -74.02),
//!     Coordinate::new(40.80, -74.02),
//!     Coordinate::new(40.80, -73.93),
//! ])
//! .unwrap();
//!
//! let bbox: BoundingBox = area.bounding_box();
//! assert!(bbox.contains(&Coordinate::new(40.75, -73.95)));
//! assert!(!bbox.contains(&la));
//! ```

pub mod bbox;
pub mod coord;
pub mod polygon;

pub use bbox::BoundingBox;
pub use coord::Coordinate;
pub use polygon::GeoPolygon;
