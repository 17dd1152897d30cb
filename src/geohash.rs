//! Geohash encoding and polygon-to-cell expansion.
//!
//! A spatial key is a base-32 string produced by interleaving binary
//! subdivisions of the longitude and latitude axes, starting with longitude.
//! Every character carries five bits, so a key of precision `p` names one
//! cell of a fixed `2^(5p)` cell grid. All functions here are pure and
//! may be called from any thread.
//!
//! ```rust
//! use geoshard::geohash::{self, Direction};
//!
//! let key = geohash::encode(42.6, -5.6, 5)?;
//! assert_eq!(key, "ezs42");
//!
//! let cell = geohash::decode(&key)?;
//! assert!(cell.lat_low <= 42.6 && 42.6 <= cell.lat_high);
//!
//! assert_eq!(geohash::neighbor(&key, Direction::North)?, "ezs48");
//! # Ok::<(), geoshard::GeoshardError>(())
//! ```

use crate::error::{GeoshardError, Result};
use geo::Intersects;
use geoshard_types::{BoundingBox, Coordinate, GeoPolygon};
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

pub const BITS_PER_CHAR: usize = 5;
pub const MAX_PRECISION: usize = 24;

/// Number of leading characters [`hash_to_long`] packs into an integer.
pub const LONG_PRECISION: usize = 12;

/// Side length of the integer grid used by [`coordinates_to_xy`].
pub const GRID_WIDTH: u32 = 1 << MAX_PRECISION;

const LATITUDE_RANGE: f64 = 90.0;
const LONGITUDE_RANGE: f64 = 180.0;

/// Maps a 5-bit value to its geohash character. `a`, `i`, `l` and `o` are omitted.
pub const ALPHABET: [u8; 32] = *b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Inverse of [`ALPHABET`] over ASCII; `-1` marks characters outside the alphabet.
static CHAR_LOOKUP: Lazy<[i8; 128]> = Lazy::new(|| {
    let mut table = [-1i8; 128];
    for (value, ch) in ALPHABET.iter().enumerate() {
        table[*ch as usize] = value as i8;
    }
    table
});

/// Compass direction of a neighboring cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    /// All eight directions in the order nw, n, ne, w, e, sw, s, se.
    pub const ALL: [Direction; 8] = [
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
        Direction::West,
        Direction::East,
        Direction::SouthWest,
        Direction::South,
        Direction::SouthEast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::North => "n",
            Direction::South => "s",
            Direction::East => "e",
            Direction::West => "w",
            Direction::NorthEast => "ne",
            Direction::NorthWest => "nw",
            Direction::SouthEast => "se",
            Direction::SouthWest => "sw",
        }
    }

    /// Unit steps (latitude, longitude) in cell heights/widths.
    fn offsets(&self) -> (f64, f64) {
        match self {
            Direction::North => (1.0, 0.0),
            Direction::South => (-1.0, 0.0),
            Direction::East => (0.0, 1.0),
            Direction::West => (0.0, -1.0),
            Direction::NorthEast => (1.0, 1.0),
            Direction::NorthWest => (1.0, -1.0),
            Direction::SouthEast => (-1.0, 1.0),
            Direction::SouthWest => (-1.0, -1.0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = GeoshardError;

    fn from_str(s: &str) -> Result<Self> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| GeoshardError::InvalidInput(format!("unknown direction '{s}'")))
    }
}

/// Layout of the children one character below a key.
///
/// Odd-length keys split into 4 columns by 8 rows (`Tall`), even-length keys
/// into 8 columns by 4 rows (`Flat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Tall,
    Flat,
}

fn validate_precision(precision: usize) -> Result<()> {
    if (1..=MAX_PRECISION).contains(&precision) {
        Ok(())
    } else {
        Err(GeoshardError::InvalidGeohash(format!(
            "precision must be between 1 and {MAX_PRECISION}, got {precision}"
        )))
    }
}

/// Encode a latitude/longitude pair into a spatial key of `precision` characters.
///
/// Out-of-range coordinates are wrapped back into range first. At every bit
/// the value is compared with the midpoint of the current interval: strictly
/// greater emits `1` and keeps the upper half, anything else emits `0` and
/// keeps the lower half.
///
/// # Errors
///
/// Returns an error for a precision outside `1..=24` or non-finite coordinates.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String> {
    validate_precision(precision)?;
    let coord = Coordinate::new(lat, lon);
    if !coord.is_finite() {
        return Err(GeoshardError::InvalidInput(format!(
            "coordinates must be finite, got ({lat}, {lon})"
        )));
    }
    let coord = coord.normalized();

    // index 0 is longitude, index 1 latitude
    let mut low = [-LONGITUDE_RANGE, -LATITUDE_RANGE];
    let mut high = [LONGITUDE_RANGE, LATITUDE_RANGE];
    let value = [coord.lon, coord.lat];

    let mut hash = String::with_capacity(precision);
    for p in 0..precision {
        let mut char_bits = 0usize;
        for b in 0..BITS_PER_CHAR {
            let axis = (p * BITS_PER_CHAR + b) % 2;
            let middle = (low[axis] + high[axis]) / 2.0;
            char_bits <<= 1;
            if value[axis] > middle {
                char_bits |= 1;
                low[axis] = middle;
            } else {
                high[axis] = middle;
            }
        }
        hash.push(ALPHABET[char_bits] as char);
    }

    Ok(hash)
}

pub fn encode_coordinate(coord: &Coordinate, precision: usize) -> Result<String> {
    encode(coord.lat, coord.lon, precision)
}

/// Encode the center point of a box.
pub fn encode_box(bbox: &BoundingBox, precision: usize) -> Result<String> {
    encode_coordinate(&bbox.center(), precision)
}

fn char_value(ch: char) -> Option<u8> {
    let idx = ch as usize;
    if idx >= 128 {
        return None;
    }
    u8::try_from(CHAR_LOOKUP[idx]).ok()
}

/// Normalize a key for lookup (trim, lowercase) and check every character.
fn parse_key(key: &str) -> Result<String> {
    let key = key.trim().to_ascii_lowercase();
    if key.is_empty() {
        return Err(GeoshardError::InvalidGeohash("empty geohash".into()));
    }
    if key.len() > MAX_PRECISION {
        return Err(GeoshardError::InvalidGeohash(format!(
            "'{key}' is longer than {MAX_PRECISION} characters"
        )));
    }
    if let Some(bad) = key.chars().find(|c| char_value(*c).is_none()) {
        return Err(GeoshardError::InvalidGeohash(format!(
            "'{key}' contains character '{bad}' outside the geohash alphabet"
        )));
    }
    Ok(key)
}

/// Decode a spatial key into the cell it names.
///
/// # Errors
///
/// Returns [`GeoshardError::InvalidGeohash`] for empty or over-long keys and
/// for any character outside the alphabet.
pub fn decode(key: &str) -> Result<BoundingBox> {
    let key = parse_key(key)?;
    Ok(decode_parsed(&key))
}

fn decode_parsed(key: &str) -> BoundingBox {
    let mut low = [-LONGITUDE_RANGE, -LATITUDE_RANGE];
    let mut high = [LONGITUDE_RANGE, LATITUDE_RANGE];

    for (i, ch) in key.chars().enumerate() {
        let value = char_value(ch).unwrap_or_default();
        for j in 0..BITS_PER_CHAR {
            let bit = (value >> (BITS_PER_CHAR - 1 - j)) & 1;
            let axis = (i * BITS_PER_CHAR + j) % 2;
            let middle = (low[axis] + high[axis]) / 2.0;
            if bit == 1 {
                low[axis] = middle;
            } else {
                high[axis] = middle;
            }
        }
    }

    BoundingBox::new(low[1], high[1], low[0], high[0])
}

fn shifted(cell: &BoundingBox, direction: Direction, precision: usize) -> Result<String> {
    let center = cell.center();
    let (dlat, dlon) = direction.offsets();
    encode(
        center.lat + dlat * cell.height(),
        center.lon + dlon * cell.width(),
        precision,
    )
}

/// The adjacent cell of the same precision in `direction`.
///
/// The cell center is moved by one full cell width/height and re-encoded.
/// Stepping across a pole or the antimeridian is not corrected for; the shifted
/// point goes through the ordinary periodic wraparound of [`encode`], which for
/// latitude lands on the opposite hemisphere.
pub fn neighbor(key: &str, direction: Direction) -> Result<String> {
    let key = parse_key(key)?;
    let cell = decode_parsed(&key);
    shifted(&cell, direction, key.len())
}

/// All eight neighbors in the order of [`Direction::ALL`].
pub fn neighbors(key: &str) -> Result<[String; 8]> {
    let key = parse_key(key)?;
    let cell = decode_parsed(&key);
    let precision = key.len();
    let mut out: [String; 8] = Default::default();
    for (slot, direction) in out.iter_mut().zip(Direction::ALL) {
        *slot = shifted(&cell, direction, precision)?;
    }
    Ok(out)
}

/// All cells of `precision` whose box intersects `polygon`.
///
/// Breadth-first flood fill over the 8-connected cell grid, seeded with the
/// cell under the center of the polygon's bounding box. If that seed cell
/// already contains the whole polygon it is the only result. Cells that do not
/// intersect the polygon are not expanded. When the seed misses the polygon
/// (a concave ring around its own center) the cells under the vertices seed
/// the fill instead.
///
/// Vertices are normalized like any encoded coordinate before the ring is
/// built. A ring that straddles the antimeridian is not split.
pub fn polygon_to_cells(polygon: &GeoPolygon, precision: usize) -> Result<BTreeSet<String>> {
    validate_precision(precision)?;
    let vertices: Vec<Coordinate> = polygon.vertices().iter().map(|v| v.normalized()).collect();
    let polygon = GeoPolygon::new(vertices).ok_or_else(|| {
        GeoshardError::InvalidInput("polygon collapses after normalization".into())
    })?;
    let geometry = polygon.to_geo();
    let extent = polygon.bounding_box();
    let seed = encode_coordinate(&polygon.center(), precision)?;

    let seed_cell = decode_parsed(&seed);
    if seed_cell.contains_box(&extent) {
        return Ok(BTreeSet::from([seed]));
    }

    let mut seeds = vec![seed];
    if !geometry.intersects(&seed_cell.to_rect()) {
        for vertex in polygon.vertices() {
            seeds.push(encode_coordinate(vertex, precision)?);
        }
    }

    let mut visited: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<String> = VecDeque::new();
    for s in seeds {
        if visited.insert(s.clone()) {
            queue.push_back(s);
        }
    }

    let mut cells = BTreeSet::new();
    while let Some(hash) = queue.pop_front() {
        let cell = decode_parsed(&hash);
        if !geometry.intersects(&cell.to_rect()) {
            continue;
        }
        for direction in Direction::ALL {
            let next = shifted(&cell, direction, precision)?;
            if visited.insert(next.clone()) {
                queue.push_back(next);
            }
        }
        cells.insert(hash);
    }

    Ok(cells)
}

/// All cells of the finer `precision` lying inside the cell `key`.
pub fn internal_cells(key: &str, precision: usize) -> Result<BTreeSet<String>> {
    let key = parse_key(key)?;
    if precision < key.len() {
        return Err(GeoshardError::InvalidInput(format!(
            "precision {precision} is coarser than key '{key}'"
        )));
    }
    let region = GeoPolygon::from_bbox(&decode_parsed(&key));
    let mut cells = polygon_to_cells(&region, precision)?;
    // Cells that only touch the region's edges belong to the neighbors.
    cells.retain(|c| c.starts_with(key.as_str()));
    Ok(cells)
}

/// The internal cells of `key` with at least one neighbor outside `key`.
pub fn border_cells(key: &str, precision: usize) -> Result<BTreeSet<String>> {
    let internal = internal_cells(key, precision)?;
    let mut border = BTreeSet::new();
    for cell in &internal {
        if neighbors(cell)?.iter().any(|n| !internal.contains(n)) {
            border.insert(cell.clone());
        }
    }
    Ok(border)
}

pub fn orientation(key: &str) -> Result<Orientation> {
    let key = parse_key(key)?;
    Ok(if key.len() % 2 == 1 {
        Orientation::Tall
    } else {
        Orientation::Flat
    })
}

/// Pack the first [`LONG_PRECISION`] characters of `key` into an integer,
/// five bits per character, most significant first.
pub fn hash_to_long(key: &str) -> Result<u64> {
    let key = parse_key(key)?;
    Ok(key
        .chars()
        .take(LONG_PRECISION)
        .filter_map(char_value)
        .fold(0u64, |acc, v| (acc << BITS_PER_CHAR) | u64::from(v)))
}

/// Project a coordinate onto the `GRID_WIDTH` x `GRID_WIDTH` integer grid.
///
/// x grows eastward from -180 and y grows southward from 90.
pub fn coordinates_to_xy(coord: &Coordinate) -> (u32, u32) {
    let width = f64::from(GRID_WIDTH);
    let xdp = 2.0 * LONGITUDE_RANGE / width;
    let ydp = 2.0 * LATITUDE_RANGE / width;
    let x = ((coord.lon + LONGITUDE_RANGE) / xdp) as u32;
    let y = ((LATITUDE_RANGE - coord.lat) / ydp) as u32;
    (x, y)
}

pub fn xy_to_coordinates(x: u32, y: u32) -> Coordinate {
    let width = f64::from(GRID_WIDTH);
    let xdp = 2.0 * LONGITUDE_RANGE / width;
    let ydp = 2.0 * LATITUDE_RANGE / width;
    Coordinate::new(
        LATITUDE_RANGE - f64::from(y) * ydp,
        f64::from(x) * xdp - LONGITUDE_RANGE,
    )
}
