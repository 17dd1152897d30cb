use geoshard::geohash::{self, Direction};
use geoshard::index::{self, PathTree};
use geoshard::{BoundingBox, Coordinate, GeoPolygon, GeoshardError};
use std::collections::BTreeSet;

/// Deterministic coordinates away from cell boundaries and the poles.
fn sample_coordinates(count: usize) -> Vec<(f64, f64)> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..count)
        .map(|_| (next() * 160.0 - 80.0, next() * 340.0 - 170.0))
        .collect()
}

#[test]
fn test_encode_matches_reference_crate() {
    for (lat, lon) in sample_coordinates(500) {
        for precision in [1, 4, 7, 12] {
            let ours = geohash::encode(lat, lon, precision).unwrap();
            let reference = ::geohash::encode(::geohash::Coord { x: lon, y: lat }, precision).unwrap();
            assert_eq!(ours, reference, "({lat}, {lon}) at precision {precision}");
        }
    }
}

#[test]
fn test_decode_matches_reference_crate() {
    for (lat, lon) in sample_coordinates(200) {
        let key = geohash::encode(lat, lon, 9).unwrap();
        let cell = geohash::decode(&key).unwrap();
        let rect = ::geohash::decode_bbox(&key).unwrap();
        assert!((cell.lon_low - rect.min().x).abs() < 1e-12);
        assert!((cell.lon_high - rect.max().x).abs() < 1e-12);
        assert!((cell.lat_low - rect.min().y).abs() < 1e-12);
        assert!((cell.lat_high - rect.max().y).abs() < 1e-12);
    }
}

#[test]
fn test_decode_contains_encoded_point() {
    for (lat, lon) in sample_coordinates(300) {
        for precision in 1..=12 {
            let key = geohash::encode(lat, lon, precision).unwrap();
            let cell = geohash::decode(&key).unwrap();
            assert!(
                cell.contains(&Coordinate::new(lat, lon)),
                "{key} does not contain ({lat}, {lon})"
            );
        }
    }
}

#[test]
fn test_neighbors_are_adjacent() {
    for (lat, lon) in sample_coordinates(50) {
        let key = geohash::encode(lat, lon, 6).unwrap();
        let cell = geohash::decode(&key).unwrap();
        let neighbors = geohash::neighbors(&key).unwrap();

        let distinct: BTreeSet<&String> = neighbors.iter().collect();
        assert_eq!(distinct.len(), 8);
        assert!(!distinct.contains(&key));

        for n in &neighbors {
            assert!(geohash::decode(n).unwrap().intersects(&cell), "{n} not adjacent to {key}");
        }
        let north = geohash::neighbor(&key, Direction::North).unwrap();
        assert!(geohash::decode(&north).unwrap().lat_low >= cell.lat_high - 1e-9);
    }
}

#[test]
fn test_polygon_cells_cover_every_vertex() {
    let polygon = GeoPolygon::new(vec![
        Coordinate::new(10.0, 10.0),
        Coordinate::new(12.5, 18.0),
        Coordinate::new(16.0, 11.0),
        Coordinate::new(13.0, 13.0),
    ])
    .unwrap();
    let cells = geohash::polygon_to_cells(&polygon, 3).unwrap();
    for vertex in polygon.vertices() {
        assert!(cells.contains(&geohash::encode_coordinate(vertex, 3).unwrap()));
    }
    // deterministic regardless of call
    assert_eq!(cells, geohash::polygon_to_cells(&polygon, 3).unwrap());
}

#[test]
fn test_invalid_keys_and_precision() {
    assert!(matches!(geohash::decode(""), Err(GeoshardError::InvalidGeohash(_))));
    assert!(matches!(geohash::decode("abc"), Err(GeoshardError::InvalidGeohash(_))));
    assert!(geohash::decode(" EZS42 ").is_ok());
    assert!(geohash::encode(0.0, 0.0, 0).is_err());
    assert!(geohash::encode(0.0, 0.0, 25).is_err());
    let whole_world = GeoPolygon::from_bbox(&BoundingBox::new(-1.0, 1.0, -1.0, 1.0));
    assert!(geohash::polygon_to_cells(&whole_world, 30).is_err());
}

#[test]
fn test_index_log_with_mixed_records() {
    let mut good = PathTree::new("good").unwrap();
    good.insert_str("9q8y/1699920000", "b1", 4).unwrap();
    good.insert_str("9q8y/1699920000", "b2", 4).unwrap();
    good.insert_str("dr5r/1699920000", "b3", 4).unwrap();

    let broken = "broken\n<<\n0,broken\n1,x\n>>\n[[\n0$1,9\n]]\n$$\n";
    let text = format!("{broken}{}", good.serialize());

    let results = index::deserialize_records(&text);
    assert_eq!(results.len(), 2);
    assert!(matches!(
        &results[0],
        Err(GeoshardError::MalformedIndex { tree, .. }) if tree == "broken"
    ));

    let trees = index::deserialize(&text);
    let restored = &trees["good"];
    assert_eq!(restored.node_count(), good.node_count());
    assert_eq!(restored.paths(), good.paths());
    let names: Vec<&str> = restored
        .lookup_exact("9q8y/1699920000")
        .unwrap()
        .iter()
        .map(|b| b.name.as_str())
        .collect();
    assert_eq!(names, ["b1", "b2"]);
}
