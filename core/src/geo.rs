/// Great-circle distance on a spherical-earth approximation, plus the
/// radius filter that orders the discovery queue. Pure and synchronous.
use crate::rest::Candidate;
use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84-style lat/lon pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// A coordinate is usable only when both components are finite and in range
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.lat.abs() <= 90.0 && self.lon.abs() <= 180.0
    }
}

/// Haversine distance between two coordinates, in kilometers
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Keep only candidates with a valid coordinate within `max_km` of `origin`,
/// annotated with their distance and sorted ascending by it. The sort is
/// stable, so ties keep input order. Candidates with a missing or invalid
/// coordinate are excluded, never treated as distance zero.
pub fn filter_by_radius(candidates: Vec<Candidate>, origin: Coordinate, max_km: f64) -> Vec<Candidate> {
    if !origin.is_valid() {
        return Vec::new();
    }

    let mut kept: Vec<Candidate> = Vec::new();
    for mut candidate in candidates {
        let coordinate = match candidate.coordinate {
            Some(c) if c.is_valid() => c,
            _ => continue,
        };
        let distance = distance_km(origin, coordinate);
        if distance <= max_km {
            candidate.distance_km = Some(distance);
            kept.push(candidate);
        }
    }

    kept.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(user_id: &str, coordinate: Option<Coordinate>) -> Candidate {
        Candidate {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            age: None,
            bio: None,
            photo_url: None,
            coordinate,
            distance_km: None,
        }
    }

    #[test]
    fn test_distance_symmetry_and_identity() {
        let a = Coordinate::new(48.8566, 2.3522);
        let b = Coordinate::new(51.5074, -0.1278);
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
        assert!(distance_km(a, a).abs() < 1e-9);
    }

    #[test]
    fn test_distance_known_value() {
        // One degree of longitude on the equator is ~111.19 km
        let d = distance_km(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.5, "got {}", d);
    }

    #[test]
    fn test_filter_radius_scenario() {
        let origin = Coordinate::new(0.0, 0.0);
        let near = candidate("near", Some(Coordinate::new(0.0, 0.1)));
        let far = candidate("far", Some(Coordinate::new(0.0, 5.0)));

        let result = filter_by_radius(vec![far, near], origin, 50.0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].user_id, "near");
        let d = result[0].distance_km.unwrap();
        assert!((d - 11.1).abs() < 0.2, "got {}", d);
    }

    #[test]
    fn test_filter_sorted_ascending_with_stable_ties() {
        let origin = Coordinate::new(0.0, 0.0);
        let list = vec![
            candidate("c", Some(Coordinate::new(0.0, 0.3))),
            candidate("a1", Some(Coordinate::new(0.0, 0.1))),
            candidate("a2", Some(Coordinate::new(0.0, 0.1))),
            candidate("b", Some(Coordinate::new(0.0, 0.2))),
        ];
        let result = filter_by_radius(list, origin, 100.0);
        let ids: Vec<_> = result.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "b", "c"]);
        for pair in result.windows(2) {
            assert!(pair[0].distance_km.unwrap() <= pair[1].distance_km.unwrap());
        }
    }

    #[test]
    fn test_filter_excludes_missing_and_invalid_coordinates() {
        let origin = Coordinate::new(0.0, 0.0);
        let list = vec![
            candidate("none", None),
            candidate("bad-lat", Some(Coordinate::new(91.0, 0.0))),
            candidate("nan", Some(Coordinate::new(f64::NAN, 0.0))),
            candidate("ok", Some(Coordinate::new(0.0, 0.05))),
        ];
        let result = filter_by_radius(list, origin, 50.0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].user_id, "ok");
    }

    #[test]
    fn test_filter_invalid_origin_yields_empty() {
        let list = vec![candidate("ok", Some(Coordinate::new(0.0, 0.0)))];
        let result = filter_by_radius(list, Coordinate::new(f64::NAN, 0.0), 50.0);
        assert!(result.is_empty());
    }
}
