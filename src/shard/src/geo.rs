//! Planar geographic coordinates
//!
//! The system operates within a small region, so coordinates are treated
//! as planar and distance is Euclidean in coordinate units (meters in the
//! vehicular deployment).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoord {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn distance_to(&self, other: &GeoCoord) -> f64 {
        let dx = self.latitude - other.latitude;
        let dy = self.longitude - other.longitude;
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = GeoCoord::new(0.0, 0.0);
        let b = GeoCoord::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoCoord::new(-1.5, 2.0);
        let b = GeoCoord::new(4.0, -3.25);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-12);
    }
}
