//! Great-circle distances for radius search.
//!
//! Candidate rows are narrowed in SQL with a [`BoundingBox`], then filtered exactly with
//! [`haversine_km`].

/// Mean Earth radius (IUGG)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

const KM_PER_DEGREE_LAT: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, String> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(format!("latitude must be between -90 and 90, got {lat}"));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(format!("longitude must be between -180 and 180, got {lng}"));
        }
        Ok(Self { lat, lng })
    }

    /// Build from optional columns, `None` unless both are present and valid
    pub fn from_optional(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        Self::new(lat?, lng?).ok()
    }
}

/// Haversine distance between two points in kilometres
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(-1.0, 1.0).asin()
}

/// Axis-aligned box that contains every point within a radius of a centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(center: Coordinates, radius_km: f64) -> Self {
        let radius_km = radius_km.max(0.0);
        let d_lat = radius_km / KM_PER_DEGREE_LAT;
        let min_lat = center.lat - d_lat;
        let max_lat = center.lat + d_lat;

        // Near the poles or across the antimeridian, fall back to every longitude
        let cos_lat = center.lat.to_radians().cos();
        if min_lat <= -90.0 || max_lat >= 90.0 || cos_lat <= f64::EPSILON {
            return Self {
                min_lat: min_lat.max(-90.0),
                max_lat: max_lat.min(90.0),
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        let d_lng = radius_km / (KM_PER_DEGREE_LAT * cos_lat);
        let (min_lng, max_lng) = (center.lng - d_lng, center.lng + d_lng);
        if min_lng < -180.0 || max_lng > 180.0 {
            return Self {
                min_lat,
                max_lat,
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat) && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[test]
    fn test_known_distances() {
        let paris = point(48.8566, 2.3522);
        let london = point(51.5074, -0.1278);
        let d = haversine_km(paris, london);
        assert!((d - 343.5).abs() < 2.0, "paris-london was {d}");

        assert_eq!(haversine_km(paris, paris), 0.0);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, -181.0).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::from_optional(Some(10.0), None).is_none());
    }

    #[test]
    fn test_bounding_box_contains_every_point_in_radius() {
        let center = point(40.4168, -3.7038);
        let radius = 25.0;
        let bbox = BoundingBox::around(center, radius);

        for bearing in 0..16 {
            let angle = (bearing as f64) * std::f64::consts::PI / 8.0;
            // ~24 km away in each direction
            let candidate = point(
                center.lat + (24.0 / 111.32) * angle.cos(),
                center.lng + (24.0 / (111.32 * center.lat.to_radians().cos())) * angle.sin(),
            );
            assert!(haversine_km(center, candidate) <= radius);
            assert!(bbox.contains(candidate));
        }

        assert!(!bbox.contains(point(41.5, -3.7)));
    }

    #[test]
    fn test_bounding_box_antimeridian_spans_all_longitudes() {
        let bbox = BoundingBox::around(point(0.0, 179.9), 50.0);
        assert_eq!(bbox.min_lng, -180.0);
        assert_eq!(bbox.max_lng, 180.0);
        assert!(bbox.contains(point(0.0, -179.9)));
    }
}
