use crate::all::*;
use geo::{HaversineDestination, HaversineDistance, Point};

// Mean earth radius, matching the one the haversine formulas use.
const EARTH_RADIUS: f64 = 6371008.8;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct GeoFix {
  // Degrees.
  pub latitude: f64,
  pub longitude: f64,
}

impl GeoFix {
  pub fn new(latitude: f64, longitude: f64) -> GeoFix {
    GeoFix { latitude, longitude }
  }

  pub fn is_valid(&self) -> bool {
    self.latitude.is_finite() && self.longitude.is_finite()
      && self.latitude.abs() <= 90. && self.longitude.abs() <= 180.
  }

  fn point(&self) -> Point<f64> {
    Point::new(self.longitude, self.latitude)
  }

  // Bearing in degrees clockwise from north, distance in meters.
  pub fn destination(&self, bearing: f64, distance: f64) -> GeoFix {
    let p = self.point().haversine_destination(bearing, distance);
    GeoFix { latitude: p.y(), longitude: p.x() }
  }

  // Great-circle distance in meters.
  pub fn distance_to(&self, other: &GeoFix) -> f64 {
    self.point().haversine_distance(&other.point())
  }
}

// Bearing in degrees clockwise from north of a planar east/north offset.
pub fn offset_bearing(east: f64, north: f64) -> f64 {
  wrap_degrees(east.atan2(north).to_degrees())
}

// Equirectangular approximation of a local tangent plane around `origin`.
// Good for the few kilometers a single flight covers.
#[derive(Clone, Copy, Debug)]
pub struct LocalProjection {
  pub origin: GeoFix,
  cos_latitude: f64,
}

impl LocalProjection {
  pub fn new(origin: GeoFix) -> LocalProjection {
    LocalProjection {
      origin,
      cos_latitude: origin.latitude.to_radians().cos(),
    }
  }

  // East and north offsets in meters.
  pub fn project(&self, fix: &GeoFix) -> Vector2d {
    let lat_diff = (fix.latitude - self.origin.latitude).to_radians();
    let lon_diff = (fix.longitude - self.origin.longitude).to_radians();
    Vector2d::new(
      lon_diff * EARTH_RADIUS * self.cos_latitude,
      lat_diff * EARTH_RADIUS,
    )
  }

  pub fn unproject(&self, p: Vector2d) -> GeoFix {
    GeoFix {
      latitude: self.origin.latitude + (p[1] / EARTH_RADIUS).to_degrees(),
      longitude: self.origin.longitude + (p[0] / (EARTH_RADIUS * self.cos_latitude)).to_degrees(),
    }
  }
}
