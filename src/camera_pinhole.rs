// Distortion-free pinhole model in photogrammetric image plane coordinates:
// the camera looks down its negative z axis, image plane y points up and
// pixel rows grow downwards.

use crate::all::*;

#[derive(Clone, Debug, PartialEq)]
pub struct PinholeModel {
  // Meters.
  pub focal_length: f64,
  // Meters per pixel, horizontal and vertical.
  pub pixel_size: Vector2d,
  pub width: usize,
  pub height: usize,
}

impl PinholeModel {
  pub fn new(
    focal_length: f64,
    pixel_size: Vector2d,
    width: usize,
    height: usize,
  ) -> PinholeModel {
    PinholeModel { focal_length, pixel_size, width, height }
  }

  // Focal length from the horizontal field of view, both in sensor units.
  pub fn focal_length_from_fov(sensor_width: f64, fov_degrees: f64) -> f64 {
    (sensor_width / 2.) / (fov_degrees.to_radians() / 2.).tan()
  }

  pub fn principal_point(&self) -> Vector2d {
    Vector2d::new(self.width as f64 / 2., self.height as f64 / 2.)
  }

  // Half extents of the sensor in meters.
  pub fn half_extent(&self) -> Vector2d {
    Vector2d::new(
      self.width as f64 * self.pixel_size[0] / 2.,
      self.height as f64 * self.pixel_size[1] / 2.,
    )
  }

  // Continuous pixel coordinates to a point on the image plane (z = -f).
  pub fn pixel_to_ray(&self, pixel: Vector2d) -> Vector3d {
    let c = self.principal_point();
    Vector3d::new(
      (pixel[0] - c[0]) * self.pixel_size[0],
      -(pixel[1] - c[1]) * self.pixel_size[1],
      -self.focal_length,
    )
  }

  // Points on or behind the image plane's parallel through the projection
  // center have no pixel.
  #[inline(always)]
  pub fn ray_to_pixel(&self, ray: Vector3d) -> Option<Vector2d> {
    if !(ray[2] < 0.) { return None }
    let scale = ray[2] / -self.focal_length;
    let c = self.principal_point();
    Some(Vector2d::new(
      c[0] + ray[0] / scale / self.pixel_size[0],
      c[1] - ray[1] / scale / self.pixel_size[1],
    ))
  }

  // Image plane y coordinate to continuous pixel row.
  pub fn plane_y_to_row(&self, y: f64) -> f64 {
    self.principal_point()[1] - y / self.pixel_size[1]
  }

  pub fn contains(&self, pixel: Vector2d) -> bool {
    pixel[0] >= 0. && pixel[1] >= 0.
      && pixel[0] < self.width as f64 && pixel[1] < self.height as f64
  }
}
