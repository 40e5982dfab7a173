use crate::all::*;

// Pose and intrinsics of the drone camera for one frame. World coordinates
// are local east, north and up in meters.
#[derive(Clone, Debug)]
pub struct Camera {
  pub model: PinholeModel,
  // Projection center.
  pub position: Vector3d,
  // Omega, phi, kappa in radians.
  pub opk: Vector3d,
  // World to camera.
  pub rotation: Matrix3d,
  // Set when the drone model was unknown and the default sensor was used.
  pub fallback_profile: bool,
}

pub fn pinhole_from_profile(
  profile: &SensorProfile,
  width: usize,
  height: usize,
  gsd_mode: GsdMode,
) -> PinholeModel {
  let sensor_width = profile.sensorWidthMm * 1e-3;
  let sensor_height = profile.sensorHeightMm * 1e-3;
  let focal_length = PinholeModel::focal_length_from_fov(sensor_width, profile.fovDegrees);
  let px = sensor_width / width as f64;
  let py = match gsd_mode {
    GsdMode::Isotropic => px,
    GsdMode::Anisotropic => sensor_height / height as f64,
  };
  PinholeModel::new(focal_length, Vector2d::new(px, py), width, height)
}

impl Camera {
  pub fn new(model: PinholeModel, position: Vector3d, opk: Vector3d) -> Camera {
    Camera {
      model,
      position,
      opk,
      rotation: rotation_opk(opk[0], opk[1], opk[2]),
      fallback_profile: false,
    }
  }

  // Builds the camera from gimbal angles in degrees.
  pub fn from_gimbal(
    profile: &SensorProfile,
    image_size: [usize; 2],
    gsd_mode: GsdMode,
    position: Vector3d,
    gimbal: Vector3d,
  ) -> Result<Camera, GeometryError> {
    let [width, height] = image_size;
    if width == 0 || height == 0 {
      return Err(GeometryError::malformed(format!("image size {}x{}", width, height)));
    }
    if position.iter().any(|x| !x.is_finite()) {
      return Err(GeometryError::malformed(format!("camera position {:?}", position.as_slice())));
    }
    if gimbal.iter().any(|x| !x.is_finite()) {
      return Err(GeometryError::malformed(format!("gimbal angles {:?}", gimbal.as_slice())));
    }
    let opk = rpy_to_opk(gimbal[0], gimbal[1], gimbal[2]).map(|a| a.to_radians());
    let model = pinhole_from_profile(profile, width, height, gsd_mode);
    Ok(Camera::new(model, position, opk))
  }

  #[inline(always)]
  pub fn world_to_camera(&self, p: &Vector3d) -> Vector3d {
    self.rotation * (p - self.position)
  }

  #[inline(always)]
  pub fn world_to_pixel(&self, p: &Vector3d) -> Option<Vector2d> {
    self.model.ray_to_pixel(self.world_to_camera(p))
  }

  // Direction of the viewing ray through an image plane point, in world
  // coordinates.
  pub fn plane_to_world_direction(&self, plane: Vector3d) -> Vector3d {
    self.rotation.transpose() * plane
  }

  // Intersection of the viewing ray through an image plane point with the
  // horizontal plane z = `ground_height`.
  pub fn plane_to_ground(&self, plane: Vector3d, ground_height: f64) -> Option<Vector3d> {
    let d = self.plane_to_world_direction(plane);
    let scale = (ground_height - self.position[2]) / d[2];
    if !(scale > 0.) || !scale.is_finite() { return None }
    Some(Vector3d::new(
      self.position[0] + scale * d[0],
      self.position[1] + scale * d[1],
      ground_height,
    ))
  }

  pub fn pixel_to_ground(&self, pixel: Vector2d, ground_height: f64) -> Option<Vector3d> {
    self.plane_to_ground(self.model.pixel_to_ray(pixel), ground_height)
  }

  pub fn height_above(&self, ground_height: f64) -> f64 {
    self.position[2] - ground_height
  }
}
