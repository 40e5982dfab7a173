use crate::all::*;

// Everything derived from one log record that the rectification, the point
// locator and the evaluator need. Read-only once built, shared across the
// parallel loops of a frame.
#[derive(Clone, Debug)]
pub struct FrameGeometry {
  pub frame_id: FrameId,
  pub camera: Camera,
  pub gsd: Gsd,
  pub boundary: GroundBoundary,
  pub ground_height: f64,
}

impl FrameGeometry {
  pub fn resolve(
    frame_id: FrameId,
    record: &LogRecord,
    sensors: &SensorTable,
    projection: Option<&LocalProjection>,
    image_size: [usize; 2],
    params: &ParameterSet,
  ) -> Result<FrameGeometry, GeometryError> {
    let height = record.height()?;
    let gimbal = record.gimbal()?;
    let planar = match (projection, record.fix()) {
      (Some(projection), Some(fix)) => projection.project(&fix),
      _ => Vector2d::zeros(),
    };
    let position = Vector3d::new(planar[0], planar[1], height);
    let (profile, fallback) = sensors.resolve(record.drone_model());
    let mut camera = Camera::from_gimbal(profile, image_size, params.gsd_mode, position, gimbal)?;
    camera.fallback_profile = fallback;
    FrameGeometry::new(frame_id, camera, record.gsd.or(params.gsd), params)
  }

  // `fixed_gsd` replaces the computed nadir GSD, typically a calibrated value.
  pub fn new(
    frame_id: FrameId,
    camera: Camera,
    fixed_gsd: Option<f64>,
    params: &ParameterSet,
  ) -> Result<FrameGeometry, GeometryError> {
    let ground_height = params.ground_height;
    let gsd = Gsd::resolve(&camera, ground_height, fixed_gsd)?;
    let boundary = GroundBoundary::compute(
      &camera,
      gsd,
      ground_height,
      params.horizon_offset_ratio,
    )?;
    debug!("Frame {}: {}x{} raster, gsd {:.4} m/px{}.", frame_id, boundary.cols, boundary.rows,
      gsd.x, if boundary.is_clamped() { ", clamped at the horizon" } else { "" });
    Ok(FrameGeometry { frame_id, camera, gsd, boundary, ground_height })
  }

  pub fn image_size(&self) -> [usize; 2] {
    [self.camera.model.width, self.camera.model.height]
  }

  // Ground point of a raster position. Integer positions are the top left
  // corners of cells.
  #[inline(always)]
  pub fn cell_to_world(&self, col: f64, row: f64) -> Vector3d {
    Vector3d::new(
      self.boundary.left + col * self.gsd.x,
      self.boundary.top - row * self.gsd.y,
      self.ground_height,
    )
  }

  pub fn world_to_cell(&self, p: &Vector3d) -> Vector2d {
    Vector2d::new(
      (p[0] - self.boundary.left) / self.gsd.x,
      (self.boundary.top - p[1]) / self.gsd.y,
    )
  }

  // Forward projection shared by rectification and grid search.
  #[inline(always)]
  pub fn cell_to_pixel(&self, col: f64, row: f64) -> Option<Vector2d> {
    self.camera.world_to_pixel(&self.cell_to_world(col, row))
  }

  // Closed-form inverse of `cell_to_pixel`.
  pub fn pixel_to_cell(&self, pixel: Vector2d) -> Option<Vector2d> {
    let p = self.camera.pixel_to_ground(pixel, self.ground_height)?;
    Some(self.world_to_cell(&p))
  }

  // Raster position right below the camera.
  pub fn nadir_cell(&self) -> Vector2d {
    let c = self.camera.position;
    self.world_to_cell(&Vector3d::new(c[0], c[1], self.ground_height))
  }

  // Source pixels inside the image and below the horizon clamp.
  pub fn covers_pixel(&self, pixel: Vector2d) -> bool {
    if !self.camera.model.contains(pixel) { return false }
    match self.boundary.usable_rows {
      Some((top, bottom)) => pixel[1] >= top && pixel[1] <= bottom,
      None => true,
    }
  }

  pub fn contains_cell(&self, cell: Vector2d) -> bool {
    cell[0] >= 0. && cell[1] >= 0.
      && cell[0] <= self.boundary.cols as f64 && cell[1] <= self.boundary.rows as f64
  }

  // The ray/plane inverse is exact whenever the whole image reaches the
  // ground. Clamped frames fall back to searching the raster.
  pub fn is_analytically_invertible(&self) -> bool {
    !self.boundary.is_clamped()
  }
}
