use crate::all::*;

const MIN_USABLE_PLANE_SPAN: f64 = 1e-9;

// Ground sample distance in meters per raster cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Gsd {
  pub x: f64,
  pub y: f64,
}

impl Gsd {
  pub fn isotropic(value: f64) -> Gsd {
    Gsd { x: value, y: value }
  }

  // Nadir GSD: pixel size scaled by height over focal length.
  pub fn compute(camera: &Camera, ground_height: f64) -> Result<Gsd, GeometryError> {
    let h = camera.height_above(ground_height);
    if !(h > 0.) {
      return Err(GeometryError::NonPositiveHeight {
        altitude: camera.position[2],
        ground_height,
      });
    }
    let scale = h / camera.model.focal_length;
    let gsd = Gsd {
      x: camera.model.pixel_size[0] * scale,
      y: camera.model.pixel_size[1] * scale,
    };
    for v in [gsd.x, gsd.y] {
      if !(v > 0.) || !v.is_finite() { return Err(GeometryError::NonPositiveGsd(v)) }
    }
    Ok(gsd)
  }

  // A known GSD, for instance from `calibrate_gsd`. The camera must still be
  // above the ground.
  pub fn fixed(camera: &Camera, ground_height: f64, value: f64) -> Result<Gsd, GeometryError> {
    if !(camera.height_above(ground_height) > 0.) {
      return Err(GeometryError::NonPositiveHeight {
        altitude: camera.position[2],
        ground_height,
      });
    }
    if !(value > 0.) || !value.is_finite() { return Err(GeometryError::NonPositiveGsd(value)) }
    Ok(Gsd::isotropic(value))
  }

  // A fixed value of zero asks for the computed GSD.
  pub fn resolve(camera: &Camera, ground_height: f64, fixed: Option<f64>) -> Result<Gsd, GeometryError> {
    match fixed {
      Some(value) if value != 0. => Gsd::fixed(camera, ground_height, value),
      _ => Gsd::compute(camera, ground_height),
    }
  }

  pub fn mean(&self) -> f64 {
    (self.x + self.y) / 2.
  }
}

// Axis-aligned ground rectangle covered by the usable part of the image, and
// the raster laid over it. Rows run from `top` (north) towards `bottom`.
#[derive(Clone, Debug, PartialEq)]
pub struct GroundBoundary {
  pub left: f64,
  pub right: f64,
  pub top: f64,
  pub bottom: f64,
  pub rows: usize,
  pub cols: usize,
  // Source pixel rows that reach the ground, set when the image had to be
  // clamped near the horizon.
  pub usable_rows: Option<(f64, f64)>,
}

impl GroundBoundary {
  pub fn compute(
    camera: &Camera,
    gsd: Gsd,
    ground_height: f64,
    horizon_offset_ratio: f64,
  ) -> Result<GroundBoundary, GeometryError> {
    if !(camera.height_above(ground_height) > 0.) {
      return Err(GeometryError::NonPositiveHeight {
        altitude: camera.position[2],
        ground_height,
      });
    }
    let half = camera.model.half_extent();
    let offset = horizon_offset_ratio * 2. * half[1];
    let (y_lo, y_hi) = usable_plane_rows(camera, half, offset)?;

    let f = camera.model.focal_length;
    let corners = [
      Vector3d::new(-half[0], y_hi, -f),
      Vector3d::new(half[0], y_hi, -f),
      Vector3d::new(half[0], y_lo, -f),
      Vector3d::new(-half[0], y_lo, -f),
    ];
    let mut left = f64::INFINITY;
    let mut right = f64::NEG_INFINITY;
    let mut top = f64::NEG_INFINITY;
    let mut bottom = f64::INFINITY;
    for corner in corners {
      let p = camera.plane_to_ground(corner, ground_height)
        .ok_or(GeometryError::NearHorizontal)?;
      left = left.min(p[0]);
      right = right.max(p[0]);
      bottom = bottom.min(p[1]);
      top = top.max(p[1]);
    }
    if ![left, right, top, bottom].iter().all(|x| x.is_finite()) {
      return Err(GeometryError::NearHorizontal);
    }

    let cols = cells_along((right - left) / gsd.x);
    let rows = cells_along((top - bottom) / gsd.y);
    if rows == 0 || cols == 0 {
      return Err(GeometryError::EmptyBoundary { rows, cols });
    }

    let clamped = y_hi < half[1] || y_lo > -half[1];
    let usable_rows = if clamped {
      Some((camera.model.plane_y_to_row(y_hi), camera.model.plane_y_to_row(y_lo)))
    }
    else {
      None
    };
    Ok(GroundBoundary { left, right, top, bottom, rows, cols, usable_rows })
  }

  // Raster cells, `None` on overflow.
  pub fn cell_count(&self) -> Option<usize> {
    self.rows.checked_mul(self.cols)
  }

  pub fn fits(&self, max_cells: usize) -> bool {
    self.cell_count().map_or(false, |n| n <= max_cells)
  }

  // Needed before allocating or scanning the raster, the boundary itself may
  // span far more cells near the horizon.
  pub fn check_cell_limit(&self, max_cells: usize) -> Result<(), GeometryError> {
    if self.fits(max_cells) { return Ok(()) }
    Err(GeometryError::BoundaryTooLarge { rows: self.rows, cols: self.cols })
  }

  pub fn is_clamped(&self) -> bool {
    self.usable_rows.is_some()
  }

  pub fn width(&self) -> f64 {
    self.right - self.left
  }

  pub fn height(&self) -> f64 {
    self.top - self.bottom
  }
}

// Float cell counts come from extents that may be huge near the horizon.
fn cells_along(x: f64) -> usize {
  if !(x >= 0.) { return 0 }
  if x >= usize::MAX as f64 { return usize::MAX }
  x.floor() as usize
}

// Range `[y_lo, y_hi]` of image plane y coordinates whose rays reach the
// ground on both image sides, kept `offset` clear of the horizon.
//
// The world z component of the ray through (x, y, -f) is linear:
// dz = a x + b y + c. The horizon on each image side is where dz = 0.
fn usable_plane_rows(
  camera: &Camera,
  half: Vector2d,
  offset: f64,
) -> Result<(f64, f64), GeometryError> {
  let rt = camera.rotation.transpose();
  let a = rt[(2, 0)];
  let b = rt[(2, 1)];
  let c = -camera.model.focal_length * rt[(2, 2)];

  let mut y_lo = -half[1];
  let mut y_hi = half[1];
  for x in [-half[0], half[0]] {
    let constant = a * x + c;
    if b.abs() < f64::EPSILON {
      if !(constant < 0.) { return Err(GeometryError::NearHorizontal) }
      continue;
    }
    let horizon = -constant / b;
    if b > 0. {
      y_hi = y_hi.min(horizon - offset);
    }
    else {
      y_lo = y_lo.max(horizon + offset);
    }
  }
  if !(y_hi - y_lo > MIN_USABLE_PLANE_SPAN) {
    return Err(GeometryError::NearHorizontal);
  }
  Ok((y_lo, y_hi))
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{Rng, SeedableRng};

  fn camera(size: [usize; 2], altitude: f64, gimbal: Vector3d) -> Camera {
    let sensors = SensorTable::builtin();
    let (profile, _) = sensors.resolve("MAVIC PRO");
    Camera::from_gimbal(profile, size, GsdMode::Isotropic, Vector3d::new(0., 0., altitude), gimbal)
      .unwrap()
  }

  #[test]
  fn test_gsd_grows_with_altitude() {
    let mut previous = 0.;
    for altitude in [1., 10., 50., 120., 500.] {
      let gsd = Gsd::compute(&camera([4000, 3000], altitude, Vector3d::new(0., -90., 0.)), 0.)
        .unwrap();
      assert!(gsd.x > previous);
      assert_eq!(gsd.x, gsd.y);
      previous = gsd.x;
    }
  }

  #[test]
  fn test_gsd_requires_height() {
    let c = camera([640, 480], 10., Vector3d::new(0., -90., 0.));
    assert!(matches!(Gsd::compute(&c, 10.), Err(GeometryError::NonPositiveHeight { .. })));
    assert!(matches!(Gsd::compute(&c, 20.), Err(GeometryError::NonPositiveHeight { .. })));
  }

  #[test]
  fn test_fixed_gsd() {
    let c = camera([640, 480], 50., Vector3d::new(0., -90., 0.));
    assert_eq!(Gsd::resolve(&c, 0., Some(0.02)).unwrap(), Gsd::isotropic(0.02));
    assert_eq!(Gsd::resolve(&c, 0., Some(0.)).unwrap(), Gsd::compute(&c, 0.).unwrap());
    assert_eq!(Gsd::resolve(&c, 0., None).unwrap(), Gsd::compute(&c, 0.).unwrap());
    assert_eq!(Gsd::resolve(&c, 0., Some(-1.)), Err(GeometryError::NonPositiveGsd(-1.)));
    assert!(matches!(Gsd::resolve(&c, 60., Some(0.02)),
      Err(GeometryError::NonPositiveHeight { .. })));
  }

  #[test]
  fn test_nadir_boundary() {
    let c = camera([4000, 3000], 100., Vector3d::new(0., -90., 0.));
    let gsd = Gsd::compute(&c, 0.).unwrap();
    let b = GroundBoundary::compute(&c, gsd, 0., 0.1).unwrap();
    assert!(!b.is_clamped());
    assert!((b.left + b.right).abs() < 1e-9);
    assert!((b.top + b.bottom).abs() < 1e-9);
    // The nadir raster matches the image size up to flooring.
    assert!((3999..=4000).contains(&b.cols));
    assert!((2999..=3000).contains(&b.rows));
  }

  #[test]
  fn test_boundary_non_empty_for_tilted_poses() {
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(3);
    for _ in 0..500 {
      let altitude = rng.gen_range(0.5..=500.);
      let gimbal = Vector3d::new(
        rng.gen_range(-45.0..=45.),
        -90. + rng.gen_range(-45.0..=45.),
        rng.gen_range(0.0..360.),
      );
      let c = camera([4000, 3000], altitude, gimbal);
      let gsd = Gsd::compute(&c, 0.).unwrap();
      let b = GroundBoundary::compute(&c, gsd, 0., 0.1).unwrap();
      assert!(b.rows > 0 && b.cols > 0);
      assert!(b.right > b.left && b.top > b.bottom);
    }
  }

  #[test]
  fn test_horizon_clamp() {
    // 70 degrees of tilt puts the image top above the horizon.
    let c = camera([640, 480], 50., Vector3d::new(0., -20., 0.));
    let gsd = Gsd::compute(&c, 0.).unwrap();
    let b = GroundBoundary::compute(&c, gsd, 0., 0.1).unwrap();
    let (top_row, bottom_row) = b.usable_rows.unwrap();
    assert!(top_row > 0. && top_row < 480.);
    assert!((bottom_row - 480.).abs() < 1e-9);
    // The clamped top edge still hits the ground.
    assert!(c.pixel_to_ground(Vector2d::new(0., top_row), 0.).is_some());
    assert!(c.pixel_to_ground(Vector2d::new(640., top_row), 0.).is_some());
  }

  #[test]
  fn test_horizontal_camera_fails() {
    let c = camera([640, 480], 50., Vector3d::new(0., 0., 0.));
    let gsd = Gsd::compute(&c, 0.).unwrap();
    let r = GroundBoundary::compute(&c, gsd, 0., 0.5);
    assert_eq!(r, Err(GeometryError::NearHorizontal));
  }

  #[test]
  fn test_cell_limit() {
    let c = camera([4000, 3000], 100., Vector3d::new(0., -90., 0.));
    let gsd = Gsd::compute(&c, 0.).unwrap();
    let b = GroundBoundary::compute(&c, gsd, 0., 0.1).unwrap();
    let n = b.cell_count().unwrap();
    assert!(b.fits(n));
    assert!(b.check_cell_limit(n).is_ok());
    assert!(!b.fits(1000));
    assert_eq!(b.check_cell_limit(1000),
      Err(GeometryError::BoundaryTooLarge { rows: b.rows, cols: b.cols }));
  }

  #[test]
  fn test_anisotropic_gsd() {
    // 16:9 frames on the 4:3 sensor stretch the vertical pixel size.
    let sensors = SensorTable::builtin();
    let (profile, _) = sensors.resolve("MAVIC PRO");
    let c = Camera::from_gimbal(profile, [1920, 1080], GsdMode::Anisotropic,
      Vector3d::new(0., 0., 100.), Vector3d::new(0., -90., 0.)).unwrap();
    let gsd = Gsd::compute(&c, 0.).unwrap();
    let ratio = (4.7 / 1080.) / (6.3 / 1920.);
    assert!((gsd.y / gsd.x - ratio).abs() < 1e-9);
    assert!(gsd.y > gsd.x);
    assert!((gsd.mean() - (gsd.x + gsd.y) / 2.).abs() < 1e-15);

    // The nadir raster still lines up with the image grid on both axes.
    let b = GroundBoundary::compute(&c, gsd, 0., 0.1).unwrap();
    assert!((1919..=1920).contains(&b.cols));
    assert!((1079..=1080).contains(&b.rows));
  }
}
