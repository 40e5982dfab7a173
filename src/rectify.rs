use crate::all::*;

// Ground-aligned raster with the source channels plus an alpha channel.
// Alpha 0 marks cells that no source pixel covers.
#[derive(Clone, Debug, PartialEq)]
pub struct RectifiedRaster {
  pub frame_id: FrameId,
  pub image: Image,
}

impl RectifiedRaster {
  pub fn rows(&self) -> usize {
    self.image.height
  }

  pub fn cols(&self) -> usize {
    self.image.width
  }

  pub fn value(&self, col: usize, row: usize) -> Option<&[u8]> {
    let p = self.image.pixel(col, row);
    let (alpha, color) = p.split_last()?;
    if *alpha == 0 { None } else { Some(color) }
  }

  pub fn coverage(&self) -> f64 {
    let n = self.rows() * self.cols();
    if n == 0 { return 0. }
    let c = self.image.channels;
    let valid = self.image.data.chunks_exact(c).filter(|p| p[c - 1] != 0).count();
    valid as f64 / n as f64
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    self.image.save(path)
  }
}

pub struct Rectifier {
  resampling: Resampling,
  timeout: Option<Duration>,
  max_cells: usize,
}

impl Rectifier {
  pub fn new(params: &ParameterSet) -> Rectifier {
    Rectifier {
      resampling: params.resampling,
      timeout: params.frame_timeout(),
      max_cells: params.max_boundary_cells,
    }
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Rectifier {
    self.timeout = timeout;
    self
  }

  // Backward mapping: every raster cell is projected into the source image
  // and sampled there. Rows are filled in parallel.
  pub fn rectify(
    &self,
    geometry: &FrameGeometry,
    source: &Image,
  ) -> Result<RectifiedRaster, GeometryError> {
    self.rectify_with_deadline(geometry, source, self.timeout.map(|t| Instant::now() + t))
  }

  pub fn rectify_with_deadline(
    &self,
    geometry: &FrameGeometry,
    source: &Image,
    deadline: Option<Instant>,
  ) -> Result<RectifiedRaster, GeometryError> {
    if [source.width, source.height] != geometry.image_size() {
      return Err(GeometryError::malformed(format!(
        "frame {} is {}x{}, expected {:?}",
        geometry.frame_id, source.width, source.height, geometry.image_size())));
    }
    if source.channels == 0 || source.channels > 3 {
      return Err(GeometryError::malformed(format!("{} source channels", source.channels)));
    }
    geometry.boundary.check_cell_limit(self.max_cells)?;
    let rows = geometry.boundary.rows;
    let cols = geometry.boundary.cols;
    let channels = source.channels + 1;
    let mut image = Image::new(cols, rows, channels);
    let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0);

    image.data.par_chunks_mut(cols * channels).enumerate().try_for_each(|(row, out)| {
      if let Some(deadline) = deadline {
        if Instant::now() >= deadline { return Err(GeometryError::Timeout(timeout_ms)) }
      }
      for col in 0..cols {
        let pixel = match geometry.cell_to_pixel(col as f64, row as f64) {
          Some(p) => p,
          None => continue,
        };
        if !geometry.covers_pixel(pixel) { continue }
        let cell = &mut out[col * channels .. (col + 1) * channels];
        match self.resampling {
          Resampling::Nearest => sample_nearest(source, pixel, cell),
          Resampling::Bilinear => sample_bilinear(source, pixel, cell),
        }
        cell[channels - 1] = 255;
      }
      Ok(())
    })?;

    Ok(RectifiedRaster { frame_id: geometry.frame_id, image })
  }
}

// The pixel must be inside the image.
#[inline(always)]
fn sample_nearest(source: &Image, pixel: Vector2d, out: &mut [u8]) {
  let x = pixel[0].floor() as usize;
  let y = pixel[1].floor() as usize;
  let c = source.channels;
  out[..c].copy_from_slice(source.pixel(x, y));
}

// Interpolates between pixel centers, edges are extended.
#[inline(always)]
fn sample_bilinear(source: &Image, pixel: Vector2d, out: &mut [u8]) {
  let u = pixel[0] - 0.5;
  let v = pixel[1] - 0.5;
  let x0 = u.floor();
  let y0 = v.floor();
  let ax = u - x0;
  let ay = v - y0;
  let clamp = |x: f64, n: usize| x.max(0.).min((n - 1) as f64) as usize;
  let x0i = clamp(x0, source.width);
  let x1i = clamp(x0 + 1., source.width);
  let y0i = clamp(y0, source.height);
  let y1i = clamp(y0 + 1., source.height);
  for c in 0..source.channels {
    let top = (1. - ax) * source.value(x0i, y0i, c) as f64 + ax * source.value(x1i, y0i, c) as f64;
    let bottom = (1. - ax) * source.value(x0i, y1i, c) as f64 + ax * source.value(x1i, y1i, c) as f64;
    out[c] = ((1. - ay) * top + ay * bottom).round().clamp(0., 255.) as u8;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::tests::test_geometry;

  // Horizontal gradient, four levels per column.
  fn gradient(width: usize, height: usize, channels: usize) -> Image {
    let mut image = Image::new(width, height, channels);
    for y in 0..height {
      for x in 0..width {
        for v in image.pixel_mut(x, y) { *v = (4 * x) as u8 }
      }
    }
    image
  }

  fn params(resampling: Resampling) -> ParameterSet {
    ParameterSet { resampling, ..ParameterSet::default() }
  }

  #[test]
  fn test_nearest_is_deterministic() {
    let g = test_geometry([64, 48], 30., [3., -75., 20.]);
    let source = gradient(64, 48, 3);
    let rectifier = Rectifier::new(&params(Resampling::Nearest));
    let a = rectifier.rectify(&g, &source).unwrap();
    let b = rectifier.rectify(&g, &source).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.rows(), g.boundary.rows);
    assert_eq!(a.cols(), g.boundary.cols);
    assert_eq!(a.image.channels, 4);
    assert!(a.coverage() > 0.2);
  }

  #[test]
  fn test_nearest_against_bilinear() {
    let g = test_geometry([64, 48], 30., [0., -90., 0.]);
    let source = gradient(64, 48, 1);
    let nearest = Rectifier::new(&params(Resampling::Nearest)).rectify(&g, &source).unwrap();
    let bilinear = Rectifier::new(&params(Resampling::Bilinear)).rectify(&g, &source).unwrap();
    let mut max_difference = 0;
    for row in 0..nearest.rows() {
      for col in 0..nearest.cols() {
        match (nearest.value(col, row), bilinear.value(col, row)) {
          (Some(a), Some(b)) => {
            let d = (a[0] as i32 - b[0] as i32).abs();
            max_difference = max_difference.max(d);
          },
          (None, None) => {},
          _ => panic!("No-data masks differ at {} {}", col, row),
        }
      }
    }
    // Aliased, but never more than one gradient step off.
    assert!(max_difference > 0);
    assert!(max_difference <= 4);
  }

  #[test]
  fn test_nadir_covers_whole_raster() {
    let g = test_geometry([64, 48], 30., [0., -90., 0.]);
    let raster = Rectifier::new(&ParameterSet::default()).rectify(&g, &gradient(64, 48, 1)).unwrap();
    assert!(raster.coverage() > 0.9);
  }

  #[test]
  fn test_clamped_frame_has_no_data_above_horizon() {
    let g = test_geometry([64, 48], 30., [0., -20., 0.]);
    assert!(g.boundary.is_clamped());
    let raster = Rectifier::new(&ParameterSet::default()).rectify(&g, &gradient(64, 48, 3)).unwrap();
    let coverage = raster.coverage();
    assert!(coverage > 0. && coverage < 1.);
  }

  #[test]
  fn test_size_mismatch() {
    let g = test_geometry([64, 48], 30., [0., -90., 0.]);
    let r = Rectifier::new(&ParameterSet::default()).rectify(&g, &gradient(32, 48, 1));
    assert!(matches!(r, Err(GeometryError::MalformedInput(_))));
  }

  #[test]
  fn test_cell_limit_applies_to_raster() {
    let g = test_geometry([64, 48], 30., [0., -90., 0.]);
    let params = ParameterSet { max_boundary_cells: 100, ..ParameterSet::default() };
    let r = Rectifier::new(&params).rectify(&g, &gradient(64, 48, 1));
    assert_eq!(r, Err(GeometryError::BoundaryTooLarge { rows: g.boundary.rows, cols: g.boundary.cols }));
  }

  #[test]
  fn test_deadline_abandons_frame() {
    let g = test_geometry([64, 48], 30., [0., -90., 0.]);
    let rectifier = Rectifier::new(&ParameterSet::default())
      .with_timeout(Some(Duration::from_millis(0)));
    let r = rectifier.rectify(&g, &gradient(64, 48, 1));
    assert_eq!(r, Err(GeometryError::Timeout(0)));
  }
}
