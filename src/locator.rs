use crate::all::*;

// How pixel positions are mapped back into the rectified raster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InverseStrategy {
  // Ray/plane intersection, exact and constant time.
  ClosedForm,
  // Projects every raster cell forward and keeps the closest one within
  // `margin` pixels of the target.
  GridSearch { margin: f64 },
}

impl InverseStrategy {
  // Clamped frames are searched unless their raster is over `max_cells`, then
  // the closed form is the only way to place anything.
  pub fn select(
    choice: LocatorChoice,
    geometry: &FrameGeometry,
    margin: f64,
    max_cells: usize,
  ) -> InverseStrategy {
    match choice {
      LocatorChoice::ClosedForm => InverseStrategy::ClosedForm,
      LocatorChoice::GridSearch => InverseStrategy::GridSearch { margin },
      LocatorChoice::Auto => {
        if geometry.is_analytically_invertible() {
          InverseStrategy::ClosedForm
        }
        else if geometry.boundary.fits(max_cells) {
          InverseStrategy::GridSearch { margin }
        }
        else {
          debug!("Frame {}: {}x{} raster too large to search, locating in closed form.",
            geometry.frame_id, geometry.boundary.cols, geometry.boundary.rows);
          InverseStrategy::ClosedForm
        }
      },
    }
  }
}

// Best grid search candidate: squared pixel distance, then row, then column.
type Candidate = (f64, usize, usize);

fn better(a: Option<Candidate>, b: Option<Candidate>) -> Option<Candidate> {
  match (a, b) {
    (Some(a), Some(b)) => {
      let a_first = a.0 < b.0 || (a.0 == b.0 && (a.1, a.2) <= (b.1, b.2));
      Some(if a_first { a } else { b })
    },
    (a, None) => a,
    (None, b) => b,
  }
}

pub struct PointLocator<'a> {
  geometry: &'a FrameGeometry,
  strategy: InverseStrategy,
  max_cells: usize,
  deadline: Option<Instant>,
  // Reported in `GeometryError::Timeout`.
  timeout_ms: u64,
}

impl<'a> PointLocator<'a> {
  pub fn new(geometry: &'a FrameGeometry, strategy: InverseStrategy) -> PointLocator<'a> {
    PointLocator {
      geometry,
      strategy,
      max_cells: usize::MAX,
      deadline: None,
      timeout_ms: 0,
    }
  }

  pub fn from_parameters(geometry: &'a FrameGeometry, params: &ParameterSet) -> PointLocator<'a> {
    let strategy = InverseStrategy::select(
      params.locator, geometry, params.locator_margin, params.max_boundary_cells);
    PointLocator::new(geometry, strategy)
      .with_cell_limit(params.max_boundary_cells)
  }

  pub fn with_cell_limit(mut self, max_cells: usize) -> PointLocator<'a> {
    self.max_cells = max_cells;
    self
  }

  // A grid search still running at `deadline` abandons the frame.
  pub fn with_deadline(mut self, deadline: Option<Instant>, timeout_ms: u64) -> PointLocator<'a> {
    self.deadline = deadline;
    self.timeout_ms = timeout_ms;
    self
  }

  pub fn strategy(&self) -> InverseStrategy {
    self.strategy
  }

  // Raster (col, row) of a source pixel, `None` when the pixel has no ground
  // position inside the raster.
  pub fn locate(&self, pixel: Vector2d) -> Result<Option<Vector2d>, GeometryError> {
    Ok(self.locate_many(&[pixel])?[0])
  }

  pub fn locate_many(&self, pixels: &[Vector2d]) -> Result<Vec<Option<Vector2d>>, GeometryError> {
    match self.strategy {
      InverseStrategy::ClosedForm => Ok(pixels.iter()
        .map(|&p| self.closed_form(p))
        .collect()),
      InverseStrategy::GridSearch { margin } => self.grid_search(pixels, margin),
    }
  }

  // The raster box spanned by the four located corners. Any corner that
  // cannot be located leaves the whole box unresolved.
  pub fn locate_box(&self, bbox: &BoundingBox) -> Result<Option<BoundingBox>, GeometryError> {
    let corners: Option<Vec<Vector2d>> = self.locate_many(&bbox.corners())?.into_iter().collect();
    Ok(corners.as_deref().and_then(BoundingBox::from_points))
  }

  pub fn locate_points(&self, points: &[ObjectPoint]) -> Result<Vec<RectifiedPoint>, GeometryError> {
    let pixels: Vec<Vector2d> = points.iter().map(|p| p.pixel).collect();
    Ok(self.locate_many(&pixels)?.into_iter().zip(points)
      .map(|(cell, p)| RectifiedPoint {
        frame_id: p.frame_id,
        track_id: p.track_id,
        class_id: p.class_id,
        cell,
      })
      .collect())
  }

  // GSD that makes the raster distance between two source pixels equal a
  // known ground distance in meters.
  pub fn calibrate_gsd(&self, a: Vector2d, b: Vector2d, meters: f64) -> Result<Gsd, GeometryError> {
    if !(meters > 0.) || !meters.is_finite() {
      return Err(GeometryError::malformed(format!("calibration distance {} m", meters)));
    }
    let cells = match self.locate_many(&[a, b])?.as_slice() {
      [Some(a), Some(b)] => (b - a).norm(),
      _ => return Err(GeometryError::malformed(format!(
        "calibration points {:?} and {:?} are outside frame {}",
        a.as_slice(), b.as_slice(), self.geometry.frame_id))),
    };
    let value = meters / cells;
    if !(value > 0.) || !value.is_finite() { return Err(GeometryError::NonPositiveGsd(value)) }
    Ok(Gsd::isotropic(value))
  }

  fn closed_form(&self, pixel: Vector2d) -> Option<Vector2d> {
    if !self.geometry.covers_pixel(pixel) { return None }
    let cell = self.geometry.pixel_to_cell(pixel)?;
    if !self.geometry.contains_cell(cell) { return None }
    Some(cell)
  }

  // One pass over the raster serves all targets. Rows are searched in
  // parallel and the per-row winners reduced in a fixed order, so results do
  // not depend on scheduling.
  fn grid_search(&self, pixels: &[Vector2d], margin: f64) -> Result<Vec<Option<Vector2d>>, GeometryError> {
    let g = self.geometry;
    let targets: Vec<Option<Vector2d>> = pixels.iter()
      .map(|&p| if g.covers_pixel(p) { Some(p) } else { None })
      .collect();
    if targets.iter().all(|t| t.is_none()) { return Ok(vec![None; pixels.len()]) }
    g.boundary.check_cell_limit(self.max_cells)?;

    let best = (0..g.boundary.rows).into_par_iter()
      .map(|row| {
        if let Some(deadline) = self.deadline {
          if Instant::now() >= deadline { return Err(GeometryError::Timeout(self.timeout_ms)) }
        }
        let mut best: Vec<Option<Candidate>> = vec![None; targets.len()];
        for col in 0..g.boundary.cols {
          let p = match g.cell_to_pixel(col as f64, row as f64) {
            Some(p) => p,
            None => continue,
          };
          for (target, b) in targets.iter().zip(best.iter_mut()) {
            let t = match target {
              Some(t) => t,
              None => continue,
            };
            let d = p - t;
            if d[0].abs() > margin || d[1].abs() > margin { continue }
            *b = better(*b, Some((d.norm_squared(), row, col)));
          }
        }
        Ok(best)
      })
      .try_reduce_with(|a, b| Ok(a.into_iter().zip(b).map(|(a, b)| better(a, b)).collect()))
      .unwrap_or_else(|| Ok(vec![None; targets.len()]))?;

    Ok(best.into_iter()
      .map(|c| c.map(|(_, row, col)| Vector2d::new(col as f64, row as f64)))
      .collect())
  }
}
