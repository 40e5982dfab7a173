use crate::all::*;

// Everything the pipeline needs to process one frame. The source image is
// optional; without it only the detections are mapped.
#[derive(Clone, Copy)]
pub struct FrameInput<'a> {
  pub frame_id: FrameId,
  pub record: Option<&'a LogRecord>,
  pub detections: &'a [Detection],
  pub image: Option<&'a Image>,
  // Used when there is no image.
  pub image_size: [usize; 2],
}

// Result of the stateless geometry stage of a frame.
#[derive(Debug)]
pub struct PreparedFrame {
  pub geometry: FrameGeometry,
  pub context: FrameContext,
  pub strategy: InverseStrategy,
  pub objects: Vec<RectifiedObject>,
  // Detections that could not be placed in the raster.
  pub unresolved: Vec<TrackId>,
  pub raster: Option<RectifiedRaster>,
}

#[derive(Debug)]
pub enum FrameOutcome {
  Evaluated {
    prepared: PreparedFrame,
    assessment: FrameAssessment,
  },
  Skipped {
    frame_id: FrameId,
    reason: GeometryError,
  },
}

impl FrameOutcome {
  pub fn frame_id(&self) -> FrameId {
    match self {
      FrameOutcome::Evaluated { prepared, .. } => prepared.geometry.frame_id,
      FrameOutcome::Skipped { frame_id, .. } => *frame_id,
    }
  }
}

pub struct Pipeline {
  params: ParameterSet,
  sensors: SensorTable,
  projection: Option<LocalProjection>,
  rectifier: Rectifier,
  evaluator: Evaluator,
  tracks: Mutex<TrackStates>,
}

impl Pipeline {
  // `origin` anchors the local planar coordinates. Without one the camera
  // sits at the planar origin in every frame.
  pub fn new(params: ParameterSet, sensors: SensorTable, origin: Option<GeoFix>) -> Result<Pipeline> {
    params.validate()?;
    if let Some(origin) = origin {
      if !origin.is_valid() { bail!("Invalid projection origin {:?}.", origin) }
    }
    Ok(Pipeline {
      rectifier: Rectifier::new(&params),
      evaluator: Evaluator::new(&params),
      projection: origin.map(LocalProjection::new),
      tracks: Mutex::new(TrackStates::new()),
      sensors,
      params,
    })
  }

  pub fn speed_mode(&self) -> SpeedMode {
    self.evaluator.speed_mode()
  }

  // Pose, boundary, optional rectification and object mapping. Touches no
  // shared state, so frames may be prepared in parallel.
  pub fn prepare(&self, input: &FrameInput) -> Result<PreparedFrame, GeometryError> {
    let deadline = self.params.frame_timeout().map(|t| Instant::now() + t);
    self.prepare_with_deadline(input, deadline)
  }

  // Rectification and grid search still running at `deadline` abandon the
  // frame.
  pub fn prepare_with_deadline(
    &self,
    input: &FrameInput,
    deadline: Option<Instant>,
  ) -> Result<PreparedFrame, GeometryError> {
    let record = input.record.ok_or_else(|| GeometryError::malformed(
      format!("no log record for frame {}", input.frame_id)))?;
    let geometry = self.resolve_geometry(input, record)?;
    let raster = match input.image {
      Some(image) => Some(self.rectifier.rectify_with_deadline(&geometry, image, deadline)?),
      None => None,
    };

    let locator = PointLocator::from_parameters(&geometry, &self.params)
      .with_deadline(deadline, self.params.frame_timeout_ms);
    let (objects, unresolved) = self.locate_detections(&locator, &geometry, input.detections)?;
    if !unresolved.is_empty() {
      debug!("Frame {}: {} of {} detections unresolved.",
        input.frame_id, unresolved.len(), input.detections.len());
    }

    Ok(PreparedFrame {
      context: FrameContext::new(&geometry, record, self.params.frame_rate),
      strategy: locator.strategy(),
      geometry,
      objects,
      unresolved,
      raster,
    })
  }

  fn resolve_geometry(&self, input: &FrameInput, record: &LogRecord) -> Result<FrameGeometry, GeometryError> {
    let image_size = match input.image {
      Some(image) => [image.width, image.height],
      None => input.image_size,
    };
    FrameGeometry::resolve(
      input.frame_id,
      record,
      &self.sensors,
      self.projection.as_ref(),
      image_size,
      &self.params,
    )
  }

  // GSD of a frame calibrated from two source pixels a known number of meters
  // apart.
  pub fn calibrate(
    &self,
    input: &FrameInput,
    a: Vector2d,
    b: Vector2d,
    meters: f64,
  ) -> Result<Gsd, GeometryError> {
    let record = input.record.ok_or_else(|| GeometryError::malformed(
      format!("no log record for frame {}", input.frame_id)))?;
    let geometry = self.resolve_geometry(input, record)?;
    let deadline = self.params.frame_timeout().map(|t| Instant::now() + t);
    PointLocator::from_parameters(&geometry, &self.params)
      .with_deadline(deadline, self.params.frame_timeout_ms)
      .calibrate_gsd(a, b, meters)
  }

  // Used for frames without a GSD of their own in the log.
  pub fn set_fixed_gsd(&mut self, gsd: Option<f64>) {
    self.params.gsd = gsd;
  }

  // All box corners go through the locator at once so that a grid search
  // scans the raster only once per frame.
  fn locate_detections(
    &self,
    locator: &PointLocator,
    geometry: &FrameGeometry,
    detections: &[Detection],
  ) -> Result<(Vec<RectifiedObject>, Vec<TrackId>), GeometryError> {
    let [width, height] = geometry.image_size();
    let mut unresolved = vec![];
    let mut clipped = vec![];
    for d in detections {
      match d.bbox.clip(width, height) {
        Some(b) => clipped.push((d, b)),
        None => unresolved.push(d.track_id),
      }
    }
    let corners: Vec<Vector2d> = clipped.iter().flat_map(|(_, b)| b.corners()).collect();
    let located = locator.locate_many(&corners)?;

    let mut objects = vec![];
    for ((d, _), cells) in clipped.iter().zip(located.chunks(4)) {
      let cells: Option<Vec<Vector2d>> = cells.iter().copied().collect();
      match cells.as_deref().and_then(BoundingBox::from_points) {
        Some(bbox) => objects.push(RectifiedObject {
          frame_id: d.frame_id,
          track_id: d.track_id,
          class: ObjectClass::classify(d.class_id, self.params.ship_class, self.params.mammal_class),
          bbox,
          confidence: d.confidence,
        }),
        None => unresolved.push(d.track_id),
      }
    }
    Ok((objects, unresolved))
  }

  // Runs the evaluator, the only step that reads and updates track state.
  pub fn evaluate(&self, prepared: &PreparedFrame) -> FrameAssessment {
    let mut tracks = self.tracks.lock().unwrap_or_else(|e| e.into_inner());
    self.evaluator.evaluate(&prepared.context, &prepared.objects, &mut tracks)
  }

  pub fn process(&self, input: &FrameInput) -> FrameOutcome {
    let prepared = self.prepare(input);
    self.finish(input.frame_id, prepared)
  }

  // Geometry in parallel, evaluation in input order.
  pub fn process_batch(&self, inputs: &[FrameInput]) -> Vec<FrameOutcome> {
    let prepared: Vec<Result<PreparedFrame, GeometryError>> = inputs.par_iter()
      .map(|input| self.prepare(input))
      .collect();
    inputs.iter().zip(prepared)
      .map(|(input, prepared)| self.finish(input.frame_id, prepared))
      .collect()
  }

  fn finish(&self, frame_id: FrameId, prepared: Result<PreparedFrame, GeometryError>) -> FrameOutcome {
    match prepared {
      Ok(prepared) => {
        let assessment = self.evaluate(&prepared);
        FrameOutcome::Evaluated { prepared, assessment }
      },
      Err(reason) => {
        warn!("Skipping frame {}: {}", frame_id, reason);
        FrameOutcome::Skipped { frame_id, reason }
      },
    }
  }

  pub fn track_count(&self) -> usize {
    self.tracks.lock().map(|t| t.len()).unwrap_or(0)
  }
}
