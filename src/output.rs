use crate::all::*;

#[derive(Debug, PartialEq, Serialize)]
pub struct VerdictRow {
  pub frame: FrameId,
  pub datetime: String,
  pub gsd: Option<f64>,
  pub min_distance: Option<f64>,
  pub ships_within_50m: usize,
  pub ships_within_300m: usize,
  pub violation: bool,
  // Rule ids joined with `;`.
  pub rules: String,
  pub unresolved: usize,
  // `ok`, or why the frame was skipped.
  pub status: String,
}

fn join_rules(rules: &[Rule]) -> String {
  rules.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(";")
}

impl VerdictRow {
  pub fn new(outcome: &FrameOutcome, record: Option<&LogRecord>) -> VerdictRow {
    let datetime = record.and_then(|r| r.datetime.clone()).unwrap_or_default();
    match outcome {
      FrameOutcome::Evaluated { prepared, assessment } => {
        let v = &assessment.verdict;
        VerdictRow {
          frame: prepared.geometry.frame_id,
          datetime,
          gsd: Some(prepared.geometry.gsd.mean()),
          min_distance: v.min_distance,
          ships_within_50m: v.ships_within_50m,
          ships_within_300m: v.ships_within_300m,
          violation: v.violation,
          rules: join_rules(&v.rules),
          unresolved: prepared.unresolved.len(),
          status: "ok".to_string(),
        }
      },
      FrameOutcome::Skipped { frame_id, reason } => VerdictRow {
        frame: *frame_id,
        datetime,
        gsd: None,
        min_distance: None,
        ships_within_50m: 0,
        ships_within_300m: 0,
        violation: false,
        rules: String::new(),
        unresolved: 0,
        status: reason.to_string(),
      },
    }
  }
}

// One located object in raster coordinates.
#[derive(Debug, PartialEq, Serialize)]
pub struct ObjectRow {
  pub frame: FrameId,
  pub track: TrackId,
  pub class: String,
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
  pub confidence: f64,
  pub distance: Option<f64>,
  pub speed: Option<f64>,
  pub speed_unit: &'static str,
  pub latitude: Option<f64>,
  pub longitude: Option<f64>,
  pub rules: String,
}

pub fn object_rows(outcome: &FrameOutcome, speed_mode: SpeedMode) -> Vec<ObjectRow> {
  let (prepared, assessment) = match outcome {
    FrameOutcome::Evaluated { prepared, assessment } => (prepared, assessment),
    FrameOutcome::Skipped { .. } => return vec![],
  };
  let ships: HashMap<TrackId, &ShipAssessment> = assessment.ships.iter()
    .map(|s| (s.track_id, s))
    .collect();
  let speed_unit = match speed_mode {
    SpeedMode::Planar => "km/h",
    SpeedMode::Geodesic => "kn",
  };
  prepared.objects.iter()
    .map(|o| {
      let ship = if o.class == ObjectClass::Ship { ships.get(&o.track_id) } else { None };
      ObjectRow {
        frame: o.frame_id,
        track: o.track_id,
        class: o.class.to_string(),
        x1: o.bbox.min[0],
        y1: o.bbox.min[1],
        x2: o.bbox.max[0],
        y2: o.bbox.max[1],
        confidence: o.confidence,
        distance: ship.and_then(|s| s.distance),
        speed: ship.and_then(|s| s.speed).map(|s| s.in_unit_of(speed_mode)),
        speed_unit,
        latitude: ship.and_then(|s| s.fix).map(|f| f.latitude),
        longitude: ship.and_then(|s| s.fix).map(|f| f.longitude),
        rules: ship.map(|s| join_rules(&s.rules)).unwrap_or_default(),
      }
    })
    .collect()
}

// Writes `verdicts.csv`, `objects.csv` and optionally one PNG per rectified
// frame into the output directory.
pub struct OutputWriter {
  verdicts: csv::Writer<File>,
  objects: csv::Writer<File>,
  raster_dir: Option<PathBuf>,
  speed_mode: SpeedMode,
}

impl OutputWriter {
  pub fn create(dir: &Path, save_rasters: bool, speed_mode: SpeedMode) -> Result<OutputWriter> {
    std::fs::create_dir_all(dir)
      .context(format!("Failed to create output directory {}.", dir.display()))?;
    let open = |name: &str| -> Result<csv::Writer<File>> {
      let path = dir.join(name);
      csv::Writer::from_path(&path).context(format!("Failed to create {}.", path.display()))
    };
    let raster_dir = if save_rasters {
      let d = dir.join("bev");
      std::fs::create_dir_all(&d)
        .context(format!("Failed to create raster directory {}.", d.display()))?;
      Some(d)
    }
    else {
      None
    };
    Ok(OutputWriter {
      verdicts: open("verdicts.csv")?,
      objects: open("objects.csv")?,
      raster_dir,
      speed_mode,
    })
  }

  pub fn write(&mut self, outcome: &FrameOutcome, record: Option<&LogRecord>) -> Result<()> {
    self.verdicts.serialize(VerdictRow::new(outcome, record))?;
    for row in object_rows(outcome, self.speed_mode) {
      self.objects.serialize(row)?;
    }
    if let (Some(dir), FrameOutcome::Evaluated { prepared, .. }) = (&self.raster_dir, outcome) {
      if let Some(raster) = &prepared.raster {
        raster.save(&dir.join(format!("bev_{:06}.png", raster.frame_id)))?;
      }
    }
    Ok(())
  }

  pub fn flush(&mut self) -> Result<()> {
    self.verdicts.flush()?;
    self.objects.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::tests::test_record;

  fn outcomes(pipeline: &Pipeline, record: &LogRecord, image: Option<&Image>) -> Vec<FrameOutcome> {
    let detections = [
      Detection {
        frame_id: 0,
        track_id: 3,
        class_id: 1,
        bbox: BoundingBox::from_xywh(30., 20., 4., 4.),
        confidence: 0.95,
      },
      Detection {
        frame_id: 0,
        track_id: 9,
        class_id: 0,
        bbox: BoundingBox::from_xywh(20., 20., 4., 4.),
        confidence: 0.95,
      },
    ];
    let inputs = [
      FrameInput { frame_id: 0, record: Some(record), detections: &detections, image, image_size: [64, 48] },
      FrameInput { frame_id: 1, record: None, detections: &[], image: None, image_size: [64, 48] },
    ];
    pipeline.process_batch(&inputs)
  }

  #[test]
  fn test_rows() {
    let pipeline = Pipeline::new(ParameterSet::default(), SensorTable::builtin(), None).unwrap();
    let mut record = test_record(20., [0., -90., 0.]);
    record.datetime = Some("10:00:00".to_string());
    let outcomes = outcomes(&pipeline, &record, None);

    let row = VerdictRow::new(&outcomes[0], Some(&record));
    assert_eq!(row.datetime, "10:00:00");
    assert_eq!(row.rules, "1");
    assert!(row.violation);
    assert_eq!(row.status, "ok");

    let skipped = VerdictRow::new(&outcomes[1], None);
    assert!(skipped.status.starts_with("Malformed input"));
    assert!(skipped.gsd.is_none());

    let objects = object_rows(&outcomes[0], SpeedMode::Planar);
    assert_eq!(objects.len(), 2);
    let ship = objects.iter().find(|o| o.track == 3).unwrap();
    assert_eq!(ship.class, "ship");
    assert!(ship.distance.is_some());
    assert!(ship.speed.is_none());
    assert_eq!(ship.rules, "1");
    let mammal = objects.iter().find(|o| o.track == 9).unwrap();
    assert!(mammal.distance.is_none());
  }

  #[test]
  fn test_writer() {
    let dir = std::env::temp_dir().join("marine_bev_output");
    let _ = std::fs::remove_dir_all(&dir);
    let pipeline = Pipeline::new(ParameterSet::default(), SensorTable::builtin(), None).unwrap();
    let record = test_record(20., [0., -90., 0.]);
    let image = Image::new(64, 48, 3);
    let outcomes = outcomes(&pipeline, &record, Some(&image));
    let mut writer = OutputWriter::create(&dir, true, SpeedMode::Planar).unwrap();
    for outcome in &outcomes {
      writer.write(outcome, Some(&record)).unwrap();
    }
    writer.flush().unwrap();

    let verdicts = std::fs::read_to_string(dir.join("verdicts.csv")).unwrap();
    let lines: Vec<&str> = verdicts.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("frame,datetime,gsd,min_distance"));
    let objects = std::fs::read_to_string(dir.join("objects.csv")).unwrap();
    assert_eq!(objects.lines().count(), 3);
    assert!(dir.join("bev").join("bev_000000.png").exists());
    assert!(!dir.join("bev").join("bev_000001.png").exists());
  }
}
