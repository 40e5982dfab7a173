use crate::all::*;

// Per-frame telemetry. Every field is optional so that a bad row fails only
// its own frame. The aliases are the column names of DJI flight log exports.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LogRecord {
  #[serde(default)]
  pub frame: Option<FrameId>,
  #[serde(default, alias = "GIMBAL.roll")]
  pub roll: Option<f64>,
  #[serde(default, alias = "GIMBAL.pitch")]
  pub pitch: Option<f64>,
  #[serde(default, alias = "GIMBAL.yaw")]
  pub yaw: Option<f64>,
  // Above the ground plane datum, meters.
  #[serde(default, alias = "adjusted height", alias = "altitude")]
  pub height: Option<f64>,
  #[serde(default, alias = "Drone type")]
  pub drone_model: Option<String>,
  #[serde(default, alias = "OSD.latitude")]
  pub latitude: Option<f64>,
  #[serde(default, alias = "OSD.longitude")]
  pub longitude: Option<f64>,
  // Seconds since the start of the flight.
  #[serde(default)]
  pub time: Option<f64>,
  #[serde(default)]
  pub datetime: Option<String>,
  // Known GSD in m/px overriding the computed one, 0 computes it.
  #[serde(default)]
  pub gsd: Option<f64>,
}

impl LogRecord {
  pub fn gimbal(&self) -> Result<Vector3d, GeometryError> {
    match (self.roll, self.pitch, self.yaw) {
      (Some(r), Some(p), Some(y)) => Ok(Vector3d::new(r, p, y)),
      _ => Err(GeometryError::malformed(format!("missing gimbal angles in frame {:?}", self.frame))),
    }
  }

  pub fn height(&self) -> Result<f64, GeometryError> {
    self.height.ok_or_else(|| GeometryError::malformed(
      format!("missing height in frame {:?}", self.frame)))
  }

  pub fn fix(&self) -> Option<GeoFix> {
    let fix = GeoFix::new(self.latitude?, self.longitude?);
    if fix.is_valid() { Some(fix) } else { None }
  }

  pub fn timestamp(&self, frame_id: FrameId, frame_rate: f64) -> f64 {
    self.time.unwrap_or(frame_id as f64 / frame_rate)
  }

  pub fn drone_model(&self) -> &str {
    self.drone_model.as_deref().unwrap_or("")
  }
}

// Log records indexed by frame number. When no record carries a frame number
// they are numbered by position; otherwise unnumbered records cannot be placed
// and are dropped.
pub struct FlightLog {
  records: Vec<LogRecord>,
  index: HashMap<FrameId, usize>,
}

impl FlightLog {
  pub fn from_records(records: Vec<LogRecord>) -> FlightLog {
    let numbered = records.iter().any(|r| r.frame.is_some());
    let mut kept: Vec<LogRecord> = vec![];
    let mut index = HashMap::new();
    for (i, mut record) in records.into_iter().enumerate() {
      let frame = match record.frame {
        Some(frame) => frame,
        None if numbered => {
          warn!("Log record {} has no frame number, dropping it.", i + 1);
          continue;
        },
        None => i,
      };
      record.frame = Some(frame);
      match index.get(&frame) {
        Some(&j) => {
          warn!("Duplicate log record for frame {}, keeping the last one.", frame);
          kept[j] = record;
        },
        None => {
          index.insert(frame, kept.len());
          kept.push(record);
        },
      }
    }
    FlightLog { records: kept, index }
  }

  // CSV when the extension says so, JSON lines otherwise.
  pub fn load(path: &Path) -> Result<FlightLog> {
    let is_csv = path.extension()
      .map(|e| e.eq_ignore_ascii_case("csv"))
      .unwrap_or(false);
    let records = if is_csv { read_csv_log(path)? } else { read_json_lines_log(path)? };
    info!("Loaded {} log records from {}.", records.len(), path.display());
    Ok(FlightLog::from_records(records))
  }

  pub fn get(&self, frame: FrameId) -> Option<&LogRecord> {
    self.index.get(&frame).map(|&i| &self.records[i])
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  // Frame numbers in ascending order.
  pub fn frames(&self) -> Vec<FrameId> {
    let mut frames: Vec<FrameId> = self.index.keys().copied().collect();
    frames.sort_unstable();
    frames
  }

  pub fn first_fix(&self) -> Option<GeoFix> {
    self.frames().into_iter()
      .filter_map(|frame| self.get(frame).and_then(|r| r.fix()))
      .next()
  }

  // Per-frame GSD values take precedence over those already in the log.
  pub fn with_gsd(mut self, table: &GsdTable) -> FlightLog {
    for record in &mut self.records {
      if let Some(gsd) = record.frame.and_then(|frame| table.get(frame)) {
        record.gsd = Some(gsd);
      }
    }
    self
  }

  // Applies a pose filter in frame order.
  pub fn filtered(&self, filter: &mut dyn PoseFilter) -> FlightLog {
    let records = self.frames().into_iter()
      .filter_map(|frame| self.get(frame))
      .map(|r| filter.filter(r))
      .collect();
    FlightLog::from_records(records)
  }
}

fn read_csv_log(path: &Path) -> Result<Vec<LogRecord>> {
  let mut reader = csv::ReaderBuilder::new()
    .trim(csv::Trim::All)
    .flexible(true)
    .from_path(path)
    .context(format!("Failed to open log {}.", path.display()))?;
  let mut records = vec![];
  for (i, row) in reader.deserialize::<LogRecord>().enumerate() {
    match row {
      Ok(record) => records.push(record),
      Err(err) => {
        warn!("Malformed log row {}: {}", i, err);
        records.push(LogRecord::default());
      },
    }
  }
  Ok(records)
}

fn read_json_lines_log(path: &Path) -> Result<Vec<LogRecord>> {
  let mut reader = LogReader::new(path)?;
  let mut records = vec![];
  while let Some(record) = reader.next()? {
    records.push(record);
  }
  Ok(records)
}

// Streams log records from a JSON lines file.
pub struct LogReader {
  reader: BufReader<File>,
  line: String,
  line_number: usize,
}

impl LogReader {
  pub fn new(path: &Path) -> Result<LogReader> {
    let file = File::open(path)
      .context(format!("Failed to open log {}.", path.display()))?;
    Ok(LogReader {
      reader: BufReader::new(file),
      line: String::new(),
      line_number: 0,
    })
  }

  // Not using `impl Iterator` to allow returning `Result`.
  // End of data is signaled by `Result::Ok(Option::None)`. Lines that do not
  // parse yield an empty record, which fails its frame downstream.
  pub fn next(&mut self) -> Result<Option<LogRecord>> {
    loop {
      self.line.clear();
      match self.reader.read_line(&mut self.line) {
        Ok(0) => return Ok(None),
        Err(err) => bail!("Failed to read line {}. {}", self.line_number + 1, err),
        _ => {},
      }
      self.line_number += 1;
      if self.line.trim().is_empty() { continue }
      match serde_json::from_str::<LogRecord>(&self.line) {
        Ok(record) => return Ok(Some(record)),
        Err(err) => {
          warn!("Malformed log line {}: {}", self.line_number, err);
          return Ok(Some(LogRecord::default()));
        },
      }
    }
  }
}

// Known GSD per frame, from whitespace separated `frame gsd` lines.
#[derive(Default)]
pub struct GsdTable {
  values: HashMap<FrameId, f64>,
}

impl GsdTable {
  pub fn load(path: &Path) -> Result<GsdTable> {
    let file = File::open(path)
      .context(format!("Failed to open GSD file {}.", path.display()))?;
    let mut table = GsdTable::default();
    for (i, line) in BufReader::new(file).lines().enumerate() {
      let line = line.context(format!("Failed to read GSD file {}.", path.display()))?;
      if line.trim().is_empty() { continue }
      match parse_gsd_line(&line) {
        Some((frame, gsd)) => { table.values.insert(frame, gsd); },
        None => warn!("Skipping malformed GSD line {}: {:?}", i + 1, line),
      }
    }
    info!("Loaded {} GSD values from {}.", table.len(), path.display());
    Ok(table)
  }

  pub fn insert(&mut self, frame: FrameId, gsd: f64) {
    self.values.insert(frame, gsd);
  }

  pub fn get(&self, frame: FrameId) -> Option<f64> {
    self.values.get(&frame).copied()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }
}

fn parse_gsd_line(line: &str) -> Option<(FrameId, f64)> {
  let mut fields = line.split_whitespace();
  let frame = fields.next()?.parse::<f64>().ok()?;
  let gsd = fields.next()?.parse::<f64>().ok()?;
  if !(frame >= 0.) || frame.fract() != 0. || !(gsd >= 0.) || !gsd.is_finite() { return None }
  Some((frame as FrameId, gsd))
}

// Detections grouped by frame.
#[derive(Default)]
pub struct DetectionTable {
  by_frame: HashMap<FrameId, Vec<Detection>>,
}

impl DetectionTable {
  pub fn new(detections: Vec<Detection>) -> DetectionTable {
    let mut by_frame: HashMap<FrameId, Vec<Detection>> = HashMap::new();
    for d in detections {
      by_frame.entry(d.frame_id).or_default().push(d);
    }
    DetectionTable { by_frame }
  }

  // MOT style rows `frame,track,class,x,y,w,h,confidence,...` without a
  // header. Rows that do not parse are skipped.
  pub fn load(path: &Path) -> Result<DetectionTable> {
    let mut reader = csv::ReaderBuilder::new()
      .has_headers(false)
      .flexible(true)
      .trim(csv::Trim::All)
      .from_path(path)
      .context(format!("Failed to open detections {}.", path.display()))?;
    let mut detections = vec![];
    for (i, row) in reader.records().enumerate() {
      let row = row.context(format!("Failed to read detections {}.", path.display()))?;
      match parse_detection(&row) {
        Some(d) => detections.push(d),
        None => warn!("Skipping malformed detection row {}: {:?}", i + 1, row),
      }
    }
    info!("Loaded {} detections from {}.", detections.len(), path.display());
    Ok(DetectionTable::new(detections))
  }

  pub fn get(&self, frame: FrameId) -> &[Detection] {
    self.by_frame.get(&frame).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn len(&self) -> usize {
    self.by_frame.values().map(|v| v.len()).sum()
  }
}

fn parse_detection(row: &csv::StringRecord) -> Option<Detection> {
  if row.len() < 8 { return None }
  let mut v = [0.; 8];
  for (i, x) in v.iter_mut().enumerate() {
    *x = row.get(i)?.parse::<f64>().ok()?;
    if !x.is_finite() { return None }
  }
  if v[0] < 0. || v[2] < 0. || v[5] < 0. || v[6] < 0. { return None }
  Some(Detection {
    frame_id: v[0] as FrameId,
    track_id: v[1] as TrackId,
    class_id: v[2] as u32,
    bbox: BoundingBox::from_xywh(v[3], v[4], v[5], v[6]),
    confidence: v[7],
  })
}
