use marine_bev::all::*;
use marine_bev::util;

use clap::Parser;

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

#[derive(Parser)]
#[clap(about = "Maps drone detections onto the ground plane and flags violations.")]
struct Args {
  // Flight log, CSV or JSON lines, one record per frame.
  #[clap(long)]
  log: String,
  // MOT style detection rows.
  #[clap(long)]
  detections: String,
  // Directory of extracted frames. Sorted by name, the n-th file is frame n.
  #[clap(long)]
  frames: Option<String>,
  // Frame size when it cannot be read from the frames.
  #[clap(long)]
  image_width: Option<usize>,
  #[clap(long)]
  image_height: Option<usize>,
  // Whitespace separated `frame gsd` lines overriding the computed GSD.
  #[clap(long)]
  gsd_file: Option<String>,
  // `frame,x1,y1,x2,y2,meters`: two pixels of a frame a known distance apart.
  // The GSD measured there is used for every frame without its own.
  #[clap(long)]
  calibration: Option<String>,
  // JSON sensor profiles extending the built-in table.
  #[clap(long)]
  sensors: Option<String>,
  // Planar coordinate origin as `latitude,longitude`, the first log fix by default.
  #[clap(long)]
  origin: Option<String>,
  #[clap(long)]
  output: String,
  // Rectify every frame and write the rasters as PNG. Needs `--frames`.
  #[clap(long)]
  save_rasters: bool,
  // Frames prepared in parallel before their evaluation.
  #[clap(long, default_value = "16")]
  batch_size: usize,
  #[clap(long, default_value = "info")]
  log_level: String,
  #[clap(flatten)]
  parameters: ParameterSet,
}

#[derive(Default)]
struct Summary {
  evaluated: usize,
  skipped: usize,
  violations: usize,
  unresolved: usize,
}

impl Summary {
  fn count(&mut self, outcome: &FrameOutcome) {
    match outcome {
      FrameOutcome::Evaluated { prepared, assessment } => {
        self.evaluated += 1;
        self.unresolved += prepared.unresolved.len();
        if assessment.verdict.violation { self.violations += 1 }
      },
      FrameOutcome::Skipped { .. } => self.skipped += 1,
    }
  }
}

fn handle_error(err: &anyhow::Error) {
  for (i, e) in err.chain().enumerate() {
    println!("  {}: {}", i + 1, e);
  }
}

fn main() {
  if let Err(err) = run() {
    handle_error(&err);
    std::process::exit(1);
  }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
  let mut paths = vec![];
  for entry in std::fs::read_dir(dir).context(format!("Failed to list {}.", dir.display()))? {
    let path = entry?.path();
    let is_frame = path.extension()
      .and_then(|e| e.to_str())
      .map(|e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
      .unwrap_or(false);
    if is_frame { paths.push(path) }
  }
  paths.sort();
  Ok(paths)
}

fn parse_origin(s: &str) -> Result<GeoFix> {
  let parts: Vec<&str> = s.split(',').map(|x| x.trim()).collect();
  if parts.len() != 2 { bail!("Origin must be `latitude,longitude`, got {}.", s) }
  let fix = GeoFix::new(
    parts[0].parse().context(format!("Bad origin latitude {}.", parts[0]))?,
    parts[1].parse().context(format!("Bad origin longitude {}.", parts[1]))?,
  );
  if !fix.is_valid() { bail!("Origin {} is out of range.", s) }
  Ok(fix)
}

struct Calibration {
  frame: FrameId,
  a: Vector2d,
  b: Vector2d,
  meters: f64,
}

fn parse_calibration(s: &str) -> Result<Calibration> {
  let parts: Vec<&str> = s.split(',').map(|x| x.trim()).collect();
  if parts.len() != 6 { bail!("Calibration must be `frame,x1,y1,x2,y2,meters`, got {}.", s) }
  let frame = parts[0].parse::<FrameId>().context(format!("Bad calibration frame {}.", parts[0]))?;
  let mut v = [0.; 5];
  for (x, part) in v.iter_mut().zip(&parts[1..]) {
    *x = part.parse().context(format!("Bad calibration value {}.", part))?;
  }
  Ok(Calibration {
    frame,
    a: Vector2d::new(v[0], v[1]),
    b: Vector2d::new(v[2], v[3]),
    meters: v[4],
  })
}

// Loads the frame image when rasters are wanted, otherwise only reads its
// size. Unreadable frames are processed without an image.
fn read_frame(path: Option<&PathBuf>, load: bool) -> (Option<Image>, Option<[usize; 2]>) {
  let path = match path {
    Some(path) => path,
    None => return (None, None),
  };
  if load {
    match Image::load(path) {
      Ok(image) => {
        let size = [image.width, image.height];
        return (Some(image), Some(size));
      },
      Err(err) => warn!("{:#}", err),
    }
  }
  else {
    match ::image::image_dimensions(path) {
      Ok((w, h)) => return (None, Some([w as usize, h as usize])),
      Err(err) => warn!("Failed to read the size of {}: {}", path.display(), err),
    }
  }
  (None, None)
}

fn run() -> Result<()> {
  let args = Args::parse();
  env_logger::Builder::new()
    .filter_level(util::parse_level(&args.log_level)?)
    .format(util::format_log)
    .init();

  let sensors = match &args.sensors {
    Some(path) => SensorTable::load(Path::new(path))?,
    None => SensorTable::builtin(),
  };
  let log = {
    let raw = FlightLog::load(Path::new(&args.log))?;
    let mut filter = build_pose_filter(&args.parameters);
    let log = raw.filtered(filter.as_mut());
    match &args.gsd_file {
      Some(path) => log.with_gsd(&GsdTable::load(Path::new(path))?),
      None => log,
    }
  };
  if log.is_empty() { bail!("Log {} has no records.", args.log) }
  let detections = DetectionTable::load(Path::new(&args.detections))?;
  let frame_paths = match &args.frames {
    Some(dir) => list_frames(Path::new(dir))?,
    None => vec![],
  };
  if args.save_rasters && frame_paths.is_empty() {
    bail!("--save-rasters needs frame images in --frames.");
  }
  let default_size = match (args.image_width, args.image_height) {
    (Some(w), Some(h)) => Some([w, h]),
    (None, None) => None,
    _ => bail!("Give both --image-width and --image-height."),
  };
  if default_size.is_none() && frame_paths.is_empty() {
    bail!("Either --frames or --image-width and --image-height are required.");
  }
  if !frame_paths.is_empty() && frame_paths.len() != log.len() {
    warn!("{} frames for {} log records.", frame_paths.len(), log.len());
  }

  let origin = match &args.origin {
    Some(s) => Some(parse_origin(s)?),
    None => log.first_fix(),
  };
  match origin {
    Some(o) => info!("Planar origin at {:.6}, {:.6}.", o.latitude, o.longitude),
    None => warn!("No geographic fix in the log, the drone stays at the planar origin."),
  }
  let mut pipeline = Pipeline::new(args.parameters.clone(), sensors, origin)?;
  if let Some(s) = &args.calibration {
    let c = parse_calibration(s)?;
    let (image, size) = read_frame(frame_paths.get(c.frame), false);
    let input = FrameInput {
      frame_id: c.frame,
      record: log.get(c.frame),
      detections: &[],
      image: image.as_ref(),
      image_size: size.or(default_size).unwrap_or([0, 0]),
    };
    let gsd = pipeline.calibrate(&input, c.a, c.b, c.meters)
      .context(format!("Failed to calibrate the GSD in frame {}.", c.frame))?;
    info!("Calibrated GSD {:.5} m/px in frame {}.", gsd.x, c.frame);
    pipeline.set_fixed_gsd(Some(gsd.x));
  }
  let mut writer = OutputWriter::create(Path::new(&args.output), args.save_rasters, pipeline.speed_mode())?;

  let start = Instant::now();
  let mut summary = Summary::default();
  let frames = log.frames();
  for chunk in frames.chunks(args.batch_size.max(1)) {
    let images: Vec<(Option<Image>, Option<[usize; 2]>)> = chunk.par_iter()
      .map(|&frame| read_frame(frame_paths.get(frame), args.save_rasters))
      .collect();
    let inputs: Vec<FrameInput> = chunk.iter().zip(&images)
      .map(|(&frame, (image, size))| FrameInput {
        frame_id: frame,
        record: log.get(frame),
        detections: detections.get(frame),
        image: image.as_ref(),
        image_size: size.or(default_size).unwrap_or([0, 0]),
      })
      .collect();
    for outcome in pipeline.process_batch(&inputs) {
      summary.count(&outcome);
      writer.write(&outcome, log.get(outcome.frame_id()))?;
    }
    debug!("Processed frames up to {}.", chunk[chunk.len() - 1]);
  }
  writer.flush()?;

  info!("{} frames evaluated, {} skipped, {} with violations, {} unresolved detections in {:.1} s.",
    summary.evaluated, summary.skipped, summary.violations, summary.unresolved,
    start.elapsed().as_secs_f64());
  Ok(())
}
