use crate::all::*;

// Tunables of the whole engine. Flattened into the command line arguments;
// `Default` gives the same values as an empty command line.
#[derive(Clone, Debug)]
#[derive(clap::Parser)]
pub struct ParameterSet {
  #[clap(long, default_value = "30")]
  pub frame_rate: f64,

  // Ground plane geometry.
  #[clap(long, default_value = "0")]
  pub ground_height: f64,
  // Image rows kept clear below the horizon, as a fraction of image height.
  #[clap(long, default_value = "0.1")]
  pub horizon_offset_ratio: f64,
  // Cells a rectified raster or a grid search may cover. Larger frames are
  // still located in closed form.
  #[clap(long, default_value = "60000000")]
  pub max_boundary_cells: usize,
  #[clap(long, arg_enum, default_value = "isotropic")]
  pub gsd_mode: GsdMode,
  // Known GSD in m/px used instead of the computed one, 0 computes it.
  #[clap(long)]
  pub gsd: Option<f64>,

  // Dense rectification.
  #[clap(long, arg_enum, default_value = "nearest")]
  pub resampling: Resampling,
  // Zero disables the deadline.
  #[clap(long, default_value = "0")]
  pub frame_timeout_ms: u64,

  // Point locator.
  #[clap(long, arg_enum, default_value = "auto")]
  pub locator: LocatorChoice,
  #[clap(long, default_value = "1")]
  pub locator_margin: f64,

  // Evaluator.
  #[clap(long, arg_enum, default_value = "planar")]
  pub speed_mode: SpeedMode,
  #[clap(long, default_value = "1")]
  pub ship_class: u32,
  #[clap(long, default_value = "0")]
  pub mammal_class: u32,
  #[clap(long, default_value = "0.8")]
  pub min_ship_confidence: f64,
  #[clap(long, default_value = "0.5")]
  pub min_mammal_confidence: f64,
  // Tracks unseen for more frames than this are forgotten.
  #[clap(long, default_value = "90")]
  pub track_max_age: usize,

  // Weight of the newest sample in exponential pose smoothing, 1 disables it.
  #[clap(long, default_value = "1")]
  pub pose_smoothing: f64,
}

impl Default for ParameterSet {
  fn default() -> ParameterSet {
    use clap::Parser;
    ParameterSet::parse_from(["marine-bev"])
  }
}

impl ParameterSet {
  pub fn validate(&self) -> Result<()> {
    if !(self.frame_rate > 0.) {
      bail!("Frame rate must be positive, got {}.", self.frame_rate);
    }
    if !(0. ..1.).contains(&self.horizon_offset_ratio) {
      bail!("Horizon offset ratio must be in [0, 1), got {}.", self.horizon_offset_ratio);
    }
    if let Some(gsd) = self.gsd {
      if !(gsd >= 0. && gsd.is_finite()) { bail!("GSD must be a non-negative number, got {}.", gsd) }
    }
    if self.locator_margin < 0. {
      bail!("Locator margin cannot be negative.");
    }
    if !(self.pose_smoothing > 0. && self.pose_smoothing <= 1.) {
      bail!("Pose smoothing weight must be in (0, 1], got {}.", self.pose_smoothing);
    }
    if self.ship_class == self.mammal_class {
      bail!("Ship and mammal class ids must differ.");
    }
    Ok(())
  }

  pub fn frame_timeout(&self) -> Option<Duration> {
    if self.frame_timeout_ms == 0 { return None }
    Some(Duration::from_millis(self.frame_timeout_ms))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ArgEnum)]
pub enum GsdMode {
  // One pixel size (sensor width / image width) for both axes.
  Isotropic,
  // Separate horizontal and vertical pixel sizes from the sensor aspect ratio.
  Anisotropic,
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ArgEnum)]
pub enum Resampling {
  Nearest,
  Bilinear,
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ArgEnum)]
pub enum LocatorChoice {
  Auto,
  ClosedForm,
  GridSearch,
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ArgEnum)]
pub enum SpeedMode {
  // Pixel displacement times GSD, in km/h.
  Planar,
  // Great-circle displacement of projected fixes, in knots.
  Geodesic,
}
