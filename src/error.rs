use thiserror::Error;

// Reasons a single frame cannot be orthorectified. None of these abort a
// flight; the frame is skipped and logged.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GeometryError {
  #[error("Malformed input: {0}")]
  MalformedInput(String),

  #[error("Camera height {altitude} m is not above the ground plane at {ground_height} m")]
  NonPositiveHeight { altitude: f64, ground_height: f64 },

  #[error("Ground sample distance must be positive, got {0} m/px")]
  NonPositiveGsd(f64),

  #[error("Optical axis too close to the horizon, no usable ground footprint")]
  NearHorizontal,

  #[error("Ground boundary of {rows}x{cols} cells exceeds the raster limit")]
  BoundaryTooLarge { rows: usize, cols: usize },

  #[error("Ground boundary of {rows}x{cols} cells is empty")]
  EmptyBoundary { rows: usize, cols: usize },

  #[error("Frame abandoned after {0} ms")]
  Timeout(u64),
}

impl GeometryError {
  pub fn malformed(msg: impl Into<String>) -> GeometryError {
    GeometryError::MalformedInput(msg.into())
  }
}
