use crate::all::*;

// Optional smoothing of raw telemetry before pose resolution. Pose resolution
// itself stays stateless per frame; filters see records in frame order.
pub trait PoseFilter {
  fn filter(&mut self, record: &LogRecord) -> LogRecord;
}

pub struct Passthrough;

impl PoseFilter for Passthrough {
  fn filter(&mut self, record: &LogRecord) -> LogRecord {
    record.clone()
  }
}

// Exponential moving average of gimbal angles and height. Yaw is averaged on
// the circle. Records with missing values pass through and do not disturb the
// state.
pub struct ExponentialSmoothing {
  weight: f64,
  state: Option<[f64; 4]>,
}

impl ExponentialSmoothing {
  pub fn new(weight: f64) -> ExponentialSmoothing {
    ExponentialSmoothing { weight, state: None }
  }
}

impl PoseFilter for ExponentialSmoothing {
  fn filter(&mut self, record: &LogRecord) -> LogRecord {
    let sample = match (record.roll, record.pitch, record.yaw, record.height) {
      (Some(r), Some(p), Some(y), Some(h)) => [r, p, y, h],
      _ => return record.clone(),
    };
    if sample.iter().any(|x| !x.is_finite()) { return record.clone() }
    let w = self.weight;
    let s = match self.state {
      None => sample,
      Some(s) => [
        s[0] + w * (sample[0] - s[0]),
        s[1] + w * (sample[1] - s[1]),
        wrap_degrees(s[2] + w * angle_difference(s[2], sample[2])),
        s[3] + w * (sample[3] - s[3]),
      ],
    };
    self.state = Some(s);
    LogRecord {
      roll: Some(s[0]),
      pitch: Some(s[1]),
      yaw: Some(s[2]),
      height: Some(s[3]),
      ..record.clone()
    }
  }
}

pub fn build_pose_filter(params: &ParameterSet) -> Box<dyn PoseFilter> {
  if params.pose_smoothing >= 1. {
    Box::new(Passthrough)
  }
  else {
    Box::new(ExponentialSmoothing::new(params.pose_smoothing))
  }
}
