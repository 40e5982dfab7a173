// Eigen-like aliases.
pub type Vector2d = nalgebra::Vector2::<f64>;
pub type Vector3d = nalgebra::Vector3::<f64>;
pub type Matrix2d = nalgebra::Matrix2::<f64>;
pub type Matrix3d = nalgebra::Matrix3::<f64>;

// Identifier assigned by the external tracker. Merged mammal boxes use
// `MERGED_TRACK_ID`.
pub type TrackId = i64;
pub type FrameId = usize;

pub const MERGED_TRACK_ID: TrackId = 999999;
