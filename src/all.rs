// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  boundary::*,
  camera::*,
  camera_pinhole::*,
  camera_setup::*,
  detection::*,
  error::*,
  evaluator::*,
  frame::*,
  geodesy::*,
  image::*,
  input::*,
  locator::*,
  math::*,
  output::*,
  parameters::*,
  pipeline::*,
  pose_filter::*,
  rectify::*,
  types::*,
  util::*,
};

pub use {
  std::{
    collections::{BTreeSet, HashMap},
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    ops::Index,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
  },
  log::{debug, error, info, warn, LevelFilter},
  rayon::prelude::*,
  serde::{Deserialize, Serialize},
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
};
