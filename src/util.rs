pub const KMH_PER_MPS: f64 = 3.6;
pub const KNOTS_PER_MPS: f64 = 3600. / 1852.;

pub fn format_log(
  buf: &mut env_logger::fmt::Formatter,
  record: &log::Record,
) -> std::io::Result<()> {
  use std::io::Write;
  let mut style = buf.style();
  use env_logger::fmt::Color::*;
  use log::Level::*;
  style.set_color(match record.level() {
    Error => Red,
    Warn => Yellow,
    Info => Green,
    Debug => Magenta,
    Trace => Blue,
  });

  // Strip the `src/` prefix, every file lives there.
  let file = record.file().unwrap_or("?");
  let file = file.strip_prefix("src/").unwrap_or(file);
  let s = format!("{:24}{}",
    format!("{}:{}", file, record.line().unwrap_or(0)),
    record.args()
  );
  writeln!(buf, "{}", style.value(s))
}

pub fn parse_level(level: &str) -> anyhow::Result<log::LevelFilter> {
  level.parse::<log::LevelFilter>()
    .map_err(|_| anyhow::anyhow!("Unknown log level {}.", level))
}

// Wraps degrees into [0, 360).
pub fn wrap_degrees(a: f64) -> f64 {
  let a = a % 360.;
  if a < 0. { a + 360. } else { a }
}

// Signed shortest difference `b - a` in degrees, in (-180, 180].
pub fn angle_difference(a: f64, b: f64) -> f64 {
  let d = wrap_degrees(b - a);
  if d > 180. { d - 360. } else { d }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_angle_difference() {
    assert_eq!(wrap_degrees(-90.), 270.);
    assert_eq!(wrap_degrees(720.), 0.);
    assert!((angle_difference(350., 10.) - 20.).abs() < 1e-12);
    assert!((angle_difference(10., 350.) + 20.).abs() < 1e-12);
    assert!((angle_difference(0., 180.) - 180.).abs() < 1e-12);
  }

  #[test]
  fn test_speed_units() {
    // 5 knots is the 9.26 km/h threshold.
    let mps = 5. / KNOTS_PER_MPS;
    assert!((mps * KMH_PER_MPS - 9.26).abs() < 1e-9);
  }

  #[test]
  fn test_parse_level() {
    assert_eq!(parse_level("debug").unwrap(), log::LevelFilter::Debug);
    assert!(parse_level("loud").is_err());
  }
}
