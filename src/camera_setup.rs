use crate::all::*;

// Static sensor constants of one drone model.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[allow(non_snake_case)]
pub struct SensorProfile {
  pub sensorWidthMm: f64,
  pub sensorHeightMm: f64,
  pub fovDegrees: f64,
}

#[derive(Deserialize)]
pub struct SensorSetupRoot {
  pub default: Option<String>,
  pub sensors: HashMap<String, SensorProfile>,
}

pub const DEFAULT_DRONE_MODEL: &'static str = "MAVIC PRO";

lazy_static! {
  static ref BUILTIN_SENSORS: HashMap<&'static str, SensorProfile> = {
    let mavic = SensorProfile { sensorWidthMm: 6.3, sensorHeightMm: 4.7, fovDegrees: 78.8 };
    let mut m = HashMap::new();
    m.insert("MAVIC PRO", mavic);
    m.insert("MAVIC 2", mavic);
    m
  };
}

// Lookup from drone model tag to sensor constants. Unknown models degrade to
// the default profile instead of failing the frame.
#[derive(Clone, Debug)]
pub struct SensorTable {
  profiles: HashMap<String, SensorProfile>,
  default_model: String,
}

impl SensorTable {
  pub fn builtin() -> SensorTable {
    SensorTable {
      profiles: BUILTIN_SENSORS.iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect(),
      default_model: DEFAULT_DRONE_MODEL.to_string(),
    }
  }

  // Built-in profiles extended (and overridden) by a JSON file of the form
  // `{ "default": "MAVIC 2", "sensors": { "MAVIC 2": { ... } } }`.
  pub fn load(path: &Path) -> Result<SensorTable> {
    let s = std::fs::read_to_string(path)
      .context(format!("Failed to read file {}.", path.display()))?;
    let root: SensorSetupRoot = serde_json::from_str(&s)
      .context(format!("Failed to parse {}.", path.display()))?;
    let mut table = SensorTable::builtin();
    for (model, profile) in root.sensors {
      validate_profile(&model, &profile)?;
      table.profiles.insert(normalize_model(&model), profile);
    }
    if let Some(default) = root.default {
      table.set_default(&default)?;
    }
    Ok(table)
  }

  pub fn set_default(&mut self, model: &str) -> Result<()> {
    let model = normalize_model(model);
    if !self.profiles.contains_key(&model) {
      bail!("Default drone model {} has no sensor profile.", model);
    }
    self.default_model = model;
    Ok(())
  }

  pub fn get(&self, model: &str) -> Option<&SensorProfile> {
    self.profiles.get(&normalize_model(model))
  }

  // Returns the profile and whether it had to fall back to the default one.
  pub fn resolve(&self, model: &str) -> (&SensorProfile, bool) {
    if let Some(profile) = self.get(model) {
      return (profile, false);
    }
    warn!("Unknown drone model {:?}, using the {} sensor profile.", model, self.default_model);
    (&self.profiles[&self.default_model], true)
  }
}

fn normalize_model(model: &str) -> String {
  model.trim().to_uppercase()
}

fn validate_profile(model: &str, p: &SensorProfile) -> Result<()> {
  if !(p.sensorWidthMm > 0. && p.sensorHeightMm > 0.) {
    bail!("Sensor size of {} must be positive.", model);
  }
  if !(p.fovDegrees > 0. && p.fovDegrees < 180.) {
    bail!("Field of view of {} must be in (0, 180) degrees.", model);
  }
  Ok(())
}
