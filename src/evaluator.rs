use crate::all::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
  // Ship within the near distance of the mammals.
  Proximity = 1,
  // Ship moving at all inside the watch distance.
  MovingNear = 2,
  // Ship at or above the mid speed limit between the watch and mid distances.
  FastMid = 3,
  // Ship at or above the far speed limit between the mid and far distances.
  FastFar = 4,
  // Too many ships inside the watch distance.
  Crowding = 5,
  // No mammal in the frame, nothing to protect.
  NoMammal = 6,
}

impl Rule {
  pub fn id(self) -> u8 {
    self as u8
  }

  pub fn is_violation(self) -> bool {
    self != Rule::NoMammal
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.id())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Speed {
  pub meters_per_second: f64,
}

impl Speed {
  pub fn from_mps(meters_per_second: f64) -> Speed {
    Speed { meters_per_second }
  }

  pub fn from_kmh(kmh: f64) -> Speed {
    Speed { meters_per_second: kmh / KMH_PER_MPS }
  }

  pub fn kmh(&self) -> f64 {
    self.meters_per_second * KMH_PER_MPS
  }

  pub fn knots(&self) -> f64 {
    self.meters_per_second * KNOTS_PER_MPS
  }

  // Planar speeds are reported in km/h, geodesic ones in knots.
  pub fn in_unit_of(&self, mode: SpeedMode) -> f64 {
    match mode {
      SpeedMode::Planar => self.kmh(),
      SpeedMode::Geodesic => self.knots(),
    }
  }
}

// Distance thresholds in meters and speed limits in km/h.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationPolicy {
  pub near_distance: f64,
  pub watch_distance: f64,
  pub mid_distance: f64,
  pub far_distance: f64,
  pub mid_speed_limit: f64,
  pub far_speed_limit: f64,
  pub crowd_size: usize,
}

impl Default for ViolationPolicy {
  fn default() -> ViolationPolicy {
    ViolationPolicy {
      near_distance: 50.,
      watch_distance: 300.,
      mid_distance: 750.,
      far_distance: 1500.,
      mid_speed_limit: 9.26,
      far_speed_limit: 18.52,
      crowd_size: 3,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShipObservation {
  pub track_id: TrackId,
  // Meters to the merged mammal center, `None` without mammals.
  pub distance: Option<f64>,
  // `None` when the track has no usable previous observation.
  pub speed: Option<Speed>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViolationVerdict {
  pub frame_id: FrameId,
  pub mammal_present: bool,
  pub min_distance: Option<f64>,
  pub ships_within_50m: usize,
  pub ships_within_300m: usize,
  pub violation: bool,
  // Sorted and deduplicated.
  pub rules: Vec<Rule>,
}

impl ViolationPolicy {
  // Rules matched by one ship. Unknown speeds never satisfy a speed rule.
  pub fn ship_rules(&self, ship: &ShipObservation, ships_within_watch: usize) -> Vec<Rule> {
    let d = match ship.distance {
      Some(d) => d,
      None => return vec![],
    };
    let kmh = ship.speed.map(|s| s.kmh());
    let mut rules = vec![];
    if d <= self.near_distance {
      rules.push(Rule::Proximity);
    }
    if d > self.near_distance && d <= self.watch_distance && kmh.map_or(false, |v| v > 0.) {
      rules.push(Rule::MovingNear);
    }
    if d > self.watch_distance && d <= self.mid_distance
      && kmh.map_or(false, |v| v >= self.mid_speed_limit)
    {
      rules.push(Rule::FastMid);
    }
    if d > self.mid_distance && d <= self.far_distance
      && kmh.map_or(false, |v| v >= self.far_speed_limit)
    {
      rules.push(Rule::FastFar);
    }
    if d <= self.watch_distance && ships_within_watch >= self.crowd_size {
      rules.push(Rule::Crowding);
    }
    rules
  }

  // Returns the frame verdict and the rules of each ship, in input order.
  pub fn judge(
    &self,
    frame_id: FrameId,
    mammal_present: bool,
    ships: &[ShipObservation],
  ) -> (ViolationVerdict, Vec<Vec<Rule>>) {
    if !mammal_present {
      let verdict = ViolationVerdict {
        frame_id,
        mammal_present,
        min_distance: None,
        ships_within_50m: 0,
        ships_within_300m: 0,
        violation: false,
        rules: vec![Rule::NoMammal],
      };
      return (verdict, vec![vec![]; ships.len()]);
    }
    let distances: Vec<f64> = ships.iter().filter_map(|s| s.distance).collect();
    let within = |limit: f64| distances.iter().filter(|&&d| d <= limit).count();
    let ships_within_50m = within(self.near_distance);
    let ships_within_300m = within(self.watch_distance);
    let min_distance = distances.iter().copied().fold(None, |m: Option<f64>, d| {
      Some(m.map_or(d, |m| m.min(d)))
    });

    let per_ship: Vec<Vec<Rule>> = ships.iter()
      .map(|s| self.ship_rules(s, ships_within_300m))
      .collect();
    let rules: BTreeSet<Rule> = per_ship.iter().flatten().copied().collect();
    let verdict = ViolationVerdict {
      frame_id,
      mammal_present,
      min_distance,
      ships_within_50m,
      ships_within_300m,
      violation: rules.iter().any(|r| r.is_violation()),
      rules: rules.into_iter().collect(),
    };
    (verdict, per_ship)
  }
}

pub fn metric_distance(a: Vector2d, b: Vector2d, gsd: Gsd) -> f64 {
  let d = b - a;
  (d[0] * gsd.x).hypot(d[1] * gsd.y)
}

// Last observation of a tracked ship.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackState {
  pub frame_id: FrameId,
  pub time: f64,
  // Raster (col, row).
  pub center: Vector2d,
  pub fix: Option<GeoFix>,
}

// The only state carried from one frame to the next.
#[derive(Clone, Debug, Default)]
pub struct TrackStates {
  states: HashMap<TrackId, TrackState>,
}

impl TrackStates {
  pub fn new() -> TrackStates {
    TrackStates::default()
  }

  pub fn get(&self, track_id: TrackId) -> Option<&TrackState> {
    self.states.get(&track_id)
  }

  pub fn observe(&mut self, track_id: TrackId, state: TrackState) {
    self.states.insert(track_id, state);
  }

  // Drops tracks last seen more than `max_age` frames before `frame_id`.
  pub fn forget_older_than(&mut self, frame_id: FrameId, max_age: usize) -> usize {
    let before = self.states.len();
    self.states.retain(|_, s| frame_id.saturating_sub(s.frame_id) <= max_age);
    before - self.states.len()
  }

  pub fn len(&self) -> usize {
    self.states.len()
  }

  pub fn is_empty(&self) -> bool {
    self.states.is_empty()
  }
}

// Per-frame inputs of the evaluator beyond the located objects.
#[derive(Clone, Debug)]
pub struct FrameContext {
  pub frame_id: FrameId,
  // Seconds.
  pub time: f64,
  pub gsd: Gsd,
  pub drone_fix: Option<GeoFix>,
  // Raster position right below the drone.
  pub nadir: Vector2d,
}

impl FrameContext {
  pub fn new(geometry: &FrameGeometry, record: &LogRecord, frame_rate: f64) -> FrameContext {
    FrameContext {
      frame_id: geometry.frame_id,
      time: record.timestamp(geometry.frame_id, frame_rate),
      gsd: geometry.gsd,
      drone_fix: record.fix(),
      nadir: geometry.nadir_cell(),
    }
  }

  // Geographic fix of a raster position: from the drone fix along the
  // bearing of the nadir-to-object offset.
  pub fn object_fix(&self, center: Vector2d) -> Option<GeoFix> {
    let drone = self.drone_fix?;
    let east = (center[0] - self.nadir[0]) * self.gsd.x;
    let north = (self.nadir[1] - center[1]) * self.gsd.y;
    Some(drone.destination(offset_bearing(east, north), east.hypot(north)))
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShipAssessment {
  pub track_id: TrackId,
  pub center: Vector2d,
  pub distance: Option<f64>,
  pub speed: Option<Speed>,
  pub fix: Option<GeoFix>,
  pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameAssessment {
  pub verdict: ViolationVerdict,
  pub ships: Vec<ShipAssessment>,
  // Union of the mammal boxes, with its center as the distance reference.
  pub mammal_box: Option<BoundingBox>,
  pub mammal_center: Option<Vector2d>,
}

pub struct Evaluator {
  pub policy: ViolationPolicy,
  speed_mode: SpeedMode,
  frame_rate: f64,
  min_ship_confidence: f64,
  min_mammal_confidence: f64,
  track_max_age: usize,
}

impl Evaluator {
  pub fn new(params: &ParameterSet) -> Evaluator {
    Evaluator {
      policy: ViolationPolicy::default(),
      speed_mode: params.speed_mode,
      frame_rate: params.frame_rate,
      min_ship_confidence: params.min_ship_confidence,
      min_mammal_confidence: params.min_mammal_confidence,
      track_max_age: params.track_max_age,
    }
  }

  pub fn speed_mode(&self) -> SpeedMode {
    self.speed_mode
  }

  pub fn evaluate(
    &self,
    context: &FrameContext,
    objects: &[RectifiedObject],
    tracks: &mut TrackStates,
  ) -> FrameAssessment {
    let mammal_box = merge_boxes(objects.iter()
      .filter(|o| o.class == ObjectClass::Mammal && o.confidence >= self.min_mammal_confidence)
      .map(|o| &o.bbox));
    let mammal_center = mammal_box.map(|b| b.center());

    let mut seen = BTreeSet::new();
    let mut ships = vec![];
    for o in objects {
      if o.class != ObjectClass::Ship || o.confidence < self.min_ship_confidence { continue }
      if !seen.insert(o.track_id) {
        warn!("Frame {}: track {} detected twice, ignoring the repeat.", context.frame_id, o.track_id);
        continue;
      }
      let center = o.center();
      let fix = context.object_fix(center);
      ships.push(ShipAssessment {
        track_id: o.track_id,
        center,
        distance: mammal_center.map(|m| metric_distance(center, m, context.gsd)),
        speed: self.speed(context, tracks.get(o.track_id), center, fix),
        fix,
        rules: vec![],
      });
    }

    let observations: Vec<ShipObservation> = ships.iter()
      .map(|s| ShipObservation { track_id: s.track_id, distance: s.distance, speed: s.speed })
      .collect();
    let (verdict, per_ship) = self.policy.judge(context.frame_id, mammal_center.is_some(), &observations);
    for (ship, rules) in ships.iter_mut().zip(per_ship) {
      ship.rules = rules;
      tracks.observe(ship.track_id, TrackState {
        frame_id: context.frame_id,
        time: context.time,
        center: ship.center,
        fix: ship.fix,
      });
    }
    let forgotten = tracks.forget_older_than(context.frame_id, self.track_max_age);
    if forgotten > 0 {
      debug!("Frame {}: forgot {} stale tracks.", context.frame_id, forgotten);
    }

    FrameAssessment { verdict, ships, mammal_box, mammal_center }
  }

  fn speed(
    &self,
    context: &FrameContext,
    previous: Option<&TrackState>,
    center: Vector2d,
    fix: Option<GeoFix>,
  ) -> Option<Speed> {
    let previous = previous?;
    if previous.frame_id >= context.frame_id { return None }
    match self.speed_mode {
      SpeedMode::Planar => {
        let elapsed = (context.frame_id - previous.frame_id) as f64 / self.frame_rate;
        let meters = metric_distance(previous.center, center, context.gsd);
        Some(Speed::from_mps(meters / elapsed))
      },
      SpeedMode::Geodesic => {
        let (a, b) = (previous.fix?, fix?);
        let elapsed = context.time - previous.time;
        if !(elapsed > 0.) { return None }
        Some(Speed::from_mps(a.distance_to(&b) / elapsed))
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  const GSD: f64 = 0.05;

  fn context(frame_id: FrameId) -> FrameContext {
    FrameContext {
      frame_id,
      time: frame_id as f64 / 30.,
      gsd: Gsd::isotropic(GSD),
      drone_fix: None,
      nadir: Vector2d::zeros(),
    }
  }

  fn object(track_id: TrackId, class: ObjectClass, center: Vector2d, confidence: f64) -> RectifiedObject {
    RectifiedObject {
      frame_id: 0,
      track_id,
      class,
      bbox: BoundingBox::new(center[0] - 10., center[1] - 10., center[0] + 10., center[1] + 10.),
      confidence,
    }
  }

  fn mammal() -> RectifiedObject {
    object(MERGED_TRACK_ID, ObjectClass::Mammal, Vector2d::new(1000., 1000.), 0.9)
  }

  // Ship `meters` north of the mammal, shifted east by `shift` meters.
  fn ship(track_id: TrackId, meters: f64, shift: f64) -> RectifiedObject {
    let center = Vector2d::new(1000. + shift / GSD, 1000. - meters / GSD);
    object(track_id, ObjectClass::Ship, center, 0.9)
  }

  // Evaluates the ship over one second of motion and returns the second frame.
  fn moving_ship(meters: f64, kmh: f64) -> FrameAssessment {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let mut tracks = TrackStates::new();
    let first = evaluator.evaluate(&context(0), &[mammal(), ship(1, meters, 0.)], &mut tracks);
    assert!(first.ships[0].speed.is_none());
    let shift = Speed::from_kmh(kmh).meters_per_second;
    evaluator.evaluate(&context(30), &[mammal(), ship(1, meters, shift)], &mut tracks)
  }

  #[test]
  fn test_rule_1_proximity() {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let a = evaluator.evaluate(&context(0), &[mammal(), ship(1, 40., 0.)], &mut TrackStates::new());
    assert_relative_eq!(a.verdict.min_distance.unwrap(), 40., epsilon = 1e-9);
    assert_eq!(a.verdict.rules, vec![Rule::Proximity]);
    assert!(a.verdict.violation);
    assert_eq!(a.verdict.ships_within_50m, 1);
    assert_eq!(a.verdict.ships_within_300m, 1);
  }

  #[test]
  fn test_rule_2_moving_near() {
    let a = moving_ship(120., 5.);
    assert_relative_eq!(a.ships[0].speed.unwrap().kmh(), 5., epsilon = 1e-6);
    assert_eq!(a.verdict.rules, vec![Rule::MovingNear]);
    assert!(a.verdict.violation);
  }

  #[test]
  fn test_stationary_near_ship_is_fine() {
    let a = moving_ship(120., 0.);
    assert_eq!(a.ships[0].speed.unwrap().kmh(), 0.);
    assert!(a.verdict.rules.is_empty());
    assert!(!a.verdict.violation);
  }

  #[test]
  fn test_rule_3_fast_mid() {
    let a = moving_ship(500., 10.);
    assert_eq!(a.verdict.rules, vec![Rule::FastMid]);
    let a = moving_ship(500., 9.);
    assert!(a.verdict.rules.is_empty());
  }

  #[test]
  fn test_rule_4_fast_far() {
    let a = moving_ship(1000., 20.);
    assert_eq!(a.verdict.rules, vec![Rule::FastFar]);
    let a = moving_ship(1600., 40.);
    assert!(a.verdict.rules.is_empty());
  }

  #[test]
  fn test_rule_5_crowding() {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let mut tracks = TrackStates::new();
    let ships: Vec<RectifiedObject> = (0..4).map(|i| ship(i, 250., i as f64)).collect();
    let mut objects = ships.clone();
    objects.push(mammal());
    evaluator.evaluate(&context(0), &objects, &mut tracks);
    let a = evaluator.evaluate(&context(1), &objects, &mut tracks);
    assert_eq!(a.verdict.ships_within_300m, 4);
    assert_eq!(a.verdict.rules, vec![Rule::Crowding]);
    assert!(a.ships.iter().all(|s| s.rules == vec![Rule::Crowding]));
  }

  #[test]
  fn test_rule_6_no_mammal() {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let objects = [ship(1, 10., 0.), ship(2, 10., 0.5)];
    let a = evaluator.evaluate(&context(0), &objects, &mut TrackStates::new());
    assert_eq!(a.verdict.rules, vec![Rule::NoMammal]);
    assert!(!a.verdict.violation);
    assert!(a.verdict.min_distance.is_none());
    assert!(a.mammal_center.is_none());
  }

  #[test]
  fn test_low_confidence_is_ignored() {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let weak_mammal = RectifiedObject { confidence: 0.4, ..mammal() };
    let a = evaluator.evaluate(&context(0), &[weak_mammal, ship(1, 10., 0.)], &mut TrackStates::new());
    assert_eq!(a.verdict.rules, vec![Rule::NoMammal]);
    let weak_ship = RectifiedObject { confidence: 0.7, ..ship(1, 10., 0.) };
    let a = evaluator.evaluate(&context(0), &[mammal(), weak_ship], &mut TrackStates::new());
    assert!(a.ships.is_empty());
    assert!(!a.verdict.violation);
  }

  #[test]
  fn test_mammals_are_merged() {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let a = object(5, ObjectClass::Mammal, Vector2d::new(0., 0.), 0.9);
    let b = object(6, ObjectClass::Mammal, Vector2d::new(100., 40.), 0.9);
    let assessment = evaluator.evaluate(&context(0), &[a, b], &mut TrackStates::new());
    assert_eq!(assessment.mammal_center, Some(Vector2d::new(50., 20.)));
    assert_eq!(assessment.mammal_box, Some(BoundingBox::new(-10., -10., 110., 50.)));
  }

  #[test]
  fn test_unknown_speed_never_triggers_speed_rules() {
    let policy = ViolationPolicy::default();
    for d in [120., 500., 1000.] {
      let ship = ShipObservation { track_id: 1, distance: Some(d), speed: None };
      assert!(policy.ship_rules(&ship, 1).is_empty());
    }
  }

  #[test]
  fn test_all_matching_rules_are_recorded() {
    let policy = ViolationPolicy::default();
    let ships: Vec<ShipObservation> = [30., 100., 200.].iter().enumerate()
      .map(|(i, &d)| ShipObservation {
        track_id: i as TrackId,
        distance: Some(d),
        speed: Some(Speed::from_kmh(3.)),
      })
      .collect();
    let (verdict, per_ship) = policy.judge(7, true, &ships);
    assert_eq!(per_ship[0], vec![Rule::Proximity, Rule::Crowding]);
    assert_eq!(per_ship[1], vec![Rule::MovingNear, Rule::Crowding]);
    assert_eq!(verdict.rules, vec![Rule::Proximity, Rule::MovingNear, Rule::Crowding]);
    assert_eq!(verdict.min_distance, Some(30.));
    assert_eq!(verdict.ships_within_50m, 1);
  }

  #[test]
  fn test_metric_distance_scales_each_axis() {
    let gsd = Gsd { x: 0.1, y: 0.2 };
    let d = metric_distance(Vector2d::zeros(), Vector2d::new(3., 4.), gsd);
    assert_relative_eq!(d, 0.3f64.hypot(0.8), epsilon = 1e-12);
    assert_relative_eq!(metric_distance(Vector2d::zeros(), Vector2d::new(10., 0.), gsd), 1., epsilon = 1e-12);
    assert_relative_eq!(metric_distance(Vector2d::zeros(), Vector2d::new(0., 10.), gsd), 2., epsilon = 1e-12);
  }

  #[test]
  fn test_anisotropic_cells() {
    // 5 cm wide, 10 cm tall cells: the same cell offset is twice as far along a column.
    let context_at = |frame_id| FrameContext { gsd: Gsd { x: 0.05, y: 0.1 }, ..context(frame_id) };
    let evaluator = Evaluator::new(&ParameterSet::default());
    let mut tracks = TrackStates::new();
    let north = object(1, ObjectClass::Ship, Vector2d::new(1000., 600.), 0.9);
    let east = object(2, ObjectClass::Ship, Vector2d::new(1400., 1000.), 0.9);
    let a = evaluator.evaluate(&context_at(0), &[mammal(), north.clone(), east], &mut tracks);
    assert_relative_eq!(a.ships[0].distance.unwrap(), 40., epsilon = 1e-9);
    assert_relative_eq!(a.ships[1].distance.unwrap(), 20., epsilon = 1e-9);
    assert_eq!(a.verdict.rules, vec![Rule::Proximity]);
    assert_eq!(a.verdict.ships_within_50m, 2);

    // Ten rows in one second is 1 m/s.
    let moved = object(1, ObjectClass::Ship, Vector2d::new(1000., 590.), 0.9);
    let a = evaluator.evaluate(&context_at(30), &[mammal(), moved], &mut tracks);
    assert_relative_eq!(a.ships[0].speed.unwrap().meters_per_second, 1., epsilon = 1e-9);
  }

  #[test]
  fn test_planar_speed_uses_elapsed_frames() {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let mut tracks = TrackStates::new();
    evaluator.evaluate(&context(0), &[ship(1, 100., 0.)], &mut tracks);
    // Two meters in 60 frames at 30 fps.
    let a = evaluator.evaluate(&context(60), &[ship(1, 100., 2.)], &mut tracks);
    assert_relative_eq!(a.ships[0].speed.unwrap().meters_per_second, 1., epsilon = 1e-9);
  }

  #[test]
  fn test_geodesic_speed() {
    let params = ParameterSet { speed_mode: SpeedMode::Geodesic, ..ParameterSet::default() };
    let evaluator = Evaluator::new(&params);
    let mut tracks = TrackStates::new();
    let drone = GeoFix::new(33.2, 126.3);
    let context = |frame_id: FrameId, time: f64| FrameContext {
      drone_fix: Some(drone),
      time,
      ..self::context(frame_id)
    };
    let north = |meters: f64| object(1, ObjectClass::Ship, Vector2d::new(0., -meters / GSD), 0.9);
    let a = evaluator.evaluate(&context(0, 0.), &[north(100.)], &mut tracks);
    let fix = a.ships[0].fix.unwrap();
    assert_relative_eq!(drone.distance_to(&fix), 100., epsilon = 1e-6);
    assert!(fix.latitude > drone.latitude);
    let a = evaluator.evaluate(&context(300, 10.), &[north(105.)], &mut tracks);
    let speed = a.ships[0].speed.unwrap();
    assert_relative_eq!(speed.meters_per_second, 0.5, epsilon = 1e-6);
    assert_relative_eq!(speed.in_unit_of(SpeedMode::Geodesic), 0.5 * 3600. / 1852., epsilon = 1e-6);
  }

  #[test]
  fn test_geodesic_speed_needs_fix() {
    let params = ParameterSet { speed_mode: SpeedMode::Geodesic, ..ParameterSet::default() };
    let evaluator = Evaluator::new(&params);
    let mut tracks = TrackStates::new();
    evaluator.evaluate(&context(0), &[ship(1, 100., 0.)], &mut tracks);
    let a = evaluator.evaluate(&context(30), &[ship(1, 100., 2.)], &mut tracks);
    assert!(a.ships[0].speed.is_none());
  }

  #[test]
  fn test_stale_tracks_are_forgotten() {
    let evaluator = Evaluator::new(&ParameterSet::default());
    let mut tracks = TrackStates::new();
    evaluator.evaluate(&context(0), &[ship(1, 100., 0.)], &mut tracks);
    evaluator.evaluate(&context(50), &[ship(2, 100., 0.)], &mut tracks);
    assert_eq!(tracks.len(), 2);
    evaluator.evaluate(&context(91), &[], &mut tracks);
    assert_eq!(tracks.len(), 1);
    assert!(tracks.get(2).is_some());
  }
}
