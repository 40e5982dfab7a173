use crate::all::*;

// Axis-aligned box in pixel or raster coordinates, `min` is the top left
// corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
  pub min: Vector2d,
  pub max: Vector2d,
}

impl BoundingBox {
  pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingBox {
    BoundingBox {
      min: Vector2d::new(x1.min(x2), y1.min(y2)),
      max: Vector2d::new(x1.max(x2), y1.max(y2)),
    }
  }

  pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> BoundingBox {
    BoundingBox::new(x, y, x + w, y + h)
  }

  pub fn from_points(points: &[Vector2d]) -> Option<BoundingBox> {
    let first = points.first()?;
    let mut b = BoundingBox { min: *first, max: *first };
    for p in &points[1..] {
      b.min = b.min.inf(p);
      b.max = b.max.sup(p);
    }
    Some(b)
  }

  pub fn center(&self) -> Vector2d {
    (self.min + self.max) / 2.
  }

  pub fn width(&self) -> f64 {
    self.max[0] - self.min[0]
  }

  pub fn height(&self) -> f64 {
    self.max[1] - self.min[1]
  }

  // Top left, top right, bottom right, bottom left.
  pub fn corners(&self) -> [Vector2d; 4] {
    [
      self.min,
      Vector2d::new(self.max[0], self.min[1]),
      self.max,
      Vector2d::new(self.min[0], self.max[1]),
    ]
  }

  pub fn union(&self, other: &BoundingBox) -> BoundingBox {
    BoundingBox {
      min: self.min.inf(&other.min),
      max: self.max.sup(&other.max),
    }
  }

  // Clips to the pixel index range of a `width` x `height` image. Boxes that
  // collapse are dropped.
  pub fn clip(&self, width: usize, height: usize) -> Option<BoundingBox> {
    if width == 0 || height == 0 { return None }
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;
    let b = BoundingBox {
      min: Vector2d::new(self.min[0].clamp(0., max_x), self.min[1].clamp(0., max_y)),
      max: Vector2d::new(self.max[0].clamp(0., max_x), self.max[1].clamp(0., max_y)),
    };
    if b.min[0] >= b.max[0] || b.min[1] >= b.max[1] { return None }
    Some(b)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectClass {
  Ship,
  Mammal,
  Other(u32),
}

impl ObjectClass {
  pub fn classify(class_id: u32, ship_class: u32, mammal_class: u32) -> ObjectClass {
    if class_id == ship_class { ObjectClass::Ship }
    else if class_id == mammal_class { ObjectClass::Mammal }
    else { ObjectClass::Other(class_id) }
  }
}

impl fmt::Display for ObjectClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ObjectClass::Ship => write!(f, "ship"),
      ObjectClass::Mammal => write!(f, "mammal"),
      ObjectClass::Other(id) => write!(f, "class{}", id),
    }
  }
}

// One tracked detection in pixel space.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
  pub frame_id: FrameId,
  pub track_id: TrackId,
  pub class_id: u32,
  pub bbox: BoundingBox,
  pub confidence: f64,
}

// A detection after inverse mapping, with its box in raster (col, row)
// coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct RectifiedObject {
  pub frame_id: FrameId,
  pub track_id: TrackId,
  pub class: ObjectClass,
  pub bbox: BoundingBox,
  pub confidence: f64,
}

impl RectifiedObject {
  pub fn center(&self) -> Vector2d {
    self.bbox.center()
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPoint {
  pub frame_id: FrameId,
  pub track_id: TrackId,
  pub class_id: u32,
  pub pixel: Vector2d,
}

// `cell` is `None` when the point could not be located in the raster.
#[derive(Clone, Debug, PartialEq)]
pub struct RectifiedPoint {
  pub frame_id: FrameId,
  pub track_id: TrackId,
  pub class_id: u32,
  pub cell: Option<Vector2d>,
}

// Union of all mammal boxes, the evaluator measures distances to its center.
pub fn merge_boxes<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<BoundingBox> {
  boxes.into_iter().fold(None, |merged, b| match merged {
    Some(m) => Some(b.union(&m)),
    None => Some(*b),
  })
}
