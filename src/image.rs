use crate::all::*;

// Row-major interleaved 8-bit image storage.
#[derive(Clone, PartialEq)]
pub struct Image {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
  pub channels: usize,
}

impl Image {
  pub fn new(width: usize, height: usize, channels: usize) -> Image {
    Image {
      data: vec![0; width * height * channels],
      width,
      height,
      channels,
    }
  }

  pub fn row_len(&self) -> usize {
    self.width * self.channels
  }

  #[inline(always)]
  pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
    let i = (y * self.width + x) * self.channels;
    &self.data[i .. i + self.channels]
  }

  #[inline(always)]
  pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [u8] {
    let i = (y * self.width + x) * self.channels;
    &mut self.data[i .. i + self.channels]
  }

  #[inline(always)]
  pub fn value(&self, x: usize, y: usize, channel: usize) -> u8 {
    self.data[(y * self.width + x) * self.channels + channel]
  }

  // Grayscale sources stay single channel, everything else becomes RGB.
  pub fn load(path: &Path) -> Result<Image> {
    let decoded = ::image::open(path)
      .context(format!("Failed to decode image {}.", path.display()))?;
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    if decoded.color().has_color() {
      Ok(Image { data: decoded.to_rgb8().into_raw(), width, height, channels: 3 })
    }
    else {
      Ok(Image { data: decoded.to_luma8().into_raw(), width, height, channels: 1 })
    }
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    use ::image::ColorType;
    let color = match self.channels {
      1 => ColorType::L8,
      2 => ColorType::La8,
      3 => ColorType::Rgb8,
      4 => ColorType::Rgba8,
      n => bail!("Cannot save an image with {} channels.", n),
    };
    ::image::save_buffer(path, &self.data, self.width as u32, self.height as u32, color)
      .context(format!("Failed to write image {}.", path.display()))
  }
}

// Row access in the manner of `image[y]`, channels interleaved.
impl Index<usize> for Image {
  type Output = [u8];
  fn index(&self, y: usize) -> &Self::Output {
    let n = self.row_len();
    &self.data[y * n .. (y + 1) * n]
  }
}

impl fmt::Debug for Image {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Image({}x{}x{})", self.width, self.height, self.channels)
  }
}
