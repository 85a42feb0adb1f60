use image::RgbaImage;
#[cfg(test)]
use image::Rgba;

/// Square grid of RGBA samples, the unit passed between capture,
/// processing and the on-screen canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// A transparent `size` x `size` buffer, the state of a fresh canvas.
    pub fn new(size: u32) -> Self {
        Self {
            image: RgbaImage::new(size, size),
        }
    }

    #[cfg(test)]
    pub fn filled(size: u32, color: Rgba<u8>) -> Self {
        Self {
            image: RgbaImage::from_pixel(size, size, color),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_square_of(&self, size: u32) -> bool {
        self.dimensions() == (size, size)
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Raw RGBA bytes, row-major.
    #[cfg(test)]
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Overwrite the region starting at `(x, y)` with `source`, clipped to
    /// this buffer's bounds. Dimensions of `self` never change.
    pub fn put(&mut self, source: &PixelBuffer, x: u32, y: u32) {
        image::imageops::replace(&mut self.image, &source.image, x as i64, y as i64);
    }

    #[cfg(test)]
    pub fn is_uniform(&self, color: Rgba<u8>) -> bool {
        self.image.pixels().all(|p| *p == color)
    }
}
