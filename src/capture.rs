use image::imageops::FilterType;
use image::RgbaImage;

use crate::pixel_buffer::PixelBuffer;

/// Draw `frame` into the top-left `size` x `size` region of `canvas`, where
/// `size` is the canvas size, and read that region back.
///
/// Frames that do not already match the canvas are scaled to fit it, the
/// same way a video frame is drawn stretched into a fixed-size canvas.
pub fn capture(frame: &RgbaImage, canvas: &mut PixelBuffer) -> PixelBuffer {
    let (size, _) = canvas.dimensions();
    let drawn = draw_frame(frame, size);
    canvas.put(&drawn, 0, 0);
    drawn
}

fn draw_frame(frame: &RgbaImage, size: u32) -> PixelBuffer {
    if frame.dimensions() == (size, size) {
        return PixelBuffer::from_image(frame.clone());
    }
    log::debug!(
        "Scaling {}x{} frame into {}x{} capture region",
        frame.width(),
        frame.height(),
        size,
        size
    );
    PixelBuffer::from_image(image::imageops::resize(frame, size, size, FilterType::Triangle))
}
