use egui::{Context, TextureHandle, TextureOptions};
use image::RgbaImage;

use crate::pixel_buffer::PixelBuffer;
use crate::ui::SnapshotApp;

impl SnapshotApp {
    pub fn update_preview_texture(&mut self, ctx: &Context, frame: &RgbaImage) {
        // Skip empty frames instead of flashing an empty texture
        if frame.width() == 0 || frame.height() == 0 {
            return;
        }
        upload(&mut self.preview_texture, ctx, "camera_preview", frame);
    }

    pub fn update_canvas_texture(&mut self, ctx: &Context, canvas: &PixelBuffer) {
        upload(&mut self.canvas_texture, ctx, "capture_canvas", canvas.as_image());
    }
}

fn upload(slot: &mut Option<TextureHandle>, ctx: &Context, name: &str, image: &RgbaImage) {
    let size = [image.width() as usize, image.height() as usize];
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());

    match slot {
        // Reuse the texture while the size holds
        Some(texture) if texture.size() == size => {
            texture.set(color_image, TextureOptions::NEAREST);
        }
        _ => {
            *slot = Some(ctx.load_texture(name, color_image, TextureOptions::NEAREST));
        }
    }
}
