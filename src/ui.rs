use crossbeam::channel::Receiver;
use eframe::egui;
use image::RgbaImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::controller::{CameraStatus, InteractionController};
use crate::notify::{Notice, NoticeKind};
use crate::processing::Readiness;

const BANNER_DURATION: Duration = Duration::from_secs(4);
const BUTTON_HEIGHT: f32 = 36.0;
const SPACING: f32 = 10.0;

// ============================================================================
// MAIN APP STRUCT
// ============================================================================

pub struct SnapshotApp {
    controller: InteractionController,
    notices: Receiver<Notice>,

    // Textures
    pub preview_texture: Option<egui::TextureHandle>,
    pub canvas_texture: Option<egui::TextureHandle>,
    last_preview: Option<Arc<RgbaImage>>,
    last_canvas_revision: Option<u64>,

    // Processing failure banner
    banner: Option<(String, Instant)>,
}

impl SnapshotApp {
    pub fn new(controller: InteractionController, notices: Receiver<Notice>) -> Self {
        Self {
            controller,
            notices,
            preview_texture: None,
            canvas_texture: None,
            last_preview: None,
            last_canvas_revision: None,
            banner: None,
        }
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for SnapshotApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        self.drain_notices();
        self.refresh_textures(ctx);
        self.render_ui(ctx);
        self.render_banner(ctx);

        ctx.request_repaint_after(self.controller.frame_interval());
    }
}

impl SnapshotApp {
    fn drain_notices(&mut self) {
        for notice in self.notices.try_iter() {
            match notice.kind {
                NoticeKind::CameraUnavailable => {
                    // Blocking, like a browser alert
                    rfd::MessageDialog::new()
                        .set_level(rfd::MessageLevel::Error)
                        .set_title("Camera unavailable")
                        .set_description(&notice.message)
                        .set_buttons(rfd::MessageButtons::Ok)
                        .show();
                }
                NoticeKind::ProcessingFailed => {
                    let text = format!("{}  {}", notice.at.format("%H:%M:%S"), notice.message);
                    self.banner = Some((text, Instant::now()));
                }
            }
        }
    }

    fn refresh_textures(&mut self, ctx: &egui::Context) {
        if let Some(frame) = self.controller.surface().current_frame() {
            let is_new = !self
                .last_preview
                .as_ref()
                .is_some_and(|last| Arc::ptr_eq(last, &frame));
            if is_new {
                self.update_preview_texture(ctx, &frame);
                self.last_preview = Some(frame);
            }
        }

        let revision = self.controller.canvas_revision();
        if self.last_canvas_revision != Some(revision) {
            let canvas = self.controller.canvas();
            self.update_canvas_texture(ctx, &canvas);
            self.last_canvas_revision = Some(revision);
        }
    }

    fn render_ui(&mut self, ctx: &egui::Context) {
        let side = self.controller.capture_size() as f32;
        let image_size = egui::vec2(side, side);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(SPACING);

                // Live preview
                match &self.preview_texture {
                    Some(texture) => {
                        ui.add(egui::Image::new(texture).fit_to_exact_size(image_size));
                    }
                    None => self.render_placeholder(ui, image_size),
                }

                ui.add_space(SPACING);

                // Trigger
                let button = egui::Button::new(self.controller.button_label())
                    .min_size(egui::vec2(side, BUTTON_HEIGHT));
                if ui.add_enabled(self.controller.can_take_photo(), button).clicked() {
                    let _ = self.controller.take_photo();
                }
                if self.controller.processing_readiness() == Readiness::Initializing {
                    ui.label(egui::RichText::new("Loading image processing...").weak());
                }

                ui.add_space(SPACING);

                // Captured / processed canvas
                if let Some(texture) = &self.canvas_texture {
                    ui.add(egui::Image::new(texture).fit_to_exact_size(image_size));
                }
            });
        });
    }

    fn render_placeholder(&self, ui: &mut egui::Ui, size: egui::Vec2) {
        let (rect, _) = ui.allocate_exact_size(size, egui::Sense::hover());
        ui.painter().rect_filled(rect, 0.0, egui::Color32::from_rgb(40, 40, 40));

        let text = match self.controller.camera_status() {
            CameraStatus::Acquiring => "Starting camera...",
            CameraStatus::Live => "",
            CameraStatus::Unavailable(_) => "No camera available",
        };
        ui.painter().text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            text,
            egui::FontId::proportional(14.0),
            egui::Color32::WHITE,
        );
    }

    fn render_banner(&mut self, ctx: &egui::Context) {
        if let Some((_, shown_at)) = &self.banner {
            if shown_at.elapsed() > BANNER_DURATION {
                self.banner = None;
            }
        }

        if let Some((message, _)) = &self.banner {
            egui::Area::new("processing_failed")
                .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, SPACING * 2.0))
                .order(egui::Order::Tooltip)
                .show(ctx, |ui| {
                    egui::Frame::none()
                        .fill(egui::Color32::from_rgb(180, 40, 40))
                        .rounding(8.0)
                        .inner_margin(egui::Margin::symmetric(20.0, 15.0))
                        .show(ui, |ui| {
                            ui.label(
                                egui::RichText::new(message.as_str())
                                    .color(egui::Color32::WHITE)
                                    .size(18.0),
                            );
                        });
                });
        }
    }
}
