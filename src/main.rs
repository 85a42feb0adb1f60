use anyhow::Result;
use eframe::egui;
use log::info;
use std::sync::Arc;

mod camera_controller;
mod capture;
mod config;
mod controller;
mod cv;
mod error;
mod frame_source;
mod notify;
mod pixel_buffer;
mod processing;
mod texture;
mod ui;

#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::controller::{ControllerSettings, InteractionController};
use crate::cv::LocalCv;
use crate::notify::ChannelNotifier;
use crate::ui::SnapshotApp;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting snapshot-cv");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;
    info!(
        "Configuration loaded: {}x{} capture, {:?} camera",
        config.capture.size, config.capture.size, config.camera.backend
    );

    // Initialize components
    let camera = camera_controller::build_camera(&config.camera);
    let capability = Arc::new(LocalCv::new(config.processing.pipeline.clone()));
    let (notifier, notices) = ChannelNotifier::new();

    let controller = InteractionController::new(
        ControllerSettings::from(&config),
        tokio::runtime::Handle::current(),
        camera,
        capability,
        Arc::new(notifier),
    );
    controller.mount();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.display.width as f32, config.display.height as f32])
            .with_fullscreen(config.display.fullscreen),
        ..Default::default()
    };

    info!("Launching GUI application...");

    let app_controller = controller.clone();
    eframe::run_native(
        "Snapshot CV",
        options,
        Box::new(move |cc| {
            setup_style(&cc.egui_ctx);
            Box::new(SnapshotApp::new(app_controller, notices))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    controller.shutdown();
    info!("Application shut down gracefully");
    Ok(())
}

fn setup_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    style.spacing.button_padding = egui::vec2(16.0, 10.0);
    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(18.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(16.0, egui::FontFamily::Proportional),
    );

    ctx.set_style(style);
}
