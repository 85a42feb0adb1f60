use async_trait::async_trait;
use image::{ImageBuffer, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

use crate::config::CameraConfig;
use crate::error::CameraError;

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Facing {
    User,
    Environment,
}

/// Camera implementation selected in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraBackend {
    Rpicam,
    TestPattern,
}

/// Parameters of a camera acquisition. Video only; width and height both
/// come from the capture size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub audio: bool,
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
}

impl CameraRequest {
    pub fn video(size: u32, facing: Facing) -> Self {
        Self {
            audio: false,
            facing,
            width: size,
            height: size,
        }
    }
}

/// A camera that can be opened into a live stream of frames.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, request: &CameraRequest) -> Result<Box<dyn VideoStream>, CameraError>;

    fn name(&self) -> &str;
}

/// An open camera stream.
#[async_trait]
pub trait VideoStream: Send {
    /// Next decoded frame; `None` once the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<RgbaImage>, CameraError>;

    /// Release the device. Called once when playback ends.
    fn stop(&mut self) {}
}

pub fn build_camera(config: &CameraConfig) -> Arc<dyn CameraDevice> {
    match config.backend {
        CameraBackend::Rpicam => Arc::new(RpicamCamera::new(config.quality)),
        CameraBackend::TestPattern => Arc::new(TestPatternCamera),
    }
}

// ============================================================================
// RASPBERRY PI CAMERA (rpicam-still / raspistill)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StillTool {
    Rpicam,
    Raspistill,
}

impl StillTool {
    fn program(&self) -> &'static str {
        match self {
            StillTool::Rpicam => "rpicam-still",
            StillTool::Raspistill => "raspistill",
        }
    }

    fn probe_arg(&self) -> &'static str {
        match self {
            StillTool::Rpicam => "--help",
            StillTool::Raspistill => "-?",
        }
    }

    fn still_args(&self, output: &str, width: u32, height: u32, quality: u8) -> Vec<String> {
        let (width, height, quality) = (width.to_string(), height.to_string(), quality.to_string());
        let args: Vec<&str> = match self {
            StillTool::Rpicam => vec![
                "-o", output,
                "--width", &width,
                "--height", &height,
                "--quality", &quality,
                "--immediate",
                "--nopreview",
                "--timeout", "100",
            ],
            StillTool::Raspistill => vec![
                "-o", output,
                "-w", &width,
                "-h", &height,
                "-q", &quality,
                "-t", "100",
                "-n",
            ],
        };
        args.into_iter().map(String::from).collect()
    }
}

/// Raspberry Pi camera driven through the libcamera still-capture tools.
/// Each frame is one quick JPEG still.
pub struct RpicamCamera {
    quality: u8,
}

impl RpicamCamera {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100),
        }
    }

    async fn detect_tool() -> Result<StillTool, CameraError> {
        let mut last_error = String::new();
        for tool in [StillTool::Rpicam, StillTool::Raspistill] {
            match Command::new(tool.program()).arg(tool.probe_arg()).output().await {
                Ok(_) => {
                    log::info!("Using {} for camera capture", tool.program());
                    return Ok(tool);
                }
                Err(e) => {
                    log::warn!("{} not found: {}", tool.program(), e);
                    last_error = e.to_string();
                }
            }
        }
        Err(CameraError::Unsupported(format!(
            "neither rpicam-still nor raspistill found ({})",
            last_error
        )))
    }
}

#[async_trait]
impl CameraDevice for RpicamCamera {
    async fn open(&self, request: &CameraRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        if request.facing != Facing::User {
            log::debug!("rpicam has no facing selection, ignoring {:?}", request.facing);
        }
        let tool = Self::detect_tool().await?;
        let frame_path = std::env::temp_dir()
            .join(format!("snapshot_cv_frame_{}.jpg", std::process::id()));

        Ok(Box::new(RpicamStream {
            tool,
            frame_path,
            width: request.width,
            height: request.height,
            quality: self.quality,
        }))
    }

    fn name(&self) -> &str {
        "rpicam"
    }
}

struct RpicamStream {
    tool: StillTool,
    frame_path: PathBuf,
    width: u32,
    height: u32,
    quality: u8,
}

#[async_trait]
impl VideoStream for RpicamStream {
    async fn next_frame(&mut self) -> Result<Option<RgbaImage>, CameraError> {
        let output_path = self.frame_path.to_string_lossy().into_owned();
        let args = self.tool.still_args(&output_path, self.width, self.height, self.quality);

        let output = Command::new(self.tool.program())
            .args(&args)
            .output()
            .await
            .map_err(|e| CameraError::Unsupported(format!("{}: {}", self.tool.program(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!("{} failed with status {}: {}", self.tool.program(), output.status, stderr.trim());
            return Err(classify_failure(&stderr));
        }

        let frame = image::open(&self.frame_path)
            .map_err(|e| CameraError::Frame(format!("failed to decode still: {}", e)))?;
        Ok(Some(frame.to_rgba8()))
    }

    fn stop(&mut self) {
        if self.frame_path.exists() {
            let _ = std::fs::remove_file(&self.frame_path);
        }
    }
}

impl Drop for RpicamStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn classify_failure(stderr: &str) -> CameraError {
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") {
        CameraError::PermissionDenied(stderr.trim().to_string())
    } else if lower.contains("no cameras available") {
        CameraError::NoDevice(stderr.trim().to_string())
    } else {
        CameraError::Frame(stderr.trim().to_string())
    }
}

// ============================================================================
// TEST PATTERN (development machines without a camera)
// ============================================================================

pub struct TestPatternCamera;

#[async_trait]
impl CameraDevice for TestPatternCamera {
    async fn open(&self, request: &CameraRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        log::warn!("Using test pattern camera - no real device is opened");
        Ok(Box::new(TestPatternStream {
            width: request.width.max(1),
            height: request.height.max(1),
            tick: 0,
        }))
    }

    fn name(&self) -> &str {
        "test-pattern"
    }
}

struct TestPatternStream {
    width: u32,
    height: u32,
    tick: u32,
}

#[async_trait]
impl VideoStream for TestPatternStream {
    async fn next_frame(&mut self) -> Result<Option<RgbaImage>, CameraError> {
        let (width, height) = (self.width, self.height);
        let phase = self.tick as f32 * 0.1;
        self.tick = self.tick.wrapping_add(1);

        let frame = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x as f32 / width as f32 * 155.0) + (phase * 1.5).sin() * 50.0;
            let g = (y as f32 / height as f32 * 155.0) + (phase * 0.9).cos() * 50.0;
            let b = ((x + y) as f32 / (width + height) as f32 * 155.0) + (phase * 2.1).sin() * 50.0;
            image::Rgba([
                (r.max(0.0) as u8).saturating_add(50),
                (g.max(0.0) as u8).saturating_add(50),
                (b.max(0.0) as u8).saturating_add(50),
                255,
            ])
        });
        Ok(Some(frame))
    }
}
