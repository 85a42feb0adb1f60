use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::camera_controller::{CameraBackend, Facing};
use crate::cv::Filter;

pub const DEFAULT_CONFIG_FILE: &str = "snapshot_config.toml";
pub const DEFAULT_CAPTURE_SIZE: u32 = 200;
pub const MAX_CAPTURE_SIZE: u32 = 2048;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub camera: CameraConfig,
    pub processing: ProcessingConfig,
    pub display: DisplayConfig,
    pub paths: PathConfig,
}

/// `size` is the single capture size: camera request, capture region,
/// canvas and processing buffers all use it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    pub facing: Facing,
    pub frame_interval_ms: u64,
    pub quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Give up on a frame after this long. Unset means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub pipeline: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                size: DEFAULT_CAPTURE_SIZE,
            },
            camera: CameraConfig {
                backend: CameraBackend::Rpicam,
                facing: Facing::User,
                frame_interval_ms: 33,
                quality: 70,
            },
            processing: ProcessingConfig {
                timeout_ms: None,
                pipeline: vec![Filter::Grayscale],
            },
            display: DisplayConfig {
                width: 800,
                height: 480,
                fullscreen: true,
            },
            paths: PathConfig {
                config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            },
        }
    }
}

impl Config {
    /// Read `snapshot_config.toml` from the working directory, writing the
    /// preset for this machine there first if it does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_or_create(DEFAULT_CONFIG_FILE)
    }

    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path);
        }

        log::info!("No configuration at {}, writing defaults", path.display());
        let config = Self {
            paths: PathConfig {
                config_file: path.to_path_buf(),
            },
            ..Self::for_this_machine()
        };
        config.save()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read configuration {}", path.display()))?;
        let config = toml::from_str::<Self>(&text)
            .with_context(|| format!("Malformed configuration {}", path.display()))?;

        log::info!(
            "Configuration read from {} ({} filter(s), capture {}px)",
            path.display(),
            config.processing.pipeline.len(),
            config.capture.size
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).context("Cannot encode configuration as TOML")?;

        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create directory {}", dir.display()))?,
            _ => {}
        }
        std::fs::write(path, text).with_context(|| format!("Cannot write configuration {}", path.display()))?;

        log::info!("Configuration written to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let size = self.capture.size;
        ensure!(
            (1..=MAX_CAPTURE_SIZE).contains(&size),
            "Capture size {} out of range 1..={}",
            size,
            MAX_CAPTURE_SIZE
        );
        ensure!(
            self.display.width > 0 && self.display.height > 0,
            "Window size {}x{} is empty",
            self.display.width,
            self.display.height
        );
        ensure!(self.camera.frame_interval_ms > 0, "Camera frame interval must be at least 1 ms");
        ensure!(
            self.camera.quality <= 100,
            "Camera quality {} above 100",
            self.camera.quality
        );
        if self.processing.timeout_ms == Some(0) {
            bail!("Processing timeout of 0 ms would fail every photo; omit it to wait indefinitely");
        }

        for (index, filter) in self.processing.pipeline.iter().enumerate() {
            if let Err(reason) = filter.validate() {
                bail!("Filter #{} ({}) is invalid: {}", index + 1, filter.name(), reason);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub struct ConfigBuilder {
    config: Config,
}

#[cfg(test)]
impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn capture_size(mut self, size: u32) -> Self {
        self.config.capture.size = size;
        self
    }

    pub fn camera_backend(mut self, backend: CameraBackend) -> Self {
        self.config.camera.backend = backend;
        self
    }

    pub fn frame_interval_ms(mut self, interval: u64) -> Self {
        self.config.camera.frame_interval_ms = interval;
        self
    }

    pub fn pipeline(mut self, pipeline: Vec<Filter>) -> Self {
        self.config.processing.pipeline = pipeline;
        self
    }

    pub fn processing_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        self.config.processing.timeout_ms = timeout;
        self
    }

    pub fn fullscreen(mut self, enabled: bool) -> Self {
        self.config.display.fullscreen = enabled;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Presets for the two places this usually runs.
impl Config {
    /// The Pi has the camera module; anything else gets the test pattern.
    pub fn for_this_machine() -> Self {
        if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
            Self::raspberry_pi_7inch()
        } else {
            Self::development_desktop()
        }
    }

    pub fn raspberry_pi_7inch() -> Self {
        Config {
            display: DisplayConfig {
                width: 800,
                height: 480,
                fullscreen: true,
            },
            ..Default::default()
        }
    }

    pub fn development_desktop() -> Self {
        Config {
            camera: CameraConfig {
                backend: CameraBackend::TestPattern,
                ..Config::default().camera
            },
            display: DisplayConfig {
                width: 1024,
                height: 768,
                fullscreen: false,
            },
            ..Default::default()
        }
    }
}
