use async_trait::async_trait;
use image::{GrayImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ProcessingError;
use crate::pixel_buffer::PixelBuffer;
use crate::processing::{ProcessingCapability, ProcessingResponse};

/// One step of the built-in processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Filter {
    Grayscale,
    Threshold { level: u8 },
    Edges { low: f32, high: f32 },
    Blur { sigma: f32 },
    Invert,
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Threshold { level } => write!(f, "{} ({})", self.name(), level),
            Filter::Edges { low, high } => write!(f, "{} ({}..{})", self.name(), low, high),
            Filter::Blur { sigma } => write!(f, "{} (sigma {})", self.name(), sigma),
            _ => write!(f, "{}", self.name()),
        }
    }
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Grayscale => "Grayscale",
            Filter::Threshold { .. } => "Threshold",
            Filter::Edges { .. } => "Edges",
            Filter::Blur { .. } => "Blur",
            Filter::Invert => "Invert",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Filter::Edges { low, high } => {
                if !low.is_finite() || !high.is_finite() || low < 0.0 {
                    return Err(format!("invalid edge thresholds {}..{}", low, high));
                }
                if low > high {
                    return Err(format!("edge low threshold {} exceeds high threshold {}", low, high));
                }
                Ok(())
            }
            Filter::Blur { sigma } => {
                if !sigma.is_finite() || sigma <= 0.0 {
                    return Err(format!("blur sigma must be positive, got {}", sigma));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, image: RgbaImage) -> RgbaImage {
        match *self {
            Filter::Grayscale => with_luma(&image, &grayscale(&image)),
            Filter::Threshold { level } => {
                let binary = imageproc::contrast::threshold(&grayscale(&image), level);
                with_luma(&image, &binary)
            }
            Filter::Edges { low, high } => {
                let edges = imageproc::edges::canny(&grayscale(&image), low, high);
                with_luma(&image, &edges)
            }
            Filter::Blur { sigma } => imageproc::filter::gaussian_blur_f32(&image, sigma),
            Filter::Invert => {
                let mut image = image;
                image::imageops::invert(&mut image);
                image
            }
        }
    }
}

pub fn apply_pipeline(image: RgbaImage, pipeline: &[Filter]) -> RgbaImage {
    pipeline.iter().fold(image, |image, filter| filter.apply(image))
}

fn grayscale(image: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Spread a single-channel result back over RGB, keeping the original alpha.
fn with_luma(original: &RgbaImage, luma: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(original.width(), original.height(), |x, y| {
        let l = luma.get_pixel(x, y)[0];
        Rgba([l, l, l, original.get_pixel(x, y)[3]])
    })
}

/// In-process image processing built on `imageproc`.
pub struct LocalCv {
    pipeline: Arc<Vec<Filter>>,
    loaded: AtomicBool,
}

impl LocalCv {
    pub fn new(pipeline: Vec<Filter>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            loaded: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ProcessingCapability for LocalCv {
    async fn load(&self) -> Result<(), ProcessingError> {
        for filter in self.pipeline.iter() {
            filter.validate().map_err(ProcessingError::Load)?;
        }
        if self.pipeline.is_empty() {
            log::warn!("Processing pipeline is empty, frames will pass through unchanged");
        }

        // Run the whole pipeline once so the first real frame does not pay
        // for any lazy setup inside the filters.
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || {
            apply_pipeline(RgbaImage::from_pixel(8, 8, Rgba([128, 128, 128, 255])), &pipeline)
        })
        .await
        .map_err(|e| ProcessingError::Load(format!("warm-up run failed: {}", e)))?;

        let names: Vec<String> = self.pipeline.iter().map(|f| f.to_string()).collect();
        log::info!("Processing pipeline loaded: [{}]", names.join(", "));
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn image_processing(&self, image: PixelBuffer) -> Result<ProcessingResponse, ProcessingError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(ProcessingError::NotReady);
        }

        let pipeline = Arc::clone(&self.pipeline);
        let processed = tokio::task::spawn_blocking(move || apply_pipeline(image.into_image(), &pipeline))
            .await
            .map_err(|e| ProcessingError::Transform(e.to_string()))?;

        Ok(ProcessingResponse::new(PixelBuffer::from_image(processed)))
    }

    fn name(&self) -> &str {
        "local-cv"
    }
}
