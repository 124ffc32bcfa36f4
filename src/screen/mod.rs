//! Screen capture boundary and the per-step observation.

pub mod ocr;

use async_trait::async_trait;
use image::DynamicImage;

use crate::errors::{DeskPilotError, DeskPilotResult};

/// A raw capture of the primary display.
#[derive(Debug, Clone)]
pub struct Frame {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Abstract capture source. OS-specific capture lives outside this crate;
/// tests and dry runs use [`SolidColorSource`] or a file-backed source.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    async fn capture(&mut self) -> DeskPilotResult<Frame>;
}

/// Serves a fixed-size solid-color frame. Used by `--dry-run` and tests,
/// where no OS capture adapter is wired in.
pub struct SolidColorSource {
    width: u32,
    height: u32,
    png: Option<Vec<u8>>,
}

impl SolidColorSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            png: None,
        }
    }
}

#[async_trait]
impl ScreenSource for SolidColorSource {
    async fn capture(&mut self) -> DeskPilotResult<Frame> {
        if self.png.is_none() {
            let img = image::RgbaImage::from_pixel(
                self.width,
                self.height,
                image::Rgba([40, 44, 52, 255]),
            );
            self.png = Some(encode_png(&DynamicImage::ImageRgba8(img))?);
        }
        Ok(Frame {
            png: self.png.clone().unwrap_or_default(),
            width: self.width,
            height: self.height,
        })
    }
}

/// Serves a PNG file from disk, re-capturing it on every call so an
/// external process can swap the file between steps.
pub struct FileSource {
    path: std::path::PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScreenSource for FileSource {
    async fn capture(&mut self) -> DeskPilotResult<Frame> {
        let png = tokio::fs::read(&self.path).await?;
        let img = image::load_from_memory(&png)
            .map_err(|e| DeskPilotError::Perception(format!("decode {}: {e}", self.path.display())))?;
        Ok(Frame {
            width: img.width(),
            height: img.height(),
            png,
        })
    }
}

/// One step's view of the screen: the raw capture plus a copy scaled into
/// grounding space. Immutable for the rest of the step.
#[derive(Debug, Clone)]
pub struct Observation {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// The capture resized to fit the grounding canvas.
    pub grounding_png: Vec<u8>,
    /// Canvas the grounding model returns coordinates in.
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Observation {
    pub fn from_frame(frame: Frame, canvas_width: u32, canvas_height: u32) -> DeskPilotResult<Self> {
        let img = image::load_from_memory(&frame.png)
            .map_err(|e| DeskPilotError::Perception(format!("decode frame: {e}")))?;
        let scaled = resize_to_fit(&img, canvas_width, canvas_height);
        let grounding_png = if scaled.width() == img.width() && scaled.height() == img.height() {
            frame.png.clone()
        } else {
            encode_png(&scaled)?
        };
        Ok(Self {
            png: frame.png,
            width: frame.width,
            height: frame.height,
            grounding_png,
            canvas_width,
            canvas_height,
        })
    }

    /// Maps a grounding-space point back to screen pixels. The declared
    /// canvas dimensions are the scale reference; getting this wrong means
    /// every click misses.
    pub fn rescale(&self, gx: i32, gy: i32) -> (i32, i32) {
        let x = (gx as f64 * self.width as f64 / self.canvas_width as f64).round() as i32;
        let y = (gy as f64 * self.height as f64 / self.canvas_height as f64).round() as i32;
        (x, y)
    }
}

/// Aspect-preserving resize that never upsamples.
pub fn resize_to_fit(img: &DynamicImage, max_w: u32, max_h: u32) -> DynamicImage {
    if img.width() <= max_w && img.height() <= max_h {
        return img.clone();
    }
    img.resize(max_w, max_h, image::imageops::FilterType::CatmullRom)
}

pub fn encode_png(img: &DynamicImage) -> DeskPilotResult<Vec<u8>> {
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| DeskPilotError::Perception(format!("PNG encode: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> Frame {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        Frame {
            png: encode_png(&DynamicImage::ImageRgba8(img)).unwrap(),
            width,
            height,
        }
    }

    #[test]
    fn rescale_maps_canvas_center_to_screen_center() {
        let obs = Observation::from_frame(solid_frame(1920, 1080), 1000, 1000).unwrap();
        let (x, y) = obs.rescale(500, 500);
        assert!((x - 960).abs() <= 1, "x = {x}");
        assert!((y - 540).abs() <= 1, "y = {y}");
    }

    #[test]
    fn resize_never_upsamples() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            640,
            480,
            image::Rgba([0, 0, 0, 255]),
        ));
        let out = resize_to_fit(&img, 1000, 1000);
        assert_eq!((out.width(), out.height()), (640, 480));
    }

    #[test]
    fn resize_preserves_aspect_ratio() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            1920,
            1080,
            image::Rgba([0, 0, 0, 255]),
        ));
        let out = resize_to_fit(&img, 1000, 1000);
        assert_eq!(out.width(), 1000);
        assert!((out.height() as i32 - 562).abs() <= 1, "height = {}", out.height());
    }
}
