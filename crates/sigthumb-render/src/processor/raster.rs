//! Pure Rust processor built on the `image` crate.

use std::io::{Cursor, Write};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::Value;

use super::{Processor, ProcessorError, ResizeMode, ResizeOptions};
use crate::source::Source;

/// Resampling filter used for every resize.
const FILTER: FilterType = FilterType::Lanczos3;

/// Processor decoding and encoding with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageProcessor;

impl ImageProcessor {
    /// Create the processor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Processor for ImageProcessor {
    fn process(
        &self,
        source: &mut Source,
        sink: &mut dyn Write,
        extension: &str,
        options: &Value,
    ) -> Result<(), ProcessorError> {
        let options = ResizeOptions::from_value(options)?;
        let format = output_format(extension)?;

        let bytes = source.read_all()?;
        let image = image::load_from_memory(&bytes).map_err(ProcessorError::Decode)?;
        let resized = resize(image, &options)?;
        tracing::debug!(
            source = source.name(),
            width = resized.width(),
            height = resized.height(),
            ?format,
            "Resized image"
        );

        encode(&resized, format, options.quality, sink)
    }
}

/// Output format for an extension.
fn output_format(extension: &str) -> Result<ImageFormat, ProcessorError> {
    ImageFormat::from_extension(extension)
        .filter(ImageFormat::writing_enabled)
        .ok_or_else(|| {
            ProcessorError::InvalidOptions(format!("unsupported output format: {extension}"))
        })
}

fn resize(image: DynamicImage, options: &ResizeOptions) -> Result<DynamicImage, ProcessorError> {
    let (width, height) = (image.width(), image.height());
    let resized = match (options.resize, options.width, options.height) {
        (ResizeMode::Fit, None, None) => image,
        (ResizeMode::Fit, box_w, box_h) => {
            let (w, h) = fit_within((width, height), box_w, box_h);
            if (w, h) == (width, height) {
                image
            } else {
                image.resize_exact(w, h, FILTER)
            }
        }
        (ResizeMode::Fill, Some(w), Some(h)) => image.resize_to_fill(w, h, FILTER),
        (ResizeMode::Squash, Some(w), Some(h)) => image.resize_exact(w, h, FILTER),
        (ResizeMode::Pad, Some(w), Some(h)) => {
            let (fw, fh) = fit_within((width, height), Some(w), Some(h));
            let fitted = image.resize_exact(fw, fh, FILTER).to_rgba8();
            let mut canvas = RgbaImage::from_pixel(w, h, Rgba(options.background_rgba()?));
            imageops::overlay(
                &mut canvas,
                &fitted,
                i64::from((w - fw) / 2),
                i64::from((h - fh) / 2),
            );
            DynamicImage::ImageRgba8(canvas)
        }
        (mode, _, _) => {
            return Err(ProcessorError::InvalidOptions(format!(
                "resize mode {mode:?} requires both width and height"
            )));
        }
    };
    Ok(resized)
}

/// Largest size within the box that keeps the aspect ratio, never upscaling.
///
/// A missing box dimension is derived from the other one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fit_within((width, height): (u32, u32), box_w: Option<u32>, box_h: Option<u32>) -> (u32, u32) {
    let (w, h) = (f64::from(width), f64::from(height));
    let scale = match (box_w, box_h) {
        (Some(bw), Some(bh)) => (f64::from(bw) / w).min(f64::from(bh) / h),
        (Some(bw), None) => f64::from(bw) / w,
        (None, Some(bh)) => f64::from(bh) / h,
        (None, None) => return (width, height),
    }
    .min(1.0);
    let scaled = |dim: f64| ((dim * scale).round() as u32).max(1);
    (scaled(w), scaled(h))
}

fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u8,
    sink: &mut dyn Write,
) -> Result<(), ProcessorError> {
    if format == ImageFormat::Jpeg {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let encoder = JpegEncoder::new_with_quality(&mut *sink, quality);
        return rgb
            .write_with_encoder(encoder)
            .map_err(ProcessorError::Encode);
    }

    // Most encoders need a seekable writer
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.to_rgba8())
        .write_to(&mut buf, format)
        .map_err(ProcessorError::Encode)?;
    sink.write_all(buf.get_ref())?;
    Ok(())
}
