use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::layout;
use crate::types::Preview;

#[derive(Debug, Clone, Copy)]
pub struct PrepOptions {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for PrepOptions {
    fn default() -> Self {
        Self {
            max_dimension: crate::config::MAX_IMAGE_SIZE,
            quality: crate::config::IMAGE_QUALITY,
        }
    }
}

/// Target size for an upload: the larger side is capped at `max_dimension`,
/// smaller images are left alone.
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / width.max(height) as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// Decodes, downsamples and JPEG-encodes the image for the vision API.
pub fn compress(path: &Path, options: PrepOptions) -> anyhow::Result<Vec<u8>> {
    let image = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
    encode_jpeg(&image, options)
}

fn encode_jpeg(image: &DynamicImage, options: PrepOptions) -> anyhow::Result<Vec<u8>> {
    let (w, h) = (image.width(), image.height());
    let (new_w, new_h) = scaled_dimensions(w, h, options.max_dimension);

    let resized = if (new_w, new_h) != (w, h) {
        image.resize_exact(new_w, new_h, FilterType::Lanczos3)
    } else {
        image.clone()
    };

    let rgb = resized.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, options.quality);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;

    log::debug!(
        "[imaging] Compressed {}x{} -> {}x{} ({} bytes)",
        w,
        h,
        new_w,
        new_h,
        buf.len()
    );
    Ok(buf)
}

/// Bytes to upload: the compressed image, or the original file when it
/// cannot be decoded.
pub fn prepare_for_ocr(path: &Path, options: PrepOptions) -> std::io::Result<Vec<u8>> {
    match compress(path, options) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            log::warn!("Error compressing image, sending original: {:#}", e);
            fs::read(path)
        }
    }
}

pub fn render_preview(path: &Path) -> anyhow::Result<Preview> {
    let image = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let (width, height) = layout::preview_size(image.width(), image.height());
    let scaled = image.resize_exact(width, height, FilterType::Lanczos3);

    let mut png = Vec::new();
    scaled
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("Failed to encode preview")?;

    Ok(Preview {
        data_url: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
        width,
        height,
    })
}

/// Runs [`render_preview`] on the blocking pool.
pub async fn render_preview_async(path: PathBuf) -> anyhow::Result<Preview> {
    tokio::task::spawn_blocking(move || render_preview(&path)).await?
}
