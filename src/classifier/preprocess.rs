use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Side length, in pixels, of the square network input.
pub const DEFAULT_IMAGE_SIZE: u32 = 128;

/// File extensions accepted when scanning a dataset directory.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// Grayscale, resize to `side`×`side` and scale to [0, 1], row-major.
pub fn normalize(image: &DynamicImage, side: u32) -> Vec<f32> {
    let gray = image.to_luma8();
    let resized = image::imageops::resize(&gray, side, side, FilterType::Triangle);
    resized
        .pixels()
        .map(|p| f32::from(p.0[0]) / 255.0)
        .collect()
}

/// Decode an image file (format sniffed from content) and normalise it.
pub fn preprocess_path(path: &Path, side: u32) -> Result<Vec<f32>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to open {}", path.display()))?;
    preprocess_bytes(&bytes, side).with_context(|| format!("Failed to decode {}", path.display()))
}

/// Decode an in-memory image and normalise it.
pub fn preprocess_bytes(bytes: &[u8], side: u32) -> Result<Vec<f32>> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to read image")?
        .decode()
        .context("Failed to decode image")?;
    Ok(normalize(&image, side))
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}
