use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use ndarray::{Array2, Array4, Axis, stack};
use std::io::Cursor;

use super::InferenceError;

/// Side length of the square input the classifier was trained on.
pub const IMAGE_SIZE: u32 = 150;
pub const CHANNELS: usize = 3;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Decodes an uploaded image, sniffing the format from its content.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, InferenceError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    Ok(reader.decode()?)
}

/// Resizes to 150x150 and builds a `(1, 150, 150, 3)` tensor by stacking the
/// single intensity plane three times along the last axis.
pub fn prepare_image(img: &DynamicImage) -> Result<Array4<f32>, InferenceError> {
    let resized = img.resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom);
    let plane = resized.to_luma8();

    let side = IMAGE_SIZE as usize;
    let pixels: Vec<f32> = plane.into_raw().into_iter().map(f32::from).collect();
    let plane = Array2::from_shape_vec((side, side), pixels)?.insert_axis(Axis(0));

    let stacked = stack(Axis(3), &[plane.view(); CHANNELS])?;
    Ok(stacked)
}

/// MIME type used when echoing an upload back as a data URI.
pub fn mime_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}
