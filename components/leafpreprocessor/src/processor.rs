use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, RgbImage};
use mltypes::{MlError, MlResult, Tensor};
use ndarray::Array4;
use tracing::{debug, warn};

use crate::{ColorPolicy, CHANNELS};

pub(crate) fn decode(bytes: &[u8]) -> MlResult<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MlError::DecodeError(e.to_string()))?;

    match reader.format() {
        Some(ImageFormat::Jpeg) | Some(ImageFormat::Png) => {}
        Some(other) => {
            warn!("rejecting image container {:?}", other);
            return Err(MlError::UnsupportedFormatError(format!(
                "{:?} images are not accepted, use JPEG or PNG",
                other
            )));
        }
        None => {
            return Err(MlError::DecodeError(
                "input does not start with a known image signature".to_string(),
            ));
        }
    }

    reader.decode().map_err(|error| match error {
        ImageError::Unsupported(e) => MlError::UnsupportedFormatError(e.to_string()),
        other => MlError::DecodeError(other.to_string()),
    })
}

pub(crate) fn to_rgb(image: DynamicImage, policy: ColorPolicy) -> MlResult<RgbImage> {
    let color = image.color();

    match (policy, image) {
        (_, DynamicImage::ImageRgb8(rgb)) => Ok(rgb),
        (ColorPolicy::Strict, _) if usize::from(color.channel_count()) != CHANNELS => {
            Err(MlError::UnsupportedFormatError(format!(
                "expected {} color channels, image has {} ({:?})",
                CHANNELS,
                color.channel_count(),
                color
            )))
        }
        (_, other) => {
            debug!("converting {:?} image to 8-bit RGB", color);
            Ok(other.to_rgb8())
        }
    }
}

/// Scales the image to cover `width` x `height` and crops the centre, so the
/// aspect ratio is never distorted.
pub(crate) fn fit(rgb: RgbImage, width: u32, height: u32) -> RgbImage {
    if rgb.dimensions() == (width, height) {
        return rgb;
    }

    DynamicImage::ImageRgb8(rgb)
        .resize_to_fill(width, height, FilterType::Lanczos3)
        .to_rgb8()
}

pub(crate) fn to_tensor(rgb: &RgbImage, factor: f32) -> Tensor {
    let (width, height) = rgb.dimensions();

    let array = Array4::from_shape_fn(
        (1, height as usize, width as usize, CHANNELS),
        |(_, y, x, c)| {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            pixel[c] as f32 * factor
        },
    );

    Tensor::from_array(array)
}
