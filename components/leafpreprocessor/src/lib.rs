//! Turns uploaded leaf photographs into the input tensor of the classifier.
//!
//! Decoding accepts JPEG and PNG. The decoded image is brought to RGB,
//! cropped-and-fitted to the model resolution with a Lanczos filter and laid
//! out as an NHWC `f32` tensor of shape `[1, HEIGHT, WIDTH, CHANNELS]`.

use std::str::FromStr;

use image::RgbImage;
use mltypes::{MlError, MlResult, Tensor};
use tracing::{debug, warn};

mod processor;

pub const CHANNELS: usize = 3;
pub const HEIGHT: u32 = 128;
pub const WIDTH: u32 = 128;

const WRONG_TENSOR_SHAPE: &str = "Expecting an input shape of [1, height, width, 3]";

/// How images that are not 3-channel RGB are treated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ColorPolicy {
    /// Grey, grey+alpha, RGBA and 16-bit images are converted to 8-bit RGB.
    #[default]
    Convert,
    /// Anything with a channel count other than 3 is rejected.
    Strict,
}

/// Numeric range of the produced pixel values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PixelScale {
    /// `0.0..=255.0`
    #[default]
    Raw,
    /// `0.0..=1.0`
    Unit,
}

impl PixelScale {
    fn factor(self) -> f32 {
        match self {
            PixelScale::Raw => 1.0,
            PixelScale::Unit => 1.0 / 255.0,
        }
    }
}

impl FromStr for PixelScale {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(PixelScale::Raw),
            "unit" => Ok(PixelScale::Unit),
            _ => {
                warn!(
                    "invalid or missing pixel scale detected: '{}' - defaults to 'raw'",
                    s
                );

                Ok(PixelScale::Raw)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessConfig {
    pub height: u32,
    pub width: u32,
    pub color_policy: ColorPolicy,
    pub pixel_scale: PixelScale,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig {
            height: HEIGHT,
            width: WIDTH,
            color_policy: ColorPolicy::default(),
            pixel_scale: PixelScale::default(),
        }
    }
}

impl PreprocessConfig {
    /// Derives height and width from a model input shape `[1, h, w, 3]`.
    pub fn for_input_shape(shape: &[usize]) -> MlResult<Self> {
        match shape {
            [1, h, w, c] if *c == CHANNELS && *h > 0 && *w > 0 => Ok(PreprocessConfig {
                height: *h as u32,
                width: *w as u32,
                ..Default::default()
            }),
            _ => Err(MlError::InferenceError(format!(
                "{}, got {:?}",
                WRONG_TENSOR_SHAPE, shape
            ))),
        }
    }

    pub fn with_color_policy(mut self, color_policy: ColorPolicy) -> Self {
        self.color_policy = color_policy;
        self
    }

    pub fn with_pixel_scale(mut self, pixel_scale: PixelScale) -> Self {
        self.pixel_scale = pixel_scale;
        self
    }

    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, CHANNELS]
    }
}

/// An upload decoded to 8-bit RGB, not yet fitted to the model resolution.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    rgb: RgbImage,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }
}

/// First half of [`preprocess`]: sniffs, decodes and applies the color policy.
pub fn decode_image(bytes: &[u8], color_policy: ColorPolicy) -> MlResult<DecodedImage> {
    debug!("received conversion request of {} bytes", bytes.len());

    let image = processor::decode(bytes)?;
    let rgb = processor::to_rgb(image, color_policy)?;

    Ok(DecodedImage { rgb })
}

/// Second half of [`preprocess`]: crop-and-fit and tensor layout.
pub fn tensor_from_image(image: DecodedImage, config: &PreprocessConfig) -> Tensor {
    let fitted = processor::fit(image.rgb, config.width, config.height);
    let tensor = processor::to_tensor(&fitted, config.pixel_scale.factor());

    debug!("converted image into tensor of shape {:?}", tensor.shape());

    tensor
}

/// Decodes `bytes` and produces the classifier input tensor.
///
/// Pure function of its arguments: identical bytes always yield an identical
/// tensor.
pub fn preprocess(bytes: &[u8], config: &PreprocessConfig) -> MlResult<Tensor> {
    let image = decode_image(bytes, config.color_policy)?;
    Ok(tensor_from_image(image, config))
}
