//! Resize and format policy applied between decode and GPU upload.

use std::time::SystemTime;

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};

use crate::decode::{PixelLayout, RawImage};
use crate::error::ReadError;
use crate::events::{TargetUsage, TransformParams};

/// A `RawImage` after resize/format normalization, ready for upload.
#[derive(Debug, Clone)]
pub struct FinalImage {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub srgb: bool,
    pub usage: TargetUsage,
    pub modified_at: Option<SystemTime>,
    pub pixels: Vec<u8>,
}

/// Apply the caller's transform parameters. Resizing runs only for a valid
/// strict downscale; UI targets additionally widen single-channel images to
/// BGRA8 so UI consumers always receive four channels.
pub fn apply_transform(raw: RawImage, params: &TransformParams) -> Result<FinalImage, ReadError> {
    let RawImage {
        mut width,
        mut height,
        mut layout,
        srgb,
        modified_at,
        mut pixels,
        ..
    } = raw;

    if params.is_percent_size_valid() {
        let target_width = (width * params.percent_size_x / 100).max(1);
        let target_height = (height * params.percent_size_y / 100).max(1);
        pixels = resize(pixels, width, height, target_width, target_height, layout)?;
        width = target_width;
        height = target_height;
    }

    if params.usage == TargetUsage::Ui && layout == PixelLayout::G8 {
        pixels = widen_gray_to_bgra(&pixels);
        layout = PixelLayout::Bgra8;
    }

    Ok(FinalImage {
        width,
        height,
        layout,
        srgb,
        usage: params.usage,
        modified_at,
        pixels,
    })
}

fn resize(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
    layout: PixelLayout,
) -> Result<Vec<u8>, ReadError> {
    let pixel_type = match layout {
        PixelLayout::G8 => PixelType::U8,
        PixelLayout::Bgra8 => PixelType::U8x4,
        PixelLayout::Rgba16 => PixelType::U16x4,
    };

    let src = Image::from_vec_u8(width, height, pixels, pixel_type)
        .map_err(|err| ReadError::Transform(err.to_string()))?;
    let mut dst = Image::new(target_width, target_height, pixel_type);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    resizer
        .resize(&src, &mut dst, Some(&options))
        .map_err(|err| ReadError::Transform(err.to_string()))?;

    Ok(dst.into_vec())
}

fn widen_gray_to_bgra(gray: &[u8]) -> Vec<u8> {
    gray.iter()
        .flat_map(|&luma| [luma, luma, luma, 255])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_image(width: u32, height: u32, luma: u8) -> RawImage {
        RawImage {
            width,
            height,
            layout: PixelLayout::G8,
            bit_depth: 8,
            srgb: false,
            modified_at: None,
            pixels: vec![luma; (width * height) as usize],
        }
    }

    fn bgra_image(width: u32, height: u32) -> RawImage {
        let pixels = std::iter::repeat_n([50u8, 60, 70, 255], (width * height) as usize)
            .flatten()
            .collect();
        RawImage {
            width,
            height,
            layout: PixelLayout::Bgra8,
            bit_depth: 8,
            srgb: true,
            modified_at: None,
            pixels,
        }
    }

    #[test]
    fn no_op_params_keep_dimensions_and_layout() {
        let params = TransformParams {
            usage: TargetUsage::World,
            percent_size_x: 100,
            percent_size_y: 100,
        };
        let image = apply_transform(gray_image(8, 4, 7), &params).unwrap();
        assert_eq!((image.width, image.height), (8, 4));
        assert_eq!(image.layout, PixelLayout::G8);
        assert_eq!(image.pixels, vec![7u8; 32]);
    }

    #[test]
    fn strict_downscale_halves_dimensions() {
        let params = TransformParams {
            usage: TargetUsage::World,
            percent_size_x: 50,
            percent_size_y: 50,
        };
        let image = apply_transform(bgra_image(8, 8), &params).unwrap();
        assert_eq!((image.width, image.height), (4, 4));
        assert_eq!(image.pixels.len(), 4 * 4 * 4);
        // flat opaque input stays flat through the bilinear kernel
        for pixel in image.pixels.chunks_exact(4) {
            assert_eq!(pixel, [50, 60, 70, 255]);
        }
    }

    #[test]
    fn downscale_never_reaches_zero() {
        let params = TransformParams {
            usage: TargetUsage::World,
            percent_size_x: 10,
            percent_size_y: 10,
        };
        let image = apply_transform(gray_image(4, 4, 1), &params).unwrap();
        assert_eq!((image.width, image.height), (1, 1));
    }

    #[test]
    fn ui_usage_widens_gray_to_bgra() {
        let params = TransformParams {
            usage: TargetUsage::Ui,
            percent_size_x: 100,
            percent_size_y: 100,
        };
        let image = apply_transform(gray_image(2, 1, 9), &params).unwrap();
        assert_eq!(image.layout, PixelLayout::Bgra8);
        assert_eq!(image.pixels, vec![9, 9, 9, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn world_usage_keeps_gray_single_channel() {
        let params = TransformParams {
            usage: TargetUsage::World,
            percent_size_x: 100,
            percent_size_y: 100,
        };
        let image = apply_transform(gray_image(2, 2, 3), &params).unwrap();
        assert_eq!(image.layout, PixelLayout::G8);
        assert_eq!(image.pixels.len(), 4);
    }

    #[test]
    fn rgba16_resize_preserves_stride() {
        let raw = RawImage {
            width: 4,
            height: 4,
            layout: PixelLayout::Rgba16,
            bit_depth: 16,
            srgb: false,
            modified_at: None,
            pixels: vec![0u8; 4 * 4 * 8],
        };
        let params = TransformParams {
            usage: TargetUsage::World,
            percent_size_x: 50,
            percent_size_y: 50,
        };
        let image = apply_transform(raw, &params).unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.pixels.len(), 2 * 2 * 8);
    }
}
