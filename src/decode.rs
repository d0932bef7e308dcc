//! Turns compressed file bytes into a uniform raw pixel buffer.
//! Format detection and the per-format pixel-layout tables live here;
//! resolution validity is checked from the header before a full decode runs.

use std::io::Cursor;
use std::time::SystemTime;

use image::codecs::bmp::BmpDecoder;
use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::tga::TgaDecoder;
use image::{ColorType, DynamicImage, ImageDecoder};

use crate::config::ReaderConfig;
use crate::error::{ImageFormatKind, ReadError};

/// Internal pixel layouts every decoded image is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 8-bit single-channel grayscale.
    G8,
    /// 8-bit blue/green/red/alpha.
    Bgra8,
    /// 16-bit red/green/blue/alpha.
    Rgba16,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::G8 => 1,
            Self::Bgra8 => 4,
            Self::Rgba16 => 8,
        }
    }
}

/// Decoded, unresized pixel data. Owned exclusively by the worker until it is
/// packed into a construct task.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub bit_depth: u8,
    pub srgb: bool,
    pub modified_at: Option<SystemTime>,
    pub pixels: Vec<u8>,
}

/// Resolution policy snapshot handed to the worker at spawn.
#[derive(Debug, Clone)]
pub struct DecodeLimits {
    pub max_texture_size: u32,
    pub max_mip_count: u32,
    pub allow_non_power_of_two: bool,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::from(&ReaderConfig::default())
    }
}

impl From<&ReaderConfig> for DecodeLimits {
    fn from(cfg: &ReaderConfig) -> Self {
        Self {
            max_texture_size: cfg.max_texture_size,
            max_mip_count: cfg.max_mip_count,
            allow_non_power_of_two: cfg.allow_non_power_of_two,
        }
    }
}

/// A dimension is valid when it fits the mip chain (2^(count-1), since 1x1 is
/// a valid mip level), satisfies the power-of-two rule when one applies, and
/// stays under the hard cap.
pub fn is_resolution_valid(width: u32, height: u32, limits: &DecodeLimits) -> bool {
    let max_mip_resolution = 1u32 << (limits.max_mip_count - 1);
    if width > max_mip_resolution || height > max_mip_resolution {
        return false;
    }

    let is_power_of_two = width.is_power_of_two() && height.is_power_of_two();
    if !limits.allow_non_power_of_two && !is_power_of_two {
        return false;
    }

    if width > limits.max_texture_size || height > limits.max_texture_size {
        return false;
    }

    true
}

fn ensure_resolution(width: u32, height: u32, limits: &DecodeLimits) -> Result<(), ReadError> {
    if is_resolution_valid(width, height, limits) {
        Ok(())
    } else {
        Err(ReadError::ResolutionNotSupported { width, height })
    }
}

/// Decode `bytes` into a `RawImage`, normalizing to one of the internal pixel
/// layouts. The container is sniffed from the leading bytes; TGA is matched
/// last, by its header fields, since it has no magic number.
pub fn decode_image(bytes: &[u8], limits: &DecodeLimits) -> Result<RawImage, ReadError> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return decode_png(bytes, limits);
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return decode_jpeg(bytes, limits);
    }
    if bytes.starts_with(b"BM") {
        return decode_bmp(bytes, limits);
    }
    if let Some(header) = TgaHeader::parse(bytes) {
        if header.is_supported() {
            return decode_tga(bytes, &header, limits);
        }
        return Err(ReadError::UnsupportedPixelFormat(ImageFormatKind::Tga));
    }
    Err(ReadError::UnsupportedFormat(
        "file matches no supported image container".to_string(),
    ))
}

fn decode_png(bytes: &[u8], limits: &DecodeLimits) -> Result<RawImage, ReadError> {
    let format = ImageFormatKind::Png;
    let decoder =
        PngDecoder::new(Cursor::new(bytes)).map_err(|source| ReadError::Decode { format, source })?;
    let (width, height) = decoder.dimensions();
    ensure_resolution(width, height, limits)?;

    let (layout, bit_depth) = match decoder.color_type() {
        ColorType::L8 | ColorType::La8 => (PixelLayout::G8, 8),
        // 16-bit grayscale widens to RGBA16; 16-bit color stays unsupported.
        ColorType::L16 | ColorType::La16 => (PixelLayout::Rgba16, 16),
        ColorType::Rgb8 | ColorType::Rgba8 => (PixelLayout::Bgra8, 8),
        ColorType::Rgb16 | ColorType::Rgba16 => {
            return Err(ReadError::UnsupportedBitDepth(format));
        }
        _ => return Err(ReadError::UnsupportedPixelFormat(format)),
    };

    let image =
        DynamicImage::from_decoder(decoder).map_err(|source| ReadError::Decode { format, source })?;
    Ok(RawImage {
        width,
        height,
        layout,
        bit_depth,
        srgb: bit_depth < 16,
        modified_at: None,
        pixels: convert_pixels(image, layout),
    })
}

fn decode_jpeg(bytes: &[u8], limits: &DecodeLimits) -> Result<RawImage, ReadError> {
    let format = ImageFormatKind::Jpeg;
    let decoder = JpegDecoder::new(Cursor::new(bytes))
        .map_err(|source| ReadError::Decode { format, source })?;
    let (width, height) = decoder.dimensions();
    ensure_resolution(width, height, limits)?;

    let layout = match decoder.color_type() {
        ColorType::L8 => PixelLayout::G8,
        ColorType::Rgb8 | ColorType::Rgba8 => PixelLayout::Bgra8,
        _ => return Err(ReadError::UnsupportedPixelFormat(format)),
    };

    let image =
        DynamicImage::from_decoder(decoder).map_err(|source| ReadError::Decode { format, source })?;
    Ok(RawImage {
        width,
        height,
        layout,
        bit_depth: 8,
        srgb: true,
        modified_at: None,
        pixels: convert_pixels(image, layout),
    })
}

fn decode_bmp(bytes: &[u8], limits: &DecodeLimits) -> Result<RawImage, ReadError> {
    let format = ImageFormatKind::Bmp;
    let decoder =
        BmpDecoder::new(Cursor::new(bytes)).map_err(|source| ReadError::Decode { format, source })?;
    let (width, height) = decoder.dimensions();
    ensure_resolution(width, height, limits)?;

    let image =
        DynamicImage::from_decoder(decoder).map_err(|source| ReadError::Decode { format, source })?;
    Ok(RawImage {
        width,
        height,
        layout: PixelLayout::Bgra8,
        bit_depth: 8,
        srgb: true,
        modified_at: None,
        pixels: convert_pixels(image, PixelLayout::Bgra8),
    })
}

fn decode_tga(bytes: &[u8], header: &TgaHeader, limits: &DecodeLimits) -> Result<RawImage, ReadError> {
    let format = ImageFormatKind::Tga;
    ensure_resolution(u32::from(header.width), u32::from(header.height), limits)?;

    let decoder =
        TgaDecoder::new(Cursor::new(bytes)).map_err(|source| ReadError::Decode { format, source })?;
    let (width, height) = decoder.dimensions();

    let grayscale = matches!(decoder.color_type(), ColorType::L8 | ColorType::La8);
    let layout = if grayscale { PixelLayout::G8 } else { PixelLayout::Bgra8 };
    // Grayscale TGAs are commonly used as masks; keep them linear.
    let srgb = !(grayscale && header.image_type == 3);

    let image =
        DynamicImage::from_decoder(decoder).map_err(|source| ReadError::Decode { format, source })?;
    Ok(RawImage {
        width,
        height,
        layout,
        bit_depth: 8,
        srgb,
        modified_at: None,
        pixels: convert_pixels(image, layout),
    })
}

fn convert_pixels(image: DynamicImage, layout: PixelLayout) -> Vec<u8> {
    match layout {
        PixelLayout::G8 => image.into_luma8().into_raw(),
        PixelLayout::Bgra8 => {
            let mut pixels = image.into_rgba8().into_raw();
            for pixel in pixels.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
            pixels
        }
        PixelLayout::Rgba16 => {
            let wide = image.into_rgba16();
            bytemuck::cast_slice::<u16, u8>(wide.as_raw()).to_vec()
        }
    }
}

/// The first 18 bytes of a TGA file. TGA has no magic number, so the original
/// loader's header-field heuristic is the detection rule.
#[derive(Debug, Clone, Copy)]
struct TgaHeader {
    color_map_type: u8,
    image_type: u8,
    width: u16,
    height: u16,
    bits_per_pixel: u8,
}

impl TgaHeader {
    const SIZE: usize = 18;

    fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            color_map_type: bytes[1],
            image_type: bytes[2],
            width: u16::from_le_bytes([bytes[12], bytes[13]]),
            height: u16::from_le_bytes([bytes[14], bytes[15]]),
            bits_per_pixel: bytes[16],
        })
    }

    /// Uncompressed/RLE true color, uncompressed grayscale, or 8-bit
    /// pseudo-color (alpha stored via the color map).
    fn is_supported(&self) -> bool {
        (self.color_map_type == 0 && matches!(self.image_type, 2 | 3 | 10))
            || (self.color_map_type == 1 && self.image_type == 1 && self.bits_per_pixel == 8)
    }
}
