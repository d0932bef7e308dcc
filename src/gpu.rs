//! The main-thread texture-creation capability, plus the default wgpu
//! implementation.

use tracing::debug;

use crate::decode::PixelLayout;
use crate::error::ReadError;
use crate::transform::FinalImage;

/// Turns a decoded image into a GPU resource. Injected into the reader and
/// invoked only from the main thread, during `drain`.
pub trait TextureCreator {
    type Handle: Send + 'static;

    fn create_texture(
        &mut self,
        source_id: &str,
        image: &FinalImage,
    ) -> Result<Self::Handle, ReadError>;
}

/// A wgpu texture built from one read request. The caller owns it once the
/// result is claimed.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// Default creator: uploads into a freshly allocated 2D texture via
/// `Queue::write_texture`.
pub struct WgpuTextureCreator {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuTextureCreator {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

impl TextureCreator for WgpuTextureCreator {
    type Handle = GpuTexture;

    fn create_texture(
        &mut self,
        source_id: &str,
        image: &FinalImage,
    ) -> Result<GpuTexture, ReadError> {
        let format = texture_format(image);

        // Validation failures (zero-sized, over device limits) surface here
        // instead of panicking the main thread.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(source_id),
            size: wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            texture.as_image_copy(),
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.layout.bytes_per_pixel() * image.width),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ReadError::TextureCreation {
                source_id: source_id.to_string(),
                reason: error.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        debug!(source_id = %source_id, format = ?format, "gpu texture created");
        Ok(GpuTexture {
            texture,
            view,
            width: image.width,
            height: image.height,
            format,
        })
    }
}

fn texture_format(image: &FinalImage) -> wgpu::TextureFormat {
    match (image.layout, image.srgb) {
        (PixelLayout::G8, _) => wgpu::TextureFormat::R8Unorm,
        (PixelLayout::Bgra8, true) => wgpu::TextureFormat::Bgra8UnormSrgb,
        (PixelLayout::Bgra8, false) => wgpu::TextureFormat::Bgra8Unorm,
        (PixelLayout::Rgba16, _) => wgpu::TextureFormat::Rgba16Uint,
    }
}
