//! Texture allocation and CPU <-> GPU conversion.
//!
//! [`TextureFactory`] allocates storage-writable 2D textures and
//! converts between textures and the CPU-addressable encodings
//! (bitmap, encoded image bytes, raw pixel buffers). Dimensions are
//! clamped into `[1, 16384]`; `bytes_per_row` for buffer copies is
//! padded to wgpu's 256-byte alignment and stripped again on readback.
//!
//! Pixel formats are *logical*: compute kernels write `rgba8unorm`
//! storage, so BGRA-sourced data (hardware capture convention) is
//! byte-swapped at the upload/download boundary while the descriptor
//! keeps reporting `Bgra8Unorm` to the caller. This is what prevents
//! the red/blue channel swap on the camera path.

use std::sync::mpsc;
use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

use crate::context::GpuContext;
use crate::{ChainError, ChainResult};

/// Inclusive texture dimension bounds.
pub const MIN_DIMENSION: u32 = 1;
pub const MAX_DIMENSION: u32 = 16384;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Logical pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Canonical 4-channel 8-bit encoding.
    #[default]
    Rgba8Unorm,
    /// Byte-order-swapped variant used by hardware capture buffers.
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Bgra8Unorm => 4,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }

    /// True when red/blue are swapped relative to the canonical order.
    pub fn is_byte_order_swapped(&self) -> bool {
        matches!(self, PixelFormat::Bgra8Unorm)
    }

    /// The wgpu format actually allocated. Both 8-bit logical formats
    /// map to `Rgba8Unorm` so one set of storage kernels serves both;
    /// the swap happens at the CPU boundary.
    pub(crate) fn physical(&self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }
}

/// Where the data a texture will hold originated. Capture-sourced
/// inputs default to the byte-swapped format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureOrigin {
    #[default]
    Static,
    Capture,
}

/// Allocation parameters. `format: None` lets the factory infer from
/// the origin; setting it records an explicit caller override.
#[derive(Debug, Clone)]
pub struct TextureOptions {
    pub format: Option<PixelFormat>,
    pub usage: wgpu::TextureUsages,
    pub sample_count: u32,
    pub origin: TextureOrigin,
}

impl Default for TextureOptions {
    fn default() -> Self {
        TextureOptions {
            format: None,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            sample_count: 1,
            origin: TextureOrigin::Static,
        }
    }
}

impl TextureOptions {
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_origin(mut self, origin: TextureOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Explicit override wins; otherwise capture-sourced data gets the
    /// byte-swapped format and everything else the canonical one.
    pub fn resolved_format(&self) -> PixelFormat {
        match (self.format, self.origin) {
            (Some(f), _) => f,
            (None, TextureOrigin::Capture) => PixelFormat::Bgra8Unorm,
            (None, TextureOrigin::Static) => PixelFormat::Rgba8Unorm,
        }
    }
}

/// A GPU-resident 2D image. The wgpu handles inside are reference
/// counted, so clones share the same texture memory; it is released
/// once the last clone drops.
#[derive(Clone)]
pub struct Texture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) width: u32,
    pub(crate) height: u32,
    format: PixelFormat,
    usage: wgpu::TextureUsages,
    sample_count: u32,
}

impl Texture {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn is_storage_writable(&self) -> bool {
        self.usage.contains(wgpu::TextureUsages::STORAGE_BINDING)
    }

    pub(crate) fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

/// CPU-addressable raw pixel buffer.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Allocates textures and converts between representations. Cheap to
/// construct; all state lives in the shared context.
#[derive(Clone)]
pub struct TextureFactory {
    ctx: Arc<GpuContext>,
}

impl TextureFactory {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        TextureFactory { ctx }
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Largest texture edge worth allocating on this device: 16384 on
    /// full-capability tiers, 8192 otherwise. Informational; `allocate`
    /// clamps to the global bound, not this one.
    pub fn max_dimension(&self) -> u32 {
        if self.ctx.limits().max_texture_dimension_2d >= MAX_DIMENSION {
            MAX_DIMENSION
        } else {
            8192
        }
    }

    /// Allocates a new texture, clamping `width`/`height` into
    /// `[1, 16384]`.
    pub fn allocate(&self, width: u32, height: u32, options: &TextureOptions) -> ChainResult<Texture> {
        let width = width.clamp(MIN_DIMENSION, MAX_DIMENSION);
        let height = height.clamp(MIN_DIMENSION, MAX_DIMENSION);
        let format = options.resolved_format();

        // wgpu reports descriptor validation as a device panic; check
        // the device-dependent constraints here and fail typed.
        let limit = self.ctx.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(ChainError::AllocationFailed(format!(
                "{width}x{height} exceeds device limit {limit}"
            )));
        }
        if options.sample_count != 1 {
            // Multisampled textures cannot be storage-bound, which every
            // filter destination requires.
            return Err(ChainError::AllocationFailed(format!(
                "unsupported sample count {}",
                options.sample_count
            )));
        }

        let texture = self.ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("chroma texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: options.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: format.physical(),
            usage: options.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Texture {
            texture,
            view,
            width,
            height,
            format,
            usage: options.usage,
            sample_count: options.sample_count,
        })
    }

    /// New texture with the same descriptor and a copy of the contents,
    /// backed by independent memory. Required whenever a texture would
    /// otherwise be both the read-source and write-destination of one
    /// pass.
    pub fn copy_of(&self, source: &Texture) -> ChainResult<Texture> {
        let options = TextureOptions {
            format: Some(source.format),
            usage: source.usage,
            sample_count: source.sample_count,
            origin: TextureOrigin::Static,
        };
        let copy = self.allocate(source.width, source.height, &options)?;
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture copy"),
            });
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            copy.texture.as_image_copy(),
            source.extent(),
        );
        self.ctx.queue().submit([encoder.finish()]);
        Ok(copy)
    }

    // =========================================================================
    // Decode: CPU representation -> texture
    // =========================================================================

    /// Uploads an RGBA bitmap.
    pub fn from_bitmap(&self, image: &RgbaImage) -> ChainResult<Texture> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ChainError::InvalidDimensions(width, height));
        }
        let texture = self.allocate(width, height, &TextureOptions::default())?;
        self.write_rgba(&texture, image.as_raw(), width * 4)?;
        Ok(texture)
    }

    /// Decodes encoded image bytes (PNG, JPEG, ...) and uploads them.
    pub fn from_encoded(&self, bytes: &[u8]) -> ChainResult<Texture> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ChainError::ConversionFailed(e.to_string()))?;
        self.from_bitmap(&decoded.to_rgba8())
    }

    /// Uploads a raw pixel buffer, swizzling byte-swapped data to the
    /// canonical order. The returned texture keeps the buffer's logical
    /// format.
    pub fn from_pixels(&self, buffer: &PixelBuffer) -> ChainResult<Texture> {
        match buffer.format {
            PixelFormat::Rgba8Unorm | PixelFormat::Bgra8Unorm => {}
            _ => return Err(ChainError::UnsupportedSourceType("non-8-bit pixel buffer")),
        }
        let expected = (buffer.width as usize) * (buffer.height as usize) * 4;
        if buffer.data.len() != expected {
            return Err(ChainError::ConversionFailed(format!(
                "pixel buffer size {} does not match {}x{}",
                buffer.data.len(),
                buffer.width,
                buffer.height
            )));
        }
        let options = TextureOptions::default().with_format(buffer.format);
        let texture = self.allocate(buffer.width, buffer.height, &options)?;
        if buffer.format.is_byte_order_swapped() {
            let mut rgba = buffer.data.clone();
            swap_red_blue(&mut rgba);
            self.write_rgba(&texture, &rgba, buffer.width * 4)?;
        } else {
            self.write_rgba(&texture, &buffer.data, buffer.width * 4)?;
        }
        Ok(texture)
    }

    pub(crate) fn write_rgba(
        &self,
        texture: &Texture,
        data: &[u8],
        bytes_per_row: u32,
    ) -> ChainResult<()> {
        if texture.format.bytes_per_pixel() != 4 {
            return Err(ChainError::ConversionFailed(
                "cannot upload 8-bit rows into a float texture".into(),
            ));
        }
        self.ctx.queue().write_texture(
            texture.texture.as_image_copy(),
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(texture.height),
            },
            texture.extent(),
        );
        Ok(())
    }

    // =========================================================================
    // Encode: texture -> CPU representation
    // =========================================================================

    /// Reads the texture back as an RGBA bitmap.
    pub fn to_bitmap(&self, texture: &Texture) -> ChainResult<RgbaImage> {
        let mut data = self.read_rgba(texture)?;
        if texture.format.is_byte_order_swapped() {
            swap_red_blue(&mut data);
        }
        RgbaImage::from_raw(texture.width, texture.height, data)
            .ok_or_else(|| ChainError::ConversionFailed("bitmap assembly failed".into()))
    }

    /// Encodes the texture into image bytes of the given format.
    pub fn to_encoded(
        &self,
        texture: &Texture,
        format: image::ImageFormat,
    ) -> ChainResult<Vec<u8>> {
        let bitmap = self.to_bitmap(texture)?;
        let mut bytes = std::io::Cursor::new(Vec::new());
        bitmap
            .write_to(&mut bytes, format)
            .map_err(|e| ChainError::ConversionFailed(e.to_string()))?;
        Ok(bytes.into_inner())
    }

    /// Reads the texture back as a raw buffer in its logical format.
    pub fn to_pixels(&self, texture: &Texture) -> ChainResult<PixelBuffer> {
        let mut data = self.read_rgba(texture)?;
        if texture.format.is_byte_order_swapped() {
            swap_red_blue(&mut data);
        }
        Ok(PixelBuffer {
            data,
            width: texture.width,
            height: texture.height,
            format: texture.format,
        })
    }

    /// Raw readback in the canonical channel order, 256-byte row
    /// padding stripped. Synchronous; stalls until the GPU copy lands.
    pub(crate) fn read_rgba(&self, texture: &Texture) -> ChainResult<Vec<u8>> {
        if texture.format.bytes_per_pixel() != 4 {
            return Err(ChainError::ConversionFailed(
                "float texture readback is not supported".into(),
            ));
        }
        let unpadded = texture.width * 4;
        let padded = align_to(unpadded, COPY_ALIGNMENT);
        let size = padded as u64 * texture.height as u64;
        let buffer = self.ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture readback"),
            });
        encoder.copy_texture_to_buffer(
            texture.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(texture.height),
                },
            },
            texture.extent(),
        );
        self.ctx.queue().submit([encoder.finish()]);

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.ctx.device().poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| ChainError::ConversionFailed("readback map callback lost".into()))?
            .map_err(|e| ChainError::ConversionFailed(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut out = vec![0u8; unpadded as usize * texture.height as usize];
        for row in 0..texture.height as usize {
            let src = row * padded as usize;
            let dst = row * unpadded as usize;
            out[dst..dst + unpadded as usize]
                .copy_from_slice(&mapped[src..src + unpadded as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(out)
    }
}

/// Rounds `value` up to the next multiple of `alignment`.
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Swaps the red/blue channels of packed 4-byte pixels in place.
pub(crate) fn swap_red_blue(data: &mut [u8]) {
    data.par_chunks_exact_mut(4).for_each(|px| px.swap(0, 2));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(640 * 4, 256), 2560);
    }

    #[test]
    fn test_swap_red_blue() {
        let mut data = vec![1u8, 2, 3, 4, 10, 20, 30, 40];
        swap_red_blue(&mut data);
        assert_eq!(data, vec![3, 2, 1, 4, 30, 20, 10, 40]);
    }

    #[test]
    fn test_resolved_format_inference() {
        // No override: capture-sourced implies the swapped order.
        let capture = TextureOptions::default().with_origin(TextureOrigin::Capture);
        assert_eq!(capture.resolved_format(), PixelFormat::Bgra8Unorm);
        let still = TextureOptions::default();
        assert_eq!(still.resolved_format(), PixelFormat::Rgba8Unorm);
        // Explicit override always wins.
        let forced = TextureOptions::default()
            .with_origin(TextureOrigin::Capture)
            .with_format(PixelFormat::Rgba8Unorm);
        assert_eq!(forced.resolved_format(), PixelFormat::Rgba8Unorm);
    }

    #[test]
    fn test_pixel_format_properties() {
        assert_eq!(PixelFormat::Rgba8Unorm.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgba32Float.bytes_per_pixel(), 16);
        assert!(PixelFormat::Bgra8Unorm.is_byte_order_swapped());
        assert!(!PixelFormat::Rgba8Unorm.is_byte_order_swapped());
    }
}
