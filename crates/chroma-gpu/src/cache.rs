//! Capture-frame conversion with a reusable staging arena.
//!
//! Video capture hands over one frame per tick, usually byte-swapped
//! (BGRA) and with a row stride padded past `width * 4`. Converting a
//! frame to a texture therefore compacts rows and swizzles channels on
//! the CPU before upload. [`FrameCache`] keeps the scratch buffer for
//! that step alive between frames so the hot path allocates nothing
//! after warm-up; [`FrameCache::flush`] releases the memory when a
//! capture session ends.

use crate::texture::{
    swap_red_blue, PixelFormat, Texture, TextureFactory, TextureOptions, TextureOrigin,
};
use crate::{ChainError, ChainResult};

/// Channel order of a raw capture frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureFormat {
    /// The common hardware capture order.
    #[default]
    Bgra8,
    Rgba8,
}

impl CaptureFormat {
    /// The logical texture format a frame of this order becomes.
    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            CaptureFormat::Bgra8 => PixelFormat::Bgra8Unorm,
            CaptureFormat::Rgba8 => PixelFormat::Rgba8Unorm,
        }
    }
}

/// One raw frame from a capture source. `stride` is the byte length of
/// a row in `data`, which may exceed `width * 4` on padded buffers.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: CaptureFormat,
}

impl CaptureFrame {
    /// Convenience constructor for tightly packed frames.
    pub fn packed(data: Vec<u8>, width: u32, height: u32, format: CaptureFormat) -> Self {
        CaptureFrame {
            data,
            width,
            height,
            stride: width * 4,
            format,
        }
    }
}

/// Grow-only staging arena for frame conversion. One per [`GpuContext`];
/// reached through [`GpuContext::with_frame_cache`].
///
/// [`GpuContext`]: crate::context::GpuContext
/// [`GpuContext::with_frame_cache`]: crate::context::GpuContext::with_frame_cache
#[derive(Debug, Default)]
pub struct FrameCache {
    staging: Vec<u8>,
    conversions: usize,
}

impl FrameCache {
    pub fn new() -> Self {
        FrameCache::default()
    }

    /// Number of frames converted since creation. Test hook.
    pub fn conversions(&self) -> usize {
        self.conversions
    }

    /// Bytes currently held by the staging arena.
    pub fn staging_capacity(&self) -> usize {
        self.staging.capacity()
    }

    /// Converts a capture frame into a texture carrying the frame's
    /// logical format. Rows are compacted to `width * 4` and swapped
    /// channels are normalized before upload.
    pub fn texture_from(
        &mut self,
        factory: &TextureFactory,
        frame: &CaptureFrame,
    ) -> ChainResult<Texture> {
        if frame.data.is_empty() {
            return Err(ChainError::CacheUnavailable);
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(ChainError::InvalidDimensions(frame.width, frame.height));
        }
        let row = frame.width as usize * 4;
        let stride = frame.stride as usize;
        if stride < row || frame.data.len() < stride * (frame.height as usize - 1) + row {
            return Err(ChainError::ConversionFailed(format!(
                "frame buffer {} bytes too small for {}x{} stride {}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.stride
            )));
        }

        let packed = self.compact(&frame.data, row, stride, frame.height as usize);
        if frame.format == CaptureFormat::Bgra8 {
            swap_red_blue(&mut self.staging[..packed]);
        }

        let options = TextureOptions::default()
            .with_origin(TextureOrigin::Capture)
            .with_format(frame.format.pixel_format());
        let texture = factory.allocate(frame.width, frame.height, &options)?;
        factory.write_rgba(&texture, &self.staging[..packed], frame.width * 4)?;
        self.conversions += 1;
        Ok(texture)
    }

    /// Copies `height` rows of `row` bytes out of a `stride`-pitched
    /// buffer into the staging arena; returns the packed length.
    fn compact(&mut self, data: &[u8], row: usize, stride: usize, height: usize) -> usize {
        let packed = row * height;
        if self.staging.len() < packed {
            self.staging.resize(packed, 0);
        }
        if stride == row {
            self.staging[..packed].copy_from_slice(&data[..packed]);
        } else {
            for y in 0..height {
                self.staging[y * row..(y + 1) * row]
                    .copy_from_slice(&data[y * stride..y * stride + row]);
            }
        }
        packed
    }

    /// Drops the staging memory. The cache stays usable; the next frame
    /// rebuilds the arena.
    pub fn flush(&mut self) {
        self.staging = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_format_mapping() {
        assert_eq!(CaptureFormat::Bgra8.pixel_format(), PixelFormat::Bgra8Unorm);
        assert_eq!(CaptureFormat::Rgba8.pixel_format(), PixelFormat::Rgba8Unorm);
    }

    #[test]
    fn test_compact_strips_stride_padding() {
        let mut cache = FrameCache::new();
        // 2x2 frame, 8-byte rows padded to 12.
        let mut data = Vec::new();
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]);
        data.extend_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16, 0, 0, 0, 0]);
        let packed = cache.compact(&data, 8, 12, 2);
        assert_eq!(packed, 16);
        assert_eq!(
            &cache.staging[..16],
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
        );
    }

    #[test]
    fn test_flush_releases_staging() {
        let mut cache = FrameCache::new();
        cache.compact(&[0u8; 64], 16, 16, 4);
        assert!(cache.staging_capacity() >= 64);
        cache.flush();
        assert_eq!(cache.staging_capacity(), 0);
    }

    #[test]
    fn test_packed_constructor_stride() {
        let frame = CaptureFrame::packed(vec![0; 16], 2, 2, CaptureFormat::Rgba8);
        assert_eq!(frame.stride, 8);
    }
}
