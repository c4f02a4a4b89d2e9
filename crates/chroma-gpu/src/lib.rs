//! GPU filter-chain engine for images and video frames.
//!
//! Converts between image representations (bitmap, raw pixel buffer,
//! capture frame, GPU texture) and runs an ordered chain of filters over
//! them on the GPU, sharing a process-wide cache of the objects that are
//! expensive to create (device, queue, compiled pipelines, conversion
//! cache).
//!
//! # Architecture
//!
//! ```text
//! ImageLike ──► FilterChain::run ──► ImageLike (same variant)
//!                     │
//!                     ▼
//!              GpuContext (singleton)
//!              ├── wgpu Device + single Queue
//!              ├── kernel name → ComputePipeline   (memoized, permanent)
//!              ├── color space → RenderContext     (memoized, permanent)
//!              └── FrameCache (capture frame → texture, lazily created)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chroma_gpu::{FilterChain, Filter, ImageLike};
//!
//! let chain = FilterChain::new(vec![Filter::grayscale(), Filter::gaussian_blur(6.0)]);
//! let output = chain.run(&ImageLike::Bitmap(input))?;
//! ```
//!
//! Filters are immutable value objects; the same filter may appear in any
//! number of concurrently running chains. Within one chain run filters
//! execute in strict list order, each filter's output feeding the next.

pub mod cache;
pub mod collector;
pub mod context;
pub mod engine;
pub mod filters;
pub mod kernel;
mod shaders;
pub mod texture;

pub use cache::{CaptureFormat, CaptureFrame, FrameCache};
pub use collector::{Collector, FrameSink};
pub use context::{ColorSpace, GpuContext, RenderContext, ShaderLibrary};
pub use engine::{FilterChain, ImageLike};
pub use kernel::{Filter, GraphOp, HookOp, IspKernel, SizePolicy, SpecialParam, Strategy};
pub use texture::{
    PixelBuffer, PixelFormat, Texture, TextureFactory, TextureOptions, TextureOrigin,
    MAX_DIMENSION, MIN_DIMENSION,
};

use thiserror::Error;

/// Filter-chain errors.
///
/// Errors from an individual chain run never corrupt the shared
/// [`GpuContext`] caches; everything except `InitializationFailed` is
/// recoverable at the granularity of one run.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("No usable GPU device: {0}")]
    InitializationFailed(String),

    #[error("Kernel '{0}' missing from all shader libraries or failed to compile")]
    PipelineCompilationFailed(String),

    #[error("Texture allocation refused by device: {0}")]
    AllocationFailed(String),

    #[error("Format conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Unsupported source type: {0}")]
    UnsupportedSourceType(&'static str),

    #[error("Could not encode GPU pass: {0}")]
    EncodingFailed(String),

    #[error("Capture conversion cache unavailable")]
    CacheUnavailable,

    #[error("Invalid dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),
}

pub type ChainResult<T> = Result<T, ChainError>;
