//! Process-wide GPU context.
//!
//! Owns the objects that are expensive to create and safe to share:
//! the wgpu device, the single command queue, registered shader
//! libraries, and the memoized pipeline / render-context caches. All
//! other components borrow an `Arc<GpuContext>`.
//!
//! The singleton is lazily created on first [`GpuContext::acquire`] and
//! can be dropped with [`GpuContext::release`] when GPU memory must be
//! reclaimed (e.g. app backgrounding); the next `acquire` starts over.
//! A process mutex guards the slot, so concurrent first calls collapse
//! into a single device creation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::cache::FrameCache;
use crate::{ChainError, ChainResult};

static SHARED: Mutex<Option<Arc<GpuContext>>> = Mutex::new(None);

/// Number of wgpu devices created over the process lifetime. Test hook
/// for the at-most-once initialization property.
static DEVICES_CREATED: AtomicUsize = AtomicUsize::new(0);

/// Color spaces a render context can work in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    Srgb,
    LinearSrgb,
    /// Display P3 primaries with the sRGB transfer curve.
    DisplayP3,
}

/// Working context for fixed-function graph stages, keyed by color
/// space and memoized for the context lifetime.
#[derive(Debug)]
pub struct RenderContext {
    color_space: ColorSpace,
}

impl RenderContext {
    fn new(color_space: ColorSpace) -> Self {
        RenderContext { color_space }
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Encoded value to working (linear) value.
    pub fn decode(&self, c: f32) -> f32 {
        match self.color_space {
            ColorSpace::LinearSrgb => c,
            ColorSpace::Srgb | ColorSpace::DisplayP3 => {
                if c <= 0.04045 {
                    c / 12.92
                } else {
                    ((c + 0.055) / 1.055).powf(2.4)
                }
            }
        }
    }

    /// Working (linear) value back to encoded.
    pub fn encode(&self, c: f32) -> f32 {
        match self.color_space {
            ColorSpace::LinearSrgb => c,
            ColorSpace::Srgb | ColorSpace::DisplayP3 => {
                if c <= 0.003_130_8 {
                    c * 12.92
                } else {
                    1.055 * c.powf(1.0 / 2.4) - 0.055
                }
            }
        }
    }

    /// Applies a fixed-function graph op to RGBA8 pixel data in place.
    /// Pure CPU work, parallel over pixels.
    pub fn apply_graph_op(&self, op: &crate::kernel::GraphOp, data: &mut [u8]) {
        use crate::kernel::GraphOp;
        match op {
            GraphOp::Identity => {}
            GraphOp::Monochrome { color, intensity } => {
                let t = intensity.clamp(0.0, 1.0);
                data.par_chunks_exact_mut(4).for_each(|px| {
                    let rgb: Vec<f32> =
                        px[..3].iter().map(|&c| self.decode(c as f32 / 255.0)).collect();
                    let luma = 0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2];
                    for i in 0..3 {
                        let mono = luma * color[i];
                        let mixed = rgb[i] * (1.0 - t) + mono * t;
                        px[i] = (self.encode(mixed).clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                });
            }
            GraphOp::SepiaTone { intensity } => {
                let t = intensity.clamp(0.0, 1.0);
                data.par_chunks_exact_mut(4).for_each(|px| {
                    let (r, g, b) = (
                        px[0] as f32 / 255.0,
                        px[1] as f32 / 255.0,
                        px[2] as f32 / 255.0,
                    );
                    let sep = [
                        0.393 * r + 0.769 * g + 0.189 * b,
                        0.349 * r + 0.686 * g + 0.168 * b,
                        0.272 * r + 0.534 * g + 0.131 * b,
                    ];
                    for i in 0..3 {
                        let orig = px[i] as f32 / 255.0;
                        let mixed = orig * (1.0 - t) + sep[i] * t;
                        px[i] = (mixed.clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                });
            }
        }
    }
}

/// A named table of WGSL kernel sources a caller can register with the
/// context. Libraries are searched in registration order, before the
/// built-in set.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    pub name: String,
    kernels: HashMap<String, String>,
}

impl ShaderLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        ShaderLibrary {
            name: name.into(),
            kernels: HashMap::new(),
        }
    }

    pub fn insert(&mut self, kernel: impl Into<String>, source: impl Into<String>) {
        self.kernels.insert(kernel.into(), source.into());
    }

    pub fn get(&self, kernel: &str) -> Option<&str> {
        self.kernels.get(kernel).map(String::as_str)
    }
}

/// Shared GPU state. See the module docs for lifecycle.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    libraries: Mutex<Vec<ShaderLibrary>>,
    /// kernel name -> compiled pipeline. Append-only, never evicted.
    pipelines: Mutex<HashMap<String, Arc<wgpu::ComputePipeline>>>,
    compiled: AtomicUsize,
    render_contexts: Mutex<HashMap<ColorSpace, Arc<RenderContext>>>,
    frame_cache: Mutex<Option<FrameCache>>,
}

impl GpuContext {
    /// Returns the process-wide context, initializing it on first call.
    ///
    /// Concurrent callers during initialization block on the slot mutex
    /// and observe the one context the winner created; the device is
    /// created at most once per singleton generation.
    pub fn acquire() -> ChainResult<Arc<GpuContext>> {
        let mut slot = SHARED.lock().unwrap();
        if let Some(ctx) = slot.as_ref() {
            return Ok(ctx.clone());
        }
        let ctx = Arc::new(Self::init()?);
        *slot = Some(ctx.clone());
        Ok(ctx)
    }

    /// Drops the singleton and every cached pipeline/render context.
    /// In-flight holders of the `Arc` keep their context alive; new
    /// `acquire` calls build a fresh one.
    pub fn release() {
        let dropped = SHARED.lock().unwrap().take();
        if dropped.is_some() {
            tracing::debug!("gpu context released");
        }
    }

    pub fn is_initialized() -> bool {
        SHARED.lock().unwrap().is_some()
    }

    /// The current context if one exists, without initializing.
    pub fn current() -> Option<Arc<GpuContext>> {
        SHARED.lock().unwrap().clone()
    }

    /// Kicks off initialization on a background thread so the first
    /// chain run doesn't pay the device-creation latency.
    pub fn warm_up() {
        std::thread::spawn(|| {
            if let Err(e) = GpuContext::acquire() {
                tracing::warn!("gpu warm-up failed: {e}");
            }
        });
    }

    /// Devices created over the process lifetime. Test hook.
    pub fn devices_created() -> usize {
        DEVICES_CREATED.load(Ordering::SeqCst)
    }

    fn init() -> ChainResult<GpuContext> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| ChainError::InitializationFailed("no adapter found".into()))?;
        let adapter_info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("chroma-gpu"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| ChainError::InitializationFailed(e.to_string()))?;
        DEVICES_CREATED.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "gpu context initialized"
        );
        let limits = device.limits();
        Ok(GpuContext {
            device,
            queue,
            adapter_info,
            limits,
            libraries: Mutex::new(Vec::new()),
            pipelines: Mutex::new(HashMap::new()),
            compiled: AtomicUsize::new(0),
            render_contexts: Mutex::new(HashMap::new()),
            frame_cache: Mutex::new(None),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Registers a shader library; its kernels shadow same-named
    /// built-ins for subsequent `pipeline` calls.
    pub fn register_library(&self, library: ShaderLibrary) {
        self.libraries.lock().unwrap().push(library);
    }

    fn lookup_kernel(&self, name: &str) -> Option<String> {
        let libraries = self.libraries.lock().unwrap();
        for lib in libraries.iter() {
            if let Some(src) = lib.get(name) {
                return Some(src.to_string());
            }
        }
        crate::shaders::source(name).map(str::to_string)
    }

    /// Returns the compiled pipeline for `name`, compiling and caching
    /// it on first use. Subsequent lookups are O(1) and never
    /// recompile.
    ///
    /// A missing or invalid kernel panics in debug builds (a
    /// development-time signal, the kernel name is simply wrong) and
    /// returns [`ChainError::PipelineCompilationFailed`] in release.
    pub fn pipeline(&self, name: &str) -> ChainResult<Arc<wgpu::ComputePipeline>> {
        if let Some(pipeline) = self.pipelines.lock().unwrap().get(name) {
            return Ok(pipeline.clone());
        }
        let source = match self.lookup_kernel(name) {
            Some(src) => src,
            None => return Err(Self::compile_failure(name, "not found in any library")),
        };
        // Validate up front: wgpu panics on malformed WGSL, naga gives
        // us a typed error instead.
        let module = naga::front::wgsl::parse_str(&source)
            .map_err(|e| Self::compile_failure(name, &e.emit_to_string(&source)))?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| Self::compile_failure(name, &format!("{:?}", e.as_inner())))?;

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(name),
                layout: None,
                module: &shader,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        self.compiled.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(kernel = name, "compute pipeline compiled");

        // Two callers may race to compile the same kernel; both results
        // are equivalent, the first insert wins and the loser's compile
        // is discarded.
        let mut cache = self.pipelines.lock().unwrap();
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(pipeline));
        Ok(entry.clone())
    }

    fn compile_failure(name: &str, detail: &str) -> ChainError {
        let err = ChainError::PipelineCompilationFailed(name.to_string());
        if cfg!(debug_assertions) {
            panic!("{err}: {detail}");
        }
        tracing::error!(kernel = name, detail, "pipeline compilation failed");
        err
    }

    /// Compile invocations since this context was created. Test hook
    /// for the memoization property.
    pub fn pipelines_compiled(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    pub fn pipeline_cache_len(&self) -> usize {
        self.pipelines.lock().unwrap().len()
    }

    /// Render context for `color_space`, memoized on first use.
    pub fn render_context(&self, color_space: ColorSpace) -> Arc<RenderContext> {
        let mut cache = self.render_contexts.lock().unwrap();
        cache
            .entry(color_space)
            .or_insert_with(|| Arc::new(RenderContext::new(color_space)))
            .clone()
    }

    /// Runs `f` with the capture-frame conversion cache, creating it
    /// lazily. One cache per context, reused across the video hot path.
    pub fn with_frame_cache<R>(&self, f: impl FnOnce(&mut FrameCache) -> R) -> R {
        let mut slot = self.frame_cache.lock().unwrap();
        let cache = slot.get_or_insert_with(FrameCache::new);
        f(cache)
    }

    /// Maintenance: releases the conversion cache's transient staging
    /// memory without destroying the cache itself.
    pub fn flush_frame_cache(&self) {
        if let Some(cache) = self.frame_cache.lock().unwrap().as_mut() {
            cache.flush();
        }
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("pipelines", &self.pipeline_cache_len())
            .finish()
    }
}
