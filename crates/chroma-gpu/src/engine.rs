//! The filter chain engine.
//!
//! [`FilterChain`] applies an ordered list of [`Filter`]s to an input
//! in any supported representation:
//!
//! ```text
//!              +-------------+    per filter    +-------------+
//!  ImageLike ->| to texture  |--> pass(es)  --> | to ImageLike|
//!              +-------------+                  +-------------+
//! ```
//!
//! Two commit modes. Batched (the default) encodes every filter into
//! one command buffer and submits once; nothing is realized until the
//! end. Immediate submits and waits after every filter; the chain drops
//! into it whenever a fixed-function (CPU) filter is present, because
//! that filter must read realized pixels, or when
//! [`FilterChain::realtime_commit`] asks for per-filter latency.
//!
//! An empty chain is the identity and returns the input without
//! touching the GPU; a texture input comes back as the same texture.

use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use crate::cache::{CaptureFormat, CaptureFrame};
use crate::context::{ColorSpace, GpuContext};
use crate::kernel::{thread_groups, Filter, HookOp, SizePolicy, Strategy};
use crate::texture::{
    swap_red_blue, PixelBuffer, PixelFormat, Texture, TextureFactory, TextureOptions,
};
use crate::{ChainError, ChainResult};

/// An image in any of the representations the engine accepts. The
/// output of a run is the same variant as its input.
#[derive(Debug)]
pub enum ImageLike {
    Texture(Texture),
    Bitmap(RgbaImage),
    Pixels(PixelBuffer),
    Capture(CaptureFrame),
}

/// An ordered filter chain plus its output options. Cheap to clone;
/// holds no GPU state of its own.
#[derive(Debug, Clone)]
pub struct FilterChain {
    filters: Vec<Filter>,
    /// Overrides the logical pixel format inferred from the input.
    pixel_format: Option<PixelFormat>,
    /// Append a horizontal flip after the last filter.
    mirrored: bool,
    /// When false, the result is also blitted back into the source
    /// texture (same-size chains only).
    create_dest: bool,
    /// Force immediate mode even for pure compute chains.
    realtime_commit: bool,
    color_space: ColorSpace,
}

impl Default for FilterChain {
    fn default() -> Self {
        FilterChain::new(Vec::new())
    }
}

impl FilterChain {
    pub fn new(filters: Vec<Filter>) -> Self {
        FilterChain {
            filters,
            pixel_format: None,
            mirrored: false,
            create_dest: true,
            realtime_commit: false,
            color_space: ColorSpace::default(),
        }
    }

    pub fn push(&mut self, filter: Filter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    pub fn with_create_dest(mut self, create_dest: bool) -> Self {
        self.create_dest = create_dest;
        self
    }

    pub fn with_realtime_commit(mut self, realtime: bool) -> Self {
        self.realtime_commit = realtime;
        self
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// True when this chain will submit and wait per filter instead of
    /// batching one command buffer.
    pub fn is_immediate(&self) -> bool {
        self.realtime_commit || self.filters.iter().any(Filter::is_fixed_function)
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Runs the chain. The output variant matches the input variant.
    ///
    /// An empty, unmirrored chain is the identity: the input is
    /// returned as-is without initializing the GPU context, and a
    /// texture input comes back as a handle to the same texture.
    pub fn run(&self, input: &ImageLike) -> ChainResult<ImageLike> {
        if self.filters.is_empty() && !self.mirrored {
            return Ok(Self::identity_output(input));
        }

        let ctx = GpuContext::acquire()?;
        let factory = TextureFactory::new(ctx.clone());
        debug!(
            filters = self.filters.len(),
            immediate = self.is_immediate(),
            "running filter chain"
        );

        match input {
            ImageLike::Texture(texture) => {
                let out = self.filter_texture(&ctx, &factory, texture)?;
                Ok(ImageLike::Texture(out))
            }
            ImageLike::Bitmap(bitmap) => {
                let source = factory.from_bitmap(bitmap)?;
                let out = self.filter_texture(&ctx, &factory, &source)?;
                Ok(ImageLike::Bitmap(factory.to_bitmap(&out)?))
            }
            ImageLike::Pixels(buffer) => {
                let source = match self.pixel_format {
                    Some(format) if format != buffer.format => {
                        factory.from_pixels(&PixelBuffer {
                            data: buffer.data.clone(),
                            width: buffer.width,
                            height: buffer.height,
                            format,
                        })?
                    }
                    _ => factory.from_pixels(buffer)?,
                };
                let out = self.filter_texture(&ctx, &factory, &source)?;
                // Intermediate destinations are canonical-order; restore
                // the caller's byte order on the way out.
                let desired = self.pixel_format.unwrap_or(buffer.format);
                let mut pixels = factory.to_pixels(&out)?;
                if desired.is_byte_order_swapped() && !pixels.format.is_byte_order_swapped() {
                    swap_red_blue(&mut pixels.data);
                    pixels.format = desired;
                }
                Ok(ImageLike::Pixels(pixels))
            }
            ImageLike::Capture(frame) => {
                let frame = self.resolve_capture_format(frame)?;
                let source = ctx.with_frame_cache(|cache| cache.texture_from(&factory, &frame))?;
                let out = self.filter_texture(&ctx, &factory, &source)?;
                let mut pixels = factory.to_pixels(&out)?;
                if frame.format == CaptureFormat::Bgra8 && !pixels.format.is_byte_order_swapped() {
                    swap_red_blue(&mut pixels.data);
                }
                Ok(ImageLike::Capture(CaptureFrame::packed(
                    pixels.data,
                    pixels.width,
                    pixels.height,
                    frame.format,
                )))
            }
        }
    }

    /// Best-effort variant for realtime paths: on any failure the
    /// original input comes back unchanged instead of an error.
    pub fn run_or_original(&self, input: ImageLike) -> ImageLike {
        match self.run(&input) {
            Ok(out) => out,
            Err(err) => {
                trace!(%err, "chain failed, passing original through");
                input
            }
        }
    }

    /// Runs the chain on a worker thread and hands the result to
    /// `callback`.
    pub fn run_detached<F>(&self, input: ImageLike, callback: F)
    where
        F: FnOnce(ChainResult<ImageLike>) + Send + 'static,
    {
        let chain = self.clone();
        std::thread::spawn(move || callback(chain.run(&input)));
    }

    /// Identity output: no allocation and no GPU work. Texture handles
    /// are reference counted, so the clone is the same texture.
    fn identity_output(input: &ImageLike) -> ImageLike {
        match input {
            ImageLike::Texture(t) => ImageLike::Texture(t.clone()),
            ImageLike::Bitmap(b) => ImageLike::Bitmap(b.clone()),
            ImageLike::Pixels(p) => ImageLike::Pixels(p.clone()),
            ImageLike::Capture(f) => ImageLike::Capture(f.clone()),
        }
    }

    /// Applies the chain's pixel-format override to a capture frame.
    /// Without an override the frame's own channel order stands, which
    /// is how byte-swapped capture input is inferred.
    fn resolve_capture_format(&self, frame: &CaptureFrame) -> ChainResult<CaptureFrame> {
        let format = match self.pixel_format {
            None => frame.format,
            Some(PixelFormat::Bgra8Unorm) => CaptureFormat::Bgra8,
            Some(PixelFormat::Rgba8Unorm) => CaptureFormat::Rgba8,
            Some(_) => return Err(ChainError::UnsupportedSourceType("float capture frame")),
        };
        let mut frame = frame.clone();
        frame.format = format;
        Ok(frame)
    }

    // =========================================================================
    // Texture pipeline
    // =========================================================================

    /// Applies the chain to a texture. Filters that read their input
    /// get a fresh destination; pure generators write the incoming
    /// texture in place and hand it on.
    pub fn filter_texture(
        &self,
        ctx: &Arc<GpuContext>,
        factory: &TextureFactory,
        source: &Texture,
    ) -> ChainResult<Texture> {
        let mut filters = self.filters.clone();
        if self.mirrored {
            filters.push(Filter::flip_horizontal());
        }
        if filters.is_empty() {
            return Ok(source.clone());
        }

        let mut current: Option<Texture> = None;
        if self.is_immediate() {
            for filter in &filters {
                let input = current.as_ref().unwrap_or(source);
                current = Some(self.apply_immediate(ctx, factory, input, filter)?);
            }
        } else {
            let mut encoder = ctx
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("filter chain"),
                });
            for filter in &filters {
                let input = current.as_ref().unwrap_or(source);
                current = Some(self.encode_filter(ctx, factory, &mut encoder, input, filter)?);
            }
            ctx.queue().submit([encoder.finish()]);
            let _ = ctx.device().poll(wgpu::Maintain::Wait);
        }

        let result = match current {
            Some(texture) => texture,
            None => source.clone(),
        };
        if !self.create_dest {
            self.blit_back(ctx, source, &result)?;
        }
        Ok(result)
    }

    /// In-place output mode: copy the result over the source texture.
    fn blit_back(&self, ctx: &GpuContext, source: &Texture, result: &Texture) -> ChainResult<()> {
        // In-place filters can end on the source itself; nothing to copy.
        if result.raw() == source.raw() {
            return Ok(());
        }
        if source.width() != result.width() || source.height() != result.height() {
            return Err(ChainError::EncodingFailed(format!(
                "in-place output needs matching sizes, {}x{} -> {}x{}",
                source.width(),
                source.height(),
                result.width(),
                result.height()
            )));
        }
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("in-place writeback"),
            });
        encoder.copy_texture_to_texture(
            result.raw().as_image_copy(),
            source.raw().as_image_copy(),
            result.extent(),
        );
        ctx.queue().submit([encoder.finish()]);
        Ok(())
    }

    /// One filter in immediate mode: encode, submit, wait. Required
    /// before a fixed-function filter can read realized pixels, and for
    /// the realtime-commit latency mode.
    fn apply_immediate(
        &self,
        ctx: &Arc<GpuContext>,
        factory: &TextureFactory,
        input: &Texture,
        filter: &Filter,
    ) -> ChainResult<Texture> {
        if let Strategy::FixedFunction(_) = filter.strategy() {
            return self.apply_fixed_function(ctx, factory, input, filter);
        }
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("immediate filter"),
            });
        let out = self.encode_filter(ctx, factory, &mut encoder, input, filter)?;
        ctx.queue().submit([encoder.finish()]);
        let _ = ctx.device().poll(wgpu::Maintain::Wait);
        Ok(out)
    }

    /// Encodes one GPU filter (pre hook, main pass or passes, post
    /// hook) into `encoder` and returns its destination texture.
    fn encode_filter(
        &self,
        ctx: &GpuContext,
        factory: &TextureFactory,
        encoder: &mut wgpu::CommandEncoder,
        input: &Texture,
        filter: &Filter,
    ) -> ChainResult<Texture> {
        // Pre hook: crop the source before the main pass sees it.
        let cropped;
        let main_input = match filter.pre_hook() {
            Some(HookOp::CropSource { x, y, width, height }) => {
                cropped = self.encode_crop(ctx, factory, encoder, input, x, y, width, height)?;
                &cropped
            }
            _ => input,
        };

        let main_out = match filter.strategy() {
            Strategy::Compute { kernel } => {
                let (dw, dh) = filter
                    .size_policy()
                    .resolve(main_input.width(), main_input.height());
                let in_place = !filter.needs_dedicated_destination()
                    && (dw, dh) == (main_input.width(), main_input.height())
                    && main_input.is_storage_writable();
                if in_place {
                    // Generators never read binding 0, so the incoming
                    // texture doubles as the storage destination.
                    self.encode_pass(
                        ctx,
                        encoder,
                        kernel,
                        None,
                        main_input,
                        &filter.packed_factors(dw, dh),
                        &filter.special_words(),
                        None,
                    )?;
                    main_input.clone()
                } else {
                    let dest = factory.allocate(dw, dh, &TextureOptions::default())?;
                    let source = filter.needs_dedicated_destination().then(|| main_input.view());
                    self.encode_pass(
                        ctx,
                        encoder,
                        kernel,
                        source,
                        &dest,
                        &filter.packed_factors(dw, dh),
                        &filter.special_words(),
                        None,
                    )?;
                    dest
                }
            }
            Strategy::MultiPass(isp) => {
                let (w, h) = (main_input.width(), main_input.height());
                let (pass_h, pass_v) = isp.pass_kernels();
                let factors = [isp.radius()];
                let intermediate = factory.allocate(w, h, &TextureOptions::default())?;
                self.encode_pass(
                    ctx,
                    encoder,
                    pass_h,
                    Some(main_input.view()),
                    &intermediate,
                    &factors,
                    &[],
                    None,
                )?;
                let dest = factory.allocate(w, h, &TextureOptions::default())?;
                self.encode_pass(
                    ctx,
                    encoder,
                    pass_v,
                    Some(intermediate.view()),
                    &dest,
                    &factors,
                    &[],
                    None,
                )?;
                dest
            }
            Strategy::FixedFunction(_) => {
                // Fixed-function filters never reach the encoder path.
                return Err(ChainError::EncodingFailed(
                    "fixed-function filter on the GPU encode path".into(),
                ));
            }
        };

        self.encode_post_hook(ctx, factory, encoder, input, main_out, filter)
    }

    /// Post hook: mix the filtered result over the filter's input.
    fn encode_post_hook(
        &self,
        ctx: &GpuContext,
        factory: &TextureFactory,
        encoder: &mut wgpu::CommandEncoder,
        input: &Texture,
        filtered: Texture,
        filter: &Filter,
    ) -> ChainResult<Texture> {
        let Some(HookOp::BlendOriginal { intensity }) = filter.post_hook() else {
            return Ok(filtered);
        };
        let dest = factory.allocate(filtered.width(), filtered.height(), &TextureOptions::default())?;
        self.encode_pass(
            ctx,
            encoder,
            "blend_original",
            Some(filtered.view()),
            &dest,
            &[intensity],
            &[],
            Some(input.view()),
        )?;
        Ok(dest)
    }

    fn encode_crop(
        &self,
        ctx: &GpuContext,
        factory: &TextureFactory,
        encoder: &mut wgpu::CommandEncoder,
        input: &Texture,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> ChainResult<Texture> {
        let (cw, ch) = SizePolicy::Crop { x, y, width, height }
            .resolve(input.width(), input.height());
        let dest = factory.allocate(cw, ch, &TextureOptions::default())?;
        self.encode_pass(
            ctx,
            encoder,
            "crop",
            Some(input.view()),
            &dest,
            &[x as f32, y as f32],
            &[],
            None,
        )?;
        Ok(dest)
    }

    /// Encodes one compute pass. Bindings follow the kernel contract:
    /// 0 source (when present), 1 destination, 2 factors (when
    /// non-empty), 3 special uniform or secondary source. The bind
    /// group layout is derived from the shader, so the entries here
    /// must match what the kernel declares exactly.
    #[allow(clippy::too_many_arguments)]
    fn encode_pass(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        kernel: &str,
        source: Option<&wgpu::TextureView>,
        dest: &Texture,
        factors: &[f32],
        special: &[f32],
        secondary: Option<&wgpu::TextureView>,
    ) -> ChainResult<()> {
        let pipeline = ctx.pipeline(kernel)?;

        let factor_buffer = (!factors.is_empty()).then(|| {
            ctx.device()
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("filter factors"),
                    contents: bytemuck::cast_slice(factors),
                    usage: wgpu::BufferUsages::STORAGE,
                })
        });
        let special_buffer = (!special.is_empty()).then(|| {
            ctx.device()
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("special params"),
                    contents: bytemuck::cast_slice(special),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let mut entries = Vec::with_capacity(4);
        if let Some(view) = source {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: 1,
            resource: wgpu::BindingResource::TextureView(dest.view()),
        });
        if let Some(buffer) = &factor_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: buffer.as_entire_binding(),
            });
        }
        if let Some(buffer) = &special_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: buffer.as_entire_binding(),
            });
        } else if let Some(view) = secondary {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let (groups_x, groups_y) = thread_groups(dest.width(), dest.height());
        trace!(kernel, groups_x, groups_y, "dispatch");
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, 1);
        Ok(())
    }

    /// CPU graph stage: read back, transform in the chain's working
    /// color space, upload. Hooks run as their own submitted passes.
    fn apply_fixed_function(
        &self,
        ctx: &Arc<GpuContext>,
        factory: &TextureFactory,
        input: &Texture,
        filter: &Filter,
    ) -> ChainResult<Texture> {
        let Strategy::FixedFunction(op) = filter.strategy() else {
            return Err(ChainError::EncodingFailed(
                "compute filter on the fixed-function path".into(),
            ));
        };

        let cropped;
        let main_input = match filter.pre_hook() {
            Some(HookOp::CropSource { x, y, width, height }) => {
                cropped = self.submit_single(ctx, |chain, encoder| {
                    chain.encode_crop(ctx, factory, encoder, input, x, y, width, height)
                })?;
                &cropped
            }
            _ => input,
        };

        let mut data = factory.read_rgba(main_input)?;
        ctx.render_context(self.color_space).apply_graph_op(op, &mut data);
        let out = factory.allocate(
            main_input.width(),
            main_input.height(),
            &TextureOptions::default(),
        )?;
        factory.write_rgba(&out, &data, main_input.width() * 4)?;

        if matches!(filter.post_hook(), Some(HookOp::BlendOriginal { .. })) {
            return self.submit_single(ctx, |chain, encoder| {
                chain.encode_post_hook(ctx, factory, encoder, input, out, filter)
            });
        }
        Ok(out)
    }

    /// Runs one encoding closure in its own command buffer and waits
    /// for it.
    fn submit_single(
        &self,
        ctx: &Arc<GpuContext>,
        encode: impl FnOnce(&Self, &mut wgpu::CommandEncoder) -> ChainResult<Texture>,
    ) -> ChainResult<Texture> {
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("hook pass"),
            });
        let out = encode(self, &mut encoder)?;
        ctx.queue().submit([encoder.finish()]);
        let _ = ctx.device().poll(wgpu::Maintain::Wait);
        Ok(out)
    }
}
