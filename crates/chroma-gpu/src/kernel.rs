//! Filter kernel descriptors.
//!
//! A [`Filter`] is an immutable value describing one entry in a chain:
//! an ordered list of numeric factors, optional special (non-float)
//! parameters, an output-size policy, and one of three execution
//! strategies. Construction happens through the associated functions in
//! [`crate::filters`]; the engine consumes the descriptor.
//!
//! # Binding contract
//!
//! Compute kernels see their resources at fixed bind group 0 slots:
//!
//! | binding | resource                                        |
//! |---------|-------------------------------------------------|
//! | 0       | source texture (absent for generators)          |
//! | 1       | destination storage texture                     |
//! | 2       | `array<f32>` storage: factors, then pixel count |
//! | 3       | special params uniform / secondary source       |
//!
//! A kernel declares a binding only if it uses it; the engine supplies
//! exactly the entries the filter's descriptor implies. Factor order is
//! significant and must match the kernel's expected argument order.

/// Workgroup edge for 2D compute dispatches. Too large and some GPUs
/// reject the pipeline, too small and occupancy suffers.
pub(crate) const WORKGROUP_SIZE: u32 = 16;

/// Thread-group grid for a `width`x`height` dispatch.
///
/// Rounds up so edge pixels are covered, with a floor of 1 per axis so
/// a 1x1 texture still dispatches.
pub(crate) fn thread_groups(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(WORKGROUP_SIZE).max(1),
        height.div_ceil(WORKGROUP_SIZE).max(1),
    )
}

/// How a filter executes.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Single dispatch of a named compute kernel over a 2D grid.
    Compute { kernel: &'static str },
    /// CPU image-processing graph stage. Its output must be a realized
    /// texture before the next filter encodes, so chains containing one
    /// of these run in immediate mode.
    FixedFunction(GraphOp),
    /// Filter-owned sequence of compute passes encoded into the shared
    /// command stream (e.g. separable blur).
    MultiPass(IspKernel),
}

/// Fixed-function graph operations, applied on the CPU in the render
/// context's working color space.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    /// Copies source to destination unchanged. Useful as a realization
    /// barrier and in tests.
    Identity,
    /// Luma-weighted tint toward `color`, mixed by `intensity`.
    Monochrome { color: [f32; 4], intensity: f32 },
    /// Classic sepia tone matrix, mixed by `intensity`.
    SepiaTone { intensity: f32 },
}

/// Multi-pass ISP-style kernels.
#[derive(Debug, Clone, PartialEq)]
pub enum IspKernel {
    /// Separable Gaussian blur: horizontal pass into an intermediate,
    /// vertical pass into the destination.
    GaussianBlur { radius: f32 },
    /// Separable box blur, same two-pass shape.
    BoxBlur { radius: f32 },
}

impl IspKernel {
    pub(crate) fn pass_kernels(&self) -> (&'static str, &'static str) {
        match self {
            IspKernel::GaussianBlur { .. } => ("gaussian_blur_h", "gaussian_blur_v"),
            IspKernel::BoxBlur { .. } => ("box_blur_h", "box_blur_v"),
        }
    }

    pub(crate) fn radius(&self) -> f32 {
        match self {
            IspKernel::GaussianBlur { radius } | IspKernel::BoxBlur { radius } => *radius,
        }
    }
}

/// Non-float parameters bound after the numeric factors.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialParam {
    /// Column-major 4x4 matrix.
    Mat4([f32; 16]),
    Vec4([f32; 4]),
}

impl SpecialParam {
    /// Flat f32 view, padded the way the uniform expects it.
    pub(crate) fn words(&self) -> Vec<f32> {
        match self {
            SpecialParam::Mat4(m) => m.to_vec(),
            SpecialParam::Vec4(v) => v.to_vec(),
        }
    }
}

/// Output-size policy: maps input dimensions to output dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizePolicy {
    /// Output matches input (the common case).
    Preserve,
    /// Fixed output size regardless of input.
    Fixed { width: u32, height: u32 },
    /// Uniform scale of the input size.
    Scale(f32),
    /// Crop rectangle; origin is clamped inside the input.
    Crop { x: u32, y: u32, width: u32, height: u32 },
    /// Rotate by `n` quarter turns; odd turns swap the axes.
    Rotate90(u32),
}

impl SizePolicy {
    /// Computes output dimensions for an input of `width`x`height`.
    /// Results are clamped to at least 1x1.
    pub fn resolve(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = match *self {
            SizePolicy::Preserve => (width, height),
            SizePolicy::Fixed { width, height } => (width, height),
            SizePolicy::Scale(s) => (
                (width as f32 * s).round() as u32,
                (height as f32 * s).round() as u32,
            ),
            SizePolicy::Crop {
                x,
                y,
                width: cw,
                height: ch,
            } => (cw.min(width.saturating_sub(x)), ch.min(height.saturating_sub(y))),
            SizePolicy::Rotate90(n) => {
                if n % 2 == 1 {
                    (height, width)
                } else {
                    (width, height)
                }
            }
        };
        (w.max(1), h.max(1))
    }
}

/// Combination hooks that run around a filter's main pass.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOp {
    /// Pre hook: crop the source before the main pass sees it.
    CropSource { x: u32, y: u32, width: u32, height: u32 },
    /// Post hook: mix the filtered result over the original source,
    /// `intensity` = 1.0 keeps the filtered result.
    BlendOriginal { intensity: f32 },
}

/// One entry in a filter chain.
///
/// Immutable once constructed; the same instance may appear in multiple
/// concurrent chains. Built-in constructors live in [`crate::filters`].
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub(crate) strategy: Strategy,
    /// Shader constants, in the kernel's expected argument order.
    pub(crate) factors: Vec<f32>,
    /// Append the destination pixel count after the factors.
    pub(crate) needs_count: bool,
    /// False for generators with no spatial dependency on the input;
    /// the destination then aliases the source (pass-through).
    pub(crate) needs_dest: bool,
    pub(crate) special: Vec<SpecialParam>,
    pub(crate) size_policy: SizePolicy,
    pub(crate) pre: Option<HookOp>,
    pub(crate) post: Option<HookOp>,
}

impl Filter {
    pub(crate) fn compute(kernel: &'static str) -> Self {
        Filter::with_strategy(Strategy::Compute { kernel })
    }

    pub(crate) fn fixed_function(op: GraphOp) -> Self {
        Filter::with_strategy(Strategy::FixedFunction(op))
    }

    pub(crate) fn multi_pass(kernel: IspKernel) -> Self {
        Filter::with_strategy(Strategy::MultiPass(kernel))
    }

    fn with_strategy(strategy: Strategy) -> Self {
        Filter {
            strategy,
            factors: Vec::new(),
            needs_count: false,
            needs_dest: true,
            special: Vec::new(),
            size_policy: SizePolicy::Preserve,
            pre: None,
            post: None,
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn factors(&self) -> &[f32] {
        &self.factors
    }

    pub fn needs_dedicated_destination(&self) -> bool {
        self.needs_dest
    }

    pub fn size_policy(&self) -> SizePolicy {
        self.size_policy
    }

    /// True for CPU graph stages that force the chain into immediate
    /// mode.
    pub fn is_fixed_function(&self) -> bool {
        matches!(self.strategy, Strategy::FixedFunction(_))
    }

    pub(crate) fn pre_hook(&self) -> Option<HookOp> {
        self.pre.clone()
    }

    pub(crate) fn post_hook(&self) -> Option<HookOp> {
        self.post.clone()
    }

    /// Attaches a pre-pass source crop.
    pub fn with_source_crop(mut self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.pre = Some(HookOp::CropSource { x, y, width, height });
        self
    }

    /// Attaches a post-pass blend over the original source.
    pub fn with_blend_original(mut self, intensity: f32) -> Self {
        self.post = Some(HookOp::BlendOriginal {
            intensity: intensity.clamp(0.0, 1.0),
        });
        self
    }

    /// Factors as uploaded to the kernel: declared factors in order,
    /// then the destination pixel count when `needs_count` is set.
    pub(crate) fn packed_factors(&self, dest_width: u32, dest_height: u32) -> Vec<f32> {
        let mut packed = self.factors.clone();
        if self.needs_count {
            packed.push((dest_width as u64 * dest_height as u64) as f32);
        }
        packed
    }

    /// Special params flattened into one uniform allocation.
    pub(crate) fn special_words(&self) -> Vec<f32> {
        self.special.iter().flat_map(|p| p.words()).collect()
    }
}
