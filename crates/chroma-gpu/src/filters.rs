//! Built-in filter constructors.
//!
//! Each function returns an immutable [`Filter`] descriptor; nothing
//! here touches the GPU. Arguments are clamped into their sensible
//! ranges at construction so a descriptor is always valid by the time
//! the engine sees it.

use crate::kernel::{Filter, GraphOp, IspKernel, SizePolicy, SpecialParam};

impl Filter {
    /// Rec. 709 luma grayscale.
    pub fn grayscale() -> Self {
        Filter::compute("grayscale")
    }

    /// Inverts RGB, leaves alpha.
    pub fn invert() -> Self {
        Filter::compute("invert")
    }

    /// Adds `value` to each channel; `value` in `[-1, 1]`.
    pub fn brightness(value: f32) -> Self {
        let mut f = Filter::compute("brightness");
        f.factors = vec![value.clamp(-1.0, 1.0)];
        f
    }

    /// Scales contrast around mid-gray; `value` in `[0, 4]`, 1 is
    /// identity.
    pub fn contrast(value: f32) -> Self {
        let mut f = Filter::compute("contrast");
        f.factors = vec![value.clamp(0.0, 4.0)];
        f
    }

    /// Photographic exposure in stops; `stops` in `[-10, 10]`.
    pub fn exposure(stops: f32) -> Self {
        let mut f = Filter::compute("exposure");
        f.factors = vec![stops.clamp(-10.0, 10.0)];
        f
    }

    /// Multiplies each pixel by a column-major 4x4 color matrix.
    pub fn color_matrix(matrix: [f32; 16]) -> Self {
        let mut f = Filter::compute("color_matrix");
        f.special = vec![SpecialParam::Mat4(matrix)];
        f
    }

    /// Generator: fills the texture with `rgba`. No spatial dependency
    /// on the input, so it writes in place instead of allocating a
    /// destination.
    pub fn solid_color(rgba: [f32; 4]) -> Self {
        let mut f = Filter::compute("solid_color");
        f.factors = rgba.to_vec();
        f.needs_dest = false;
        f
    }

    /// Crops to the rectangle at `(x, y)`. The output shrinks to the
    /// crop size, clamped inside the input.
    pub fn crop(x: u32, y: u32, width: u32, height: u32) -> Self {
        let mut f = Filter::compute("crop");
        f.factors = vec![x as f32, y as f32];
        f.size_policy = SizePolicy::Crop { x, y, width, height };
        f
    }

    /// Horizontal mirror.
    pub fn flip_horizontal() -> Self {
        Filter::compute("flip_h")
    }

    /// Nearest-neighbour resize to a fixed output size.
    pub fn resize(width: u32, height: u32) -> Self {
        let mut f = Filter::compute("resample");
        f.size_policy = SizePolicy::Fixed { width, height };
        f
    }

    /// Nearest-neighbour uniform scale.
    pub fn scaled(factor: f32) -> Self {
        let mut f = Filter::compute("resample");
        f.size_policy = SizePolicy::Scale(factor.max(0.0));
        f
    }

    /// Rotates by `turns` quarter turns counted clockwise. Odd turn
    /// counts swap the output axes.
    pub fn rotate90(turns: u32) -> Self {
        let turns = turns % 4;
        let mut f = Filter::compute("rotate");
        f.factors = vec![turns as f32];
        f.size_policy = SizePolicy::Rotate90(turns);
        f
    }

    /// Separable Gaussian blur; `radius` in pixels, clamped to
    /// `[0, 100]`.
    pub fn gaussian_blur(radius: f32) -> Self {
        Filter::multi_pass(IspKernel::GaussianBlur {
            radius: radius.clamp(0.0, 100.0),
        })
    }

    /// Separable box blur; `radius` in pixels, clamped to `[0, 100]`.
    pub fn box_blur(radius: f32) -> Self {
        Filter::multi_pass(IspKernel::BoxBlur {
            radius: radius.clamp(0.0, 100.0),
        })
    }

    /// Fixed-function luma tint toward `color`; `intensity` in
    /// `[0, 1]`. Forces the containing chain into immediate mode.
    pub fn monochrome(color: [f32; 4], intensity: f32) -> Self {
        Filter::fixed_function(GraphOp::Monochrome {
            color,
            intensity: intensity.clamp(0.0, 1.0),
        })
    }

    /// Fixed-function sepia tone; `intensity` in `[0, 1]`.
    pub fn sepia(intensity: f32) -> Self {
        Filter::fixed_function(GraphOp::SepiaTone {
            intensity: intensity.clamp(0.0, 1.0),
        })
    }

    /// Fixed-function pass-through. Copies pixels unchanged but still
    /// forces immediate mode; useful as a realization barrier and in
    /// tests that exercise the CPU path.
    pub fn graph_identity() -> Self {
        Filter::fixed_function(GraphOp::Identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{HookOp, Strategy};

    #[test]
    fn test_brightness_clamps_factor() {
        assert_eq!(Filter::brightness(2.0).factors(), &[1.0]);
        assert_eq!(Filter::brightness(-3.0).factors(), &[-1.0]);
        assert_eq!(Filter::brightness(0.25).factors(), &[0.25]);
    }

    #[test]
    fn test_contrast_rejects_negative() {
        assert_eq!(Filter::contrast(-1.0).factors(), &[0.0]);
    }

    #[test]
    fn test_solid_color_writes_in_place() {
        let f = Filter::solid_color([1.0, 0.0, 0.0, 1.0]);
        assert!(!f.needs_dedicated_destination());
        assert_eq!(f.factors(), &[1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_crop_factors_match_policy() {
        let f = Filter::crop(10, 20, 100, 50);
        assert_eq!(f.factors(), &[10.0, 20.0]);
        assert_eq!(
            f.size_policy(),
            SizePolicy::Crop { x: 10, y: 20, width: 100, height: 50 }
        );
    }

    #[test]
    fn test_rotate_reduces_turns() {
        let f = Filter::rotate90(5);
        assert_eq!(f.factors(), &[1.0]);
        assert_eq!(f.size_policy(), SizePolicy::Rotate90(1));
    }

    #[test]
    fn test_blur_strategies_are_multi_pass() {
        assert!(matches!(
            Filter::gaussian_blur(3.0).strategy(),
            Strategy::MultiPass(IspKernel::GaussianBlur { radius }) if *radius == 3.0
        ));
        assert!(matches!(
            Filter::box_blur(200.0).strategy(),
            Strategy::MultiPass(IspKernel::BoxBlur { radius }) if *radius == 100.0
        ));
    }

    #[test]
    fn test_fixed_function_flag() {
        assert!(Filter::sepia(0.8).is_fixed_function());
        assert!(Filter::graph_identity().is_fixed_function());
        assert!(!Filter::grayscale().is_fixed_function());
    }

    #[test]
    fn test_fixed_function_carries_graph_op() {
        assert!(matches!(
            Filter::monochrome([1.0, 0.9, 0.8, 1.0], 2.0).strategy(),
            Strategy::FixedFunction(GraphOp::Monochrome { intensity, .. }) if *intensity == 1.0
        ));
        assert!(matches!(
            Filter::sepia(0.3).strategy(),
            Strategy::FixedFunction(GraphOp::SepiaTone { intensity }) if *intensity == 0.3
        ));
        assert!(matches!(
            Filter::graph_identity().strategy(),
            Strategy::FixedFunction(GraphOp::Identity)
        ));
    }

    #[test]
    fn test_hooks_attach() {
        let f = Filter::grayscale()
            .with_source_crop(0, 0, 8, 8)
            .with_blend_original(0.5);
        assert!(matches!(
            f.strategy(),
            Strategy::Compute { kernel: "grayscale" }
        ));
        assert_eq!(f.post, Some(HookOp::BlendOriginal { intensity: 0.5 }));
    }
}
