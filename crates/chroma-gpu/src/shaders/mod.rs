//! Built-in WGSL kernel sources.
//!
//! Every kernel follows the binding contract in [`crate::kernel`]:
//! binding 0 source texture, binding 1 destination storage texture,
//! binding 2 factor array, binding 3 special uniform or secondary
//! source. Kernels declare only the bindings they use. All kernels use
//! a 16x16 workgroup and guard against out-of-bounds invocations, so
//! any dispatch grid rounded up from the destination size is safe.

/// Rec. 709 luma.
pub const GRAYSCALE: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let p = textureLoad(src, vec2<i32>(gid.xy), 0);
    let luma = dot(p.rgb, vec3<f32>(0.2126, 0.7152, 0.0722));
    textureStore(dst, vec2<i32>(gid.xy), vec4<f32>(luma, luma, luma, p.a));
}
"#;

pub const INVERT: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let p = textureLoad(src, vec2<i32>(gid.xy), 0);
    textureStore(dst, vec2<i32>(gid.xy), vec4<f32>(1.0 - p.rgb, p.a));
}
"#;

/// factors: [offset] added to all channels.
pub const BRIGHTNESS: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let p = textureLoad(src, vec2<i32>(gid.xy), 0);
    let out = clamp(p.rgb + vec3<f32>(factors[0]), vec3<f32>(0.0), vec3<f32>(1.0));
    textureStore(dst, vec2<i32>(gid.xy), vec4<f32>(out, p.a));
}
"#;

/// factors: [gain] around mid gray.
pub const CONTRAST: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let p = textureLoad(src, vec2<i32>(gid.xy), 0);
    let out = clamp((p.rgb - vec3<f32>(0.5)) * factors[0] + vec3<f32>(0.5),
                    vec3<f32>(0.0), vec3<f32>(1.0));
    textureStore(dst, vec2<i32>(gid.xy), vec4<f32>(out, p.a));
}
"#;

/// factors: [stops]; +1 doubles brightness.
pub const EXPOSURE: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let p = textureLoad(src, vec2<i32>(gid.xy), 0);
    let out = clamp(p.rgb * exp2(factors[0]), vec3<f32>(0.0), vec3<f32>(1.0));
    textureStore(dst, vec2<i32>(gid.xy), vec4<f32>(out, p.a));
}
"#;

/// special: 4x4 color matrix applied to (r, g, b, a).
pub const COLOR_MATRIX: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(3) var<uniform> color_matrix: mat4x4<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let p = textureLoad(src, vec2<i32>(gid.xy), 0);
    let out = clamp(color_matrix * p, vec4<f32>(0.0), vec4<f32>(1.0));
    textureStore(dst, vec2<i32>(gid.xy), out);
}
"#;

/// Generator: fills the destination with factors [r, g, b, a].
/// No source binding; the input plays no part in the output.
pub const SOLID_COLOR: &str = r#"
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let color = vec4<f32>(factors[0], factors[1], factors[2], factors[3]);
    textureStore(dst, vec2<i32>(gid.xy), color);
}
"#;

/// factors: [origin_x, origin_y]; destination is the crop size.
pub const CROP: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let origin = vec2<i32>(i32(factors[0]), i32(factors[1]));
    let p = textureLoad(src, vec2<i32>(gid.xy) + origin, 0);
    textureStore(dst, vec2<i32>(gid.xy), p);
}
"#;

pub const FLIP_H: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let mirrored = vec2<i32>(i32(dims.x - 1u - gid.x), i32(gid.y));
    textureStore(dst, vec2<i32>(gid.xy), textureLoad(src, mirrored, 0));
}
"#;

/// factors: [radius]. Weights derived in-shader from sigma = radius / 2,
/// normalized, so flat regions stay flat. Edge-clamped.
pub const GAUSSIAN_BLUR_H: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let radius = i32(ceil(factors[0]));
    let sigma = max(factors[0] * 0.5, 0.5);
    var acc = vec4<f32>(0.0);
    var total = 0.0;
    for (var i = -radius; i <= radius; i = i + 1) {
        let w = exp(-f32(i * i) / (2.0 * sigma * sigma));
        let x = clamp(i32(gid.x) + i, 0, i32(dims.x) - 1);
        acc = acc + w * textureLoad(src, vec2<i32>(x, i32(gid.y)), 0);
        total = total + w;
    }
    textureStore(dst, vec2<i32>(gid.xy), acc / total);
}
"#;

pub const GAUSSIAN_BLUR_V: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let radius = i32(ceil(factors[0]));
    let sigma = max(factors[0] * 0.5, 0.5);
    var acc = vec4<f32>(0.0);
    var total = 0.0;
    for (var i = -radius; i <= radius; i = i + 1) {
        let w = exp(-f32(i * i) / (2.0 * sigma * sigma));
        let y = clamp(i32(gid.y) + i, 0, i32(dims.y) - 1);
        acc = acc + w * textureLoad(src, vec2<i32>(i32(gid.x), y), 0);
        total = total + w;
    }
    textureStore(dst, vec2<i32>(gid.xy), acc / total);
}
"#;

pub const BOX_BLUR_H: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let radius = i32(ceil(factors[0]));
    var acc = vec4<f32>(0.0);
    for (var i = -radius; i <= radius; i = i + 1) {
        let x = clamp(i32(gid.x) + i, 0, i32(dims.x) - 1);
        acc = acc + textureLoad(src, vec2<i32>(x, i32(gid.y)), 0);
    }
    textureStore(dst, vec2<i32>(gid.xy), acc / f32(2 * radius + 1));
}
"#;

pub const BOX_BLUR_V: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let radius = i32(ceil(factors[0]));
    var acc = vec4<f32>(0.0);
    for (var i = -radius; i <= radius; i = i + 1) {
        let y = clamp(i32(gid.y) + i, 0, i32(dims.y) - 1);
        acc = acc + textureLoad(src, vec2<i32>(i32(gid.x), y), 0);
    }
    textureStore(dst, vec2<i32>(gid.xy), acc / f32(2 * radius + 1));
}
"#;

/// Post hook: mixes binding 0 (filtered) over binding 3 (original
/// source) by factors [intensity].
pub const BLEND_ORIGINAL: &str = r#"
@group(0) @binding(0) var filtered: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;
@group(0) @binding(3) var original: texture_2d<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if gid.x >= dims.x || gid.y >= dims.y { return; }
    let f = textureLoad(filtered, vec2<i32>(gid.xy), 0);
    let o = textureLoad(original, vec2<i32>(gid.xy), 0);
    textureStore(dst, vec2<i32>(gid.xy), mix(o, f, factors[0]));
}
"#;

/// Nearest-neighbour resample from the source size to the destination
/// size. The size policy on the filter decides the destination size;
/// the kernel just maps coordinates.
pub const RESAMPLE: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let out_dims = textureDimensions(dst);
    if gid.x >= out_dims.x || gid.y >= out_dims.y { return; }
    let in_dims = textureDimensions(src);
    let scaled = vec2<f32>(gid.xy) * vec2<f32>(in_dims) / vec2<f32>(out_dims);
    let coord = clamp(
        vec2<i32>(scaled),
        vec2<i32>(0),
        vec2<i32>(in_dims) - vec2<i32>(1),
    );
    textureStore(dst, vec2<i32>(gid.xy), textureLoad(src, coord, 0));
}
"#;

/// Rotates by factors [quarter turns]. Odd turn counts expect a
/// destination with swapped axes.
pub const ROTATE: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<storage, read> factors: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let out_dims = textureDimensions(dst);
    if gid.x >= out_dims.x || gid.y >= out_dims.y { return; }
    let in_dims = vec2<i32>(textureDimensions(src));
    let x = i32(gid.x);
    let y = i32(gid.y);
    var coord = vec2<i32>(x, y);
    switch u32(factors[0]) % 4u {
        case 1u: { coord = vec2<i32>(y, in_dims.y - 1 - x); }
        case 2u: { coord = vec2<i32>(in_dims.x - 1 - x, in_dims.y - 1 - y); }
        case 3u: { coord = vec2<i32>(in_dims.x - 1 - y, x); }
        default: {}
    }
    textureStore(dst, vec2<i32>(gid.xy), textureLoad(src, coord, 0));
}
"#;

/// All built-in kernels, name to source.
pub(crate) const BUILTIN: &[(&str, &str)] = &[
    ("grayscale", GRAYSCALE),
    ("invert", INVERT),
    ("brightness", BRIGHTNESS),
    ("contrast", CONTRAST),
    ("exposure", EXPOSURE),
    ("color_matrix", COLOR_MATRIX),
    ("solid_color", SOLID_COLOR),
    ("crop", CROP),
    ("flip_h", FLIP_H),
    ("gaussian_blur_h", GAUSSIAN_BLUR_H),
    ("gaussian_blur_v", GAUSSIAN_BLUR_V),
    ("box_blur_h", BOX_BLUR_H),
    ("box_blur_v", BOX_BLUR_V),
    ("blend_original", BLEND_ORIGINAL),
    ("resample", RESAMPLE),
    ("rotate", ROTATE),
];

/// Looks up a built-in kernel source by name.
pub(crate) fn source(name: &str) -> Option<&'static str> {
    BUILTIN
        .iter()
        .find(|(kernel, _)| *kernel == name)
        .map(|(_, src)| *src)
}
