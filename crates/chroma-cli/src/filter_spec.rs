//! Parses `name` / `name=arg,arg,...` filter specs into filters.

use anyhow::{bail, Context, Result};
use chroma_gpu::Filter;

/// One line per filter, printed by `chroma filters`.
pub fn usage() -> String {
    let specs = [
        ("grayscale", "Rec. 709 luma grayscale"),
        ("invert", "invert RGB"),
        ("brightness=V", "add V to each channel, V in -1..1"),
        ("contrast=V", "scale contrast around mid-gray, 1 = identity"),
        ("exposure=STOPS", "photographic exposure in stops"),
        ("blur=RADIUS", "separable Gaussian blur"),
        ("box-blur=RADIUS", "separable box blur"),
        ("sepia=INTENSITY", "sepia tone, 0..1 (CPU stage)"),
        ("crop=X,Y,W,H", "crop to the rectangle"),
        ("flip", "horizontal mirror"),
        ("resize=W,H", "nearest-neighbour resize"),
        ("scale=FACTOR", "uniform scale"),
        ("rotate=TURNS", "clockwise quarter turns"),
        ("solid=R,G,B,A", "fill with a color, components 0..1"),
    ];
    let mut out = String::new();
    for (spec, help) in specs {
        out.push_str(&format!("  {spec:<20} {help}\n"));
    }
    out
}

pub fn parse(spec: &str) -> Result<Filter> {
    let (name, args) = match spec.split_once('=') {
        Some((name, args)) => (name.trim(), Some(args)),
        None => (spec.trim(), None),
    };
    let filter = match name {
        "grayscale" => Filter::grayscale(),
        "invert" => Filter::invert(),
        "flip" => Filter::flip_horizontal(),
        "brightness" => Filter::brightness(one_float(name, args)?),
        "contrast" => Filter::contrast(one_float(name, args)?),
        "exposure" => Filter::exposure(one_float(name, args)?),
        "blur" => Filter::gaussian_blur(one_float(name, args)?),
        "box-blur" => Filter::box_blur(one_float(name, args)?),
        "sepia" => Filter::sepia(one_float(name, args)?),
        "scale" => Filter::scaled(one_float(name, args)?),
        "rotate" => {
            let turns: u32 = required(name, args)?
                .trim()
                .parse()
                .context("turns must be a non-negative integer")?;
            Filter::rotate90(turns)
        }
        "crop" => {
            let [x, y, w, h] = n_ints::<4>(name, args)?;
            Filter::crop(x, y, w, h)
        }
        "resize" => {
            let [w, h] = n_ints::<2>(name, args)?;
            Filter::resize(w, h)
        }
        "solid" => {
            let [r, g, b, a] = n_floats::<4>(name, args)?;
            Filter::solid_color([r, g, b, a])
        }
        other => bail!("unknown filter '{other}'"),
    };
    Ok(filter)
}

fn required<'a>(name: &str, args: Option<&'a str>) -> Result<&'a str> {
    args.with_context(|| format!("'{name}' needs arguments"))
}

fn one_float(name: &str, args: Option<&str>) -> Result<f32> {
    required(name, args)?
        .trim()
        .parse()
        .with_context(|| format!("'{name}' needs one number"))
}

fn n_floats<const N: usize>(name: &str, args: Option<&str>) -> Result<[f32; N]> {
    let parts: Vec<f32> = required(name, args)?
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("'{name}' needs {N} comma-separated numbers"))?;
    parts
        .try_into()
        .map_err(|_| anyhow::anyhow!("'{name}' needs exactly {N} values"))
}

fn n_ints<const N: usize>(name: &str, args: Option<&str>) -> Result<[u32; N]> {
    let parts: Vec<u32> = required(name, args)?
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("'{name}' needs {N} comma-separated integers"))?;
    parts
        .try_into()
        .map_err(|_| anyhow::anyhow!("'{name}' needs exactly {N} values"))
}
