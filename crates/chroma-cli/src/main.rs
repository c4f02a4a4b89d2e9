//! chroma - apply GPU filter chains to images

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chroma_gpu::{FilterChain, GpuContext, ImageLike};

mod filter_spec;

#[derive(Parser)]
#[command(name = "chroma")]
#[command(author, version, about = "Apply GPU filter chains to images")]
#[command(long_about = "
Runs an ordered list of filters over an image on the GPU.

Examples:
  chroma apply input.png -o out.png -f grayscale -f blur=4
  chroma apply photo.jpg -o out.jpg -f brightness=0.1 -f contrast=1.3
  chroma apply frame.png -o out.png -f crop=64,64,512,512 --mirrored
  chroma filters                        # List available filters
  chroma info                           # Show the selected adapter
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a filter chain to an image file
    #[command(visible_alias = "a")]
    Apply(ApplyArgs),

    /// List the available filters and their arguments
    #[command(visible_alias = "f")]
    Filters,

    /// Show the GPU adapter the chain engine selected
    #[command(visible_alias = "i")]
    Info,
}

#[derive(clap::Args)]
struct ApplyArgs {
    /// Input image (any format the image crate decodes)
    input: PathBuf,

    /// Output image path; format follows the extension
    #[arg(short, long)]
    output: PathBuf,

    /// Filter spec, repeatable and applied in order (name or name=args)
    #[arg(short, long = "filter")]
    filters: Vec<String>,

    /// Flip the result horizontally after the last filter
    #[arg(long)]
    mirrored: bool,

    /// Submit and wait after every filter instead of batching
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Apply(args) => apply(args),
        Commands::Filters => {
            print!("{}", filter_spec::usage());
            Ok(())
        }
        Commands::Info => info(),
    }
}

fn apply(args: ApplyArgs) -> Result<()> {
    let mut filters = Vec::with_capacity(args.filters.len());
    for spec in &args.filters {
        filters.push(filter_spec::parse(spec).with_context(|| format!("filter '{spec}'"))?);
    }

    let chain = FilterChain::new(filters)
        .with_mirrored(args.mirrored)
        .with_realtime_commit(args.realtime);

    let input = image::open(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?
        .to_rgba8();
    let (w, h) = input.dimensions();
    tracing::debug!(width = w, height = h, filters = chain.filters().len(), "loaded input");

    let output = match chain.run(&ImageLike::Bitmap(input))? {
        ImageLike::Bitmap(bitmap) => bitmap,
        other => anyhow::bail!("unexpected output variant {other:?}"),
    };
    output
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "{} -> {} ({}x{})",
        args.input.display(),
        args.output.display(),
        output.width(),
        output.height()
    );
    Ok(())
}

fn info() -> Result<()> {
    let ctx = GpuContext::acquire()?;
    let info = ctx.adapter_info();
    println!("adapter:  {}", info.name);
    println!("backend:  {:?}", info.backend);
    println!("type:     {:?}", info.device_type);
    println!("max 2d:   {}", ctx.limits().max_texture_dimension_2d);
    Ok(())
}
