//! Binary entrypoint: loads the images given on the command line through the
//! reader pipeline and reports each result.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use texture_reader::config::{self, ReaderConfig};
use texture_reader::events::{ReadRequest, TargetUsage, TransformParams};
use texture_reader::gpu::WgpuTextureCreator;
use texture_reader::reader::ImageReader;
use texture_reader::source::FsImageSource;

#[derive(Debug, Parser)]
#[command(name = "texture-reader", about = "Decode images off-thread into GPU textures")]
struct Cli {
    /// Image files to load
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,

    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Downscale both axes to this percentage (exclusive 0-100)
    #[arg(long, value_name = "PERCENT")]
    scale: Option<u32>,

    /// Treat images as world textures instead of UI textures
    #[arg(long)]
    world: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("texture_reader={}", level).parse()?)
        .add_directive("wgpu=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = match &cli.config {
        Some(path) => config::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ReaderConfig::default(),
    };
    cfg.validate().context("validating configuration")?;

    if let Some(scale) = cli.scale {
        if scale == 0 || scale >= 100 {
            bail!("--scale must be strictly between 0 and 100, got {scale}");
        }
    }

    // A headless device is all the pipeline needs; no surface, no window.
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .context("failed to acquire GPU adapter")?;
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("texture-reader-device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::default(),
        trace: wgpu::Trace::default(),
        experimental_features: wgpu::ExperimentalFeatures::default(),
    }))
    .context("failed to acquire GPU device")?;

    let source = Arc::new(FsImageSource::new(cfg.max_file_size_bytes));
    let creator = WgpuTextureCreator::new(device, queue);
    let mut reader = ImageReader::initialize(&cfg, source, creator)?;

    let transform = TransformParams {
        usage: if cli.world { TargetUsage::World } else { TargetUsage::Ui },
        percent_size_x: cli.scale.unwrap_or(100),
        percent_size_y: cli.scale.unwrap_or(100),
    };
    let submitted = cli.images.len();
    for path in &cli.images {
        reader.submit(ReadRequest::with_transform(
            path.to_string_lossy().into_owned(),
            transform,
        ));
    }
    info!(count = submitted, "requests submitted");

    reader.flush();

    let mut failures = 0usize;
    while let Some(result) = reader.poll() {
        match result.texture {
            Some(texture) => info!(
                source_id = %result.source_id,
                width = texture.width,
                height = texture.height,
                format = ?texture.format,
                "texture ready"
            ),
            None => {
                failures += 1;
                let err = result.error.unwrap_or_default();
                error!(source_id = %result.source_id, error = %err, "load failed");
            }
        }
    }

    reader.shutdown();

    if failures > 0 {
        bail!("{failures} of {submitted} images failed to load");
    }
    Ok(())
}
