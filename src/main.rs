use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pan_sentry::config::AppConfig;
use pan_sentry::devices::headless::HeadlessDisplay;
use pan_sentry::devices::replay::ReplaySource;
use pan_sentry::devices::serial::open_actuator_channel;
use pan_sentry::stream::{self, DisplaySurface, FrameSource, SystemClock};
use pan_sentry::{PipelineConfig, TrackingPipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// Colour input, 7px kernel, two merge dilations.
    Default,
    /// Luma input, 5px kernel, one dilation, every other frame analysed.
    Responsive,
}

#[derive(Parser, Debug)]
#[command(name = "pan_sentry", about = "Point a pan servo at whatever moves in front of the camera")]
struct Args {
    /// JSON configuration file; missing fields keep their defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Replace the pipeline section with a built-in preset.
    #[arg(long, value_enum)]
    preset: Option<Preset>,
    /// Serial device of the servo controller.
    #[arg(long, value_name = "PATH")]
    serial_port: Option<String>,
    #[arg(long)]
    camera: Option<i32>,
    /// Replay still images from a directory instead of opening a camera.
    #[arg(long, value_name = "DIR")]
    replay: Option<PathBuf>,
    #[arg(long)]
    headless: bool,
    /// Headless only: write annotated frames and masks here.
    #[arg(long, value_name = "DIR")]
    dump_dir: Option<PathBuf>,
    /// Used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = resolve_config(&args)?;
    run(&config)
}

fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };

    match args.preset {
        Some(Preset::Default) => config.pipeline = PipelineConfig::default(),
        Some(Preset::Responsive) => config.pipeline = PipelineConfig::responsive(),
        None => {}
    }
    if let Some(port) = &args.serial_port {
        config.serial.port = Some(port.clone());
    }
    if let Some(index) = args.camera {
        config.capture.camera_index = index;
    }
    if let Some(dir) = &args.replay {
        config.capture.replay_dir = Some(dir.clone());
    }
    if args.headless {
        config.display.headless = true;
    }
    if let Some(dir) = &args.dump_dir {
        config.display.dump_dir = Some(dir.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(config: &AppConfig) -> Result<()> {
    info!(state = "starting", "pan_sentry");
    let mut source = open_source(config)?;
    let mut display = open_display(config)?;

    let channel = stream::acquire_channel(|| open_actuator_channel(&config.serial));
    let mut pipeline = TrackingPipeline::new(config.pipeline.clone(), channel);

    let summary = stream::run_stream(source.as_mut(), display.as_mut(), &mut pipeline, &mut SystemClock)
        .context("stream aborted")?;
    info!(
        frames = summary.frames,
        commands = summary.commands_sent,
        failures = pipeline.dispatcher().stats().failures,
        "done"
    );
    Ok(())
}

fn open_source(config: &AppConfig) -> Result<Box<dyn FrameSource>> {
    if let Some(dir) = &config.capture.replay_dir {
        let source = ReplaySource::open(dir).with_context(|| format!("opening replay directory {}", dir.display()))?;
        return Ok(Box::new(source));
    }
    open_camera(config)
}

#[cfg(feature = "camera")]
fn open_camera(config: &AppConfig) -> Result<Box<dyn FrameSource>> {
    let camera = pan_sentry::devices::camera::CameraSource::open(&config.capture)
        .with_context(|| format!("opening camera {}", config.capture.camera_index))?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_config: &AppConfig) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without the `camera` feature; pass --replay <DIR> or rebuild with --features camera")
}

fn open_display(config: &AppConfig) -> Result<Box<dyn DisplaySurface>> {
    if config.display.headless || !cfg!(feature = "camera") {
        return Ok(Box::new(HeadlessDisplay::new(&config.display).context("preparing headless display")?));
    }
    open_window(config)
}

#[cfg(feature = "camera")]
fn open_window(config: &AppConfig) -> Result<Box<dyn DisplaySurface>> {
    let window = pan_sentry::devices::camera::HighGuiDisplay::new(&config.display).context("opening display window")?;
    Ok(Box::new(window))
}

#[cfg(not(feature = "camera"))]
fn open_window(config: &AppConfig) -> Result<Box<dyn DisplaySurface>> {
    Ok(Box::new(HeadlessDisplay::new(&config.display)?))
}
