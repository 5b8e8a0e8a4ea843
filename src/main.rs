mod annotate;
mod capture;
mod config;
mod detection;
mod output;
mod overlay;
mod scheduler;
mod session;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use capture::NokhwaProvider;
use clap::{Args, Parser, Subcommand};
use config::SessionConfig;
use detection::{DetectionClient, HttpDetector, UpdatePolicy};
use output::{NullOutput, OutputSink, V4L2Output};
use overlay::{ClassColors, OverlayRenderer};
use scheduler::FrameScheduler;
use session::Session;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available video input devices
    Devices,

    /// Stream a webcam through the detector until Ctrl+C
    Run(RunArgs),

    /// Detect objects in a still image and save an annotated copy
    Annotate(AnnotateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Camera to open (index or device path); defaults to the first camera
    #[arg(short, long, env = "HELMWATCH_DEVICE")]
    device: Option<String>,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: PathBuf,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Run without a display surface
    #[arg(long, conflicts_with = "output_device")]
    headless: bool,

    /// Render ticks per second
    #[arg(long, default_value_t = 60)]
    refresh_rate: u32,

    /// Delay between requesting the camera and opening it, in milliseconds
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Minimum milliseconds between detection requests
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// Maximum detection requests in flight (0 = unbounded)
    #[arg(long, default_value_t = 1)]
    max_in_flight: usize,

    /// Let a late response overwrite a newer one
    #[arg(long)]
    accept_out_of_order: bool,

    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Image to annotate
    input: PathBuf,

    /// Where to write the annotated image
    output: PathBuf,

    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(Args, Debug)]
struct DetectorArgs {
    /// Detection endpoint
    #[arg(long, env = "HELMWATCH_ENDPOINT", default_value = config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// JPEG quality of uploaded frames (1-100)
    #[arg(long, default_value_t = 80)]
    jpeg_quality: u8,

    /// Detection request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Box colour override as LABEL=COLOR; `*` sets the fallback colour
    #[arg(long = "class-color", value_name = "LABEL=COLOR")]
    class_colors: Vec<String>,

    /// Label font size in pixels
    #[arg(long, default_value_t = 18)]
    font_size: u32,
}

impl DetectorArgs {
    fn apply(&self, config: &mut SessionConfig) -> Result<()> {
        config.endpoint = config::parse_endpoint(&self.endpoint)?;
        config.jpeg_quality = self.jpeg_quality;
        config.request_timeout = Duration::from_millis(self.timeout_ms);
        config.font_size = self.font_size;
        Ok(())
    }

    fn class_colors(&self) -> Result<ClassColors> {
        let mut colors = ClassColors::default();
        for assignment in &self.class_colors {
            colors
                .apply_override(assignment)
                .context("Invalid --class-color")?;
        }
        Ok(colors)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Devices => list_devices(),
        Command::Run(args) => run(args),
        Command::Annotate(args) => annotate(args),
    }
}

fn list_devices() -> Result<()> {
    let devices = capture::list_devices(&NokhwaProvider);
    if devices.is_empty() {
        println!("No video input devices available");
        return Ok(());
    }

    println!("{:<16} Name", "Id");
    for device in devices {
        println!("{:<16} {}", device.id, device.display_name);
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = SessionConfig {
        detection_interval: Duration::from_millis(args.interval_ms),
        settle_delay: Duration::from_millis(args.settle_ms),
        refresh_rate: args.refresh_rate,
        max_in_flight: args.max_in_flight,
        update_policy: if args.accept_out_of_order {
            UpdatePolicy::CompletionOrder
        } else {
            UpdatePolicy::LatestDispatch
        },
        ..SessionConfig::default()
    };
    args.detector.apply(&mut config)?;
    config.validate()?;

    tracing::info!("helmwatch starting");
    tracing::info!("Detector: {}", config.endpoint);
    tracing::info!(
        "Detection every {} ms, render at {} Hz",
        config.detection_interval.as_millis(),
        config.refresh_rate
    );

    let sink: Box<dyn OutputSink + Send> = if args.headless {
        tracing::info!("Running headless (no display surface)");
        Box::new(NullOutput::default())
    } else {
        Box::new(
            V4L2Output::new(&args.output_device, args.output_width, args.output_height)
                .context("Failed to initialize v4l2loopback output")?,
        )
    };
    let (out_w, out_h) = sink.resolution();
    tracing::debug!("Display surface {}x{}", out_w, out_h);

    let detector = HttpDetector::new(
        config.endpoint.clone(),
        config.jpeg_quality,
        config.request_timeout,
    );
    let client = DetectionClient::new(
        Arc::new(detector),
        config.update_policy,
        config.max_in_flight,
    );
    let renderer = OverlayRenderer::new(
        args.detector.class_colors()?,
        config.font_size,
        config.line_width,
    );
    let scheduler = FrameScheduler::new(client.clone(), renderer, config.detection_interval);
    let mut session = Session::new(
        config,
        Arc::new(NokhwaProvider),
        scheduler,
        client,
        sink,
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    tracing::info!("Waiting for camera...");
    session
        .start(args.device.as_deref())
        .context("Failed to start session")?;
    tracing::info!("Press Ctrl+C to stop");

    // Surface the controls and fps readout once a second until shutdown
    let mut was_busy = None;
    while let Err(mpsc::RecvTimeoutError::Timeout) =
        shutdown_rx.recv_timeout(Duration::from_secs(1))
    {
        let controls = session.controls();
        if let Some(busy) = busy_transition(&mut was_busy, controls.busy) {
            tracing::info!(busy, "Busy indicator changed");
        }
        tracing::info!(
            start = controls.start_enabled,
            stop = controls.stop_enabled,
            busy = controls.busy,
            "{:?}: {} fps, {} detections, {} requests in flight",
            session.state(),
            controls.fps,
            session.client().snapshot().current().len(),
            session.client().in_flight()
        );
    }

    tracing::info!("Shutting down");
    session.dispose();
    Ok(())
}

/// Returns the new busy flag when it differs from the last one seen
fn busy_transition(last: &mut Option<bool>, busy: bool) -> Option<bool> {
    if *last == Some(busy) {
        return None;
    }
    *last = Some(busy);
    Some(busy)
}

fn annotate(args: AnnotateArgs) -> Result<()> {
    let mut config = SessionConfig::default();
    args.detector.apply(&mut config)?;
    config.validate()?;

    let detector = HttpDetector::new(
        config.endpoint.clone(),
        config.jpeg_quality,
        config.request_timeout,
    );
    tracing::info!("Detector: {}", detector.endpoint());
    let renderer = OverlayRenderer::new(
        args.detector.class_colors()?,
        config.font_size,
        config.line_width,
    );

    annotate::annotate_file(&detector, &renderer, &args.input, &args.output)?;
    Ok(())
}
