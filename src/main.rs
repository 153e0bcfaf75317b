//! RGB-D Fusion CLI
//!
//! Runs the fusion pipeline against the synthetic sensor and reports
//! matched-frame statistics.

use clap::Parser;
use rgbd_fusion::{
    capture::{FileConfig, MockSensor},
    metrics::MetricsRegistry,
    Callback, FusionPipeline, PipelineStats,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "rgbd-fusion")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many fused frames (0 runs until Ctrl+C)
    #[arg(short, long)]
    frames: Option<u64>,

    /// Build decimated clouds instead of full resolution
    #[arg(long)]
    normal_cloud: bool,

    /// Pixel stride for decimated clouds
    #[arg(long)]
    stride: Option<usize>,

    /// Do not re-project points into the color image
    #[arg(long)]
    no_align: bool,

    /// Treat color as already registered to depth
    #[arg(long)]
    preregistered: bool,

    /// Metrics server port (0 disables it)
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn load_config(args: &Args) -> Result<FileConfig, rgbd_fusion::capture::ConfigError> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    if args.normal_cloud {
        config.pipeline.large_cloud = false;
    }
    if let Some(stride) = args.stride {
        config.pipeline.normal_cloud_stride = stride;
    }
    if args.no_align {
        config.pipeline.align_to_color = false;
    }
    if args.preregistered {
        config.pipeline.preregistered = true;
    }
    #[cfg(feature = "metrics")]
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }

    config.pipeline.validate()?;
    Ok(config)
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("RGB-D Fusion v{}", rgbd_fusion::VERSION);
    info!("This is a demonstration using synthetic sensor input");

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let (sensor, _handle) = MockSensor::synthetic(config.calibration.clone(), config.sensor.clone());
    let pipeline = match FusionPipeline::with_config(sensor, config.pipeline.clone()) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("Failed to create pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let fused = Arc::new(AtomicU64::new(0));
    {
        let fused = Arc::clone(&fused);
        pipeline.callbacks().register(Callback::all_data(move |frame| {
            let n = fused.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                frame = n,
                captured_at = %frame.captured_at.format("%H:%M:%S%.3f"),
                width = frame.cloud.width,
                height = frame.cloud.height,
                valid = frame.cloud.valid_count(),
                "Fused frame"
            );
            Ok(())
        }));
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(err) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    }

    let registry = match MetricsRegistry::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };

    #[cfg(feature = "metrics")]
    spawn_metrics_server(config.output.metrics_port, Arc::clone(&pipeline));

    if let Err(e) = pipeline.start() {
        eprintln!("Failed to start pipeline on {}: {}", pipeline.name(), e);
        std::process::exit(1);
    }

    let frame_limit = config.output.frame_count;
    info!(
        sensor = %pipeline.name(),
        frame_limit,
        large_cloud = config.pipeline.large_cloud,
        "Processing frames, press Ctrl+C to stop"
    );

    let mut last_report = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));

        if !pipeline.is_running() {
            warn!("Acquisition stopped unexpectedly");
            break;
        }
        if frame_limit > 0 && fused.load(Ordering::Relaxed) >= frame_limit {
            break;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let stats = pipeline.stats();
            registry.update(&stats);
            report(&stats);
        }
    }

    if let Err(e) = pipeline.stop() {
        warn!("Stop failed: {}", e);
    }

    let stats = pipeline.stats();
    registry.update(&stats);
    report(&stats);
    info!(
        "Processed {} events: {} fused, {} dropped for skew, {} extraction failures",
        stats.events, stats.pairs_matched, stats.pairs_dropped, stats.extraction_failures
    );

    match registry.encode() {
        Ok(text) => debug!("Final metrics:\n{}", text),
        Err(e) => warn!("Failed to encode metrics: {}", e),
    }

    info!("Done. Fused frames delivered: {}", fused.load(Ordering::Relaxed));
}

fn report(stats: &PipelineStats) {
    info!(
        fps = stats.frames_per_second,
        matched = stats.pairs_matched,
        dropped = stats.pairs_dropped,
        clouds = stats.clouds_built,
        failures = stats.callback_failures,
        "Pipeline status"
    );
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(port: u16, pipeline: Arc<FusionPipeline>) {
    use rgbd_fusion::metrics::MetricsServer;

    if port == 0 {
        return;
    }

    let server = match MetricsServer::new(port, pipeline) {
        Ok(server) => server,
        Err(e) => {
            warn!("Metrics server disabled: {}", e);
            return;
        }
    };

    let spawned = std::thread::Builder::new()
        .name("metrics-server".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.serve()) {
                warn!("Metrics server stopped: {}", e);
            }
        });

    if let Err(e) = spawned {
        warn!("Failed to spawn metrics server: {}", e);
    }
}
